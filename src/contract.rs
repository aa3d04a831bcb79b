// =============================================================================
// ATOMIC SWAP v0.1 - Contract Script
// =============================================================================
//
// Redeem script of a swap deposit:
//
// OP_IF
//     2 <depositor_pubkey> <recipient_pubkey> 2 OP_CHECKMULTISIG
// OP_ELSE
//     <recipient_pubkey> OP_CHECKSIGVERIFY OP_HASH256 <digest> OP_EQUAL
// OP_ENDIF
//
// Cooperative spend (used by the refund):
//     OP_0 <depositor_sig> <recipient_sig> OP_1 <redeem_script>
//
// Hash-lock spend (recipient claims with the secret):
//     <preimage> <recipient_sig> OP_0 <redeem_script>
//
// The deposit pays to OP_HASH160 <hash160(redeem_script)> OP_EQUAL.
//
// =============================================================================

use crate::chain::ChainParams;
use crate::error::{Result, SwapError};
use crate::keys::{script_to_address, validate_pubkey};
use crate::script::{hash160, OpCode, Script};
use crate::HASH_SIZE;

/// Branch-selector for the cooperative 2-of-2 path
pub const MULTISIG_BRANCH: OpCode = OpCode::Op1;

/// Branch-selector for the hash-lock path
pub const HASHLOCK_BRANCH: OpCode = OpCode::Op0;

/// Multisig slot of the depositor, the only party a refund may pay
pub const DEPOSITOR_SLOT: usize = 0;

/// Multisig slot of the recipient, who cosigns the depositor's refund
pub const RECIPIENT_SLOT: usize = 1;

/// A validated swap redeem script
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractScript {
    depositor_pubkey: Vec<u8>,
    recipient_pubkey: Vec<u8>,
    digest: [u8; HASH_SIZE],
    redeem_script: Script,
}

impl ContractScript {
    /// Build the contract for a deposit by `depositor` payable to `recipient`
    pub fn build(depositor_pubkey: &[u8], recipient_pubkey: &[u8], digest: &[u8]) -> Result<Self> {
        validate_pubkey(depositor_pubkey)?;
        validate_pubkey(recipient_pubkey)?;
        if depositor_pubkey == recipient_pubkey {
            return Err(SwapError::validation("Depositor and recipient keys must differ"));
        }
        let digest: [u8; HASH_SIZE] = digest
            .try_into()
            .map_err(|_| SwapError::validation("Hash digest must be 32 bytes"))?;

        let redeem_script = Script {
            ops: vec![
                OpCode::OpIf,
                OpCode::Op2,
                OpCode::OpPushData(depositor_pubkey.to_vec()),
                OpCode::OpPushData(recipient_pubkey.to_vec()),
                OpCode::Op2,
                OpCode::OpCheckMultiSig,
                OpCode::OpElse,
                OpCode::OpPushData(recipient_pubkey.to_vec()),
                OpCode::OpCheckSigVerify,
                OpCode::OpHash256,
                OpCode::OpPushData(digest.to_vec()),
                OpCode::OpEqual,
                OpCode::OpEndIf,
            ],
        };

        log::debug!("Contract script built: digest {}", hex::encode(&digest[..8]));

        Ok(ContractScript {
            depositor_pubkey: depositor_pubkey.to_vec(),
            recipient_pubkey: recipient_pubkey.to_vec(),
            digest,
            redeem_script,
        })
    }

    /// Parse a contract received from the counterparty, checking its shape
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let script = Script::from_bytes(bytes)?;

        let pushed = |i: usize| match script.ops.get(i) {
            Some(OpCode::OpPushData(d)) => Ok(d.clone()),
            _ => Err(SwapError::validation("Not a swap contract script")),
        };
        let depositor = pushed(2)?;
        let recipient = pushed(3)?;
        let digest = pushed(10)?;

        let contract = Self::build(&depositor, &recipient, &digest)?;
        if contract.redeem_script != script {
            return Err(SwapError::validation("Not a swap contract script"));
        }
        Ok(contract)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| SwapError::validation(format!("Invalid contract hex: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    pub fn redeem_script(&self) -> &Script {
        &self.redeem_script
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.redeem_script.to_bytes()
    }

    pub fn to_hex(&self) -> String {
        self.redeem_script.to_hex()
    }

    /// OP_HASH160 <hash160(redeem)> OP_EQUAL
    pub fn locking_script(&self) -> Script {
        Script::p2sh(&self.script_hash())
    }

    pub fn script_hash(&self) -> [u8; 20] {
        hash160(&self.to_bytes())
    }

    pub fn p2sh_address(&self, chain: &ChainParams) -> String {
        script_to_address(&self.redeem_script, chain)
    }

    pub fn depositor_pubkey(&self) -> &[u8] {
        &self.depositor_pubkey
    }

    pub fn recipient_pubkey(&self) -> &[u8] {
        &self.recipient_pubkey
    }

    pub fn digest(&self) -> &[u8; HASH_SIZE] {
        &self.digest
    }

    /// P2PKH script of the depositor: where every refund of this contract pays
    pub fn depositor_script_pubkey(&self) -> Script {
        Script::p2pkh(&hash160(&self.depositor_pubkey))
    }

    /// Keys of the 2-of-2 branch, in the order signatures must appear
    pub fn multisig_keys(&self) -> [&[u8]; 2] {
        [self.depositor_pubkey.as_slice(), self.recipient_pubkey.as_slice()]
    }

    /// Position of `pubkey` in the 2-of-2 branch
    pub fn multisig_slot(&self, pubkey: &[u8]) -> Option<usize> {
        self.multisig_keys().iter().position(|k| *k == pubkey)
    }

    pub fn to_asm(&self) -> String {
        self.redeem_script.to_asm()
    }
}
