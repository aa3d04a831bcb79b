// =============================================================================
// ATOMIC SWAP v0.1 - Refund Transaction
// =============================================================================
//
// Returns a deposit to its creator once the locktime passes:
//
//   input 0:  funding output 0, sequence 0 (so the locktime is enforced)
//   output 0: amount - fee -> creator
//   locktime: now + hours * 3600 (unix timestamp)
//
// The creator signs first. The transaction stays below the 2-of-2 threshold,
// and therefore unspendable, until the counterparty cosigns.
//
// =============================================================================

use std::time::{SystemTime, UNIX_EPOCH};

use crate::contract::{ContractScript, DEPOSITOR_SLOT};
use crate::error::{Result, SwapError};
use crate::funding::{FundingTransaction, CONTRACT_OUTPUT_INDEX};
use crate::keys::KeyMaterial;
use crate::proof::MultisigProof;
use crate::transaction::{verify_ecdsa, Tx, Txid};
use crate::{SECONDS_PER_HOUR, SEQUENCE_FINAL, SIGHASH_ALL};

/// Input sequence of every refund; any value below final enables locktime
pub const REFUND_SEQUENCE: u32 = 0;

/// A refund transaction together with its typed spending proof
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefundTransaction {
    tx: Tx,
    proof: MultisigProof,
}

impl RefundTransaction {
    /// Rebuild from a received transaction, recovering its proof
    pub fn from_tx(tx: Tx, contract: &ContractScript) -> Result<Self> {
        if tx.inputs.len() != 1 {
            return Err(SwapError::validation(format!(
                "Refund must have exactly one input, found {}",
                tx.inputs.len()
            )));
        }
        let proof = MultisigProof::from_script_sig(&tx, 0, contract)?;
        Ok(RefundTransaction { tx, proof })
    }

    pub fn from_hex(s: &str, contract: &ContractScript) -> Result<Self> {
        Self::from_tx(Tx::from_hex(s)?, contract)
    }

    pub(crate) fn from_parts(tx: Tx, proof: MultisigProof) -> Self {
        RefundTransaction { tx, proof }
    }

    pub fn tx(&self) -> &Tx {
        &self.tx
    }

    pub fn txid(&self) -> Txid {
        self.tx.txid()
    }

    pub fn proof(&self) -> &MultisigProof {
        &self.proof
    }

    pub fn lock_time(&self) -> u32 {
        self.tx.lock_time
    }

    /// Value returned to the creator
    pub fn refund_value(&self) -> u64 {
        self.tx.output_sum()
    }

    /// Both signatures present and encoded
    pub fn is_final(&self) -> bool {
        self.proof.is_complete()
    }

    pub fn to_hex(&self) -> String {
        self.tx.to_hex()
    }

    /// Full script verification against the contract's locking script
    pub fn verify(&self, contract: &ContractScript) -> Result<bool> {
        if !self.is_final() {
            return Ok(false);
        }
        self.tx.verify_input_script(0, &contract.locking_script())
    }

    /// Checks a counterparty should make before adding its signature
    pub fn check_timelocked(&self) -> Result<()> {
        let input = self
            .tx
            .inputs
            .first()
            .ok_or_else(|| SwapError::validation("Refund has no input"))?;
        if self.tx.lock_time == 0 {
            return Err(SwapError::validation("Refund has no locktime"));
        }
        if input.sequence == SEQUENCE_FINAL {
            return Err(SwapError::validation("Refund input is final; locktime would be ignored"));
        }
        Ok(())
    }
}

/// Builds the creator's partially signed refund
pub struct RefundTransactionBuilder {
    fee: u64,
}

impl RefundTransactionBuilder {
    pub fn new(fee: u64) -> Self {
        RefundTransactionBuilder { fee }
    }

    pub fn build(
        &self,
        key: &KeyMaterial,
        amount: u64,
        funding: &FundingTransaction,
        contract: &ContractScript,
        lock_hours: u32,
    ) -> Result<RefundTransaction> {
        self.build_at(key, amount, funding, contract, lock_hours, unix_now())
    }

    /// As `build`, with an explicit current time (unix seconds)
    pub fn build_at(
        &self,
        key: &KeyMaterial,
        amount: u64,
        funding: &FundingTransaction,
        contract: &ContractScript,
        lock_hours: u32,
        now: u64,
    ) -> Result<RefundTransaction> {
        if amount <= self.fee {
            return Err(SwapError::validation(format!(
                "Amount {} does not cover the refund fee {}",
                amount, self.fee
            )));
        }

        let deposit = funding.contract_output()?;
        if deposit.script_pubkey != contract.locking_script() {
            return Err(SwapError::validation("Funding output does not pay to this contract"));
        }
        if deposit.value != amount {
            return Err(SwapError::validation(format!(
                "Funding output holds {}, refund expects {}",
                deposit.value, amount
            )));
        }

        // Only the depositor refunds; the recipient's way out is the hash lock
        if contract.multisig_slot(&key.public_key_bytes()) != Some(DEPOSITOR_SLOT) {
            return Err(SwapError::validation("Only the contract's depositor can build its refund"));
        }

        let lock_time = locktime_after(now, lock_hours)?;

        let mut tx = Tx::new();
        tx.add_input_with_sequence(deposit.txid, CONTRACT_OUTPUT_INDEX, REFUND_SEQUENCE);
        tx.add_output(amount - self.fee, contract.depositor_script_pubkey());
        tx.lock_time = lock_time;

        // Signed against the redeem script: the output spent is P2SH
        let digest = tx.signature_hash(0, contract.redeem_script(), SIGHASH_ALL)?;
        let signature = key.sign(&digest);
        if !verify_ecdsa(&digest, &signature[..signature.len() - 1], &key.public_key_bytes()) {
            return Err(SwapError::signature("Refund signature does not verify"));
        }

        let mut proof = MultisigProof::new();
        proof.add_signature(DEPOSITOR_SLOT, signature)?;
        tx.inputs[0].script_sig = proof.partial_script_sig();

        log::info!(
            "Refund {} partially signed: {} back to {} after locktime {}",
            tx.txid(),
            amount - self.fee,
            key.address(),
            lock_time
        );

        Ok(RefundTransaction { tx, proof })
    }
}

/// Absolute unix-time locktime `hours` after `now`
pub fn locktime_after(now: u64, hours: u32) -> Result<u32> {
    let lock = now.saturating_add(hours as u64 * SECONDS_PER_HOUR as u64);
    u32::try_from(lock).map_err(|_| SwapError::InvalidTimeout(format!("Locktime {} out of range", lock)))
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
