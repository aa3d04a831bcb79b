// =============================================================================
// ATOMIC SWAP v0.1 - Multisig Spending Proof
// =============================================================================
//
// Script-sig of the cooperative (2-of-2) contract branch, built up one
// signature at a time:
//
//   empty    ->  (nothing)
//   partial  ->  OP_0 <sig>
//   final    ->  OP_0 <sig_depositor> <sig_recipient> OP_1 <redeem_script>
//
// OP_0 fills the extra argument CHECKMULTISIG pops; OP_1 selects the OP_IF
// branch of the contract.
//
// =============================================================================

use crate::contract::{ContractScript, MULTISIG_BRANCH};
use crate::error::{Result, SwapError};
use crate::script::{OpCode, Script, SignatureChecker};
use crate::transaction::{Tx, TxSignatureChecker};

/// Signatures collected for the 2-of-2 branch, indexed by key position
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MultisigProof {
    signatures: [Option<Vec<u8>>; 2],
}

impl MultisigProof {
    pub fn new() -> Self {
        MultisigProof::default()
    }

    /// Place `signature` in the slot of the key that produced it
    pub fn add_signature(&mut self, slot: usize, signature: Vec<u8>) -> Result<()> {
        let entry = self
            .signatures
            .get_mut(slot)
            .ok_or_else(|| SwapError::validation(format!("No multisig slot {}", slot)))?;
        if entry.is_some() {
            return Err(SwapError::validation(format!("Multisig slot {} already signed", slot)));
        }
        *entry = Some(signature);
        Ok(())
    }

    pub fn signature(&self, slot: usize) -> Option<&[u8]> {
        self.signatures.get(slot).and_then(|s| s.as_deref())
    }

    pub fn has_signature(&self, slot: usize) -> bool {
        self.signature(slot).is_some()
    }

    pub fn signature_count(&self) -> usize {
        self.signatures.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.signature_count() == self.signatures.len()
    }

    /// Below-threshold encoding: placeholder plus whatever signatures exist
    pub fn partial_script_sig(&self) -> Script {
        if self.signature_count() == 0 {
            return Script::new();
        }
        let mut ops = vec![OpCode::Op0];
        ops.extend(self.signatures.iter().flatten().map(|s| OpCode::OpPushData(s.clone())));
        Script { ops }
    }

    /// Spendable encoding; only available once both signatures are present
    pub fn finalize(&self, contract: &ContractScript) -> Result<Script> {
        let (first, second) = match &self.signatures {
            [Some(first), Some(second)] => (first, second),
            _ => {
                return Err(SwapError::validation(format!(
                    "Proof has {} of 2 signatures",
                    self.signature_count()
                )))
            }
        };

        Ok(Script {
            ops: vec![
                OpCode::Op0,
                OpCode::OpPushData(first.clone()),
                OpCode::OpPushData(second.clone()),
                MULTISIG_BRANCH,
                OpCode::OpPushData(contract.to_bytes()),
            ],
        })
    }

    /// Whichever encoding matches the current state
    pub fn to_script_sig(&self, contract: &ContractScript) -> Result<Script> {
        if self.is_complete() {
            self.finalize(contract)
        } else {
            Ok(self.partial_script_sig())
        }
    }

    /// Recover a proof from input `input_index` of a received transaction.
    ///
    /// Each signature is matched to the contract key it verifies under, so the
    /// result does not depend on which party signed first.
    pub fn from_script_sig(tx: &Tx, input_index: usize, contract: &ContractScript) -> Result<Self> {
        let input = tx
            .inputs
            .get(input_index)
            .ok_or_else(|| SwapError::validation("Input index out of bounds"))?;
        let ops = &input.script_sig.ops;

        let signatures: Vec<&Vec<u8>> = match ops.as_slice() {
            [] => Vec::new(),
            [OpCode::Op0, OpCode::OpPushData(s)] => vec![s],
            [OpCode::Op0, OpCode::OpPushData(a), OpCode::OpPushData(b), selector, OpCode::OpPushData(redeem)]
                if *selector == MULTISIG_BRANCH =>
            {
                if redeem.as_slice() != contract.to_bytes().as_slice() {
                    return Err(SwapError::validation("Proof commits to a different contract"));
                }
                vec![a, b]
            }
            _ => return Err(SwapError::validation("Unrecognised multisig proof")),
        };

        let checker = TxSignatureChecker::new(tx, input_index);
        let mut proof = MultisigProof::new();
        for signature in signatures {
            let slot = contract
                .multisig_keys()
                .iter()
                .position(|key| checker.check_sig(signature, key, contract.redeem_script()))
                .ok_or_else(|| SwapError::validation("Signature matches neither contract key"))?;
            proof.add_signature(slot, signature.clone())?;
        }

        Ok(proof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainParams;
    use crate::keys::KeyMaterial;
    use crate::transaction::Txid;
    use crate::SIGHASH_ALL;

    struct Fixture {
        depositor: KeyMaterial,
        recipient: KeyMaterial,
        contract: ContractScript,
        tx: Tx,
    }

    fn fixture() -> Fixture {
        let chain = ChainParams::bitcoin();
        let depositor = KeyMaterial::generate(&chain);
        let recipient = KeyMaterial::generate(&chain);
        let contract = ContractScript::build(
            &depositor.public_key_bytes(),
            &recipient.public_key_bytes(),
            &[3; 32],
        )
        .unwrap();
        let mut tx = Tx::new();
        tx.add_input_with_sequence(Txid([1; 32]), 0, 0);
        tx.add_output(1_000, depositor.script_pubkey());
        tx.lock_time = 1_800_000_000;
        Fixture { depositor, recipient, contract, tx }
    }

    fn sign(f: &Fixture, key: &KeyMaterial) -> Vec<u8> {
        let digest = f.tx.signature_hash(0, f.contract.redeem_script(), SIGHASH_ALL).unwrap();
        key.sign(&digest)
    }

    #[test]
    fn test_partial_encoding() {
        let f = fixture();
        let mut proof = MultisigProof::new();
        assert!(proof.partial_script_sig().is_empty());

        let sig = sign(&f, &f.depositor);
        proof.add_signature(0, sig.clone()).unwrap();
        let script = proof.partial_script_sig();
        assert_eq!(script.ops, vec![OpCode::Op0, OpCode::OpPushData(sig)]);
        assert!(proof.finalize(&f.contract).is_err());
    }

    #[test]
    fn test_slot_cannot_be_overwritten() {
        let mut proof = MultisigProof::new();
        proof.add_signature(1, vec![1]).unwrap();
        assert!(proof.add_signature(1, vec![2]).is_err());
        assert!(proof.add_signature(2, vec![3]).is_err());
        assert_eq!(proof.signature(1), Some(&[1u8][..]));
    }

    #[test]
    fn test_final_encoding_in_key_order() {
        let f = fixture();
        let sig_d = sign(&f, &f.depositor);
        let sig_r = sign(&f, &f.recipient);

        // Recipient signs first; encoding still follows key order
        let mut proof = MultisigProof::new();
        proof.add_signature(1, sig_r.clone()).unwrap();
        proof.add_signature(0, sig_d.clone()).unwrap();

        let script = proof.finalize(&f.contract).unwrap();
        assert_eq!(
            script.ops,
            vec![
                OpCode::Op0,
                OpCode::OpPushData(sig_d),
                OpCode::OpPushData(sig_r),
                OpCode::Op1,
                OpCode::OpPushData(f.contract.to_bytes()),
            ]
        );
    }

    #[test]
    fn test_recover_from_tx() {
        let f = fixture();
        let sig_r = sign(&f, &f.recipient);

        // A lone recipient signature lands in slot 1 even in the first position
        let mut tx = f.tx.clone();
        tx.inputs[0].script_sig = Script {
            ops: vec![OpCode::Op0, OpCode::OpPushData(sig_r.clone())],
        };
        let proof = MultisigProof::from_script_sig(&tx, 0, &f.contract).unwrap();
        assert!(!proof.has_signature(0));
        assert_eq!(proof.signature(1), Some(sig_r.as_slice()));
    }

    #[test]
    fn test_recover_rejects_foreign_signature() {
        let f = fixture();
        let stranger = KeyMaterial::generate(&ChainParams::bitcoin());
        let mut tx = f.tx.clone();
        tx.inputs[0].script_sig = Script {
            ops: vec![OpCode::Op0, OpCode::OpPushData(sign(&f, &stranger))],
        };
        assert!(MultisigProof::from_script_sig(&tx, 0, &f.contract).is_err());
    }

    #[test]
    fn test_recover_rejects_pair_without_redeem() {
        let f = fixture();
        let mut tx = f.tx.clone();
        tx.inputs[0].script_sig = Script {
            ops: vec![
                OpCode::Op0,
                OpCode::OpPushData(sign(&f, &f.depositor)),
                OpCode::OpPushData(sign(&f, &f.recipient)),
            ],
        };
        assert!(matches!(
            MultisigProof::from_script_sig(&tx, 0, &f.contract),
            Err(SwapError::Validation(_))
        ));
    }

    #[test]
    fn test_recover_rejects_unknown_shape() {
        let f = fixture();
        let mut tx = f.tx.clone();
        tx.inputs[0].script_sig = Script { ops: vec![OpCode::OpPushData(vec![1, 2, 3])] };
        assert!(MultisigProof::from_script_sig(&tx, 0, &f.contract).is_err());
    }
}
