// =============================================================================
// ATOMIC SWAP v0.1 - Counterparty Cosigning
// =============================================================================
//
// The recipient adds the second 2-of-2 signature to the depositor's refund.
// Before signing, the cosigner checks the refund really is time-locked and
// pays only the depositor: a refund with no locktime would let the depositor
// take the coins back at once, and one paying anyone else is a theft.
//
// =============================================================================

use crate::contract::{ContractScript, DEPOSITOR_SLOT, RECIPIENT_SLOT};
use crate::error::{Result, SwapError};
use crate::keys::KeyMaterial;
use crate::proof::MultisigProof;
use crate::refund::RefundTransaction;
use crate::transaction::verify_ecdsa;
use crate::SIGHASH_ALL;

/// Completes refunds created by the other party
#[derive(Clone, Copy, Debug, Default)]
pub struct CounterpartyCosigner;

impl CounterpartyCosigner {
    pub fn new() -> Self {
        CounterpartyCosigner
    }

    /// Sign `refund` with `key` and return it in final, spendable form
    pub fn cosign(
        &self,
        key: &KeyMaterial,
        refund: &RefundTransaction,
        contract: &ContractScript,
    ) -> Result<RefundTransaction> {
        if refund.is_final() {
            return Err(SwapError::validation("Refund already carries both signatures"));
        }
        if refund.tx().inputs.len() != 1 {
            return Err(SwapError::validation("Refund must have exactly one input"));
        }
        refund.check_timelocked()?;

        // The second signature belongs to the recipient
        if contract.multisig_slot(&key.public_key_bytes()) != Some(RECIPIENT_SLOT) {
            return Err(SwapError::validation("Only the contract's recipient can cosign its refund"));
        }

        let outputs = &refund.tx().outputs;
        if outputs.len() != 1 || outputs[0].script_pubkey != contract.depositor_script_pubkey() {
            return Err(SwapError::validation("Refund must pay the depositor and nobody else"));
        }

        // The signatures on the wire must be the ones we think we hold
        let existing = MultisigProof::from_script_sig(refund.tx(), 0, contract)?;
        if &existing != refund.proof() {
            return Err(SwapError::signature("Refund proof does not match its script-sig"));
        }
        if existing.signature_count() != 1 || !existing.has_signature(DEPOSITOR_SLOT) {
            return Err(SwapError::validation("Refund must carry the depositor's signature alone"));
        }

        let mut tx = refund.tx().clone();
        let digest = tx.signature_hash(0, contract.redeem_script(), SIGHASH_ALL)?;
        let signature = key.sign(&digest);
        if !verify_ecdsa(&digest, &signature[..signature.len() - 1], &key.public_key_bytes()) {
            return Err(SwapError::signature("Cosignature does not verify"));
        }

        let mut proof = existing;
        proof.add_signature(RECIPIENT_SLOT, signature)?;
        tx.inputs[0].script_sig = proof.to_script_sig(contract)?;

        let completed = RefundTransaction::from_parts(tx, proof);
        if !completed.verify(contract)? {
            log::warn!("Cosigned refund {} failed script verification", completed.txid());
            return Err(SwapError::signature("Cosigned refund does not satisfy the contract"));
        }

        log::info!(
            "Refund {} cosigned by {}, locktime {}",
            completed.txid(),
            key.address(),
            completed.lock_time()
        );

        Ok(completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainParams;
    use crate::funding::{FundingTransaction, FundingTransactionAssembler};
    use crate::refund::RefundTransactionBuilder;
    use crate::script::{OpCode, Script};
    use crate::selection::GreedyFirstFit;
    use crate::transaction::{Tx, Txid, UnspentOutput};
    use crate::{COIN, DEFAULT_FEE};

    struct Fixture {
        depositor: KeyMaterial,
        recipient: KeyMaterial,
        contract: ContractScript,
        funding: FundingTransaction,
    }

    fn fixture() -> Fixture {
        let chain = ChainParams::bitcoin();
        let depositor = KeyMaterial::generate(&chain);
        let recipient = KeyMaterial::generate(&chain);
        let contract = ContractScript::build(
            &depositor.public_key_bytes(),
            &recipient.public_key_bytes(),
            &[9; 32],
        )
        .unwrap();
        let utxos = vec![UnspentOutput {
            txid: Txid([2; 32]),
            index: 1,
            value: 3 * COIN,
            script_pubkey: depositor.script_pubkey(),
        }];
        let funding = FundingTransactionAssembler::new(DEFAULT_FEE, &GreedyFirstFit)
            .build(&depositor, COIN, &utxos, &contract)
            .unwrap();
        Fixture { depositor, recipient, contract, funding }
    }

    fn partial(f: &Fixture, key: &KeyMaterial) -> RefundTransaction {
        RefundTransactionBuilder::new(DEFAULT_FEE)
            .build(key, COIN, &f.funding, &f.contract, 48)
            .unwrap()
    }

    /// Time-locked spend of the deposit, signed by `signer` into its own slot
    fn hand_built(f: &Fixture, signer: Option<&KeyMaterial>, pay_to: Vec<Script>) -> RefundTransaction {
        let deposit = f.funding.contract_output().unwrap();
        let mut tx = Tx::new();
        tx.add_input_with_sequence(deposit.txid, deposit.index, 0);
        let value = (COIN - DEFAULT_FEE) / pay_to.len() as u64;
        for script_pubkey in pay_to {
            tx.add_output(value, script_pubkey);
        }
        tx.lock_time = 1_800_000_000;

        let mut proof = MultisigProof::new();
        if let Some(signer) = signer {
            let digest = tx.signature_hash(0, f.contract.redeem_script(), SIGHASH_ALL).unwrap();
            let slot = f.contract.multisig_slot(&signer.public_key_bytes()).unwrap();
            proof.add_signature(slot, signer.sign(&digest)).unwrap();
        }
        tx.inputs[0].script_sig = proof.partial_script_sig();
        RefundTransaction::from_parts(tx, proof)
    }

    #[test]
    fn test_cosign_produces_final_form() {
        let f = fixture();
        let refund = partial(&f, &f.depositor);
        let cosigned = CounterpartyCosigner::new().cosign(&f.recipient, &refund, &f.contract).unwrap();

        assert!(cosigned.is_final());
        assert!(cosigned.verify(&f.contract).unwrap());
        assert_eq!(cosigned.lock_time(), refund.lock_time());
        assert_eq!(cosigned.tx().outputs, refund.tx().outputs);

        let ops = &cosigned.tx().inputs[0].script_sig.ops;
        assert_eq!(ops.len(), 5);
        assert_eq!(ops[0], OpCode::Op0);
        assert_eq!(ops[3], OpCode::Op1);
        assert_eq!(ops[4], OpCode::OpPushData(f.contract.to_bytes()));
    }

    #[test]
    fn test_cosigned_refund_pays_depositor() {
        let f = fixture();
        let cosigned = CounterpartyCosigner::new()
            .cosign(&f.recipient, &partial(&f, &f.depositor), &f.contract)
            .unwrap();
        assert_eq!(cosigned.tx().outputs.len(), 1);
        assert_eq!(cosigned.tx().outputs[0].script_pubkey, f.contract.depositor_script_pubkey());
        assert_eq!(cosigned.refund_value(), COIN - DEFAULT_FEE);
    }

    #[test]
    fn test_rejects_depositor_cosigning_recipient_refund() {
        let f = fixture();
        let refund = hand_built(&f, Some(&f.recipient), vec![f.recipient.script_pubkey()]);
        let err = CounterpartyCosigner::new().cosign(&f.depositor, &refund, &f.contract).unwrap_err();
        assert!(matches!(err, SwapError::Validation(_)));
    }

    #[test]
    fn test_rejects_refund_to_someone_else() {
        let f = fixture();
        let stranger = KeyMaterial::generate(&ChainParams::bitcoin());
        let cosigner = CounterpartyCosigner::new();

        let to_stranger = hand_built(&f, Some(&f.depositor), vec![stranger.script_pubkey()]);
        assert!(matches!(
            cosigner.cosign(&f.recipient, &to_stranger, &f.contract),
            Err(SwapError::Validation(_))
        ));

        let to_recipient = hand_built(&f, Some(&f.depositor), vec![f.recipient.script_pubkey()]);
        assert!(matches!(
            cosigner.cosign(&f.recipient, &to_recipient, &f.contract),
            Err(SwapError::Validation(_))
        ));

        // Depositor output plus a second one on the side
        let split = hand_built(
            &f,
            Some(&f.depositor),
            vec![f.depositor.script_pubkey(), stranger.script_pubkey()],
        );
        assert!(matches!(
            cosigner.cosign(&f.recipient, &split, &f.contract),
            Err(SwapError::Validation(_))
        ));
    }

    #[test]
    fn test_rejects_unsigned_refund() {
        let f = fixture();
        let refund = hand_built(&f, None, vec![f.depositor.script_pubkey()]);
        assert!(refund.tx().inputs[0].script_sig.is_empty());
        let err = CounterpartyCosigner::new().cosign(&f.recipient, &refund, &f.contract).unwrap_err();
        assert!(matches!(err, SwapError::Validation(_)));
    }

    #[test]
    fn test_hand_built_depositor_refund_cosigns() {
        let f = fixture();
        let refund = hand_built(&f, Some(&f.depositor), vec![f.depositor.script_pubkey()]);
        let cosigned = CounterpartyCosigner::new().cosign(&f.recipient, &refund, &f.contract).unwrap();
        assert!(cosigned.verify(&f.contract).unwrap());
    }

    #[test]
    fn test_cosign_after_wire_round_trip() {
        let f = fixture();
        let refund = partial(&f, &f.depositor);
        let received = RefundTransaction::from_hex(&refund.to_hex(), &f.contract).unwrap();
        let cosigned = CounterpartyCosigner::new().cosign(&f.recipient, &received, &f.contract).unwrap();
        assert!(cosigned.verify(&f.contract).unwrap());
    }

    #[test]
    fn test_rejects_second_signature_from_same_key() {
        let f = fixture();
        let refund = partial(&f, &f.depositor);
        let err = CounterpartyCosigner::new().cosign(&f.depositor, &refund, &f.contract).unwrap_err();
        assert!(matches!(err, SwapError::Validation(_)));
    }

    #[test]
    fn test_rejects_already_final() {
        let f = fixture();
        let cosigner = CounterpartyCosigner::new();
        let cosigned = cosigner.cosign(&f.recipient, &partial(&f, &f.depositor), &f.contract).unwrap();
        assert!(cosigner.cosign(&f.recipient, &cosigned, &f.contract).is_err());
    }

    #[test]
    fn test_rejects_missing_locktime() {
        let f = fixture();
        let refund = partial(&f, &f.depositor);
        let mut tx = refund.tx().clone();
        tx.lock_time = 0;
        let tampered = RefundTransaction::from_parts(tx, refund.proof().clone());
        assert!(CounterpartyCosigner::new().cosign(&f.recipient, &tampered, &f.contract).is_err());
    }

    #[test]
    fn test_rejects_final_sequence() {
        let f = fixture();
        let refund = partial(&f, &f.depositor);
        let mut tx = refund.tx().clone();
        tx.inputs[0].sequence = crate::SEQUENCE_FINAL;
        let tampered = RefundTransaction::from_parts(tx, refund.proof().clone());
        assert!(CounterpartyCosigner::new().cosign(&f.recipient, &tampered, &f.contract).is_err());
    }

    #[test]
    fn test_rejects_stranger() {
        let f = fixture();
        let stranger = KeyMaterial::generate(&ChainParams::bitcoin());
        let refund = partial(&f, &f.depositor);
        assert!(CounterpartyCosigner::new().cosign(&stranger, &refund, &f.contract).is_err());
    }
}
