// =============================================================================
// ATOMIC SWAP v0.1 - Funding Transaction
// =============================================================================
//
// Pays the swap amount into the contract's P2SH output:
//
//   inputs:  selected previous outputs, each signed P2PKH by the depositor
//   output 0: amount -> OP_HASH160 <hash160(contract)> OP_EQUAL
//   output 1: change -> depositor (only when change > 0)
//
// =============================================================================

use crate::contract::ContractScript;
use crate::error::{Result, SwapError};
use crate::keys::KeyMaterial;
use crate::script::Script;
use crate::selection::{total_value, CoinSelector};
use crate::transaction::{Tx, Txid, UnspentOutput};
use crate::SIGHASH_ALL;

/// Index of the contract payment in every funding transaction
pub const CONTRACT_OUTPUT_INDEX: u32 = 0;

/// A fully signed funding transaction
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FundingTransaction {
    tx: Tx,
    spent: Vec<UnspentOutput>,
    amount: u64,
    fee: u64,
}

impl FundingTransaction {
    pub fn tx(&self) -> &Tx {
        &self.tx
    }

    pub fn txid(&self) -> Txid {
        self.tx.txid()
    }

    /// Amount locked in the contract
    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn fee(&self) -> u64 {
        self.fee
    }

    /// Change paid back to the depositor, if any
    pub fn change(&self) -> Option<u64> {
        self.tx.outputs.get(1).map(|o| o.value)
    }

    /// Previous outputs spent by this transaction, in input order
    pub fn spent_outputs(&self) -> &[UnspentOutput] {
        &self.spent
    }

    /// The contract output, as an output the refund can spend
    pub fn contract_output(&self) -> Result<UnspentOutput> {
        UnspentOutput::from_tx(&self.tx, CONTRACT_OUTPUT_INDEX)
    }

    pub fn to_hex(&self) -> String {
        self.tx.to_hex()
    }

    /// Re-run every input's scripts against the outputs they spend
    pub fn verify(&self) -> Result<()> {
        for (index, previous) in self.spent.iter().enumerate() {
            if !self.tx.verify_input(index, previous)? {
                return Err(SwapError::signature(format!("Funding input {} does not verify", index)));
            }
        }
        Ok(())
    }
}

/// Builds and signs funding transactions
pub struct FundingTransactionAssembler<'a> {
    fee: u64,
    selector: &'a dyn CoinSelector,
}

impl<'a> FundingTransactionAssembler<'a> {
    pub fn new(fee: u64, selector: &'a dyn CoinSelector) -> Self {
        FundingTransactionAssembler { fee, selector }
    }

    pub fn build(
        &self,
        key: &KeyMaterial,
        amount: u64,
        previous_outputs: &[UnspentOutput],
        contract: &ContractScript,
    ) -> Result<FundingTransaction> {
        if amount == 0 {
            return Err(SwapError::validation("Swap amount must be positive"));
        }
        let target = amount
            .checked_add(self.fee)
            .ok_or_else(|| SwapError::validation("Amount plus fee overflows"))?;

        let selected = self.selector.select(previous_outputs, target)?;
        let total = total_value(&selected)?;
        if total < target {
            return Err(SwapError::InsufficientFunds {
                needed: target,
                available: total,
            });
        }
        let change = total - target;

        let mut tx = Tx::new();
        for previous in &selected {
            tx.add_input(previous.txid, previous.index);
        }
        tx.add_output(amount, contract.locking_script());
        if change > 0 {
            tx.add_output(change, key.script_pubkey());
        }

        // Sign every input against the output it spends
        let pubkey = key.public_key_bytes();
        for (index, previous) in selected.iter().enumerate() {
            let digest = tx.signature_hash(index, &previous.script_pubkey, SIGHASH_ALL)?;
            let signature = key.sign(&digest);
            tx.inputs[index].script_sig = Script::p2pkh_sig(&signature, &pubkey);

            let verified = tx.verify_input(index, previous).unwrap_or(false);
            if !verified {
                log::warn!("Funding input {} failed self-verification", index);
                return Err(SwapError::signature(format!(
                    "Input {} ({}:{}) does not verify with the signing key",
                    index, previous.txid, previous.index
                )));
            }
        }

        log::info!(
            "Funding transaction {} assembled: {} inputs, amount {}, change {}",
            tx.txid(),
            selected.len(),
            amount,
            change
        );

        Ok(FundingTransaction {
            tx,
            spent: selected,
            amount,
            fee: self.fee,
        })
    }
}
