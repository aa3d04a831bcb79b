// =============================================================================
// ATOMIC SWAP v0.1 - Exchange Payloads
// =============================================================================
//
// What the two parties hand each other, as JSON with hex-encoded fields.
// Transport is up to the caller.
//
//   initiator -> responder   InitiatorOffer   (funding, contract, H(x), refund)
//   either    -> other       CosignRequest    (partial refund + its contract)
//   other     -> either      CosignResponse   (final refund)
//
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::contract::ContractScript;
use crate::error::{Result, SwapError};
use crate::hashlock::parse_digest;
use crate::refund::RefundTransaction;
use crate::transaction::Tx;
use crate::HASH_SIZE;

/// Everything the responder needs to mirror the initiator's deposit
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiatorOffer {
    pub funding_tx: String,
    pub contract_script: String,
    pub hash_digest: String,
    pub refund_tx: String,
}

impl InitiatorOffer {
    pub fn to_json(&self) -> Result<String> {
        to_json(self)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        from_json(json)
    }

    pub fn contract(&self) -> Result<ContractScript> {
        ContractScript::from_hex(&self.contract_script)
    }

    pub fn funding(&self) -> Result<Tx> {
        Tx::from_hex(&self.funding_tx)
    }

    /// H(x), checked against the digest committed in the contract
    pub fn digest(&self) -> Result<[u8; HASH_SIZE]> {
        let digest = parse_digest(&self.hash_digest)?;
        if &digest != self.contract()?.digest() {
            return Err(SwapError::validation("Offered digest differs from the contract's"));
        }
        Ok(digest)
    }

    pub fn cosign_request(&self) -> CosignRequest {
        CosignRequest {
            refund_tx: self.refund_tx.clone(),
            contract_script: self.contract_script.clone(),
        }
    }
}

/// A partially signed refund awaiting the counterparty's signature
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CosignRequest {
    pub refund_tx: String,
    pub contract_script: String,
}

impl CosignRequest {
    pub fn new(refund: &RefundTransaction, contract: &ContractScript) -> Self {
        CosignRequest {
            refund_tx: refund.to_hex(),
            contract_script: contract.to_hex(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        to_json(self)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        from_json(json)
    }

    /// Decode both fields; the refund's signatures are checked against the contract
    pub fn decode(&self) -> Result<(RefundTransaction, ContractScript)> {
        let contract = ContractScript::from_hex(&self.contract_script)?;
        let refund = RefundTransaction::from_hex(&self.refund_tx, &contract)?;
        Ok((refund, contract))
    }
}

/// The refund returned in final form
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CosignResponse {
    pub refund_tx: String,
}

impl CosignResponse {
    pub fn new(refund: &RefundTransaction) -> Self {
        CosignResponse { refund_tx: refund.to_hex() }
    }

    pub fn to_json(&self) -> Result<String> {
        to_json(self)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        from_json(json)
    }

    pub fn decode(&self, contract: &ContractScript) -> Result<RefundTransaction> {
        RefundTransaction::from_hex(&self.refund_tx, contract)
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| SwapError::validation(format!("JSON encode: {}", e)))
}

fn from_json<T: for<'de> Deserialize<'de>>(json: &str) -> Result<T> {
    serde_json::from_str(json).map_err(|e| SwapError::validation(format!("JSON decode: {}", e)))
}
