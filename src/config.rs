// =============================================================================
// ATOMIC SWAP v0.1 - Swap Configuration
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::error::{Result, SwapError};
use crate::{DEFAULT_FEE, INITIATOR_REFUND_HOURS, RESPONDER_REFUND_HOURS};

/// Tunables shared by both sides of a swap
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwapConfig {
    /// Flat fee paid by every funding and refund transaction (base units)
    pub fee: u64,

    /// Hours until the initiator's refund becomes valid
    pub initiator_refund_hours: u32,

    /// Hours until the responder's refund becomes valid
    pub responder_refund_hours: u32,
}

impl Default for SwapConfig {
    fn default() -> Self {
        SwapConfig {
            fee: DEFAULT_FEE,
            initiator_refund_hours: INITIATOR_REFUND_HOURS,
            responder_refund_hours: RESPONDER_REFUND_HOURS,
        }
    }
}

impl SwapConfig {
    /// Load from a JSON file; missing fields fall back to the defaults
    pub fn load(path: &str) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| SwapError::Config(format!("Failed to read {}: {}", path, e)))?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: SwapConfig = serde_json::from_str(json)
            .map_err(|e| SwapError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// The responder must be able to refund before the initiator can, so that
    /// the responder is never left waiting on a preimage after its own deadline.
    pub fn validate(&self) -> Result<()> {
        if self.fee == 0 {
            return Err(SwapError::Config("Fee must be positive".to_string()));
        }
        if self.responder_refund_hours == 0 {
            return Err(SwapError::InvalidTimeout(
                "Responder refund window must be positive".to_string(),
            ));
        }
        if self.responder_refund_hours >= self.initiator_refund_hours {
            return Err(SwapError::InvalidTimeout(format!(
                "Responder window ({}h) must be shorter than initiator window ({}h)",
                self.responder_refund_hours, self.initiator_refund_hours
            )));
        }
        Ok(())
    }
}
