//! Error types for swap construction.
//!
//! Every operation aborts on the first error; no partially built artifact is
//! ever handed back to the caller.

use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, SwapError>;

/// Atomic swap errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SwapError {
    /// Previous outputs, taken in the given order, never reach `amount + fee`
    #[error("Insufficient funds: need {needed}, available {available}")]
    InsufficientFunds {
        /// amount + fee
        needed: u64,
        /// Sum of every offered previous output
        available: u64,
    },

    /// A freshly produced signature failed self-verification
    #[error("Signature error: {0}")]
    Signature(String),

    /// Malformed key, digest, script or transaction encoding
    #[error("Validation error: {0}")]
    Validation(String),

    /// Refund windows violate the responder < initiator ordering
    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),

    /// Spending the hash-lock branch is not supported
    #[error("Claim transactions are not implemented")]
    ClaimUnimplemented,

    /// Configuration could not be read or parsed
    #[error("Config error: {0}")]
    Config(String),
}

impl SwapError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        SwapError::Validation(msg.into())
    }

    pub(crate) fn signature(msg: impl Into<String>) -> Self {
        SwapError::Signature(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_funds_message() {
        let err = SwapError::InsufficientFunds { needed: 110, available: 50 };
        assert_eq!(err.to_string(), "Insufficient funds: need 110, available 50");
    }

    #[test]
    fn test_helpers() {
        assert!(matches!(SwapError::validation("bad"), SwapError::Validation(m) if m == "bad"));
        assert!(matches!(SwapError::signature("x"), SwapError::Signature(_)));
    }
}
