// =============================================================================
// ATOMIC SWAP v0.1 - Coin Selection
// =============================================================================

use crate::error::{Result, SwapError};
use crate::transaction::UnspentOutput;

/// Chooses which previous outputs fund a payment of `target` base units
pub trait CoinSelector {
    /// Returns the chosen subset, whose total value is at least `target`,
    /// or `InsufficientFunds`.
    fn select(&self, previous_outputs: &[UnspentOutput], target: u64) -> Result<Vec<UnspentOutput>>;
}

/// Take outputs in the caller's order until the target is reached.
///
/// Not fee-optimal: a large output late in the list is never preferred over
/// several small ones earlier on.
#[derive(Clone, Copy, Debug, Default)]
pub struct GreedyFirstFit;

impl CoinSelector for GreedyFirstFit {
    fn select(&self, previous_outputs: &[UnspentOutput], target: u64) -> Result<Vec<UnspentOutput>> {
        let mut chosen = Vec::new();
        let mut total: u64 = 0;

        for output in previous_outputs {
            chosen.push(output.clone());
            total = total.saturating_add(output.value);
            if total >= target {
                return Ok(chosen);
            }
        }

        Err(SwapError::InsufficientFunds {
            needed: target,
            available: total,
        })
    }
}

/// Sum of output values, failing on overflow
pub fn total_value(outputs: &[UnspentOutput]) -> Result<u64> {
    outputs.iter().try_fold(0u64, |acc, o| {
        acc.checked_add(o.value)
            .ok_or_else(|| SwapError::validation("Input value overflow"))
    })
}
