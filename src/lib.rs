// =============================================================================
// ATOMIC SWAP v0.1 - Protocol Constants
// Hash-lock cross-chain swaps for UTXO ledgers
// =============================================================================
//
// Two parties swap coins across two chains:
// 1. Initiator picks a random secret x and publishes H(x) = SHA256(SHA256(x))
// 2. Initiator funds a contract on chain 1: "2-of-2 (A, B)" or "B + x"
// 3. Initiator pre-signs a refund of that contract, locked 48h in the future
// 4. Responder mirrors the deposit on chain 2 using only H(x), locked 24h
// 5. Each side cosigns the other's refund, so a stalled swap unwinds on its own
//
// =============================================================================

pub mod chain;
pub mod config;
pub mod contract;
pub mod cosign;
pub mod error;
pub mod funding;
pub mod hashlock;
pub mod keys;
pub mod proof;
pub mod protocol;
pub mod refund;
pub mod script;
pub mod selection;
pub mod swap;
pub mod transaction;

pub use chain::ChainParams;
pub use config::SwapConfig;
pub use contract::ContractScript;
pub use cosign::CounterpartyCosigner;
pub use error::{Result, SwapError};
pub use funding::{FundingTransaction, FundingTransactionAssembler};
pub use hashlock::{HashLock, Preimage};
pub use keys::KeyMaterial;
pub use proof::MultisigProof;
pub use protocol::{CosignRequest, CosignResponse, InitiatorOffer};
pub use refund::{RefundTransaction, RefundTransactionBuilder};
pub use selection::{CoinSelector, GreedyFirstFit};
pub use swap::{SwapOrchestrator, SwapRole, SwapSession};
pub use transaction::{Tx, TxIn, TxOut, Txid, UnspentOutput};

// --- Units ---
pub const COIN: u64 = 100_000_000;                  // base units per coin (10^8)

// --- Fees ---
pub const DEFAULT_FEE: u64 = COIN / 10_000;         // 0.0001 coin, flat per transaction

// --- Refund windows ---
pub const INITIATOR_REFUND_HOURS: u32 = 48;
pub const RESPONDER_REFUND_HOURS: u32 = 24;
pub const SECONDS_PER_HOUR: u32 = 60 * 60;

// --- Hash lock ---
pub const PREIMAGE_SIZE: usize = 32;
pub const HASH_SIZE: usize = 32;

// --- Signatures ---
pub const SIGHASH_ALL: u32 = 0x01;

// --- Transactions ---
pub const TX_VERSION: i32 = 1;
pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

// --- Helpers ---
pub fn format_coins(units: u64) -> String {
    let whole = units / COIN;
    let frac = units % COIN;
    if frac == 0 {
        format!("{}", whole)
    } else {
        format!("{}.{:08}", whole, frac)
    }
}
