// =============================================================================
// ATOMIC SWAP v0.1 - Chain Parameters
// =============================================================================
//
// Version bytes for the chains a swap can run on. Every operation takes the
// chain explicitly so two sessions on different chains never share state.
//
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::error::{Result, SwapError};

/// Encoding parameters of one UTXO chain
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParams {
    /// Human readable chain name
    pub name: String,

    /// Version byte of pay-to-pubkey-hash addresses
    pub pubkey_address_version: u8,

    /// Version byte of pay-to-script-hash addresses
    pub script_address_version: u8,

    /// Version byte of WIF encoded private keys
    pub wif_version: u8,
}

impl ChainParams {
    pub fn bitcoin() -> Self {
        ChainParams {
            name: "bitcoin".to_string(),
            pubkey_address_version: 0x00,
            script_address_version: 0x05,
            wif_version: 0x80,
        }
    }

    pub fn testnet() -> Self {
        ChainParams {
            name: "testnet".to_string(),
            pubkey_address_version: 0x6f,
            script_address_version: 0xc4,
            wif_version: 0xef,
        }
    }

    pub fn litecoin() -> Self {
        ChainParams {
            name: "litecoin".to_string(),
            pubkey_address_version: 0x30,
            script_address_version: 0x32,
            wif_version: 0xb0,
        }
    }

    pub fn dogecoin() -> Self {
        ChainParams {
            name: "dogecoin".to_string(),
            pubkey_address_version: 0x1e,
            script_address_version: 0x16,
            wif_version: 0x9e,
        }
    }

    /// Look up a preset by name
    pub fn by_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "bitcoin" | "mainnet" => Ok(Self::bitcoin()),
            "testnet" | "testnet3" => Ok(Self::testnet()),
            "litecoin" => Ok(Self::litecoin()),
            "dogecoin" => Ok(Self::dogecoin()),
            other => Err(SwapError::Config(format!("Unknown chain: {}", other))),
        }
    }
}

impl std::fmt::Display for ChainParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}
