// =============================================================================
// ATOMIC SWAP v0.1 - Keys (ECDSA secp256k1)
// =============================================================================

use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};

use crate::chain::ChainParams;
use crate::error::{Result, SwapError};
use crate::script::{hash160, Script};
use crate::SIGHASH_ALL;

/// A participant's signing key. Never leaves the process that owns it.
#[derive(Clone)]
pub struct KeyMaterial {
    secret_key: SecretKey,
    public_key: PublicKey,
    compressed: bool,
    address: String,
}

impl KeyMaterial {
    pub fn from_secret_key(secret_key: SecretKey, chain: &ChainParams) -> Self {
        let secp = Secp256k1::signing_only();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        let mut key = KeyMaterial {
            secret_key,
            public_key,
            compressed: true,
            address: String::new(),
        };
        key.address = pubkey_to_address(&key.public_key_bytes(), chain);
        key
    }

    /// The same key with addresses of another chain; a swap party signs on
    /// both chains with one key.
    pub fn for_chain(&self, chain: &ChainParams) -> Self {
        KeyMaterial {
            secret_key: self.secret_key,
            public_key: self.public_key,
            compressed: self.compressed,
            address: pubkey_to_address(&self.public_key_bytes(), chain),
        }
    }

    /// Fresh random key
    pub fn generate(chain: &ChainParams) -> Self {
        let secp = Secp256k1::new();
        let (sk, _pk) = secp.generate_keypair(&mut rand::thread_rng());
        Self::from_secret_key(sk, chain)
    }

    /// Import a Wallet Import Format key for `chain`
    pub fn from_wif(wif: &str, chain: &ChainParams) -> Result<Self> {
        let payload = base58check_decode(wif.trim())?;

        let (version, rest) = payload
            .split_first()
            .ok_or_else(|| SwapError::validation("Empty WIF payload"))?;
        if *version != chain.wif_version {
            return Err(SwapError::validation(format!(
                "WIF version 0x{:02x} does not belong to {}",
                version, chain
            )));
        }

        let (key_bytes, compressed) = match rest.len() {
            32 => (rest, false),
            33 if rest[32] == 0x01 => (&rest[..32], true),
            _ => return Err(SwapError::validation("Invalid WIF length")),
        };

        let secret_key = SecretKey::from_slice(key_bytes)
            .map_err(|e| SwapError::validation(format!("Invalid private key: {}", e)))?;

        let mut key = Self::from_secret_key(secret_key, chain);
        if !compressed {
            key.compressed = false;
            key.address = pubkey_to_address(&key.public_key_bytes(), chain);
        }
        Ok(key)
    }

    pub fn to_wif(&self, chain: &ChainParams) -> String {
        let mut payload = vec![chain.wif_version];
        payload.extend_from_slice(&self.secret_key.secret_bytes());
        if self.compressed {
            payload.push(0x01);
        }
        base58check_encode(&payload)
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Serialized public key, in the encoding the key was imported with
    pub fn public_key_bytes(&self) -> Vec<u8> {
        if self.compressed {
            self.public_key.serialize().to_vec()
        } else {
            self.public_key.serialize_uncompressed().to_vec()
        }
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key_bytes())
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Pay-to-pubkey-hash locking script for this key
    pub fn script_pubkey(&self) -> Script {
        Script::p2pkh(&hash160(&self.public_key_bytes()))
    }

    /// DER signature over `digest` with the SIGHASH_ALL byte appended
    pub fn sign(&self, digest: &[u8; 32]) -> Vec<u8> {
        let secp = Secp256k1::signing_only();
        let message = Message::from_digest(*digest);
        let sig = secp.sign_ecdsa(&message, &self.secret_key);
        let mut sig_bytes = sig.serialize_der().to_vec();
        sig_bytes.push(SIGHASH_ALL as u8);
        sig_bytes
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("public_key", &self.public_key_hex())
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Address Utilities
// =============================================================================

/// Validate a hex public key received from the counterparty
pub fn parse_pubkey(s: &str) -> Result<Vec<u8>> {
    let bytes = hex::decode(s.trim())
        .map_err(|e| SwapError::validation(format!("Invalid public key hex: {}", e)))?;
    validate_pubkey(&bytes)?;
    Ok(bytes)
}

pub fn validate_pubkey(bytes: &[u8]) -> Result<()> {
    PublicKey::from_slice(bytes)
        .map(|_| ())
        .map_err(|e| SwapError::validation(format!("Invalid public key: {}", e)))
}

/// version + hash160(pubkey), base58check encoded
pub fn pubkey_to_address(pubkey: &[u8], chain: &ChainParams) -> String {
    let mut versioned = vec![chain.pubkey_address_version];
    versioned.extend_from_slice(&hash160(pubkey));
    base58check_encode(&versioned)
}

/// version + hash160(script), base58check encoded
pub fn script_to_address(script: &Script, chain: &ChainParams) -> String {
    let mut versioned = vec![chain.script_address_version];
    versioned.extend_from_slice(&hash160(&script.to_bytes()));
    base58check_encode(&versioned)
}

/// Locking script for a base58 address of `chain`
pub fn address_to_script(address: &str, chain: &ChainParams) -> Result<Script> {
    let payload = base58check_decode(address)?;
    if payload.len() != 21 {
        return Err(SwapError::validation(format!("Invalid address length: {}", payload.len())));
    }
    let (version, hash) = (payload[0], &payload[1..]);
    if version == chain.pubkey_address_version {
        Ok(Script::p2pkh(hash))
    } else if version == chain.script_address_version {
        Ok(Script::p2sh(hash))
    } else {
        Err(SwapError::validation(format!(
            "Address version 0x{:02x} does not belong to {}",
            version, chain
        )))
    }
}

pub fn base58check_encode(payload: &[u8]) -> String {
    let checksum = Sha256::digest(Sha256::digest(payload));
    let mut data = payload.to_vec();
    data.extend_from_slice(&checksum[..4]);
    bs58::encode(data).into_string()
}

pub fn base58check_decode(s: &str) -> Result<Vec<u8>> {
    let decoded = bs58::decode(s)
        .into_vec()
        .map_err(|e| SwapError::validation(format!("Invalid base58 encoding: {}", e)))?;

    if decoded.len() < 5 {
        return Err(SwapError::validation("Base58 payload too short"));
    }

    let (payload, checksum) = decoded.split_at(decoded.len() - 4);
    let computed = Sha256::digest(Sha256::digest(payload));
    if &computed[..4] != checksum {
        return Err(SwapError::validation("Invalid base58 checksum"));
    }

    Ok(payload.to_vec())
}
