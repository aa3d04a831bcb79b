// =============================================================================
// ATOMIC SWAP v0.1 - Hash Lock
// =============================================================================
//
// The initiator's secret x and its digest H(x) = SHA256(SHA256(x)). Only the
// digest travels during setup; x is disclosed when the initiator claims.
//
// =============================================================================

use rand::RngCore;

use crate::error::{Result, SwapError};
use crate::script::hash256;
use crate::{HASH_SIZE, PREIMAGE_SIZE};

/// The swap secret. `Debug` never prints it.
#[derive(Clone, PartialEq, Eq)]
pub struct Preimage([u8; PREIMAGE_SIZE]);

impl Preimage {
    /// Fresh secret from the thread-local CSPRNG
    pub fn generate() -> Self {
        let mut bytes = [0u8; PREIMAGE_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Preimage(bytes)
    }

    pub fn from_bytes(bytes: [u8; PREIMAGE_SIZE]) -> Self {
        Preimage(bytes)
    }

    pub fn digest(&self) -> [u8; HASH_SIZE] {
        hash256(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8; PREIMAGE_SIZE] {
        &self.0
    }

    /// Hex form, for out-of-band disclosure
    pub fn reveal_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Debug for Preimage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Preimage(<redacted>)")
    }
}

/// Preimage together with its digest
#[derive(Clone, Debug)]
pub struct HashLock {
    preimage: Preimage,
    digest: [u8; HASH_SIZE],
}

impl HashLock {
    pub fn generate() -> Self {
        Self::from_preimage(Preimage::generate())
    }

    pub fn from_preimage(preimage: Preimage) -> Self {
        let digest = preimage.digest();
        HashLock { preimage, digest }
    }

    pub fn preimage(&self) -> &Preimage {
        &self.preimage
    }

    pub fn digest(&self) -> &[u8; HASH_SIZE] {
        &self.digest
    }

    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest)
    }

    pub fn into_parts(self) -> (Preimage, [u8; HASH_SIZE]) {
        (self.preimage, self.digest)
    }
}

/// Check a disclosed preimage against a published digest
pub fn verify_preimage(preimage: &Preimage, digest: &[u8; HASH_SIZE]) -> bool {
    &preimage.digest() == digest
}

/// Parse a hex digest received from the counterparty
pub fn parse_digest(s: &str) -> Result<[u8; HASH_SIZE]> {
    let bytes = hex::decode(s.trim())
        .map_err(|e| SwapError::validation(format!("Invalid hash digest hex: {}", e)))?;
    bytes
        .try_into()
        .map_err(|_| SwapError::validation("Hash digest must be 32 bytes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_unique() {
        let a = HashLock::generate();
        let b = HashLock::generate();
        assert_ne!(a.preimage(), b.preimage());
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn test_digest_is_double_sha256() {
        let preimage = Preimage::from_bytes([0u8; 32]);
        let lock = HashLock::from_preimage(preimage.clone());
        assert_eq!(lock.digest(), &hash256(&[0u8; 32]));
        assert!(verify_preimage(&preimage, lock.digest()));
        assert!(!verify_preimage(&Preimage::from_bytes([1u8; 32]), lock.digest()));
    }

    #[test]
    fn test_debug_redacts() {
        let lock = HashLock::generate();
        let rendered = format!("{:?}", lock);
        assert!(!rendered.contains(&lock.preimage().reveal_hex()));
        assert!(rendered.contains("redacted"));
    }

    #[test]
    fn test_hex_parsing() {
        let lock = HashLock::generate();
        assert_eq!(&parse_digest(&lock.digest_hex()).unwrap(), lock.digest());
        assert!(parse_digest("abcd").is_err());
        assert!(parse_digest("zz").is_err());
    }
}
