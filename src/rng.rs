//! Commitment RNG: deterministic float derivation from a seed triple.
//!
//! The server seed acts as the key of a SHA-256 based keyed hash; the message
//! encodes the client seed, the nonce, and the output index. Publishing
//! `seed_hash(server_seed)` before play and revealing the raw seed only after
//! rotation lets a player recompute every outcome and confirm the operator
//! committed to the seed before seeing any bet.

use sha2::{Digest, Sha256};

/// 53 bits of hash output are used per float, matching the f64 mantissa.
const FLOAT_BITS: u32 = 53;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RngError {
    #[error("server seed must not be empty")]
    EmptyServerSeed,
}

/// Public commitment for a server seed: hex-encoded SHA-256 of its bytes.
pub fn seed_hash(server_seed: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(server_seed.as_bytes());
    hex::encode(hasher.finalize())
}

/// Derive `count` ordered floats in [0, 1) from a seed triple.
///
/// Deterministic and reproducible for identical inputs across calls and
/// process restarts; this is the verifiability guarantee players rely on.
pub fn derive(
    server_seed: &str,
    client_seed: &str,
    nonce: u64,
    count: usize,
) -> Result<Vec<f64>, RngError> {
    if server_seed.is_empty() {
        return Err(RngError::EmptyServerSeed);
    }

    let mut floats = Vec::with_capacity(count);
    for index in 0..count {
        let mut hasher = Sha256::new();
        hasher.update(server_seed.as_bytes());
        hasher.update(b":");
        hasher.update(format!("{}:{}:{}", client_seed, nonce, index).as_bytes());
        let digest = hasher.finalize();

        let mut raw = [0u8; 8];
        raw.copy_from_slice(&digest[..8]);
        let wide = u64::from_be_bytes(raw) >> (64 - FLOAT_BITS);
        floats.push(wide as f64 / (1u64 << FLOAT_BITS) as f64);
    }

    Ok(floats)
}

/// Convenience wrapper for a single float.
pub fn derive_one(server_seed: &str, client_seed: &str, nonce: u64) -> Result<f64, RngError> {
    Ok(derive(server_seed, client_seed, nonce, 1)?[0])
}
