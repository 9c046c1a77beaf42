//! Seed pair lifecycle: creation, nonce issuance, rotation, reveal.
//!
//! The registry owns the commit/reveal discipline. A pair's hash is public
//! from the moment it exists; the raw server seed leaves the registry only
//! through `rotate`, after the pair is retired. Nonces are issued strictly
//! increasing and are never reused.

use crate::errors::{EngineResult, IntegrityError};
use crate::rng;
use dashmap::DashMap;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// A user's full seed pair. Internal to the engine; the `commitment` view is
/// what clients see while the pair is live.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeedPair {
    pub server_seed: String,
    pub server_seed_hash: String,
    pub client_seed: String,
    /// Next nonce to be issued from this pair.
    pub nonce: u64,
}

impl SeedPair {
    fn fresh(client_seed: &str) -> Self {
        let mut raw = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut raw);
        let server_seed = hex::encode(raw);
        let server_seed_hash = rng::seed_hash(&server_seed);
        Self {
            server_seed,
            server_seed_hash,
            client_seed: client_seed.to_string(),
            nonce: 0,
        }
    }

    /// Client-visible commitment: hash, client seed, next nonce.
    pub fn commitment(&self) -> SeedCommitment {
        SeedCommitment {
            server_seed_hash: self.server_seed_hash.clone(),
            client_seed: self.client_seed.clone(),
            next_nonce: self.nonce,
        }
    }
}

/// Public view of a live pair; never contains the raw server seed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeedCommitment {
    pub server_seed_hash: String,
    pub client_seed: String,
    pub next_nonce: u64,
}

/// Result of rotating a pair: the retired pair with its seed revealed, plus
/// the commitment of the replacement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedRotation {
    pub revealed: SeedPair,
    pub next: SeedCommitment,
}

/// A single issued derivation slot: the pair snapshot plus the nonce the
/// caller must use. Issuing advances the pair's nonce.
#[derive(Debug, Clone)]
pub struct IssuedSeed {
    pub server_seed: String,
    pub server_seed_hash: String,
    pub client_seed: String,
    pub nonce: u64,
}

/// Per-user rotating seed pair collaborator.
pub trait SeedRegistry: Send + Sync {
    /// Current pair's public commitment, creating the pair on first use.
    fn current(&self, user_id: &str) -> EngineResult<SeedCommitment>;

    /// Issue the next nonce from the user's pair for one derivation.
    fn issue(&self, user_id: &str) -> EngineResult<IssuedSeed>;

    /// Retire the current pair (revealing its server seed) and commit to a
    /// fresh one. Nonce restarts at 0 on the new pair.
    fn rotate(&self, user_id: &str) -> EngineResult<SeedRotation>;

    /// Set the client seed used for future issuances on the current pair.
    fn set_client_seed(&self, user_id: &str, client_seed: &str) -> EngineResult<SeedCommitment>;

    /// Stop issuing from this user's pair. Used when verification surfaces
    /// an integrity failure.
    fn halt(&self, user_id: &str);

    /// Whether a server seed hash belongs to a retired (revealed) pair.
    fn is_retired(&self, user_id: &str, server_seed_hash: &str) -> bool;
}

struct UserSeeds {
    pair: SeedPair,
    halted: bool,
    retired_hashes: Vec<String>,
}

/// In-memory seed registry. Production deployments back this trait with the
/// platform's durable seed service; the engine only sees the contract.
pub struct InMemorySeedRegistry {
    users: DashMap<String, UserSeeds>,
    default_client_seed: String,
}

impl InMemorySeedRegistry {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            default_client_seed: "fairplay".to_string(),
        }
    }

    fn with_user<T>(
        &self,
        user_id: &str,
        f: impl FnOnce(&mut UserSeeds) -> EngineResult<T>,
    ) -> EngineResult<T> {
        let mut entry = self.users.entry(user_id.to_string()).or_insert_with(|| UserSeeds {
            pair: SeedPair::fresh(&self.default_client_seed),
            halted: false,
            retired_hashes: Vec::new(),
        });
        f(entry.value_mut())
    }

    fn ensure_live(user_id: &str, seeds: &UserSeeds) -> EngineResult<()> {
        if seeds.halted {
            return Err(IntegrityError::SeedPairHalted(user_id.to_string()).into());
        }
        Ok(())
    }
}

impl Default for InMemorySeedRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SeedRegistry for InMemorySeedRegistry {
    fn current(&self, user_id: &str) -> EngineResult<SeedCommitment> {
        self.with_user(user_id, |seeds| {
            Self::ensure_live(user_id, seeds)?;
            Ok(seeds.pair.commitment())
        })
    }

    fn issue(&self, user_id: &str) -> EngineResult<IssuedSeed> {
        self.with_user(user_id, |seeds| {
            Self::ensure_live(user_id, seeds)?;
            let issued = IssuedSeed {
                server_seed: seeds.pair.server_seed.clone(),
                server_seed_hash: seeds.pair.server_seed_hash.clone(),
                client_seed: seeds.pair.client_seed.clone(),
                nonce: seeds.pair.nonce,
            };
            seeds.pair.nonce += 1;
            Ok(issued)
        })
    }

    fn rotate(&self, user_id: &str) -> EngineResult<SeedRotation> {
        self.with_user(user_id, |seeds| {
            Self::ensure_live(user_id, seeds)?;
            let revealed = seeds.pair.clone();
            seeds.retired_hashes.push(revealed.server_seed_hash.clone());
            seeds.pair = SeedPair::fresh(&revealed.client_seed);
            tracing::info!(
                user = user_id,
                revealed = %revealed.server_seed_hash,
                next = %seeds.pair.server_seed_hash,
                "rotated seed pair"
            );
            Ok(SeedRotation {
                revealed,
                next: seeds.pair.commitment(),
            })
        })
    }

    fn set_client_seed(&self, user_id: &str, client_seed: &str) -> EngineResult<SeedCommitment> {
        self.with_user(user_id, |seeds| {
            Self::ensure_live(user_id, seeds)?;
            seeds.pair.client_seed = client_seed.to_string();
            Ok(seeds.pair.commitment())
        })
    }

    fn halt(&self, user_id: &str) {
        let mut entry = self.users.entry(user_id.to_string()).or_insert_with(|| UserSeeds {
            pair: SeedPair::fresh(&self.default_client_seed),
            halted: false,
            retired_hashes: Vec::new(),
        });
        entry.value_mut().halted = true;
        tracing::error!(user = user_id, "seed pair halted");
    }

    fn is_retired(&self, user_id: &str, server_seed_hash: &str) -> bool {
        self.users
            .get(user_id)
            .map(|entry| {
                entry
                    .retired_hashes
                    .iter()
                    .any(|h| h == server_seed_hash)
            })
            .unwrap_or(false)
    }
}
