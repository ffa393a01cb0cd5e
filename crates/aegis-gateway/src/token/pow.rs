//! SHA-512 proof-of-work challenges.
//!
//! A challenge is `complexity` cryptographically random bytes. The solver
//! must find a preimage whose SHA-512 digest starts with those bytes
//! (expected work 2^8 / 2^16 / 2^24 trials for complexity 1/2/3).

use aegis_common::constants::CHALLENGE_TTL_SECS;
use aegis_common::{AegisError, Complexity, Fingerprint};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha512};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::store::TokenStore;

/// Placeholder interpolated with the base64 suffix in the challenge page
const CHALLENGE_PLACEHOLDER: &str = "{{challenge}}";

struct PowChallenge {
    fingerprint: Fingerprint,
    created_at: DateTime<Utc>,
}

/// Issues and verifies proof-of-work challenges, minting tokens on success.
pub struct PowChallengeManager {
    prefix_len: usize,
    challenges: RwLock<HashMap<Vec<u8>, PowChallenge>>,
    store: Arc<TokenStore>,
    page: String,
}

impl PowChallengeManager {
    pub fn new(complexity: Complexity, store: Arc<TokenStore>, page: String) -> Self {
        Self {
            prefix_len: complexity.pow_prefix_len(),
            challenges: RwLock::new(HashMap::new()),
            store,
            page,
        }
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    /// Generate a fresh random suffix and register it for `fingerprint`.
    /// Challenges are keyed by the suffix bytes and may coexist per client.
    pub fn issue(&self, fingerprint: &Fingerprint) -> Vec<u8> {
        let mut suffix = vec![0u8; self.prefix_len];
        rand::rng().fill(suffix.as_mut_slice());
        let mut challenges = self
            .challenges
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        challenges.insert(
            suffix.clone(),
            PowChallenge {
                fingerprint: fingerprint.clone(),
                created_at: Utc::now(),
            },
        );
        suffix
    }

    /// Render the challenge page with a freshly issued base64 suffix.
    pub fn challenge_page(&self, fingerprint: &Fingerprint) -> Result<String, AegisError> {
        let suffix = self.issue(fingerprint);
        let encoded = STANDARD.encode(&suffix);
        tracing::info!(
            fingerprint = %fingerprint,
            complexity = self.prefix_len,
            challenge = %encoded,
            "Proof-of-work challenge prepared"
        );
        Ok(self.page.replace(CHALLENGE_PLACEHOLDER, &encoded))
    }

    /// Decode a base64 `suffix || preimage` payload and verify it.
    pub fn verify_and_mint(
        &self,
        fingerprint: &Fingerprint,
        payload: &[u8],
    ) -> Result<String, AegisError> {
        let message = STANDARD
            .decode(payload)
            .map_err(|e| AegisError::Unprocessable(e.to_string()))?;
        if message.len() <= self.prefix_len {
            return Err(AegisError::Unprocessable(
                "challenge solution is expected".to_string(),
            ));
        }
        let (challenge, solution) = message.split_at(self.prefix_len);
        self.verify(fingerprint, challenge, solution)
    }

    /// Check a solution against a stored challenge. On success the challenge
    /// is consumed and a fresh token bound to `fingerprint` is returned.
    pub fn verify(
        &self,
        fingerprint: &Fingerprint,
        challenge: &[u8],
        solution: &[u8],
    ) -> Result<String, AegisError> {
        let mut challenges = self
            .challenges
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let stored = challenges
            .get(challenge)
            .ok_or(AegisError::WrongChallenge)?;
        if stored.fingerprint != *fingerprint {
            return Err(AegisError::WrongClient);
        }
        let digest = Sha512::digest(solution);
        if digest[..self.prefix_len] != *challenge {
            return Err(AegisError::WrongSolution);
        }
        challenges.remove(challenge);
        drop(challenges);

        let token = self.store.mint(fingerprint);
        tracing::info!(
            fingerprint = %fingerprint,
            token = %token,
            "Token issued for proof-of-work solution"
        );
        Ok(token)
    }

    /// Delete challenges older than the challenge TTL.
    pub fn sweep(&self) {
        let deadline = Utc::now() - Duration::seconds(CHALLENGE_TTL_SECS);
        let mut challenges = self
            .challenges
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        challenges.retain(|_, challenge| challenge.created_at > deadline);
    }
}
