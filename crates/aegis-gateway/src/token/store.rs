//! Antibot token storage.

use aegis_common::constants::{TOKEN_BYTES, TOKEN_COOKIE};
use aegis_common::{CheckRequest, Fingerprint};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

/// A minted token with the fingerprint it was issued to.
struct IssuedToken {
    fingerprint: Fingerprint,
    created_at: DateTime<Utc>,
}

/// Maps opaque token strings to their issuing fingerprints.
///
/// Permanent tokens come from configuration, are accepted from any
/// fingerprint and are never created, mutated or expired at runtime.
pub struct TokenStore {
    tokens: RwLock<HashMap<String, IssuedToken>>,
    permanent: HashSet<String>,
}

impl TokenStore {
    pub fn new<I>(permanent: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            tokens: RwLock::new(HashMap::new()),
            permanent: permanent.into_iter().collect(),
        }
    }

    /// Mint a fresh token bound to `fingerprint`.
    ///
    /// 32 random bytes, base64-encoded. Collisions are astronomically
    /// unlikely and not guarded.
    pub fn mint(&self, fingerprint: &Fingerprint) -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::rng().fill(&mut bytes);
        let token = STANDARD.encode(bytes);
        let mut tokens = self.tokens.write().unwrap_or_else(PoisonError::into_inner);
        tokens.insert(
            token.clone(),
            IssuedToken {
                fingerprint: fingerprint.clone(),
                created_at: Utc::now(),
            },
        );
        token
    }

    /// A non-permanent token is valid iff it is stored and its issuing
    /// fingerprint equals `client` byte for byte.
    pub fn validate(&self, client: &Fingerprint, token: &str) -> bool {
        if self.permanent.contains(token) {
            return true;
        }
        let tokens = self.tokens.read().unwrap_or_else(PoisonError::into_inner);
        match tokens.get(token) {
            Some(stored) => stored.fingerprint == *client,
            None => false,
        }
    }

    /// Remove a token. Returns whether it existed. Permanent tokens are
    /// unaffected.
    pub fn revoke(&self, token: &str) -> bool {
        let mut tokens = self.tokens.write().unwrap_or_else(PoisonError::into_inner);
        match tokens.remove(token) {
            Some(removed) => {
                let age = Utc::now() - removed.created_at;
                tracing::debug!(
                    token = token,
                    fingerprint = %removed.fingerprint,
                    age_secs = age.num_seconds(),
                    "Revoked token"
                );
                true
            }
            None => false,
        }
    }

    /// Read the antibot token cookie from a request.
    pub fn extract_from_request(request: &CheckRequest) -> Option<String> {
        request.cookie(TOKEN_COOKIE).map(str::to_string)
    }
}
