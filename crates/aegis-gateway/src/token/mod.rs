//! Token lifecycle: challenge issuance, verification and storage.
//!
//! The two verification flavours sit behind one sum type with uniform
//! operations so the pipeline and the HTTP boundary never care which one is
//! configured.

mod captcha;
mod pow;
mod store;

pub use captcha::CaptchaTokenManager;
pub use pow::PowChallengeManager;
pub use store::TokenStore;

use aegis_common::{AegisError, CheckRequest, Fingerprint};
use std::sync::Arc;

/// The configured verification flavour.
pub enum Verifier {
    /// SHA-512 proof-of-work solved by the challenge page script
    Pow(PowChallengeManager),
    /// Image-classification CAPTCHA
    Captcha(CaptchaTokenManager),
}

impl Verifier {
    /// Read the antibot token carried by a request.
    pub fn extract_token(request: &CheckRequest) -> Option<String> {
        TokenStore::extract_from_request(request)
    }

    /// Render a challenge page bound to the requester's fingerprint.
    pub fn challenge_page(&self, fingerprint: &Fingerprint) -> Result<String, AegisError> {
        match self {
            Self::Pow(manager) => manager.challenge_page(fingerprint),
            Self::Captcha(manager) => manager.challenge_page(fingerprint),
        }
    }

    /// Verify a posted solution and mint a token on success.
    pub fn verify_and_mint(
        &self,
        fingerprint: &Fingerprint,
        payload: &[u8],
    ) -> Result<String, AegisError> {
        match self {
            Self::Pow(manager) => manager.verify_and_mint(fingerprint, payload),
            Self::Captcha(manager) => manager.verify_and_mint(fingerprint, payload),
        }
    }

    pub fn validate(&self, fingerprint: &Fingerprint, token: &str) -> bool {
        self.store().validate(fingerprint, token)
    }

    pub fn revoke(&self, token: &str) -> bool {
        self.store().revoke(token)
    }

    /// Drop expired challenges.
    pub fn sweep(&self) {
        match self {
            Self::Pow(manager) => manager.sweep(),
            Self::Captcha(manager) => manager.sweep(),
        }
    }

    /// Reload side assets. Only the CAPTCHA flavour has any.
    pub fn reload(&self) {
        if let Self::Captcha(manager) = self {
            manager.reload();
        }
    }

    /// Whether this flavour reloads templates periodically.
    pub fn reloads_templates(&self) -> bool {
        matches!(self, Self::Captcha(_))
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        match self {
            Self::Pow(manager) => manager.store(),
            Self::Captcha(manager) => manager.store(),
        }
    }
}
