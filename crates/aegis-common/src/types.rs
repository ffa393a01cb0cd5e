//! Core types shared across Aegis components.

use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;

/// Byte length of a client fingerprint: 4 bytes of address CRC32 followed by
/// 7 XOR-folded header bytes.
pub const FINGERPRINT_LEN: usize = 11;

/// Deterministic short byte string binding a token to a client
/// approximation (IP + selected headers).
///
/// Not a cryptographic binding - only a cheap equivalence class: two requests
/// with the same address and the same selected headers fold to the same
/// value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    value: [u8; FINGERPRINT_LEN],
}

impl Fingerprint {
    pub fn new(value: [u8; FINGERPRINT_LEN]) -> Self {
        Self { value }
    }

    pub fn value(&self) -> &[u8; FINGERPRINT_LEN] {
        &self.value
    }

    /// Lowercase hex text form, used as a map key and in log fields
    pub fn hex(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.value {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// Challenge difficulty selected by `verification.complexity`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Easy,
    Medium,
    Hard,
}

impl Complexity {
    /// Leading SHA-512 bytes a PoW solver must match (expected work
    /// 2^8 / 2^16 / 2^24 trials)
    pub fn pow_prefix_len(&self) -> usize {
        match self {
            Self::Easy => 1,
            Self::Medium => 2,
            Self::Hard => 3,
        }
    }

    /// Image slots in a classification CAPTCHA task
    pub fn captcha_slots(&self) -> usize {
        match self {
            Self::Easy => 4,
            Self::Medium => 6,
            Self::Hard => 8,
        }
    }

    /// File-name suffix of the per-complexity CAPTCHA page template
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

impl Default for Complexity {
    fn default() -> Self {
        Self::Medium
    }
}

/// Client verification flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum VerificationKind {
    /// SHA-512 proof-of-work solved by the challenge page script
    #[serde(rename = "js-challenge")]
    JsChallenge,
    /// Image-classification CAPTCHA
    #[serde(rename = "captcha")]
    Captcha,
}

impl Default for VerificationKind {
    fn default() -> Self {
        Self::JsChallenge
    }
}

/// A configured `(regex path, method, rps limit)` triple
#[derive(Debug, Clone, Deserialize)]
pub struct Protection {
    /// URL path pattern to protect (e.g. `^/api/v1/login$`)
    pub path: String,
    /// HTTP method to protect (normalised to uppercase on load)
    pub method: String,
    /// Maximum requests per second; 0 in the config file means unlimited
    /// and is normalised to `u32::MAX`
    #[serde(rename = "rps")]
    pub limit: u32,
}

/// Terminal outcome of the verification pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Let the transaction through (204)
    Allow,
    /// Reject and point the client at the verification page (403)
    Deny,
    /// Redirect the client to the verification page (302)
    Challenge,
}

/// Internal representation of one proxied HTTP transaction.
///
/// Built by the HTTP boundary from the `X-Original-*` sub-request headers;
/// header keys are folded to lowercase so lookups are case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct CheckRequest {
    /// Textual client IP, v4 or v6
    pub client_address: String,
    /// Uppercased HTTP method of the real request
    pub method: String,
    /// Path-and-query of the real request
    pub path: String,
    /// Raw request body
    pub body: String,
    /// Header map with lowercased keys
    pub headers: HashMap<String, String>,
    /// Cookie map parsed from the `Cookie` header
    pub cookies: HashMap<String, String>,
    /// Set by the fingerprint-enrichment stage
    pub fingerprint: Option<Fingerprint>,
}

impl CheckRequest {
    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }
}
