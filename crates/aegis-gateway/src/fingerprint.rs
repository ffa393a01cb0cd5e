//! Client fingerprint derivation.
//!
//! A fingerprint is 4 bytes of CRC32 over the raw client address string
//! followed by one XOR-folded byte per selected header. XOR-folding is not
//! collision-resistant; the fingerprint is only a cheap equivalence class for
//! binding a token to "the same browser on the same IP".

use aegis_common::{CheckRequest, Fingerprint, FINGERPRINT_LEN};

/// Headers folded into the fingerprint, in fixed order. An absent header
/// contributes a zero byte at its position.
const FOLDED_HEADERS: [&str; 7] = [
    "user-agent",
    "sec-ch-ua",
    "sec-ch-ua-platform",
    "sec-ch-ua-mobile",
    "sec-ch-ua-full-version-list",
    "accept-language",
    "accept-encoding",
];

/// Computes a bitwise XOR over the string bytes. Returns 0 for an empty
/// string.
fn xor_fold(value: &str) -> u8 {
    value.bytes().fold(0, |acc, b| acc ^ b)
}

/// Derives fingerprints from the client address and headers of a request.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddressHeadersFingerprinter;

impl AddressHeadersFingerprinter {
    pub fn new() -> Self {
        Self
    }

    /// Calculate the client fingerprint.
    ///
    /// Deterministic: identical address and identical selected headers
    /// always produce identical bytes.
    pub fn calculate(&self, request: &CheckRequest) -> Fingerprint {
        let mut value = [0u8; FINGERPRINT_LEN];
        let crc = crc32fast::hash(request.client_address.as_bytes());
        value[..4].copy_from_slice(&crc.to_le_bytes());
        for (i, name) in FOLDED_HEADERS.iter().enumerate() {
            value[4 + i] = request.header(name).map(xor_fold).unwrap_or(0);
        }
        Fingerprint::new(value)
    }
}
