//! CAPTCHA-backed token issuance.
//!
//! Tracks at most one active task per client fingerprint and renders the
//! challenge page from a template pre-split on its placeholders.

use aegis_common::{AegisError, Complexity, Fingerprint};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::captcha::{CaptchaManager, Solution};

use super::store::TokenStore;

/// Issues CAPTCHA challenge pages and mints tokens for solved tasks.
pub struct CaptchaTokenManager {
    slots: usize,
    manager: CaptchaManager,
    /// fingerprint hex -> active task id
    active: RwLock<HashMap<String, u32>>,
    store: Arc<TokenStore>,
    /// Page template pre-split on {{description}}, {{image}} and {{id}}
    parts: Vec<String>,
}

impl CaptchaTokenManager {
    pub fn new(
        complexity: Complexity,
        manager: CaptchaManager,
        store: Arc<TokenStore>,
        page: &str,
    ) -> Result<Self, AegisError> {
        let slots = complexity.captcha_slots();
        Ok(Self {
            slots,
            manager,
            active: RwLock::new(HashMap::new()),
            store,
            parts: split_page(page, slots)?,
        })
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    /// Build a fresh task for `fingerprint` and render the challenge page.
    /// Any previously active task for this fingerprint is superseded.
    pub fn challenge_page(&self, fingerprint: &Fingerprint) -> Result<String, AegisError> {
        let task = self.manager.task()?;
        {
            let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
            active.insert(fingerprint.hex(), task.id);
        }

        let id = task.id.to_string();
        let size = self.parts.iter().map(String::len).sum::<usize>()
            + task.description.len()
            + task.images.iter().map(String::len).sum::<usize>()
            + id.len();
        let mut content = String::with_capacity(size);
        content.push_str(&self.parts[0]);
        content.push_str(&task.description);
        content.push_str(&self.parts[1]);
        for slot in 0..self.slots {
            content.push_str(&task.images[slot]);
            content.push_str(&self.parts[2 + slot]);
        }
        content.push_str(&id);
        content.push_str(&self.parts[2 + self.slots]);

        tracing::info!(
            fingerprint = %fingerprint,
            id = task.id,
            complexity = self.slots,
            images = task.images.len(),
            description = %task.description,
            "CAPTCHA challenge prepared"
        );
        Ok(content)
    }

    /// Parse a `{id, solution}` payload and verify it against the
    /// fingerprint's active task. Mints a token on success.
    pub fn verify_and_mint(
        &self,
        fingerprint: &Fingerprint,
        payload: &[u8],
    ) -> Result<String, AegisError> {
        let solution: Solution = serde_json::from_slice(payload)
            .map_err(|e| AegisError::Unprocessable(e.to_string()))?;

        {
            let active = self.active.read().unwrap_or_else(PoisonError::into_inner);
            match active.get(&fingerprint.hex()) {
                Some(&id) if id == solution.id => {}
                _ => return Err(AegisError::WrongClient),
            }
        }

        if !self.manager.verify(&solution) {
            return Err(AegisError::WrongSolution);
        }

        {
            let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
            active.remove(&fingerprint.hex());
        }
        let token = self.store.mint(fingerprint);
        tracing::info!(
            fingerprint = %fingerprint,
            token = %token,
            id = solution.id,
            "Token issued for CAPTCHA solution"
        );
        Ok(token)
    }

    pub fn sweep(&self) {
        self.manager.sweep();
    }

    pub fn reload(&self) {
        self.manager.reload();
    }
}

/// Split the page template into literal parts around one `{{description}}`,
/// `slots` `{{image}}` markers and one `{{id}}`, in that order.
fn split_page(page: &str, slots: usize) -> Result<Vec<String>, AegisError> {
    let (head, rest) = page
        .split_once("{{description}}")
        .ok_or_else(|| AegisError::Template("missing {{description}} placeholder".to_string()))?;

    let chunks: Vec<&str> = rest.split("{{image}}").collect();
    if chunks.len() != slots + 1 {
        return Err(AegisError::Template(format!(
            "expected {} {{{{image}}}} placeholders, found {}",
            slots,
            chunks.len() - 1
        )));
    }

    let mut parts = Vec::with_capacity(slots + 3);
    parts.push(head.to_string());
    for chunk in &chunks[..slots] {
        parts.push(chunk.to_string());
    }
    let (tail_head, tail) = chunks[slots]
        .split_once("{{id}}")
        .ok_or_else(|| AegisError::Template("missing {{id}} placeholder".to_string()))?;
    parts.push(tail_head.to_string());
    parts.push(tail.to_string());
    Ok(parts)
}
