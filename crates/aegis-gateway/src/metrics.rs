//! Process metrics behind an injected registry.
//!
//! The registry is a plain struct of atomic counters owned by the
//! application state and rendered in Prometheus text exposition format at
//! `GET /metrics`.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counter registry shared across handlers and background tasks.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Verdict responses sent to the front proxy, by code
    pub allow_responses: AtomicU64,
    pub deny_responses: AtomicU64,
    pub challenge_responses: AtomicU64,

    /// Challenge pages served
    pub challenge_requests: AtomicU64,

    /// Solution submissions, by result
    pub tokens_issued: AtomicU64,
    pub solutions_rejected: AtomicU64,
    pub solutions_unprocessable: AtomicU64,

    /// Protected-path decisions, by result
    pub protection_success: AtomicU64,
    pub protection_forbidden: AtomicU64,

    /// Tokens revoked by the rate limiter
    pub tokens_revoked: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, value: u64) {
        counter.fetch_add(value, Ordering::Relaxed);
    }

    /// Render all counters in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        format!(
            "# HELP aegis_antibot_response Verdict responses sent to the front proxy\n\
             # TYPE aegis_antibot_response counter\n\
             aegis_antibot_response{{code=\"204\"}} {}\n\
             aegis_antibot_response{{code=\"403\"}} {}\n\
             aegis_antibot_response{{code=\"302\"}} {}\n\
             \n\
             # HELP aegis_challenge_request Challenge pages served\n\
             # TYPE aegis_challenge_request counter\n\
             aegis_challenge_request {}\n\
             \n\
             # HELP aegis_token_request Solution submissions by result\n\
             # TYPE aegis_token_request counter\n\
             aegis_token_request{{result=\"success\"}} {}\n\
             aegis_token_request{{result=\"wrong\"}} {}\n\
             aegis_token_request{{result=\"unprocessable\"}} {}\n\
             \n\
             # HELP aegis_endpoint_protection Protected-path decisions by result\n\
             # TYPE aegis_endpoint_protection counter\n\
             aegis_endpoint_protection{{result=\"success\"}} {}\n\
             aegis_endpoint_protection{{result=\"forbidden\"}} {}\n\
             \n\
             # HELP aegis_revoke_token Tokens revoked by the rate limiter\n\
             # TYPE aegis_revoke_token counter\n\
             aegis_revoke_token{{reason=\"rps\"}} {}\n",
            load(&self.allow_responses),
            load(&self.deny_responses),
            load(&self.challenge_responses),
            load(&self.challenge_requests),
            load(&self.tokens_issued),
            load(&self.solutions_rejected),
            load(&self.solutions_unprocessable),
            load(&self.protection_success),
            load(&self.protection_forbidden),
            load(&self.tokens_revoked),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_reflects_counter_state() {
        let metrics = Metrics::new();
        Metrics::inc(&metrics.allow_responses);
        Metrics::inc(&metrics.allow_responses);
        Metrics::add(&metrics.tokens_revoked, 3);

        let text = metrics.render();
        assert!(text.contains("aegis_antibot_response{code=\"204\"} 2"));
        assert!(text.contains("aegis_antibot_response{code=\"403\"} 0"));
        assert!(text.contains("aegis_revoke_token{reason=\"rps\"} 3"));
    }
}
