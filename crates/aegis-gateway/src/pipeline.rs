//! The verification pipeline.
//!
//! A terminating chain of stages: each stage either passes the request on
//! (`Continue`) or ends processing with a verdict (`Break`). For a single
//! request the stages run sequentially in declaration order.

use aegis_common::{CheckRequest, Protection, Verdict};
use regex::Regex;
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;

use crate::fingerprint::AddressHeadersFingerprinter;
use crate::limiter::RpsLimiter;
use crate::metrics::Metrics;
use crate::remap::RegexMap;
use crate::token::Verifier;

/// One pipeline stage.
pub trait Stage: Send + Sync {
    fn handle(&self, request: &mut CheckRequest) -> ControlFlow<Verdict>;
}

/// Ordered stage chain producing a terminal verdict.
pub struct Chain {
    stages: Vec<Box<dyn Stage>>,
}

impl Chain {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self { stages }
    }

    /// Run the stages in order. A chain that runs out of stages allows the
    /// request.
    pub fn execute(&self, request: &mut CheckRequest) -> Verdict {
        for stage in &self.stages {
            if let ControlFlow::Break(verdict) = stage.handle(request) {
                return verdict;
            }
        }
        Verdict::Allow
    }
}

/// Calculates the client fingerprint and attaches it to the request. Never
/// terminates on its own.
pub struct FingerprintEnricher {
    calculator: AddressHeadersFingerprinter,
}

impl FingerprintEnricher {
    pub fn new() -> Self {
        Self {
            calculator: AddressHeadersFingerprinter::new(),
        }
    }
}

impl Default for FingerprintEnricher {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for FingerprintEnricher {
    fn handle(&self, request: &mut CheckRequest) -> ControlFlow<Verdict> {
        request.fingerprint = Some(self.calculator.calculate(request));
        ControlFlow::Continue(())
    }
}

/// Decides the verdict for protected paths and feeds the rate counters.
pub struct PathProtector {
    /// method -> protected path patterns
    protected: HashMap<String, RegexMap<String>>,
    verifier: Arc<Verifier>,
    limiter: Arc<RpsLimiter>,
    metrics: Arc<Metrics>,
}

impl PathProtector {
    pub fn new(
        verifier: Arc<Verifier>,
        limiter: Arc<RpsLimiter>,
        metrics: Arc<Metrics>,
        protections: &[Protection],
    ) -> Self {
        let mut protected: HashMap<String, RegexMap<String>> = HashMap::new();
        for protection in protections {
            let method = protection.method.to_uppercase();
            match Regex::new(&protection.path) {
                Ok(pattern) => {
                    protected
                        .entry(method)
                        .or_default()
                        .put(pattern, protection.path.clone());
                }
                Err(e) => {
                    tracing::error!(
                        method = %method,
                        path = %protection.path,
                        error = %e,
                        "Failed to compile protection pattern"
                    );
                }
            }
        }
        Self {
            protected,
            verifier,
            limiter,
            metrics,
        }
    }
}

impl Stage for PathProtector {
    fn handle(&self, request: &mut CheckRequest) -> ControlFlow<Verdict> {
        let is_protected = self
            .protected
            .get(&request.method)
            .map(|patterns| patterns.matches(&request.path))
            .unwrap_or(false);
        if !is_protected {
            tracing::debug!(
                address = %request.client_address,
                method = %request.method,
                path = %request.path,
                verdict = "allow",
                "Unprotected path"
            );
            return ControlFlow::Break(Verdict::Allow);
        }

        let Some(fingerprint) = request.fingerprint.clone() else {
            // The enricher runs first; a missing fingerprint means the chain
            // was assembled wrong, so fail closed.
            Metrics::inc(&self.metrics.protection_forbidden);
            return ControlFlow::Break(Verdict::Deny);
        };

        let Some(token) = Verifier::extract_token(request) else {
            Metrics::inc(&self.metrics.protection_forbidden);
            tracing::debug!(
                address = %request.client_address,
                fingerprint = %fingerprint,
                method = %request.method,
                path = %request.path,
                verdict = "deny",
                "Token is absent"
            );
            return ControlFlow::Break(Verdict::Deny);
        };

        if !self.verifier.validate(&fingerprint, &token) {
            Metrics::inc(&self.metrics.protection_forbidden);
            tracing::debug!(
                address = %request.client_address,
                fingerprint = %fingerprint,
                method = %request.method,
                path = %request.path,
                token = %token,
                verdict = "deny",
                "Token is invalid"
            );
            return ControlFlow::Break(Verdict::Deny);
        }

        Metrics::inc(&self.metrics.protection_success);
        self.limiter.count(&token, &request.path, &request.method);
        ControlFlow::Break(Verdict::Allow)
    }
}
