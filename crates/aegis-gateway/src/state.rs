//! Application state and shared resources.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use aegis_common::VerificationKind;

use crate::captcha::{CaptchaManager, TemplateLibrary};
use crate::config::AppConfig;
use crate::fingerprint::AddressHeadersFingerprinter;
use crate::limiter::RpsLimiter;
use crate::metrics::Metrics;
use crate::pipeline::{Chain, FingerprintEnricher, PathProtector};
use crate::token::{CaptchaTokenManager, PowChallengeManager, TokenStore, Verifier};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub fingerprinter: AddressHeadersFingerprinter,
    pub verifier: Arc<Verifier>,
    pub limiter: Arc<RpsLimiter>,
    pub chain: Arc<Chain>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// Build the verifier, the rate limiter and the pipeline from the
    /// configuration. Template problems are fatal here, before the server
    /// binds.
    pub fn new(config: AppConfig) -> Result<Self> {
        let metrics = Arc::new(Metrics::new());
        let store = Arc::new(TokenStore::new(config.permanent_tokens.iter().cloned()));

        let assets_dir = Path::new(&config.assets_dir);
        let complexity = config.verification.complexity;
        let verifier = Arc::new(match config.verification.kind {
            VerificationKind::JsChallenge => {
                let page = read_template(&assets_dir.join("challenge/index.html"))?;
                Verifier::Pow(PowChallengeManager::new(complexity, store.clone(), page))
            }
            VerificationKind::Captcha => {
                let page = read_template(
                    &assets_dir.join(format!("captcha/index_{}.html", complexity.as_str())),
                )?;
                let library_path = PathBuf::from(&config.captcha_templates);
                let library = TemplateLibrary::load(&library_path)
                    .context("unable to load CAPTCHA template library")?;
                let manager = CaptchaManager::new(complexity, library, library_path);
                Verifier::Captcha(CaptchaTokenManager::new(
                    complexity,
                    manager,
                    store.clone(),
                    &page,
                )?)
            }
        });

        let limiter = Arc::new(RpsLimiter::new(store, metrics.clone()));
        for protection in &config.protections {
            limiter.add_limit(protection);
        }

        let chain = Arc::new(Chain::new(vec![
            Box::new(FingerprintEnricher::new()),
            Box::new(PathProtector::new(
                verifier.clone(),
                limiter.clone(),
                metrics.clone(),
                &config.protections,
            )),
        ]));

        Ok(Self {
            config,
            fingerprinter: AddressHeadersFingerprinter::new(),
            verifier,
            limiter,
            chain,
            metrics,
        })
    }
}

fn read_template(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("unable to read template {}", path.display()))
}
