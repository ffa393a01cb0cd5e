//! Configuration management for the gateway.

use aegis_common::constants::{
    CAPTCHA_TEMPLATES_PATH, DEFAULT_ASSETS_DIR, DEFAULT_LISTEN_ADDR,
};
use aegis_common::{Complexity, Protection, VerificationKind};
use anyhow::{Context, Result};
use serde::Deserialize;

/// Application configuration, loaded from a JSON file at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP listen address
    #[serde(default = "default_address")]
    pub address: String,

    #[serde(default)]
    pub logger: LoggerConfig,

    #[serde(default)]
    pub verification: VerificationConfig,

    /// Tokens accepted from any fingerprint, never expired or revoked
    #[serde(default)]
    pub permanent_tokens: Vec<String>,

    /// Endpoint protection rules
    #[serde(default)]
    pub protections: Vec<Protection>,

    /// Directory holding the challenge page templates
    #[serde(default = "default_assets_dir")]
    pub assets_dir: String,

    /// CAPTCHA template library file
    #[serde(default = "default_captcha_templates")]
    pub captcha_templates: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggerConfig {
    /// One of ERROR, WARNING, INFO, DEBUG (case-insensitive)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerificationConfig {
    #[serde(rename = "type", default)]
    pub kind: VerificationKind,
    #[serde(default)]
    pub complexity: Complexity,
}

fn default_address() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}
fn default_log_level() -> String {
    "INFO".to_string()
}
fn default_assets_dir() -> String {
    DEFAULT_ASSETS_DIR.to_string()
}
fn default_captcha_templates() -> String {
    CAPTCHA_TEMPLATES_PATH.to_string()
}

impl AppConfig {
    /// Load and normalise the configuration file.
    ///
    /// Normalisation: protection methods are uppercased and a zero RPS limit
    /// means unlimited.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::new(path, config::FileFormat::Json))
            .build()
            .with_context(|| format!("failed to load config file {}", path))?;
        let mut config: AppConfig = settings
            .try_deserialize()
            .context("failed to parse config")?;

        for protection in &mut config.protections {
            if protection.limit == 0 {
                protection.limit = u32::MAX;
            }
            protection.method = protection.method.to_uppercase();
        }
        Ok(config)
    }
}
