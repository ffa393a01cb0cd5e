//! Long-lived background loops.
//!
//! Each loop ticks on its own interval and exits on the shutdown broadcast.
//! The loops share no state with each other.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use aegis_common::constants::{ROTATION_INTERVAL_SECS, SWEEP_INTERVAL_SECS, TEMPLATE_RELOAD_SECS};

use crate::limiter::RpsLimiter;
use crate::token::Verifier;

/// Deletes expired challenges every second.
pub async fn sweep_worker(verifier: Arc<Verifier>, mut shutdown: broadcast::Receiver<()>) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(SWEEP_INTERVAL_SECS)) => {
                verifier.sweep();
            }
            _ = shutdown.recv() => {
                tracing::debug!("Challenge sweeper stopped");
                break;
            }
        }
    }
}

/// Reloads the CAPTCHA template library every minute.
pub async fn reload_worker(verifier: Arc<Verifier>, mut shutdown: broadcast::Receiver<()>) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(TEMPLATE_RELOAD_SECS)) => {
                verifier.reload();
            }
            _ = shutdown.recv() => {
                tracing::debug!("Template reloader stopped");
                break;
            }
        }
    }
}

/// Rotates rate-limit windows every second.
pub async fn rotation_worker(limiter: Arc<RpsLimiter>, mut shutdown: broadcast::Receiver<()>) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(ROTATION_INTERVAL_SECS)) => {
                limiter.rotate();
            }
            _ = shutdown.recv() => {
                tracing::debug!("Rate-limit rotation stopped");
                break;
            }
        }
    }
}
