//! # Aegis Gateway
//!
//! Out-of-band anti-bot verification gateway. Sits beside a front HTTP proxy
//! (NGINX `auth_request` or similar) and decides, for each proxied
//! transaction, one of three outcomes: allow, deny, or serve a verification
//! challenge. Clients earn short-lived opaque tokens by solving a SHA-512
//! proof-of-work or an image-classification CAPTCHA; tokens stay alive only
//! while the client's request rate stays under the configured per-endpoint
//! limits.
//!
//! ## Architecture
//! ```text
//! Client → NGINX ──auth sub-request──► Aegis ──verdict──► allow/deny/redirect
//!                                        │
//!                                   in-memory state
//!                            (tokens, challenges, counters)
//! ```

pub mod captcha;
pub mod config;
pub mod fingerprint;
pub mod limiter;
pub mod metrics;
pub mod pipeline;
pub mod remap;
pub mod routes;
pub mod server;
pub mod state;
pub mod token;
pub mod workers;
