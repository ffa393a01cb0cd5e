//! Shared constants for Aegis components.

/// Cookie carrying the antibot token back from the client
pub const TOKEN_COOKIE: &str = "AEGIS_TOKEN";

/// Default HTTP listen address
pub const DEFAULT_LISTEN_ADDR: &str = "localhost:2048";

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "/etc/aegis/config.json";

/// Default directory holding challenge page templates
pub const DEFAULT_ASSETS_DIR: &str = "/usr/share/aegis";

/// CAPTCHA template library file
pub const CAPTCHA_TEMPLATES_PATH: &str = "/etc/aegis/captcha.json";

/// Unconsumed challenges are dropped after this many seconds
pub const CHALLENGE_TTL_SECS: i64 = 60;

/// Challenge store sweep interval (seconds)
pub const SWEEP_INTERVAL_SECS: u64 = 1;

/// Rate-limit window rotation interval (seconds)
pub const ROTATION_INTERVAL_SECS: u64 = 1;

/// CAPTCHA template library reload interval (seconds)
pub const TEMPLATE_RELOAD_SECS: u64 = 60;

/// Budget for reading a request's headers (seconds)
pub const READ_TIMEOUT_SECS: u64 = 2;

/// Budget for handling a request and producing its response (seconds)
pub const WRITE_TIMEOUT_SECS: u64 = 2;

/// Keep-alive connections with no activity for this long are closed (seconds)
pub const IDLE_TIMEOUT_SECS: u64 = 20;

/// HTTP server drain budget on shutdown (seconds)
pub const SHUTDOWN_GRACE_SECS: u64 = 10;

/// Raw length of a minted token before base64 encoding
pub const TOKEN_BYTES: usize = 32;

/// Sub-request headers set by the front proxy
pub mod headers {
    /// Real client's HTTP method
    pub const X_ORIGINAL_METHOD: &str = "x-original-method";

    /// Real client's path and query
    pub const X_ORIGINAL_URL: &str = "x-original-url";

    /// Real client's textual IP address (v4 or v6)
    pub const X_ORIGINAL_ADDR: &str = "x-original-addr";
}

/// Public endpoints of the gateway
pub mod endpoints {
    /// Challenge page (GET) and solution submission (POST)
    pub const TOKEN: &str = "/aegis/token";

    /// Static solver page for the proof-of-work flow
    pub const CHALLENGE_INDEX: &str = "/aegis/challenge/index.html";

    /// Proxy sub-request entry point
    pub const CHECK: &str = "/aegis/handlers/http";

    /// Prometheus exposition endpoint
    pub const METRICS: &str = "/metrics";
}
