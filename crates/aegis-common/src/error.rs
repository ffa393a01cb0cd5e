//! Common error types for Aegis components.

use thiserror::Error;

/// Errors raised by the token subsystem and startup plumbing.
#[derive(Debug, Error)]
pub enum AegisError {
    /// PoW suffix (or CAPTCHA task) is not in the challenge store
    #[error("wrong challenge")]
    WrongChallenge,

    /// Solution fingerprint differs from the issuing fingerprint
    #[error("wrong client")]
    WrongClient,

    /// Hash prefix or index set mismatch
    #[error("wrong solution")]
    WrongSolution,

    /// Request body cannot be decoded
    #[error("unprocessable payload: {0}")]
    Unprocessable(String),

    /// Challenge page template is missing or unreadable
    #[error("template error: {0}")]
    Template(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal server error
    #[error("internal error: {0}")]
    Internal(String),
}

impl AegisError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::WrongChallenge | Self::WrongClient | Self::WrongSolution => 401,
            Self::Unprocessable(_) => 422,
            Self::Template(_) | Self::Config(_) | Self::Internal(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_the_taxonomy() {
        assert_eq!(AegisError::WrongChallenge.status_code(), 401);
        assert_eq!(AegisError::WrongClient.status_code(), 401);
        assert_eq!(AegisError::WrongSolution.status_code(), 401);
        assert_eq!(AegisError::Unprocessable("bad".into()).status_code(), 422);
        assert_eq!(AegisError::Internal("boom".into()).status_code(), 500);
    }
}
