//! Errors reported by API client implementations.

use thiserror::Error;

/// Error returned by a [`RepositoryClient`](crate::RepositoryClient).
#[derive(Debug, Error)]
pub enum ClientError {
    /// The API could not be reached.
    #[error("API unreachable: {0}")]
    Unreachable(String),

    /// The API answered with a non-success status.
    #[error("API returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The credential was rejected.
    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    /// The request did not finish in time.
    #[error("Request timed out after {0}s")]
    Timeout(u64),

    /// Response body could not be decoded.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ClientError {
    /// Whether retrying later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Unreachable(_) | ClientError::Timeout(_) => true,
            ClientError::Status { status, .. } => *status >= 500 || *status == 429,
            ClientError::Unauthorized(_) | ClientError::InvalidResponse(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_display() {
        let err = ClientError::Status {
            status: 502,
            message: "bad gateway".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("502"));
        assert!(msg.contains("bad gateway"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(ClientError::Timeout(30).is_transient());
        assert!(ClientError::Unreachable("dns".to_string()).is_transient());
        assert!(ClientError::Status { status: 503, message: String::new() }.is_transient());
        assert!(ClientError::Status { status: 429, message: String::new() }.is_transient());
        assert!(!ClientError::Status { status: 404, message: String::new() }.is_transient());
        assert!(!ClientError::Unauthorized("bad token".to_string()).is_transient());
    }
}
