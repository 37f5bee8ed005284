//! Hosting API client protocol.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::credential::Credential;
use crate::error::ClientError;

/// Rate-limit budget reported by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    /// Requests allowed per window.
    pub limit: u32,
    /// Requests left in the current window.
    pub remaining: u32,
    /// When the window resets.
    pub reset_at: Option<DateTime<Utc>>,
}

impl RateLimit {
    /// Fraction of the budget still available, in `[0, 1]`.
    pub fn remaining_ratio(&self) -> f64 {
        if self.limit == 0 {
            return 0.0;
        }
        (self.remaining as f64 / self.limit as f64).clamp(0.0, 1.0)
    }
}

/// Result of a reachability check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiStatus {
    /// Whether the API answered.
    pub reachable: bool,
    /// Round-trip latency in milliseconds.
    pub latency_ms: u64,
    /// Core rate-limit budget, when the API reports one.
    pub rate_limit: Option<RateLimit>,
}

/// Authenticated account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Login name.
    pub login: String,
    /// Account kind ("User", "Bot", ...).
    #[serde(default)]
    pub kind: Option<String>,
}

/// Client for the repository hosting API.
///
/// Implemented by the service's API wrapper; the monitor only uses it
/// from health probes.
#[async_trait]
pub trait RepositoryClient: Send + Sync {
    /// Check that the API is reachable and report the rate-limit budget.
    async fn check_status(&self, credential: Option<&Credential>) -> Result<ApiStatus, ClientError>;

    /// Resolve the identity behind a credential.
    async fn authenticated_identity(&self, credential: &Credential) -> Result<Identity, ClientError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_ratio() {
        let rl = RateLimit {
            limit: 5000,
            remaining: 500,
            reset_at: None,
        };
        assert!((rl.remaining_ratio() - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn test_remaining_ratio_zero_limit() {
        let rl = RateLimit {
            limit: 0,
            remaining: 0,
            reset_at: None,
        };
        assert_eq!(rl.remaining_ratio(), 0.0);
    }

    #[test]
    fn test_identity_deserialize() {
        let json = serde_json::json!({ "login": "triage-bot" });
        let identity: Identity = serde_json::from_value(json).unwrap();
        assert_eq!(identity.login, "triage-bot");
        assert!(identity.kind.is_none());
    }
}
