//! # IssueWatch Protocols
//!
//! Interfaces the monitoring engine consumes from the surrounding
//! issue-automation service. Contains only definitions - no implementations.
//!
//! ## Core Traits
//!
//! - [`RepositoryClient`] - reachability and identity lookups against the
//!   hosting API, used by the health probes

pub mod client;
pub mod credential;
pub mod error;

pub use client::{ApiStatus, Identity, RateLimit, RepositoryClient};
pub use credential::Credential;
pub use error::ClientError;
