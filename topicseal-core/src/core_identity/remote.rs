//! Remote capabilities consumed by the client
//!
//! The HTTP layer is external; these traits are the narrow surface the
//! identity manager and caches call into.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use super::codec::ExportedIdentity;

/// Failure of a remote call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Server rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
}

/// Identity export material sent to the key server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySubmission {
    pub public: String,
    pub private: String,
    /// Replace material already stored for this user
    pub overwrite: bool,
}

impl KeySubmission {
    pub fn new(exported: ExportedIdentity, overwrite: bool) -> Self {
        KeySubmission {
            public: exported.public,
            private: exported.private,
            overwrite,
        }
    }
}

/// Server-side storage for passphrase-protected identity exports
#[async_trait]
pub trait KeyServer: Send + Sync {
    async fn submit_keys(&self, submission: KeySubmission) -> Result<(), RemoteError>;
}

/// Lookup of other users' public identities
#[async_trait]
pub trait IdentityLookup: Send + Sync {
    /// Fetch encoded public identities; unknown usernames are absent from the result
    async fn fetch_identities(
        &self,
        usernames: &HashSet<String>,
    ) -> Result<HashMap<String, String>, RemoteError>;
}
