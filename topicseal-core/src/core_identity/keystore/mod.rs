//! Keystore module
//!
//! Local persistent store for the current user's identity. Values are opaque
//! bytes keyed by a fixed name.

use thiserror::Error;

pub mod file_keystore;
pub mod memory_keystore;

pub use file_keystore::FileKeystore;
pub use memory_keystore::MemoryKeystore;

/// Name of the encoded identity record
pub const IDENTITY_KEY: &str = "identity";

/// Name of the storage layout marker
pub const DB_VERSION_KEY: &str = "db-version";

/// Storage layout written by this version
pub const DB_VERSION: &str = "1";

/// Keystore errors
#[derive(Debug, Error)]
pub enum KeystoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid key name: {0}")]
    InvalidName(String),

    #[error("Corrupted record {name}: {reason}")]
    Corrupted { name: String, reason: String },

    #[error("Other error: {0}")]
    Other(String),
}

/// Abstract keystore trait
pub trait Keystore: Send + Sync {
    /// Load a record, `None` when it was never saved
    fn load(&self, name: &str) -> Result<Option<Vec<u8>>, KeystoreError>;

    /// Save a record, replacing any previous value
    fn save(&self, name: &str, value: &[u8]) -> Result<(), KeystoreError>;

    /// Delete a record; deleting a missing record is not an error
    fn delete(&self, name: &str) -> Result<(), KeystoreError>;
}
