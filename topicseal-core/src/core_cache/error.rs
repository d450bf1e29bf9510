use thiserror::Error;

use crate::core_identity::IdentityError;
use crate::crypto::CryptoError;
use crate::types::TopicId;

/// Cache resolution errors.
///
/// A cache miss (`NoKeyForTopic`, `NoTitleForTopic`) is recoverable: callers
/// fall back to showing content as still encrypted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("No key cached for topic {0}")]
    NoKeyForTopic(TopicId),

    #[error("No encrypted title cached for topic {0}")]
    NoTitleForTopic(TopicId),

    #[error("No public identity found for {0}")]
    UnknownIdentity(String),

    /// The batch lookup itself failed
    #[error("Identity lookup failed: {0}")]
    Lookup(String),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}
