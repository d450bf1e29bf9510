//! Server-side error types

use thiserror::Error;

use crate::types::{TopicId, UserId};

/// Storage failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Unknown topic: {0}")]
    UnknownTopic(TopicId),

    #[error("Storage task failed: {0}")]
    Task(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<r2d2::Error> for StoreError {
    fn from(e: r2d2::Error) -> Self {
        StoreError::Pool(e.to_string())
    }
}

/// Failures of the invite and access-removal flows
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    /// Invite without a wrapped key; nothing was written
    #[error("Missing wrapped key for user {user} on topic {topic}")]
    MissingWrappedKey { topic: TopicId, user: UserId },

    #[error("Unknown topic: {0}")]
    UnknownTopic(TopicId),

    #[error("Storage error: {0}")]
    Store(StoreError),
}

impl AccessError {
    /// Whether the caller sent a bad request, as opposed to a server fault
    pub fn is_client_error(&self) -> bool {
        !matches!(self, AccessError::Store(_))
    }

    /// HTTP status an API layer should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            AccessError::MissingWrappedKey { .. } => 400,
            AccessError::UnknownTopic(_) => 404,
            AccessError::Store(_) => 500,
        }
    }
}

impl From<StoreError> for AccessError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UnknownTopic(topic) => AccessError::UnknownTopic(topic),
            other => AccessError::Store(other),
        }
    }
}
