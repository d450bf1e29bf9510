//! Storage seams of the server side
//!
//! `KeyStore` holds the canonical wrapped-key records; `ParticipantStore` the
//! independently maintained participant records. The reconciler only needs
//! these two. `AccessStore` adds the single-transaction invite and removal.

use async_trait::async_trait;
use std::collections::BTreeSet;

use super::error::StoreError;
use crate::types::{TopicId, UserId};

#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Insert or replace the wrapped key of `user` for `topic`
    async fn set_key(
        &self,
        topic: TopicId,
        user: UserId,
        wrapped_key: &str,
    ) -> Result<(), StoreError>;

    async fn get_key(&self, topic: TopicId, user: UserId) -> Result<Option<String>, StoreError>;

    /// Returns whether a record was deleted
    async fn delete_key(&self, topic: TopicId, user: UserId) -> Result<bool, StoreError>;

    /// Users holding a key for `topic`
    async fn keys_for_topic(&self, topic: TopicId) -> Result<BTreeSet<UserId>, StoreError>;
}

#[async_trait]
pub trait ParticipantStore: Send + Sync {
    /// Every topic flagged as encrypted
    async fn encrypted_topics(&self) -> Result<Vec<TopicId>, StoreError>;

    async fn participants_of(&self, topic: TopicId) -> Result<BTreeSet<UserId>, StoreError>;

    /// Returns whether a record was created
    async fn add_participant(&self, topic: TopicId, user: UserId) -> Result<bool, StoreError>;

    /// Returns whether a record was deleted
    async fn remove_participant(&self, topic: TopicId, user: UserId) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait AccessStore: Send + Sync {
    /// Store the key and the participant record in one transaction
    async fn grant_access(
        &self,
        topic: TopicId,
        user: UserId,
        wrapped_key: &str,
    ) -> Result<(), StoreError>;

    /// Delete the key and the participant record in one transaction.
    ///
    /// Returns whether anything was deleted.
    async fn revoke_access(&self, topic: TopicId, user: UserId) -> Result<bool, StoreError>;
}
