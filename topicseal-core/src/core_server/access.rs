//! Invite and access-removal flows
//!
//! Both go through [`AccessStore`], which writes the key record and the
//! participant record in one transaction.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::AccessError;
use super::traits::AccessStore;
use crate::types::{TopicId, UserId};

/// Request granting `user` access to an encrypted topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteRequest {
    pub topic: TopicId,
    pub user: UserId,

    /// Topic key wrapped for `user`
    #[serde(default)]
    pub wrapped_key: Option<String>,
}

pub struct AccessService {
    store: Arc<dyn AccessStore>,
}

impl AccessService {
    pub fn new(store: Arc<dyn AccessStore>) -> Self {
        AccessService { store }
    }

    /// Store the wrapped key and add the participant.
    ///
    /// A missing or blank key is rejected before storage is touched.
    pub async fn invite(&self, request: InviteRequest) -> Result<(), AccessError> {
        let InviteRequest { topic, user, wrapped_key } = request;

        let wrapped_key = match wrapped_key {
            Some(key) if !key.trim().is_empty() => key,
            _ => {
                tracing::warn!(topic = %topic, user = %user, "Invite rejected: no wrapped key");
                return Err(AccessError::MissingWrappedKey { topic, user });
            }
        };

        self.store.grant_access(topic, user, wrapped_key.trim()).await?;
        tracing::info!(topic = %topic, user = %user, "Granted topic access");
        Ok(())
    }

    /// Delete the key and the participant record of `user`.
    ///
    /// Returns whether the user had any access to remove.
    pub async fn remove(&self, topic: TopicId, user: UserId) -> Result<bool, AccessError> {
        let removed = self.store.revoke_access(topic, user).await?;
        if removed {
            tracing::info!(topic = %topic, user = %user, "Revoked topic access");
        } else {
            tracing::debug!(topic = %topic, user = %user, "No access to revoke");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_server::{KeyStore, ParticipantStore, SqlTopicStore};

    async fn setup() -> (AccessService, Arc<SqlTopicStore>, TopicId) {
        let store = Arc::new(SqlTopicStore::memory().unwrap());
        let topic = store.create_topic("t", true).await.unwrap();
        (AccessService::new(store.clone()), store, topic)
    }

    #[tokio::test]
    async fn test_invite_writes_both_records() {
        let (service, store, topic) = setup().await;

        service
            .invite(InviteRequest {
                topic,
                user: UserId(1),
                wrapped_key: Some("wrapped".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(store.get_key(topic, UserId(1)).await.unwrap().as_deref(), Some("wrapped"));
        assert!(store.participants_of(topic).await.unwrap().contains(&UserId(1)));
    }

    #[tokio::test]
    async fn test_invite_without_key_changes_nothing() {
        let (service, store, topic) = setup().await;

        for wrapped_key in [None, Some(String::new()), Some("   ".to_string())] {
            let err = service
                .invite(InviteRequest {
                    topic,
                    user: UserId(1),
                    wrapped_key,
                })
                .await
                .unwrap_err();
            assert_eq!(err, AccessError::MissingWrappedKey { topic, user: UserId(1) });
            assert!(err.is_client_error());
        }

        assert!(store.keys_for_topic(topic).await.unwrap().is_empty());
        assert!(store.participants_of(topic).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invite_unknown_topic() {
        let (service, _, _) = setup().await;

        let err = service
            .invite(InviteRequest {
                topic: TopicId(404),
                user: UserId(1),
                wrapped_key: Some("wrapped".to_string()),
            })
            .await
            .unwrap_err();
        assert_eq!(err, AccessError::UnknownTopic(TopicId(404)));
    }

    #[tokio::test]
    async fn test_remove() {
        let (service, store, topic) = setup().await;
        store.grant_access(topic, UserId(2), "wrapped").await.unwrap();

        assert!(service.remove(topic, UserId(2)).await.unwrap());
        assert!(store.keys_for_topic(topic).await.unwrap().is_empty());
        assert!(store.participants_of(topic).await.unwrap().is_empty());

        assert!(!service.remove(topic, UserId(2)).await.unwrap());
    }

    #[test]
    fn test_invite_request_json() {
        let request: InviteRequest = serde_json::from_str(r#"{"topic": 3, "user": 9}"#).unwrap();
        assert_eq!(request.topic, TopicId(3));
        assert_eq!(request.wrapped_key, None);
    }
}
