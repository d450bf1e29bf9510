//! Per-topic symmetric keys and decrypted titles
//!
//! Entries are first-write-wins. A wrapped key is unwrapped at most once:
//! the first `get` runs the unwrap inside the entry's once-cell and every
//! concurrent caller awaits that same initialisation. A failed unwrap leaves
//! the cell empty, so the next `get` tries again.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OnceCell;

use super::error::CacheError;
use crate::core_identity::{IdentityError, IdentityManager, PublicIdentity};
use crate::crypto::{self, TopicKey};
use crate::metrics::{record_counter, CACHE_TOPIC_KEY_UNWRAPS};
use crate::types::TopicId;

/// Capability to unwrap a topic key addressed to the current user
#[async_trait]
pub trait KeySource: Send + Sync {
    async fn unwrap_topic_key(&self, wrapped: &str) -> Result<TopicKey, IdentityError>;
}

#[async_trait]
impl KeySource for IdentityManager {
    async fn unwrap_topic_key(&self, wrapped: &str) -> Result<TopicKey, IdentityError> {
        let identity = self.get_identity().await?.ok_or(IdentityError::NoIdentity)?;
        Ok(crypto::unwrap_key(identity.encryption().secret_key(), wrapped)?)
    }
}

/// What the server handed us for a topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicKeyMaterial {
    /// Topic key wrapped for the current user
    Wrapped(String),
    /// Usable key, e.g. for a topic this client just created
    Key(TopicKey),
}

impl From<TopicKey> for TopicKeyMaterial {
    fn from(key: TopicKey) -> Self {
        TopicKeyMaterial::Key(key)
    }
}

impl From<String> for TopicKeyMaterial {
    fn from(wrapped: String) -> Self {
        TopicKeyMaterial::Wrapped(wrapped)
    }
}

#[derive(Clone)]
struct KeyEntry {
    wrapped: Option<String>,
    key: Arc<OnceCell<TopicKey>>,
}

#[derive(Clone)]
struct TitleEntry {
    ciphertext: String,
    plaintext: Arc<OnceCell<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct TopicKeyCache {
    source: Arc<dyn KeySource>,
    keys: Mutex<HashMap<TopicId, KeyEntry>>,
    titles: Mutex<HashMap<TopicId, TitleEntry>>,
}

impl TopicKeyCache {
    pub fn new(source: Arc<dyn KeySource>) -> Self {
        TopicKeyCache {
            source,
            keys: Mutex::new(HashMap::new()),
            titles: Mutex::new(HashMap::new()),
        }
    }

    /// Store key material unless the topic already has some.
    ///
    /// Returns whether the material was stored.
    pub fn put(&self, topic: TopicId, material: impl Into<TopicKeyMaterial>) -> bool {
        let mut keys = lock(&self.keys);
        if keys.contains_key(&topic) {
            return false;
        }

        let entry = match material.into() {
            TopicKeyMaterial::Wrapped(wrapped) => KeyEntry {
                wrapped: Some(wrapped),
                key: Arc::new(OnceCell::new()),
            },
            TopicKeyMaterial::Key(key) => KeyEntry {
                wrapped: None,
                key: Arc::new(OnceCell::new_with(Some(key))),
            },
        };
        keys.insert(topic, entry);
        true
    }

    /// Usable key for `topic`, unwrapping it on first use
    pub async fn get(&self, topic: TopicId) -> Result<TopicKey, CacheError> {
        let entry = lock(&self.keys)
            .get(&topic)
            .cloned()
            .ok_or(CacheError::NoKeyForTopic(topic))?;

        let key = entry
            .key
            .get_or_try_init(|| async {
                let wrapped = entry.wrapped.as_deref().ok_or(CacheError::NoKeyForTopic(topic))?;
                record_counter(CACHE_TOPIC_KEY_UNWRAPS, 1);
                tracing::debug!(topic = %topic, "Unwrapping topic key");
                Ok::<_, CacheError>(self.source.unwrap_topic_key(wrapped).await?)
            })
            .await?;

        Ok(key.clone())
    }

    pub fn has_key(&self, topic: TopicId) -> bool {
        lock(&self.keys).contains_key(&topic)
    }

    /// Store an encrypted title unless the topic already has one
    pub fn put_title(&self, topic: TopicId, ciphertext: impl Into<String>) -> bool {
        let mut titles = lock(&self.titles);
        if titles.contains_key(&topic) {
            return false;
        }
        titles.insert(
            topic,
            TitleEntry {
                ciphertext: ciphertext.into(),
                plaintext: Arc::new(OnceCell::new()),
            },
        );
        true
    }

    /// Decrypted title for `topic`, decrypting it once its key is usable
    pub async fn get_title(&self, topic: TopicId) -> Result<String, CacheError> {
        let entry = lock(&self.titles)
            .get(&topic)
            .cloned()
            .ok_or(CacheError::NoTitleForTopic(topic))?;

        let title = entry
            .plaintext
            .get_or_try_init(|| async {
                let key = self.get(topic).await?;
                Ok::<_, CacheError>(crypto::decrypt(&key, &entry.ciphertext)?)
            })
            .await?;

        Ok(title.clone())
    }

    /// Wrap the topic key for a new participant
    pub async fn wrap_for(
        &self,
        topic: TopicId,
        recipient: &PublicIdentity,
    ) -> Result<String, CacheError> {
        let key = self.get(topic).await?;
        Ok(crypto::wrap_key(recipient.encryption_key(), &key)?)
    }

    /// Drop every key and title, e.g. after the identity was reset
    pub fn clear(&self) {
        lock(&self.keys).clear();
        lock(&self.titles).clear();
    }
}
