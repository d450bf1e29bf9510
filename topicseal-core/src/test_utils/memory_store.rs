use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use crate::core_server::{KeyStore, ParticipantStore, StoreError};
use crate::types::{TopicId, UserId};

/// In-memory key and participant records
#[derive(Default)]
pub struct MemoryTopicStore {
    topics: Mutex<BTreeMap<TopicId, bool>>,
    keys: Mutex<BTreeMap<(TopicId, UserId), String>>,
    participants: Mutex<BTreeSet<(TopicId, UserId)>>,
    failing_user: Mutex<Option<UserId>>,
    failing_topic: Mutex<Option<TopicId>>,
}

impl MemoryTopicStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_topic(&self, topic: TopicId, encrypted: bool) {
        self.topics.lock().unwrap().insert(topic, encrypted);
    }

    pub fn insert_key(&self, topic: TopicId, user: UserId) {
        self.keys
            .lock()
            .unwrap()
            .insert((topic, user), format!("wrapped-{}", user));
    }

    pub fn insert_participant(&self, topic: TopicId, user: UserId) {
        self.participants.lock().unwrap().insert((topic, user));
    }

    pub fn participants(&self, topic: TopicId) -> BTreeSet<UserId> {
        self.participants
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| *t == topic)
            .map(|(_, u)| *u)
            .collect()
    }

    pub fn keyholders(&self, topic: TopicId) -> BTreeSet<UserId> {
        self.keys
            .lock()
            .unwrap()
            .keys()
            .filter(|(t, _)| *t == topic)
            .map(|(_, u)| *u)
            .collect()
    }

    /// Make participant writes for `user` fail
    pub fn fail_writes_for(&self, user: UserId) {
        *self.failing_user.lock().unwrap() = Some(user);
    }

    /// Make key and participant reads for `topic` fail
    pub fn fail_reads_for(&self, topic: TopicId) {
        *self.failing_topic.lock().unwrap() = Some(topic);
    }

    fn check_readable(&self, topic: TopicId) -> Result<(), StoreError> {
        if *self.failing_topic.lock().unwrap() == Some(topic) {
            return Err(StoreError::Database("injected read failure".to_string()));
        }
        Ok(())
    }

    fn check_writable(&self, user: UserId) -> Result<(), StoreError> {
        if *self.failing_user.lock().unwrap() == Some(user) {
            return Err(StoreError::Database("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyStore for MemoryTopicStore {
    async fn set_key(
        &self,
        topic: TopicId,
        user: UserId,
        wrapped_key: &str,
    ) -> Result<(), StoreError> {
        self.keys.lock().unwrap().insert((topic, user), wrapped_key.to_string());
        Ok(())
    }

    async fn get_key(&self, topic: TopicId, user: UserId) -> Result<Option<String>, StoreError> {
        Ok(self.keys.lock().unwrap().get(&(topic, user)).cloned())
    }

    async fn delete_key(&self, topic: TopicId, user: UserId) -> Result<bool, StoreError> {
        Ok(self.keys.lock().unwrap().remove(&(topic, user)).is_some())
    }

    async fn keys_for_topic(&self, topic: TopicId) -> Result<BTreeSet<UserId>, StoreError> {
        self.check_readable(topic)?;
        Ok(self.keyholders(topic))
    }
}

#[async_trait]
impl ParticipantStore for MemoryTopicStore {
    async fn encrypted_topics(&self) -> Result<Vec<TopicId>, StoreError> {
        Ok(self
            .topics
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, encrypted)| **encrypted)
            .map(|(topic, _)| *topic)
            .collect())
    }

    async fn participants_of(&self, topic: TopicId) -> Result<BTreeSet<UserId>, StoreError> {
        self.check_readable(topic)?;
        Ok(self.participants(topic))
    }

    async fn add_participant(&self, topic: TopicId, user: UserId) -> Result<bool, StoreError> {
        self.check_writable(user)?;
        Ok(self.participants.lock().unwrap().insert((topic, user)))
    }

    async fn remove_participant(&self, topic: TopicId, user: UserId) -> Result<bool, StoreError> {
        self.check_writable(user)?;
        Ok(self.participants.lock().unwrap().remove(&(topic, user)))
    }
}
