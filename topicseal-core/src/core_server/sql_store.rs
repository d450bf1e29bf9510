//! SQLite storage for topics, participant records and key records
//!
//! All queries run on the blocking pool; the async trait methods hand a
//! closure to [`SqlTopicStore::with_conn`].

use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::error::StoreError;
use super::migrations;
use super::traits::{AccessStore, KeyStore, ParticipantStore};
use crate::types::{TopicId, UserId};

/// Milliseconds since the unix epoch, 0 if the clock is before it
pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// A topic row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub id: TopicId,
    pub title: String,
    pub encrypted: bool,
}

fn ensure_topic(conn: &Connection, topic: TopicId) -> Result<(), StoreError> {
    let exists = conn
        .query_row("SELECT 1 FROM topics WHERE id = ?", params![topic.as_i64()], |_| Ok(()))
        .optional()?
        .is_some();
    if exists {
        Ok(())
    } else {
        Err(StoreError::UnknownTopic(topic))
    }
}

fn user_set(conn: &Connection, sql: &str, topic: TopicId) -> Result<BTreeSet<UserId>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let users = stmt
        .query_map(params![topic.as_i64()], |row| row.get::<_, i64>(0))?
        .map(|id| id.map(UserId))
        .collect::<Result<_, _>>()?;
    Ok(users)
}

fn upsert_key(
    conn: &Connection,
    topic: TopicId,
    user: UserId,
    wrapped_key: &str,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO topic_keys (topic_id, user_id, wrapped_key, updated_at) VALUES (?, ?, ?, ?)
         ON CONFLICT (topic_id, user_id) DO UPDATE
         SET wrapped_key = excluded.wrapped_key, updated_at = excluded.updated_at",
        params![topic.as_i64(), user.as_i64(), wrapped_key, now_millis()],
    )?;
    Ok(())
}

fn insert_participant(conn: &Connection, topic: TopicId, user: UserId) -> Result<bool, StoreError> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO topic_participants (topic_id, user_id, added_at) VALUES (?, ?, ?)",
        params![topic.as_i64(), user.as_i64(), now_millis()],
    )?;
    Ok(inserted > 0)
}

/// SQL-based storage for topics and their access records
#[derive(Clone)]
pub struct SqlTopicStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqlTopicStore {
    /// Create a new SQL store with the given connection pool
    pub fn new(pool: Pool<SqliteConnectionManager>) -> Result<Self, StoreError> {
        migrations::migrate(&pool)?;
        Ok(Self { pool })
    }

    /// Open (creating if needed) a database file
    pub fn open(path: impl AsRef<Path>, pool_size: u32) -> Result<Self, StoreError> {
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.busy_timeout(Duration::from_secs(5))?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")
        });
        let pool = Pool::builder().max_size(pool_size.max(1)).build(manager)?;
        Self::new(pool)
    }

    /// Create a new in-memory store.
    ///
    /// Every pooled in-memory connection is its own database, so the pool
    /// holds exactly one.
    pub fn memory() -> Result<Self, StoreError> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::builder().max_size(1).build(manager)?;
        Self::new(pool)
    }

    /// Run `f` with a pooled connection on the blocking thread pool
    pub async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    // ===== Topic Operations =====

    pub async fn create_topic(&self, title: &str, encrypted: bool) -> Result<TopicId, StoreError> {
        let title = title.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO topics (title, encrypted, created_at) VALUES (?, ?, ?)",
                params![title, encrypted, now_millis()],
            )?;
            Ok(TopicId(conn.last_insert_rowid()))
        })
        .await
    }

    pub async fn get_topic(&self, topic: TopicId) -> Result<Option<Topic>, StoreError> {
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT id, title, encrypted FROM topics WHERE id = ?",
                    params![topic.as_i64()],
                    |row| {
                        Ok(Topic {
                            id: TopicId(row.get(0)?),
                            title: row.get(1)?,
                            encrypted: row.get(2)?,
                        })
                    },
                )
                .optional()?)
        })
        .await
    }

    pub async fn set_encrypted(&self, topic: TopicId, encrypted: bool) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            let updated = conn.execute(
                "UPDATE topics SET encrypted = ? WHERE id = ?",
                params![encrypted, topic.as_i64()],
            )?;
            if updated == 0 {
                return Err(StoreError::UnknownTopic(topic));
            }
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl KeyStore for SqlTopicStore {
    async fn set_key(
        &self,
        topic: TopicId,
        user: UserId,
        wrapped_key: &str,
    ) -> Result<(), StoreError> {
        let wrapped_key = wrapped_key.to_string();
        self.with_conn(move |conn| {
            ensure_topic(conn, topic)?;
            upsert_key(conn, topic, user, &wrapped_key)
        })
        .await
    }

    async fn get_key(&self, topic: TopicId, user: UserId) -> Result<Option<String>, StoreError> {
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT wrapped_key FROM topic_keys WHERE topic_id = ? AND user_id = ?",
                    params![topic.as_i64(), user.as_i64()],
                    |row| row.get(0),
                )
                .optional()?)
        })
        .await
    }

    async fn delete_key(&self, topic: TopicId, user: UserId) -> Result<bool, StoreError> {
        self.with_conn(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM topic_keys WHERE topic_id = ? AND user_id = ?",
                params![topic.as_i64(), user.as_i64()],
            )?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn keys_for_topic(&self, topic: TopicId) -> Result<BTreeSet<UserId>, StoreError> {
        self.with_conn(move |conn| {
            user_set(conn, "SELECT user_id FROM topic_keys WHERE topic_id = ?", topic)
        })
        .await
    }
}

#[async_trait]
impl ParticipantStore for SqlTopicStore {
    async fn encrypted_topics(&self) -> Result<Vec<TopicId>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM topics WHERE encrypted = 1 ORDER BY id")?;
            let topics = stmt
                .query_map([], |row| row.get::<_, i64>(0))?
                .map(|id| id.map(TopicId))
                .collect::<Result<_, _>>()?;
            Ok(topics)
        })
        .await
    }

    async fn participants_of(&self, topic: TopicId) -> Result<BTreeSet<UserId>, StoreError> {
        self.with_conn(move |conn| {
            user_set(conn, "SELECT user_id FROM topic_participants WHERE topic_id = ?", topic)
        })
        .await
    }

    async fn add_participant(&self, topic: TopicId, user: UserId) -> Result<bool, StoreError> {
        self.with_conn(move |conn| {
            ensure_topic(conn, topic)?;
            insert_participant(conn, topic, user)
        })
        .await
    }

    async fn remove_participant(&self, topic: TopicId, user: UserId) -> Result<bool, StoreError> {
        self.with_conn(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM topic_participants WHERE topic_id = ? AND user_id = ?",
                params![topic.as_i64(), user.as_i64()],
            )?;
            Ok(deleted > 0)
        })
        .await
    }
}

#[async_trait]
impl AccessStore for SqlTopicStore {
    async fn grant_access(
        &self,
        topic: TopicId,
        user: UserId,
        wrapped_key: &str,
    ) -> Result<(), StoreError> {
        let wrapped_key = wrapped_key.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            ensure_topic(&tx, topic)?;
            upsert_key(&tx, topic, user, &wrapped_key)?;
            insert_participant(&tx, topic, user)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn revoke_access(&self, topic: TopicId, user: UserId) -> Result<bool, StoreError> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let keys = tx.execute(
                "DELETE FROM topic_keys WHERE topic_id = ? AND user_id = ?",
                params![topic.as_i64(), user.as_i64()],
            )?;
            let participants = tx.execute(
                "DELETE FROM topic_participants WHERE topic_id = ? AND user_id = ?",
                params![topic.as_i64(), user.as_i64()],
            )?;
            tx.commit()?;
            Ok(keys + participants > 0)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users(ids: &[i64]) -> BTreeSet<UserId> {
        ids.iter().copied().map(UserId).collect()
    }

    #[tokio::test]
    async fn test_create_and_get_topic() {
        let store = SqlTopicStore::memory().unwrap();
        let topic = store.create_topic("Launch plans", true).await.unwrap();

        let row = store.get_topic(topic).await.unwrap().unwrap();
        assert_eq!(row.title, "Launch plans");
        assert!(row.encrypted);
        assert_eq!(store.get_topic(TopicId(999)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_encrypted_topics_only() {
        let store = SqlTopicStore::memory().unwrap();
        let secret = store.create_topic("secret", true).await.unwrap();
        let public = store.create_topic("public", false).await.unwrap();

        assert_eq!(store.encrypted_topics().await.unwrap(), vec![secret]);

        store.set_encrypted(public, true).await.unwrap();
        assert_eq!(store.encrypted_topics().await.unwrap(), vec![secret, public]);
        assert_eq!(
            store.set_encrypted(TopicId(999), true).await,
            Err(StoreError::UnknownTopic(TopicId(999)))
        );
    }

    #[tokio::test]
    async fn test_key_records() {
        let store = SqlTopicStore::memory().unwrap();
        let topic = store.create_topic("t", true).await.unwrap();

        store.set_key(topic, UserId(1), "k1").await.unwrap();
        store.set_key(topic, UserId(2), "k2").await.unwrap();
        store.set_key(topic, UserId(1), "k1-rotated").await.unwrap();

        assert_eq!(store.get_key(topic, UserId(1)).await.unwrap().as_deref(), Some("k1-rotated"));
        assert_eq!(store.keys_for_topic(topic).await.unwrap(), users(&[1, 2]));

        assert!(store.delete_key(topic, UserId(1)).await.unwrap());
        assert!(!store.delete_key(topic, UserId(1)).await.unwrap());
        assert_eq!(store.get_key(topic, UserId(1)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_key_for_unknown_topic() {
        let store = SqlTopicStore::memory().unwrap();
        assert_eq!(
            store.set_key(TopicId(7), UserId(1), "k").await,
            Err(StoreError::UnknownTopic(TopicId(7)))
        );
    }

    #[tokio::test]
    async fn test_participant_records() {
        let store = SqlTopicStore::memory().unwrap();
        let topic = store.create_topic("t", true).await.unwrap();

        assert!(store.add_participant(topic, UserId(3)).await.unwrap());
        assert!(!store.add_participant(topic, UserId(3)).await.unwrap());
        assert_eq!(store.participants_of(topic).await.unwrap(), users(&[3]));

        assert!(store.remove_participant(topic, UserId(3)).await.unwrap());
        assert!(store.participants_of(topic).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_grant_and_revoke_access() {
        let store = SqlTopicStore::memory().unwrap();
        let topic = store.create_topic("t", true).await.unwrap();

        store.grant_access(topic, UserId(5), "wrapped").await.unwrap();
        assert_eq!(store.keys_for_topic(topic).await.unwrap(), users(&[5]));
        assert_eq!(store.participants_of(topic).await.unwrap(), users(&[5]));

        assert!(store.revoke_access(topic, UserId(5)).await.unwrap());
        assert!(store.keys_for_topic(topic).await.unwrap().is_empty());
        assert!(store.participants_of(topic).await.unwrap().is_empty());
        assert!(!store.revoke_access(topic, UserId(5)).await.unwrap());
    }

    #[tokio::test]
    async fn test_grant_on_unknown_topic_writes_nothing() {
        let store = SqlTopicStore::memory().unwrap();

        assert_eq!(
            store.grant_access(TopicId(42), UserId(1), "wrapped").await,
            Err(StoreError::UnknownTopic(TopicId(42)))
        );
        assert!(store.keys_for_topic(TopicId(42)).await.unwrap().is_empty());
        assert!(store.participants_of(TopicId(42)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topics.db");

        let topic = {
            let store = SqlTopicStore::open(&path, 2).unwrap();
            let topic = store.create_topic("t", true).await.unwrap();
            store.grant_access(topic, UserId(1), "wrapped").await.unwrap();
            topic
        };

        let reopened = SqlTopicStore::open(&path, 2).unwrap();
        assert_eq!(reopened.get_key(topic, UserId(1)).await.unwrap().as_deref(), Some("wrapped"));
    }
}
