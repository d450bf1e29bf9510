//! Database migrations for topics, participants and key records
//!
//! Each migration is applied atomically and tracked in the schema_version
//! table. Participant and key records live in independent tables:
//! either may exist without the other, which is what the reconciler repairs.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};

use super::error::StoreError;
use super::sql_store::now_millis;

/// Migration descriptor
pub struct Migration {
    pub version: i32,
    pub description: &'static str,
    pub up_sql: &'static str,
}

/// All available migrations in order
pub fn get_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial topics, participants and keys schema",
            up_sql: r#"
                CREATE TABLE IF NOT EXISTS topics (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    encrypted INTEGER NOT NULL DEFAULT 0,
                    created_at INTEGER NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_topics_encrypted
                    ON topics(encrypted) WHERE encrypted = 1;

                -- Allowed participants, maintained by the messaging system
                CREATE TABLE IF NOT EXISTS topic_participants (
                    topic_id INTEGER NOT NULL,
                    user_id INTEGER NOT NULL,
                    added_at INTEGER NOT NULL,
                    PRIMARY KEY (topic_id, user_id),
                    FOREIGN KEY (topic_id) REFERENCES topics(id) ON DELETE CASCADE
                );

                CREATE INDEX IF NOT EXISTS idx_topic_participants_user
                    ON topic_participants(user_id);
            "#,
        },
        Migration {
            version: 2,
            description: "Per-participant wrapped topic keys",
            up_sql: r#"
                CREATE TABLE IF NOT EXISTS topic_keys (
                    topic_id INTEGER NOT NULL,
                    user_id INTEGER NOT NULL,
                    wrapped_key TEXT NOT NULL,
                    updated_at INTEGER NOT NULL,
                    PRIMARY KEY (topic_id, user_id),
                    FOREIGN KEY (topic_id) REFERENCES topics(id) ON DELETE CASCADE
                );

                CREATE INDEX IF NOT EXISTS idx_topic_keys_user ON topic_keys(user_id);
            "#,
        },
    ]
}

fn get_current_version(pool: &Pool<SqliteConnectionManager>) -> Result<i32, StoreError> {
    let conn = pool.get()?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let version: Option<i32> = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
        .optional()?
        .flatten();

    Ok(version.unwrap_or(0))
}

/// Run all pending migrations
pub fn migrate(pool: &Pool<SqliteConnectionManager>) -> Result<(), StoreError> {
    let current_version = get_current_version(pool)?;
    let latest_version = get_latest_version();
    if current_version > latest_version {
        tracing::warn!(current_version, latest_version, "Database schema is newer than this build");
    }

    let pending: Vec<_> = get_migrations()
        .into_iter()
        .filter(|m| m.version > current_version)
        .collect();
    if pending.is_empty() {
        return Ok(());
    }

    let conn = pool.get()?;
    for migration in pending {
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration.up_sql)?;
        tx.execute(
            "INSERT INTO schema_version (version, applied_at) VALUES (?, ?)",
            params![migration.version, now_millis()],
        )?;
        tx.commit()?;

        tracing::info!(
            version = migration.version,
            description = migration.description,
            "Applied migration"
        );
    }

    Ok(())
}

/// Get the latest migration version available
pub fn get_latest_version() -> i32 {
    get_migrations().iter().map(|m| m.version).max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_test_pool() -> Pool<SqliteConnectionManager> {
        Pool::builder()
            .max_size(1)
            .build(SqliteConnectionManager::memory())
            .expect("Failed to create pool")
    }

    #[test]
    fn test_initial_migration() {
        let pool = setup_test_pool();
        migrate(&pool).expect("Migration failed");

        let conn = pool.get().unwrap();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        for table in ["topics", "topic_participants", "topic_keys", "schema_version"] {
            assert!(tables.contains(&table.to_string()), "missing {}", table);
        }
    }

    #[test]
    fn test_migration_is_idempotent() {
        let pool = setup_test_pool();
        migrate(&pool).unwrap();
        migrate(&pool).unwrap();

        assert_eq!(get_current_version(&pool).unwrap(), get_latest_version());

        let conn = pool.get().unwrap();
        let applied: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(applied, get_migrations().len() as i64);
    }
}
