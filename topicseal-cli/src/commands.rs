//! Command handlers
//!
//! Each handler takes already-resolved inputs so it can be driven from tests
//! without going through argument parsing or the environment.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use topicseal_core::config::{Config, ReconcilerConfig};
use topicseal_core::core_identity::{
    decode_public, export_encrypted, ExportedIdentity, Identity, CURRENT_IDENTITY_VERSION,
};
use topicseal_core::core_server::{
    AccessService, InviteRequest, ReconcileSummary, Reconciler, SqlTopicStore,
};
use topicseal_core::shutdown::{install_signal_handlers, ShutdownCoordinator};
use topicseal_core::{TopicId, UserId};

/// Environment variable holding the export passphrase
pub const PASSPHRASE_VAR: &str = "TOPICSEAL_PASSPHRASE";

/// What `identity inspect` reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentitySummary {
    pub version: u32,
    pub public: String,
}

/// Expand `~` and environment variables in a user-supplied path
pub fn expand_path(path: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(path).with_context(|| format!("Cannot expand path {}", path))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

/// Open the topic database, falling back to the configured path
pub fn open_store(db: Option<&str>, config: &Config) -> Result<SqlTopicStore> {
    let path = match db {
        Some(db) => expand_path(db)?,
        None => config.store.database_path.clone(),
    };
    SqlTopicStore::open(&path, config.store.pool_size)
        .with_context(|| format!("Failed to open database {}", path.display()))
}

pub fn generate_identity(out: &Path, version: u32, passphrase: &str) -> Result<IdentitySummary> {
    if version > CURRENT_IDENTITY_VERSION {
        bail!("Unsupported identity version {}", version);
    }
    if passphrase.is_empty() {
        bail!("{} must not be empty", PASSPHRASE_VAR);
    }

    let identity = Identity::generate(version);
    let exported = export_encrypted(&identity, passphrase)?;
    let json = serde_json::to_string_pretty(&exported)?;
    std::fs::write(out, json).with_context(|| format!("Failed to write {}", out.display()))?;

    info!(version, path = %out.display(), "Generated identity");
    Ok(IdentitySummary {
        version,
        public: exported.public,
    })
}

pub fn inspect_identity(path: &Path) -> Result<IdentitySummary> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let exported: ExportedIdentity =
        serde_json::from_str(&contents).context("Not an identity export")?;
    let public = decode_public(&exported.public)?;

    Ok(IdentitySummary {
        version: public.version(),
        public: exported.public,
    })
}

pub async fn create_topic(store: &SqlTopicStore, title: &str, encrypted: bool) -> Result<TopicId> {
    let topic = store.create_topic(title, encrypted).await?;
    info!(topic = %topic, encrypted, "Created topic");
    Ok(topic)
}

pub async fn grant(
    store: Arc<SqlTopicStore>,
    topic: TopicId,
    user: UserId,
    key: String,
) -> Result<()> {
    AccessService::new(store)
        .invite(InviteRequest {
            topic,
            user,
            wrapped_key: Some(key),
        })
        .await?;
    Ok(())
}

pub async fn revoke(store: Arc<SqlTopicStore>, topic: TopicId, user: UserId) -> Result<bool> {
    Ok(AccessService::new(store).remove(topic, user).await?)
}

pub async fn reconcile_once(
    store: Arc<SqlTopicStore>,
    config: &ReconcilerConfig,
) -> ReconcileSummary {
    Reconciler::new(store.clone(), store, config.concurrency).pass().await
}

/// Reconcile every `config.interval` until Ctrl-C or SIGTERM
pub async fn reconcile_watch(store: Arc<SqlTopicStore>, config: &ReconcilerConfig) -> Result<()> {
    let shutdown = Arc::new(ShutdownCoordinator::new(config.shutdown_grace));
    install_signal_handlers(shutdown.clone());

    let reconciler = Arc::new(Reconciler::new(store.clone(), store, config.concurrency));
    info!(interval = ?config.interval, "Starting periodic reconciliation");
    reconciler.spawn_periodic(config.interval, shutdown).await?;
    Ok(())
}
