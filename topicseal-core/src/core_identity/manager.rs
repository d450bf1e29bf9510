//! Identity manager
//!
//! Owns the current user's identity slot. The slot is an explicit three-state
//! machine; a load in progress is a shared future so concurrent callers all
//! await the same read of the local store.

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use zeroize::Zeroizing;

use super::codec::{self, ExportedIdentity};
use super::error::IdentityError;
use super::identity::Identity;
use super::keystore::{Keystore, KeystoreError, DB_VERSION, DB_VERSION_KEY, IDENTITY_KEY};
use super::remote::{KeyServer, KeySubmission};

type LoadFuture = Shared<BoxFuture<'static, Result<Option<Arc<Identity>>, IdentityError>>>;

enum IdentitySlot {
    Absent,
    Loading(LoadFuture),
    Present(Arc<Identity>),
}

/// Which recovery path produced an encrypted private key.
///
/// Activation tries candidates in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyLabel {
    PaperKey,
    Device,
    Passphrase,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledPrivateKey {
    pub label: KeyLabel,
    pub private: String,
}

/// Identity material the server holds for the current user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerKeyMaterial {
    pub public: String,
    pub private_keys: Vec<LabeledPrivateKey>,
}

impl ServerKeyMaterial {
    /// Candidate exports in activation order
    fn candidates(&self) -> Vec<(KeyLabel, ExportedIdentity)> {
        let mut candidates: Vec<_> = self
            .private_keys
            .iter()
            .map(|key| {
                (
                    key.label,
                    ExportedIdentity {
                        public: self.public.clone(),
                        private: key.private.clone(),
                    },
                )
            })
            .collect();
        candidates.sort_by_key(|(label, _)| *label);
        candidates
    }
}

fn storage_error(e: KeystoreError) -> IdentityError {
    IdentityError::Storage(e.to_string())
}

async fn blocking<T, F>(f: F) -> Result<T, IdentityError>
where
    F: FnOnce() -> Result<T, IdentityError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| IdentityError::Storage(format!("blocking task failed: {}", e)))?
}

fn load_from_store(keystore: Arc<dyn Keystore>) -> Result<Option<Arc<Identity>>, IdentityError> {
    let marker = keystore.load(DB_VERSION_KEY).map_err(storage_error)?;
    if marker.as_deref() != Some(DB_VERSION.as_bytes()) {
        tracing::debug!("No identity stored for the current layout");
        return Ok(None);
    }

    let Some(raw) = keystore.load(IDENTITY_KEY).map_err(storage_error)? else {
        return Ok(None);
    };
    let raw = Zeroizing::new(raw);
    let encoded = std::str::from_utf8(&raw)
        .map_err(|_| IdentityError::MalformedIdentity("stored identity is not UTF-8".to_string()))?;

    let identity = codec::decode(encoded)?;
    tracing::debug!(version = identity.version(), "Loaded identity from local store");
    Ok(Some(Arc::new(identity)))
}

/// Manages the identity of the current user
pub struct IdentityManager {
    keystore: Arc<dyn Keystore>,
    key_server: Arc<dyn KeyServer>,
    slot: Mutex<IdentitySlot>,
}

impl IdentityManager {
    pub fn new(keystore: Arc<dyn Keystore>, key_server: Arc<dyn KeyServer>) -> Self {
        IdentityManager {
            keystore,
            key_server,
            slot: Mutex::new(IdentitySlot::Absent),
        }
    }

    /// Current identity, loading it from the local store on first use.
    ///
    /// Concurrent callers during a load share that load. A load that finds
    /// nothing or fails leaves the slot absent so a later call retries.
    pub async fn get_identity(&self) -> Result<Option<Arc<Identity>>, IdentityError> {
        let load = {
            let mut slot = self.slot.lock().await;
            match &*slot {
                IdentitySlot::Present(identity) => return Ok(Some(identity.clone())),
                IdentitySlot::Loading(load) => load.clone(),
                IdentitySlot::Absent => {
                    let keystore = self.keystore.clone();
                    let load = blocking(move || load_from_store(keystore)).boxed().shared();
                    *slot = IdentitySlot::Loading(load.clone());
                    load
                }
            }
        };

        let result = load.clone().await;

        let mut slot = self.slot.lock().await;
        if let IdentitySlot::Loading(current) = &*slot {
            if current.ptr_eq(&load) {
                *slot = match &result {
                    Ok(Some(identity)) => IdentitySlot::Present(identity.clone()),
                    _ => IdentitySlot::Absent,
                };
            }
        }

        result
    }

    pub async fn has_identity(&self) -> Result<bool, IdentityError> {
        Ok(self.get_identity().await?.is_some())
    }

    /// Fresh key material for `version`. Does not touch the slot.
    pub fn generate_identity(&self, version: u32) -> Identity {
        Identity::generate(version)
    }

    /// Make `identity` the current one and persist it locally.
    ///
    /// The identity record is written before the layout marker, so an
    /// interrupted write leaves no loadable half state.
    pub async fn set_identity(&self, identity: Identity) -> Result<Arc<Identity>, IdentityError> {
        let identity = Arc::new(identity);

        let keystore = self.keystore.clone();
        let encoded = codec::encode(&identity);
        blocking(move || {
            keystore.save(IDENTITY_KEY, encoded.as_bytes()).map_err(storage_error)?;
            keystore.save(DB_VERSION_KEY, DB_VERSION.as_bytes()).map_err(storage_error)
        })
        .await?;

        *self.slot.lock().await = IdentitySlot::Present(identity.clone());
        tracing::info!(version = identity.version(), "Activated identity");
        Ok(identity)
    }

    /// Forget the local identity
    pub async fn reset(&self) -> Result<(), IdentityError> {
        let keystore = self.keystore.clone();
        blocking(move || {
            keystore.delete(DB_VERSION_KEY).map_err(storage_error)?;
            keystore.delete(IDENTITY_KEY).map_err(storage_error)
        })
        .await?;

        *self.slot.lock().await = IdentitySlot::Absent;
        tracing::info!("Removed local identity");
        Ok(())
    }

    /// Unlock the server-held identity with `passphrase` and make it current.
    ///
    /// Candidates are tried paper key first, then device, then passphrase;
    /// the first that decrypts wins. A legacy identity is upgraded, and the
    /// upgraded export overwrites the server copy before it is stored locally.
    pub async fn activate(
        &self,
        passphrase: &str,
        material: &ServerKeyMaterial,
    ) -> Result<Arc<Identity>, IdentityError> {
        let candidates = material.candidates();
        let passphrase = Zeroizing::new(passphrase.to_string());

        let (identity, passphrase) = blocking(move || {
            let identity = candidates
                .iter()
                .find_map(|(label, exported)| match codec::import_encrypted(exported, &passphrase) {
                    Ok(identity) => {
                        tracing::debug!(?label, "Decrypted activation candidate");
                        Some(identity)
                    }
                    Err(e) => {
                        tracing::debug!(?label, error = %e, "Activation candidate rejected");
                        None
                    }
                })
                .ok_or(IdentityError::ActivationFailed)?;
            Ok((identity, passphrase))
        })
        .await?;

        if !identity.is_legacy() {
            return self.set_identity(identity).await;
        }

        let upgraded = self.upgrade_identity(identity);
        let export_source = upgraded.clone();
        let exported =
            blocking(move || codec::export_encrypted(&export_source, &passphrase)).await?;

        self.key_server
            .submit_keys(KeySubmission::new(exported, true))
            .await
            .map_err(|e| IdentityError::KeyServer(e.to_string()))?;
        tracing::info!(version = upgraded.version(), "Upgraded legacy identity");

        self.set_identity(upgraded).await
    }

    /// Upgrade a legacy identity; current identities pass through unchanged
    pub fn upgrade_identity(&self, identity: Identity) -> Identity {
        identity.upgrade()
    }
}
