use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::core_cache::KeySource;
use crate::core_identity::{
    Identity, IdentityError, IdentityLookup, KeyServer, KeySubmission, Keystore, KeystoreError,
    MemoryKeystore, RemoteError, CURRENT_IDENTITY_VERSION,
};
use crate::crypto::{self, TopicKey};

/// Keystore that counts `load` calls per record name
pub struct CountingKeystore {
    inner: MemoryKeystore,
    loads: Mutex<HashMap<String, usize>>,
}

impl CountingKeystore {
    pub fn new(inner: MemoryKeystore) -> Self {
        Self {
            inner,
            loads: Mutex::new(HashMap::new()),
        }
    }

    pub fn loads(&self, name: &str) -> usize {
        self.loads.lock().unwrap().get(name).copied().unwrap_or(0)
    }
}

impl Keystore for CountingKeystore {
    fn load(&self, name: &str) -> Result<Option<Vec<u8>>, KeystoreError> {
        *self.loads.lock().unwrap().entry(name.to_string()).or_insert(0) += 1;
        self.inner.load(name)
    }

    fn save(&self, name: &str, data: &[u8]) -> Result<(), KeystoreError> {
        self.inner.save(name, data)
    }

    fn delete(&self, name: &str) -> Result<(), KeystoreError> {
        self.inner.delete(name)
    }
}

/// Key server recording every submission
#[derive(Default)]
pub struct MockKeyServer {
    submissions: Mutex<Vec<KeySubmission>>,
    failing: bool,
}

impl MockKeyServer {
    /// Key server rejecting every submission
    pub fn failing() -> Self {
        Self {
            submissions: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    pub fn submissions(&self) -> Vec<KeySubmission> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl KeyServer for MockKeyServer {
    async fn submit_keys(&self, submission: KeySubmission) -> Result<(), RemoteError> {
        if self.failing {
            return Err(RemoteError::Rejected {
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        self.submissions.lock().unwrap().push(submission);
        Ok(())
    }
}

/// Identity lookup over a fixed directory of encoded public identities
#[derive(Default)]
pub struct MockLookup {
    directory: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<HashSet<String>>>,
    failing: AtomicBool,
    latency: Mutex<Duration>,
}

impl MockLookup {
    pub fn insert(&self, username: &str, encoded: impl Into<String>) {
        self.directory
            .lock()
            .unwrap()
            .insert(username.to_string(), encoded.into());
    }

    /// Requested username sets, in call order
    pub fn calls(&self) -> Vec<HashSet<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delay every lookup by `latency`
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }
}

#[async_trait]
impl IdentityLookup for MockLookup {
    async fn fetch_identities(
        &self,
        usernames: &HashSet<String>,
    ) -> Result<HashMap<String, String>, RemoteError> {
        self.calls.lock().unwrap().push(usernames.clone());
        let latency = *self.latency.lock().unwrap();
        if latency.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(latency).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(RemoteError::Request("connection refused".to_string()));
        }
        if usernames.is_empty() {
            return Err(RemoteError::Rejected {
                status: 400,
                message: "usernames required".to_string(),
            });
        }

        let directory = self.directory.lock().unwrap();
        Ok(usernames
            .iter()
            .filter_map(|name| directory.get(name).map(|encoded| (name.clone(), encoded.clone())))
            .collect())
    }
}

/// Unwraps with its own identity and counts every attempt
pub struct CountingKeySource {
    identity: Identity,
    unwraps: AtomicUsize,
}

impl CountingKeySource {
    pub fn new() -> Self {
        Self {
            identity: Identity::generate(CURRENT_IDENTITY_VERSION),
            unwraps: AtomicUsize::new(0),
        }
    }

    /// Wrap `key` so this source can unwrap it
    pub fn wrap(&self, key: &TopicKey) -> String {
        crypto::wrap_key(self.identity.public_identity().encryption_key(), key).unwrap()
    }

    pub fn unwraps(&self) -> usize {
        self.unwraps.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeySource for CountingKeySource {
    async fn unwrap_topic_key(&self, wrapped: &str) -> Result<TopicKey, IdentityError> {
        self.unwraps.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        Ok(crypto::unwrap_key(self.identity.encryption().secret_key(), wrapped)?)
    }
}
