//! In-memory keystore for testing

use super::{Keystore, KeystoreError};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Helper to convert poison errors into KeystoreError
fn handle_poison<T>(_err: PoisonError<T>) -> KeystoreError {
    KeystoreError::Other("Lock poisoned: a thread panicked while holding the lock".to_string())
}

/// In-memory keystore (non-persistent, for tests)
#[derive(Clone, Default)]
pub struct MemoryKeystore {
    records: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryKeystore {
    /// Create a new memory keystore
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Keystore for MemoryKeystore {
    fn load(&self, name: &str) -> Result<Option<Vec<u8>>, KeystoreError> {
        Ok(self.records.read().map_err(handle_poison)?.get(name).cloned())
    }

    fn save(&self, name: &str, value: &[u8]) -> Result<(), KeystoreError> {
        self.records
            .write()
            .map_err(handle_poison)?
            .insert(name.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<(), KeystoreError> {
        self.records.write().map_err(handle_poison)?.remove(name);
        Ok(())
    }
}
