//! File-based keystore
//!
//! One file per record under the base directory:
//! ```text
//! [Magic: 8 bytes "TSKS0001"]
//! [Version: 1 byte]
//! [Payload: variable]
//! ```

use super::{Keystore, KeystoreError};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Magic header for keystore record files
const MAGIC_HEADER: &[u8; 8] = b"TSKS0001";

/// Current record format version
const FORMAT_VERSION: u8 = 1;

const HEADER_SIZE: usize = MAGIC_HEADER.len() + 1;

/// File-based keystore
pub struct FileKeystore {
    /// Directory where records are stored
    base_path: PathBuf,
}

impl FileKeystore {
    /// Create a new file keystore at the given path
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self, KeystoreError> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)?;

        Ok(FileKeystore { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn record_path(&self, name: &str) -> Result<PathBuf, KeystoreError> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(KeystoreError::InvalidName(name.to_string()));
        }
        Ok(self.base_path.join(format!("{}.rec", name)))
    }

    /// Write file atomically (write to temp, then rename)
    fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<(), KeystoreError> {
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, data)?;
        fs::rename(temp_path, path)?;
        Ok(())
    }
}

impl Keystore for FileKeystore {
    fn load(&self, name: &str) -> Result<Option<Vec<u8>>, KeystoreError> {
        let path = self.record_path(name)?;
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let corrupted = |reason: &str| KeystoreError::Corrupted {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        if data.len() < HEADER_SIZE {
            return Err(corrupted("file too short"));
        }
        if &data[..MAGIC_HEADER.len()] != MAGIC_HEADER {
            return Err(corrupted("invalid magic header"));
        }
        if data[MAGIC_HEADER.len()] != FORMAT_VERSION {
            return Err(corrupted("unsupported format version"));
        }

        Ok(Some(data[HEADER_SIZE..].to_vec()))
    }

    fn save(&self, name: &str, value: &[u8]) -> Result<(), KeystoreError> {
        let path = self.record_path(name)?;

        let mut data = Vec::with_capacity(HEADER_SIZE + value.len());
        data.extend_from_slice(MAGIC_HEADER);
        data.push(FORMAT_VERSION);
        data.extend_from_slice(value);

        self.write_atomic(&path, &data)
    }

    fn delete(&self, name: &str) -> Result<(), KeystoreError> {
        match fs::remove_file(self.record_path(name)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
