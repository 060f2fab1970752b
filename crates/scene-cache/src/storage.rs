use crate::StorageError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Durable key-value store
pub trait StoragePort: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
    fn save(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;
}

/// One file per key under a root directory
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{name}.json"))
    }

    fn io_error(key: &str, source: std::io::Error) -> StorageError {
        StorageError::Io {
            key: key.to_string(),
            source,
        }
    }
}

impl StoragePort for FileStorage {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Self::io_error(key, err)),
        }
    }

    /// Temp file in the same directory, then rename over the target.
    fn save(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root).map_err(|e| Self::io_error(key, e))?;
        let mut tmp =
            tempfile::NamedTempFile::new_in(&self.root).map_err(|e| Self::io_error(key, e))?;
        tmp.write_all(bytes).map_err(|e| Self::io_error(key, e))?;
        tmp.as_file().sync_all().map_err(|e| Self::io_error(key, e))?;
        tmp.persist(self.path_for(key))
            .map_err(|e| Self::io_error(key, e.error))?;
        Ok(())
    }
}

/// In-process store; can be told to fail saves.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    fail_saves: Mutex<bool>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob(key: &str, bytes: impl Into<Vec<u8>>) -> Self {
        let storage = Self::default();
        storage.blobs.lock().insert(key.to_string(), bytes.into());
        storage
    }

    pub fn set_fail_saves(&self, fail: bool) {
        *self.fail_saves.lock() = fail;
    }

    pub fn blob(&self, key: &str) -> Option<Vec<u8>> {
        self.blobs.lock().get(key).cloned()
    }
}

impl StoragePort for MemoryStorage {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.blob(key))
    }

    fn save(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        if *self.fail_saves.lock() {
            return Err(StorageError::Unavailable(format!("save of {key} refused")));
        }
        self.blobs.lock().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}
