use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

const DISCONNECTED_FILE: &str = "wallet_disconnected";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Persistence for the single "user explicitly disconnected" flag.
pub trait FlagStore: Send + Sync {
    fn is_set(&self) -> Result<bool, StoreError>;
    fn set(&self) -> Result<(), StoreError>;
    fn clear(&self) -> Result<(), StoreError>;
}

/// Stores the flag as a marker file in the app data directory.
pub struct FileFlagStore {
    file_path: PathBuf,
}

impl FileFlagStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            file_path: data_dir.join(DISCONNECTED_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }
}

impl FlagStore for FileFlagStore {
    fn is_set(&self) -> Result<bool, StoreError> {
        Ok(self.file_path.exists())
    }

    fn set(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.file_path, "true")?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.file_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process flag, lost on restart.
#[derive(Debug, Default)]
pub struct MemoryFlagStore {
    flag: AtomicBool,
}

impl MemoryFlagStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FlagStore for MemoryFlagStore {
    fn is_set(&self) -> Result<bool, StoreError> {
        Ok(self.flag.load(Ordering::SeqCst))
    }

    fn set(&self) -> Result<(), StoreError> {
        self.flag.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.flag.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileFlagStore::new(&dir.path().join("nested"));

        assert!(!store.is_set().unwrap());
        store.set().unwrap();
        assert!(store.is_set().unwrap());
        assert!(store.path().exists());

        store.clear().unwrap();
        assert!(!store.is_set().unwrap());
        // clearing twice is fine
        store.clear().unwrap();
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        FileFlagStore::new(dir.path()).set().unwrap();

        let reopened = FileFlagStore::new(dir.path());
        assert!(reopened.is_set().unwrap());
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryFlagStore::new();
        assert!(!store.is_set().unwrap());
        store.set().unwrap();
        assert!(store.is_set().unwrap());
        store.clear().unwrap();
        assert!(!store.is_set().unwrap());
    }
}
