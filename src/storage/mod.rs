//! Fail-safe local key-value storage.
//!
//! [`LocalStore`] wraps a [`KeyValueBackend`] and never fails: any backend
//! error is logged and turned into `None`/`false`. With no backend at all
//! (sandboxed host, storage disabled) every call degrades to a no-op, and
//! sync keeps working in memory without durable pending flags.

mod file;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::error::StorageError;

pub use file::FileBackend;

/// Raw storage used by [`LocalStore`]. Implementations may fail freely.
pub trait KeyValueBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove(&self, key: &str) -> Result<(), StorageError>;

    fn clear(&self) -> Result<(), StorageError>;
}

/// Process-local backend.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().map_err(|_| StorageError::Unavailable)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Unavailable)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Unavailable)?;
        entries.remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Unavailable)?;
        entries.clear();
        Ok(())
    }
}

/// Key-value storage that never raises.
#[derive(Clone)]
pub struct LocalStore {
    backend: Option<Arc<dyn KeyValueBackend>>,
}

impl LocalStore {
    pub fn new(backend: Arc<dyn KeyValueBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// A store with no backend: reads return `None`, writes return `false`.
    pub fn unavailable() -> Self {
        Self { backend: None }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let backend = self.backend_or_log("get", key)?;
        match backend.get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "LocalStore: failed to get item");
                None
            }
        }
    }

    pub fn set(&self, key: &str, value: &str) -> bool {
        let Some(backend) = self.backend_or_log("set", key) else {
            return false;
        };
        match backend.set(key, value) {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "LocalStore: failed to set item");
                false
            }
        }
    }

    pub fn remove(&self, key: &str) -> bool {
        let Some(backend) = self.backend_or_log("remove", key) else {
            return false;
        };
        match backend.remove(key) {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "LocalStore: failed to remove item");
                false
            }
        }
    }

    pub fn clear(&self) -> bool {
        let Some(backend) = self.backend_or_log("clear", "*") else {
            return false;
        };
        match backend.clear() {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "LocalStore: failed to clear storage");
                false
            }
        }
    }

    fn backend_or_log(&self, operation: &str, key: &str) -> Option<&Arc<dyn KeyValueBackend>> {
        if self.backend.is_none() {
            warn!(operation, key, "LocalStore: storage unavailable");
        }
        self.backend.as_ref()
    }
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("available", &self.is_available())
            .finish()
    }
}

/// Storage key of the pending-changes flag for a user.
pub fn pending_sync_key(user_id: &str) -> String {
    format!("pending_sync_{}", user_id)
}

/// Value stored under [`pending_sync_key`] while changes are unconfirmed.
pub const PENDING_FLAG_VALUE: &str = "true";
