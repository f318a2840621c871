#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use super::{Storage, StorageError, VersionedObject};

/// In-memory storage implementation for testing and simulation
///
/// All records live in a `HashMap` behind Arc<Mutex<>> so clones share state,
/// which lets a test "restart" the bot by opening a new allocator over a clone
/// of the same storage.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<HashMap<String, VersionedObject>>>,
}

impl MemoryStorage {
    /// Create a new empty `MemoryStorage`
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.inner.lock().map(|records| records.len()).unwrap_or(0)
    }

    /// Whether no record has been stored yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<VersionedObject>, StorageError> {
        let records =
            self.inner.lock().map_err(|_| StorageError::Io("memory storage poisoned".to_string()))?;
        Ok(records.get(key).cloned())
    }

    fn set(&self, key: &str, object: &VersionedObject) -> Result<(), StorageError> {
        let mut records =
            self.inner.lock().map_err(|_| StorageError::Io("memory storage poisoned".to_string()))?;
        records.insert(key.to_string(), object.clone());
        Ok(())
    }
}
