//! Redb-backed durable storage implementation.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety. A write
//! either commits completely or leaves the previous record in place, so the
//! allocator's rollback protocol never has to repair a half-written record.

use std::{path::Path, sync::Arc};

use redb::{Database, TableDefinition};

use super::{Storage, StorageError, VersionedObject};

/// Table: objects
/// Key: record name (UTF-8)
/// Value: CBOR-encoded VersionedObject
const OBJECTS: TableDefinition<&str, &[u8]> = TableDefinition::new("objects");

/// Durable storage backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStorage {
    db: Arc<Database>,
}

impl RedbStorage {
    /// Open or create a Redb database at the given path.
    ///
    /// Creates the OBJECTS table if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(|e| StorageError::Io(e.to_string()))?;

        let txn = db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let _ = txn.open_table(OBJECTS).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl Storage for RedbStorage {
    fn get(&self, key: &str) -> Result<Option<VersionedObject>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(OBJECTS).map_err(|e| StorageError::Io(e.to_string()))?;

        match table.get(key).map_err(|e| StorageError::Io(e.to_string()))? {
            Some(value) => {
                let object: VersionedObject = ciborium::from_reader(value.value())
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                Ok(Some(object))
            },
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, object: &VersionedObject) -> Result<(), StorageError> {
        let mut bytes = Vec::with_capacity(object.data.len() + 32);
        ciborium::into_writer(object, &mut bytes)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let mut table = txn.open_table(OBJECTS).map_err(|e| StorageError::Io(e.to_string()))?;
            table.insert(key, bytes.as_slice()).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn missing_key_is_none() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path().join("test.redb")).unwrap();

        assert_eq!(storage.get("currentChannel").unwrap(), None);
    }

    #[test]
    fn object_roundtrip() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path().join("test.redb")).unwrap();

        let object = VersionedObject::new(0, 1_700_000_000, b"channel bytes".to_vec());
        storage.set("currentChannel", &object).unwrap();

        assert_eq!(storage.get("currentChannel").unwrap(), Some(object));
    }

    #[test]
    fn set_overwrites() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path().join("test.redb")).unwrap();

        let count = |n: u64, at: u64| VersionedObject::new(0, at, n.to_be_bytes().to_vec());
        storage.set("channelCount", &count(1, 1)).unwrap();
        storage.set("channelCount", &count(2, 2)).unwrap();

        let loaded = storage.get("channelCount").unwrap().unwrap();
        assert_eq!(loaded.data, 2u64.to_be_bytes().to_vec());
        assert_eq!(loaded.timestamp_secs, 2);
    }

    #[test]
    fn keys_are_independent() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path().join("test.redb")).unwrap();

        storage.set("channelCount", &VersionedObject::new(0, 1, vec![1])).unwrap();
        storage.set("inCurrentChannel", &VersionedObject::new(0, 1, vec![2])).unwrap();

        assert_eq!(storage.get("channelCount").unwrap().unwrap().data, vec![1]);
        assert_eq!(storage.get("inCurrentChannel").unwrap().unwrap().data, vec![2]);
        assert_eq!(storage.get("managerIdentity").unwrap(), None);
    }
}
