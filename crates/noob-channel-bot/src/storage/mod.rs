//! Key-value storage for the bot's persisted records.
//!
//! Trait-based abstraction over a durable store of named byte blobs. Every
//! blob travels in a [`VersionedObject`] envelope carrying a format version
//! and the wall-clock time it was captured. The trait is synchronous: writes
//! happen while the allocator holds its lock and must complete before the
//! new value counts as committed.

mod chaotic;
mod error;
mod memory;
mod redb;

pub use chaotic::ChaoticStorage;
pub use error::StorageError;
pub use memory::MemoryStorage;
use serde::{Deserialize, Serialize};

pub use self::redb::RedbStorage;

/// A stored value with its version and capture timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedObject {
    /// Record format version
    pub version: u64,
    /// Unix timestamp (seconds) when the value was captured
    pub timestamp_secs: u64,
    /// Record payload
    pub data: Vec<u8>,
}

impl VersionedObject {
    /// Wrap `data` with a version and timestamp.
    pub fn new(version: u64, timestamp_secs: u64, data: Vec<u8>) -> Self {
        Self { version, timestamp_secs, data }
    }
}

/// Durable get/set of named records.
///
/// Must be Clone (shared between the allocator and the bot runtime), Send +
/// Sync (event callbacks run on worker threads), and synchronous.
/// Implementations share internal state via Arc, so clones access the same
/// underlying storage.
pub trait Storage: Clone + Send + Sync + 'static {
    /// Load the record stored under `key`.
    ///
    /// Returns `None` if nothing was ever stored under `key`. A failed read is
    /// an error, never `None`.
    fn get(&self, key: &str) -> Result<Option<VersionedObject>, StorageError>;

    /// Store `object` under `key`, replacing any previous record.
    ///
    /// # Invariants
    ///
    /// - Post: on `Ok`, a later `get(key)` (also after a restart for durable
    ///   backends) returns `object`
    /// - Post: on `Err`, the previous record is unchanged
    fn set(&self, key: &str, object: &VersionedObject) -> Result<(), StorageError>;
}
