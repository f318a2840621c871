//! Rotation state and its persisted records.
//!
//! Three records make up the state: the number of channels ever generated
//! (`channelCount`), the number of admitted joins (`inCurrentChannel`) and the
//! channel currently handed out (`currentChannel`). Each is written on its own,
//! tagged with version 0 and the capture time, and each is independently
//! optional on load.

use noob_channel_crypto::{ChannelDefinition, ManagerIdentity};
use zeroize::Zeroize;

use crate::{
    env::Environment,
    error::AllocatorError,
    storage::{Storage, StorageError, VersionedObject},
};

/// Key of the manager identity record
pub const MANAGER_IDENTITY_KEY: &str = "managerIdentity";
/// Key of the channel sequence record
pub const CHANNEL_COUNT_KEY: &str = "channelCount";
/// Key of the occupancy record
pub const IN_CURRENT_CHANNEL_KEY: &str = "inCurrentChannel";
/// Key of the current channel record
pub const CURRENT_CHANNEL_KEY: &str = "currentChannel";

/// Version tag on every record this bot writes
pub const RECORD_VERSION: u64 = 0;

/// In-memory rotation state.
///
/// # Invariants
///
/// - `channel_sequence` and `occupancy` only decrease through rollback of a
///   failed step, and then back to exactly their previous value
/// - A field only changes after the matching record has been written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationState {
    /// Channels ever generated
    pub channel_sequence: u64,
    /// Joins admitted so far
    pub occupancy: u64,
    /// Channel handed to new joiners
    pub current_channel: ChannelDefinition,
}

/// Records as found in storage, before any missing channel is generated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRotation {
    /// `channelCount`, 0 when absent
    pub channel_sequence: u64,
    /// `inCurrentChannel`, 0 when absent
    pub occupancy: u64,
    /// `currentChannel`, `None` when absent
    pub current_channel: Option<ChannelDefinition>,
}

impl StoredRotation {
    /// Read all rotation records.
    ///
    /// A missing record takes its default. A record that is present but
    /// cannot be decoded is an error: the bot must not start on top of state
    /// it does not understand.
    pub fn load(store: &impl Storage) -> Result<Self, AllocatorError> {
        let channel_sequence = load_counter(store, CHANNEL_COUNT_KEY)?.unwrap_or(0);
        let occupancy = load_counter(store, IN_CURRENT_CHANNEL_KEY)?.unwrap_or(0);

        let current_channel = match store
            .get(CURRENT_CHANNEL_KEY)
            .map_err(|source| AllocatorError::Load { record: CURRENT_CHANNEL_KEY, source })?
        {
            Some(object) => Some(ChannelDefinition::from_bytes(&object.data)?),
            None => None,
        };

        Ok(Self { channel_sequence, occupancy, current_channel })
    }
}

/// Persist the occupancy counter.
pub fn persist_occupancy(
    store: &impl Storage,
    env: &impl Environment,
    occupancy: u64,
) -> Result<(), StorageError> {
    store_record(store, env, IN_CURRENT_CHANNEL_KEY, occupancy.to_be_bytes().to_vec())
}

/// Persist the channel sequence number.
pub fn persist_sequence(
    store: &impl Storage,
    env: &impl Environment,
    sequence: u64,
) -> Result<(), StorageError> {
    store_record(store, env, CHANNEL_COUNT_KEY, sequence.to_be_bytes().to_vec())
}

/// Persist the channel definition handed to new joiners.
pub fn persist_channel(
    store: &impl Storage,
    env: &impl Environment,
    channel: &ChannelDefinition,
) -> Result<(), StorageError> {
    let bytes = channel.to_bytes().map_err(|e| StorageError::Serialization(e.to_string()))?;
    store_record(store, env, CURRENT_CHANNEL_KEY, bytes)
}

/// Write one record with the current version and timestamp.
pub fn store_record(
    store: &impl Storage,
    env: &impl Environment,
    key: &str,
    data: Vec<u8>,
) -> Result<(), StorageError> {
    store.set(key, &VersionedObject::new(RECORD_VERSION, env.wall_clock_secs(), data))
}

/// Load the bot's identity, generating and storing one on first start.
pub fn load_or_generate_identity(
    store: &impl Storage,
    env: &impl Environment,
) -> Result<ManagerIdentity, AllocatorError> {
    let stored = store
        .get(MANAGER_IDENTITY_KEY)
        .map_err(|source| AllocatorError::Load { record: MANAGER_IDENTITY_KEY, source })?;

    if let Some(mut object) = stored {
        let identity = ManagerIdentity::from_bytes(&object.data);
        object.data.zeroize();
        return Ok(identity?);
    }

    let identity = ManagerIdentity::generate(&mut env.entropy_stream());
    let mut object =
        VersionedObject::new(RECORD_VERSION, env.wall_clock_secs(), identity.to_bytes().to_vec());
    let stored = store.set(MANAGER_IDENTITY_KEY, &object);
    object.data.zeroize();
    stored.map_err(|source| AllocatorError::Persist { record: MANAGER_IDENTITY_KEY, source })?;
    tracing::info!("Generated manager identity {}", hex::encode(identity.public_key()));

    Ok(identity)
}

fn load_counter(store: &impl Storage, key: &'static str) -> Result<Option<u64>, AllocatorError> {
    let Some(object) =
        store.get(key).map_err(|source| AllocatorError::Load { record: key, source })?
    else {
        return Ok(None);
    };

    let bytes: [u8; 8] = object.data.as_slice().try_into().map_err(|_| {
        AllocatorError::Load {
            record: key,
            source: StorageError::Serialization(format!(
                "counter is {} bytes, expected 8",
                object.data.len()
            )),
        }
    })?;

    Ok(Some(u64::from_be_bytes(bytes)))
}
