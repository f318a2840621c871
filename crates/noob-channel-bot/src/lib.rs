//! Noob channel bot.
//!
//! Hands every joiner the definition of a capacity-bounded broadcast channel
//! and rotates to a freshly generated channel once the current one is full.
//! Each generated channel's admin key is written to the admin vault.
//!
//! # Architecture
//!
//! ```text
//! join event ──▶ Dispatcher ──▶ ChannelAllocator ──▶ Storage (counters, channel)
//!                    ▲                  │
//!                    │                  └─▶ AdminVault (per-channel credentials)
//!                    └── serialized channel definition
//! ```
//!
//! # Components
//!
//! - [`ChannelAllocator`]: admission and rotation under one lock, with
//!   rollback on failed writes
//! - [`RotationPolicy`]: when to rotate and how occupancy carries over
//! - [`AdminVault`]: atomic per-channel credential directories
//! - [`Dispatcher`]: listener, relationship and single-use handler roles
//! - [`QuinnTransport`]: QUIC ingress for single-use requests
//! - [`Bot`]: production wiring (redb storage, system entropy, QUIC)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod allocator;
pub mod config;
pub mod dispatch;
pub mod env;
mod error;
pub mod policy;
pub mod rotation;
pub mod storage;
mod system_env;
pub mod transport;
pub mod vault;

use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};

pub use allocator::{AllocatorConfig, ChannelAllocator};
pub use config::{BotConfig, ChannelConfig};
pub use dispatch::{Dispatcher, NoE2eClient};
pub use env::{Environment, SeededEnv};
pub use error::{AllocatorError, BotError, ConfigError, TransportError};
use noob_channel_crypto::ManagerIdentity;
pub use policy::{NeverReset, ResetOnRotate, RotationPolicy};
pub use rotation::{RotationState, StoredRotation};
use serde::Serialize;
pub use storage::{ChaoticStorage, MemoryStorage, RedbStorage, Storage, StorageError};
pub use system_env::SystemEnv;
pub use transport::QuinnTransport;
pub use vault::{AdminVault, VaultError};

/// Contact file contents: how joiners reach this bot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BotContact {
    /// Listener name
    pub name: String,
    /// Manager identity public key (hex)
    pub identity: String,
    /// QUIC address serving single-use requests
    pub address: SocketAddr,
}

/// Production bot: redb storage, system entropy, QUIC ingress.
pub struct Bot {
    config: BotConfig,
    identity: ManagerIdentity,
    allocator: Arc<ChannelAllocator<SystemEnv, RedbStorage>>,
    transport: QuinnTransport,
}

impl Bot {
    /// Open storage, load or create rotation state, bind the transport and
    /// write the contact file.
    ///
    /// Any failure here is fatal: the bot does not start on state it cannot
    /// read or with credentials it cannot store.
    pub async fn open(config: BotConfig) -> Result<Self, BotError> {
        config.validate()?;

        let env = SystemEnv::new();
        create_parent(&config.storage_path)?;
        let store = RedbStorage::open(&config.storage_path)?;
        let vault = AdminVault::open(&config.admin_keys)?;

        let identity = rotation::load_or_generate_identity(&store, &env)?;
        let allocator = ChannelAllocator::open(
            store,
            env,
            vault,
            config.allocator_config(),
            config.rotation_policy(),
        )?;

        let transport = QuinnTransport::bind(
            &config.bind,
            config.cert_path.as_deref(),
            config.key_path.as_deref(),
        )?
        .with_read_timeout(config.response_timeout);

        let bot = Self { config, identity, allocator: Arc::new(allocator), transport };
        bot.write_contact()?;
        Ok(bot)
    }

    /// Address the transport is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, BotError> {
        Ok(self.transport.local_addr()?)
    }

    /// Shared allocator.
    pub fn allocator(&self) -> &Arc<ChannelAllocator<SystemEnv, RedbStorage>> {
        &self.allocator
    }

    /// Contact published to joiners.
    pub fn contact(&self) -> Result<BotContact, BotError> {
        Ok(BotContact {
            name: dispatch::LISTENER_NAME.to_string(),
            identity: hex::encode(self.identity.public_key()),
            address: self.local_addr()?,
        })
    }

    /// Serve join requests until interrupted.
    pub async fn run(self) -> Result<(), BotError> {
        let dispatcher = Dispatcher::new(Arc::clone(&self.allocator), NoE2eClient)
            .with_response_timeout(self.config.response_timeout);

        tracing::info!("Serving join requests on {}", self.local_addr()?);

        tokio::select! {
            result = self.transport.serve(Arc::new(dispatcher)) => result?,
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    tracing::error!("Failed to listen for shutdown signal: {}", e);
                }
                tracing::info!("Shutting down");
            }
        }

        self.transport.close();
        Ok(())
    }

    fn write_contact(&self) -> Result<(), BotError> {
        let path = &self.config.contact_output;
        let contact = self.contact()?;
        let json = serde_json::to_vec_pretty(&contact).map_err(|e| BotError::Contact {
            path: path.clone(),
            source: std::io::Error::other(e),
        })?;

        create_parent(path)?;
        std::fs::write(path, json)
            .map_err(|source| BotError::Contact { path: path.clone(), source })?;

        tracing::info!("Wrote contact to {}", path.display());
        Ok(())
    }
}

/// Read the persisted rotation state without starting the bot.
///
/// Returns `None` if the bot has never run against this storage path. The
/// database is locked while the bot runs.
pub fn read_status(config: &BotConfig) -> Result<Option<StoredRotation>, BotError> {
    if !config.storage_path.exists() {
        return Ok(None);
    }
    let store = RedbStorage::open(&config.storage_path)?;
    Ok(Some(StoredRotation::load(&store)?))
}

/// Codenames of every channel in the admin vault.
pub fn list_channels(config: &BotConfig) -> Result<Vec<String>, BotError> {
    if !config.admin_keys.exists() {
        return Ok(Vec::new());
    }
    Ok(AdminVault::open(&config.admin_keys)?.codenames()?)
}

fn create_parent(path: &Path) -> Result<(), BotError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .map_err(|source| BotError::Io { path: PathBuf::from(parent), source }),
        _ => Ok(()),
    }
}
