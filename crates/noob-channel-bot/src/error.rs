//! Bot error types.
//!
//! - [`AllocatorError`]: admission and rotation failures. Recovered through
//!   the rollback protocol and surfaced to the dispatcher, which drops the
//!   triggering event.
//! - [`TransportError`]: QUIC ingress failures.
//! - [`ConfigError`]: unreadable or invalid configuration.
//! - [`BotError`]: anything that stops the bot from starting or running.

use std::path::PathBuf;

use noob_channel_crypto::CryptoError;
use thiserror::Error;

use crate::{storage::StorageError, vault::VaultError};

/// Errors from the channel allocator.
#[derive(Error, Debug)]
pub enum AllocatorError {
    /// A rotation record exists but could not be read or decoded.
    ///
    /// Fatal at startup: the bot refuses to run on state it cannot read.
    #[error("failed to load {record}: {source}")]
    Load {
        /// Record key
        record: &'static str,
        /// Underlying failure
        source: StorageError,
    },

    /// Writing a rotation record failed. In-memory state was rolled back.
    #[error("failed to persist {record}: {source}")]
    Persist {
        /// Record key
        record: &'static str,
        /// Underlying failure
        source: StorageError,
    },

    /// Channel construction or encoding failed.
    #[error("channel error: {0}")]
    Crypto(#[from] CryptoError),

    /// Admin credentials could not be recorded.
    #[error("admin vault error: {0}")]
    Vault(#[from] VaultError),

    /// A thread panicked while holding the rotation state.
    #[error("rotation state lock poisoned")]
    Poisoned,
}

/// Errors from the QUIC ingress.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Invalid bind address or TLS material.
    #[error("transport configuration error: {0}")]
    Config(String),

    /// Endpoint or connection failure.
    #[error("transport error: {0}")]
    Connection(String),
}

/// Errors loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// File that was read
        path: PathBuf,
        /// Underlying failure
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`crate::BotConfig`].
    #[error("failed to parse config file {path}: {message}")]
    Parse {
        /// File that was parsed
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors that stop the bot.
#[derive(Error, Debug)]
pub enum BotError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Storage backend could not be opened.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Rotation state could not be initialized.
    #[error("allocator error: {0}")]
    Allocator(#[from] AllocatorError),

    /// Admin credential storage could not be prepared or read.
    #[error("admin vault error: {0}")]
    Vault(#[from] VaultError),

    /// Stored identity is unusable.
    #[error("identity error: {0}")]
    Crypto(#[from] CryptoError),

    /// Ingress failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A working directory could not be created.
    #[error("failed to create directory {path}: {source}")]
    Io {
        /// Directory being created
        path: PathBuf,
        /// Underlying failure
        source: std::io::Error,
    },

    /// The contact file could not be written.
    #[error("failed to write contact file {path}: {source}")]
    Contact {
        /// Output path
        path: PathBuf,
        /// Underlying failure
        source: std::io::Error,
    },
}
