//! Bot configuration.
//!
//! Values come from three layers: built-in defaults, an optional TOML file,
//! and command-line flags, each overriding the one before. Only the first two
//! live here; the binary applies its flags on top.
//!
//! ```toml
//! bind = "0.0.0.0:4433"
//! admin_keys = "cmix/adminKeys"
//! response_timeout = "1m"
//!
//! [channels]
//! capacity = 100
//! reset_on_rotate = false
//! ```

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use noob_channel_crypto::{MAX_DESCRIPTION_LEN, MAX_NAME_LEN, MIN_MESSAGE_LENGTH};
use serde::{Deserialize, Serialize};

use crate::{
    allocator::{
        AllocatorConfig, DEFAULT_DESCRIPTION, DEFAULT_MAX_MESSAGE_LENGTH, DEFAULT_NAME_PREFIX,
        DEFAULT_SALT,
    },
    dispatch::DEFAULT_RESPONSE_TIMEOUT,
    error::ConfigError,
    policy::{DEFAULT_CAPACITY, NeverReset, ResetOnRotate, RotationPolicy},
};

/// Longest name prefix; leaves room for the codename
const MAX_NAME_PREFIX_LEN: usize = MAX_NAME_LEN / 2;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BotConfig {
    /// QUIC listen address
    pub bind: String,

    /// TLS certificate (PEM). Self-signed when unset.
    pub cert_path: Option<PathBuf>,

    /// TLS private key (PEM). Self-signed when unset.
    pub key_path: Option<PathBuf>,

    /// Rotation state database
    pub storage_path: PathBuf,

    /// Admin credential root
    pub admin_keys: PathBuf,

    /// Where the bot's contact JSON is written at startup
    pub contact_output: PathBuf,

    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,

    /// Log file, appended to; `-` logs to stdout
    pub log_path: String,

    /// Bound on sending one single-use response
    #[serde(with = "humantime_serde")]
    pub response_timeout: Duration,

    /// Channel generation and rotation
    pub channels: ChannelConfig,
}

/// Channel generation and rotation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelConfig {
    /// Joins admitted before the first rotation
    pub capacity: u64,

    /// Count the overflowing joiner as the first member of the new channel
    /// instead of keeping the running total
    pub reset_on_rotate: bool,

    /// Largest message a channel carries
    pub max_message_length: usize,

    /// Codename seed salt
    pub salt: String,

    /// Channel name prefix
    pub name_prefix: String,

    /// Channel description
    pub description: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:4433".to_string(),
            cert_path: None,
            key_path: None,
            storage_path: PathBuf::from("cmix/noobChannel.redb"),
            admin_keys: PathBuf::from("cmix/adminKeys"),
            contact_output: PathBuf::from("cmix/ncContact.json"),
            log_level: "info".to_string(),
            log_path: "log/noobChannel.log".to_string(),
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            channels: ChannelConfig::default(),
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            reset_on_rotate: false,
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
            salt: DEFAULT_SALT.to_string(),
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
            description: DEFAULT_DESCRIPTION.to_string(),
        }
    }
}

impl BotConfig {
    /// Read a TOML config file. Missing keys take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        Self::from_toml(&contents)
            .map_err(|message| ConfigError::Parse { path: path.to_path_buf(), message })
    }

    fn from_toml(contents: &str) -> Result<Self, String> {
        toml::from_str(contents).map_err(|e| e.to_string())
    }

    /// Reject values the bot cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let channels = &self.channels;

        if channels.capacity == 0 {
            return Err(ConfigError::Invalid("channels.capacity must be at least 1".to_string()));
        }
        if channels.max_message_length < MIN_MESSAGE_LENGTH {
            return Err(ConfigError::Invalid(format!(
                "channels.max_message_length must be at least {MIN_MESSAGE_LENGTH}"
            )));
        }
        if channels.name_prefix.len() > MAX_NAME_PREFIX_LEN {
            return Err(ConfigError::Invalid(format!(
                "channels.name_prefix must be at most {MAX_NAME_PREFIX_LEN} bytes"
            )));
        }
        if channels.description.len() > MAX_DESCRIPTION_LEN {
            return Err(ConfigError::Invalid(format!(
                "channels.description must be at most {MAX_DESCRIPTION_LEN} bytes"
            )));
        }
        if self.response_timeout.is_zero() {
            return Err(ConfigError::Invalid("response_timeout must be positive".to_string()));
        }
        if self.cert_path.is_some() != self.key_path.is_some() {
            return Err(ConfigError::Invalid(
                "cert_path and key_path must be set together".to_string(),
            ));
        }

        Ok(())
    }

    /// Channel naming and sizing for the allocator.
    pub fn allocator_config(&self) -> AllocatorConfig {
        AllocatorConfig {
            max_message_length: self.channels.max_message_length,
            salt: self.channels.salt.clone(),
            name_prefix: self.channels.name_prefix.clone(),
            description: self.channels.description.clone(),
        }
    }

    /// Rotation policy selected by the configuration.
    pub fn rotation_policy(&self) -> Box<dyn RotationPolicy> {
        let cap = self.channels.capacity;
        if self.channels.reset_on_rotate {
            Box::new(ResetOnRotate { cap })
        } else {
            Box::new(NeverReset { cap })
        }
    }
}
