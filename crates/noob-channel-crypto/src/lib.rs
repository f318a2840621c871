//! Noob Channel Cryptographic Primitives
//!
//! Channel definitions, administrative keys and deterministic codenames for
//! the noob channel bot. Pure functions and value types only: randomness is
//! always supplied by the caller, so every construction is reproducible under
//! a seeded RNG.
//!
//! # Channel Lifecycle
//!
//! ```text
//! sequence number + salt
//!        │
//!        ▼
//! SHA-256 → seed → codename ("quietHarbor3fa9c01d77e2")
//!        │
//!        ▼
//! ChannelProvider → (ChannelDefinition, AdminKey)
//!        │                      │
//!        ▼                      ▼
//! handed to joiners       PEM on admin storage
//! ```
//!
//! A [`ChannelDefinition`] is immutable once built. Its `reception_id` is a
//! digest over every other field, so a definition read back from storage or
//! from the wire is rejected if any field was altered.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod channel;
pub mod codename;
mod error;
mod identity;

pub use channel::{
    AdminKey, ChannelDefinition, ChannelParams, ChannelProvider, Ed25519ChannelProvider,
    MAX_DESCRIPTION_LEN, MAX_NAME_LEN, MIN_MESSAGE_LENGTH, PrivacyLevel,
};
pub use codename::{channel_seed, codename};
pub use error::CryptoError;
pub use identity::{IDENTITY_LEN, ManagerIdentity};
/// Randomness accepted by channel and identity generation.
pub use rand_core::CryptoRngCore;
