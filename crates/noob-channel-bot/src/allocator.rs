//! Channel allocator.
//!
//! Admits join events into the current channel and rotates to a freshly
//! minted channel when the rotation policy says the current one is full.
//!
//! # Admission Protocol
//!
//! One `admit_join` runs entirely under the state lock:
//!
//! ```text
//! occupancy + 1 ──persist──▶ committed        (fail: nothing changes)
//!        │
//!   must_rotate?
//!        │ yes
//!        ▼
//! sequence + 1 ──persist──▶ mint channel ──▶ vault publish ──▶ persist channel
//!        │                                         │                  │
//!        └─────────── any failure: re-persist old sequence ◀──────────┘
//!                                                  (and discard vault entry)
//! ```
//!
//! In-memory state is only updated after the matching write succeeds, so a
//! failed step never leaves the counters ahead of storage. Occupancy that was
//! durably recorded before a failed rotation stays recorded: the join was
//! counted even though it was not answered.

#![allow(clippy::disallowed_types, reason = "Single lock over rotation state")]

use std::sync::{Arc, Mutex};

use noob_channel_crypto::{
    ChannelDefinition, ChannelParams, ChannelProvider, Ed25519ChannelProvider, PrivacyLevel,
    channel_seed, codename,
};

use crate::{
    env::Environment,
    error::AllocatorError,
    policy::RotationPolicy,
    rotation::{
        CHANNEL_COUNT_KEY, CURRENT_CHANNEL_KEY, IN_CURRENT_CHANNEL_KEY, RotationState,
        StoredRotation, persist_channel, persist_occupancy, persist_sequence,
    },
    storage::Storage,
    vault::{AdminVault, VaultError},
};

/// Salt mixed into every codename seed
pub const DEFAULT_SALT: &str = "i'm a little teapot short and stout";
/// Prefix of every generated channel name
pub const DEFAULT_NAME_PREFIX: &str = "NC_";
/// Description of every generated channel
pub const DEFAULT_DESCRIPTION: &str = "A channel for you super noobs that need some help";
/// Largest message a generated channel carries
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 4096;

/// How new channels are named and sized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatorConfig {
    /// Largest message the transport carries
    pub max_message_length: usize,
    /// Codename seed salt
    pub salt: String,
    /// Channel name prefix, followed by the codename
    pub name_prefix: String,
    /// Channel description
    pub description: String,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
            salt: DEFAULT_SALT.to_string(),
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
            description: DEFAULT_DESCRIPTION.to_string(),
        }
    }
}

impl AllocatorConfig {
    /// Codename of the channel minted at `sequence`.
    pub fn codename_for(&self, sequence: u64) -> Result<String, AllocatorError> {
        Ok(codename(&channel_seed(sequence, self.salt.as_bytes()))?)
    }

    /// Full channel name for `codename`.
    pub fn channel_name(&self, codename: &str) -> String {
        format!("{}{}", self.name_prefix, codename)
    }
}

/// Hands out channels and rotates them when full.
///
/// Safe to share across threads; concurrent admissions are serialized.
pub struct ChannelAllocator<E: Environment, S: Storage> {
    state: Mutex<RotationState>,
    minter: Minter<E, S>,
    policy: Box<dyn RotationPolicy>,
}

impl<E: Environment, S: Storage> ChannelAllocator<E, S> {
    /// Load rotation state, minting the initial channel if none was stored.
    pub fn open(
        store: S,
        env: E,
        vault: AdminVault,
        config: AllocatorConfig,
        policy: Box<dyn RotationPolicy>,
    ) -> Result<Self, AllocatorError> {
        Self::with_provider(store, env, vault, config, policy, Arc::new(Ed25519ChannelProvider))
    }

    /// [`ChannelAllocator::open`] with a specific channel provider.
    pub fn with_provider(
        store: S,
        env: E,
        vault: AdminVault,
        config: AllocatorConfig,
        policy: Box<dyn RotationPolicy>,
        provider: Arc<dyn ChannelProvider>,
    ) -> Result<Self, AllocatorError> {
        let stored = StoredRotation::load(&store)?;
        let minter = Minter { store, env, vault, provider, config };

        let current_channel = match stored.current_channel {
            Some(channel) => channel,
            None => minter.initial(stored.channel_sequence)?,
        };

        tracing::info!(
            "Allocator ready: channel {} (sequence {}, occupancy {}, policy {:?})",
            current_channel.name,
            stored.channel_sequence,
            stored.occupancy,
            policy
        );

        Ok(Self {
            state: Mutex::new(RotationState {
                channel_sequence: stored.channel_sequence,
                occupancy: stored.occupancy,
                current_channel,
            }),
            minter,
            policy,
        })
    }

    /// Admit one joiner and return the serialized definition of the channel
    /// they should join.
    ///
    /// On error the joiner is not admitted to any channel and nothing should
    /// be sent back to them.
    pub fn admit_join(&self) -> Result<Vec<u8>, AllocatorError> {
        let mut state = self.state.lock().map_err(|_| AllocatorError::Poisoned)?;

        let occupancy = state.occupancy + 1;
        persist_occupancy(&self.minter.store, &self.minter.env, occupancy)
            .map_err(|source| AllocatorError::Persist { record: IN_CURRENT_CHANNEL_KEY, source })?;
        state.occupancy = occupancy;

        if self.policy.must_rotate(occupancy) {
            self.rotate(&mut state)?;
        }

        Ok(state.current_channel.to_bytes()?)
    }

    /// Copy of the current rotation state.
    pub fn snapshot(&self) -> Result<RotationState, AllocatorError> {
        let state = self.state.lock().map_err(|_| AllocatorError::Poisoned)?;
        Ok(state.clone())
    }

    /// Naming and sizing configuration.
    pub fn config(&self) -> &AllocatorConfig {
        &self.minter.config
    }

    fn rotate(&self, state: &mut RotationState) -> Result<(), AllocatorError> {
        let Minter { store, env, .. } = &self.minter;
        let previous = state.channel_sequence;
        let sequence = previous + 1;

        persist_sequence(store, env, sequence)
            .map_err(|source| AllocatorError::Persist { record: CHANNEL_COUNT_KEY, source })?;

        let channel = match self.minter.mint(sequence) {
            Ok(channel) => channel,
            Err(err) => {
                if let Err(e) = persist_sequence(store, env, previous) {
                    tracing::warn!("Failed to restore channel sequence {}: {}", previous, e);
                }
                return Err(err);
            },
        };

        state.channel_sequence = sequence;
        state.current_channel = channel;
        tracing::info!(
            "Rotated to channel {} (sequence {}, occupancy {})",
            state.current_channel.name,
            sequence,
            state.occupancy
        );

        let occupancy = self.policy.occupancy_after_rotation(state.occupancy);
        if occupancy != state.occupancy {
            match persist_occupancy(store, env, occupancy) {
                Ok(()) => state.occupancy = occupancy,
                Err(e) => tracing::warn!(
                    "Rotation committed but occupancy reset to {} failed: {}",
                    occupancy,
                    e
                ),
            }
        }

        Ok(())
    }
}

/// Everything needed to build and record a new channel.
struct Minter<E, S> {
    store: S,
    env: E,
    vault: AdminVault,
    provider: Arc<dyn ChannelProvider>,
    config: AllocatorConfig,
}

impl<E: Environment, S: Storage> Minter<E, S> {
    /// Build the channel for `sequence`, publish its credentials and record
    /// it as the current channel.
    fn mint(&self, sequence: u64) -> Result<ChannelDefinition, AllocatorError> {
        let codename = self.config.codename_for(sequence)?;
        let name = self.config.channel_name(&codename);

        let params = ChannelParams {
            name: &name,
            description: &self.config.description,
            level: PrivacyLevel::Public,
            max_message_length: self.config.max_message_length,
        };
        let (definition, admin_key) =
            self.provider.new_channel(&params, &mut self.env.entropy_stream())?;

        self.vault.write(&codename, &definition, &admin_key)?;
        drop(admin_key);

        if let Err(source) = persist_channel(&self.store, &self.env, &definition) {
            if let Err(e) = self.vault.discard(&codename) {
                tracing::warn!("Failed to discard admin credentials for {}: {}", codename, e);
            }
            return Err(AllocatorError::Persist { record: CURRENT_CHANNEL_KEY, source });
        }

        Ok(definition)
    }

    /// Channel for a store that has none recorded, using the stored sequence
    /// number as is.
    ///
    /// A crash between publishing credentials and recording the channel
    /// leaves a vault entry for this sequence; that entry is adopted instead
    /// of failing on the collision.
    fn initial(&self, sequence: u64) -> Result<ChannelDefinition, AllocatorError> {
        match self.mint(sequence) {
            Err(AllocatorError::Vault(VaultError::Collision { codename })) => {
                tracing::warn!("Adopting unrecorded channel {} from the admin vault", codename);
                let (definition, _admin_key) = self.vault.load(&codename)?;
                persist_channel(&self.store, &self.env, &definition).map_err(|source| {
                    AllocatorError::Persist { record: CURRENT_CHANNEL_KEY, source }
                })?;
                Ok(definition)
            },
            other => other,
        }
    }
}
