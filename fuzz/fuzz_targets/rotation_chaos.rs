//! Fuzz target for the rotation protocol under storage failures
//!
//! Drives a `ChannelAllocator` through arbitrary joins while individual
//! record writes are switched on and off.
//!
//! # Invariants
//!
//! - Failed admissions NEVER panic and never change sequence or channel
//! - Sequence never decreases; occupancy never decreases without a reset
//! - The recorded channel always matches the in-memory channel
//! - One admin vault entry per committed channel

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use noob_channel_bot::{
    AdminVault, AllocatorConfig, ChannelAllocator, ChaoticStorage, MemoryStorage, NeverReset,
    ResetOnRotate, RotationPolicy, SeededEnv, StoredRotation,
    rotation::{CHANNEL_COUNT_KEY, CURRENT_CHANNEL_KEY, IN_CURRENT_CHANNEL_KEY},
};

#[derive(Debug, Clone, Arbitrary)]
struct Scenario {
    /// Seed for channel key generation
    seed: u64,
    /// Capacity 1-8
    cap: u8,
    /// Reset occupancy on rotation instead of keeping the total
    reset: bool,
    /// Operations to perform
    operations: Vec<Operation>,
}

#[derive(Debug, Clone, Copy, Arbitrary)]
enum Operation {
    /// Admit one joiner
    Join,
    /// Start failing writes to one record
    Break(Record),
    /// Stop all injected failures
    Heal,
}

#[derive(Debug, Clone, Copy, Arbitrary)]
enum Record {
    Occupancy,
    Sequence,
    Channel,
}

fuzz_target!(|scenario: Scenario| {
    let cap = u64::from(scenario.cap % 8) + 1;
    let policy: Box<dyn RotationPolicy> =
        if scenario.reset { Box::new(ResetOnRotate { cap }) } else { Box::new(NeverReset { cap }) };

    let dir = tempfile::tempdir().expect("tempdir");
    let vault = AdminVault::open(dir.path()).expect("vault");
    let store = ChaoticStorage::targeted(MemoryStorage::new());
    let Ok(allocator) = ChannelAllocator::open(
        store.clone(),
        SeededEnv::new(scenario.seed),
        vault.clone(),
        AllocatorConfig::default(),
        policy,
    ) else {
        return;
    };

    for op in scenario.operations.into_iter().take(64) {
        match op {
            Operation::Join => {
                let before = allocator.snapshot().expect("snapshot");
                let result = allocator.admit_join();
                let after = allocator.snapshot().expect("snapshot");

                assert!(after.channel_sequence >= before.channel_sequence);
                if !scenario.reset {
                    assert!(after.occupancy >= before.occupancy);
                }
                if result.is_err() {
                    assert_eq!(after.channel_sequence, before.channel_sequence);
                    assert_eq!(after.current_channel, before.current_channel);
                }

                let stored = StoredRotation::load(store.inner()).expect("inner load");
                assert_eq!(stored.current_channel.as_ref(), Some(&after.current_channel));
                let published = vault.codenames().expect("codenames").len() as u64;
                assert_eq!(published, after.channel_sequence + 1);
            },
            Operation::Break(record) => store.fail_writes_to(match record {
                Record::Occupancy => IN_CURRENT_CHANNEL_KEY,
                Record::Sequence => CHANNEL_COUNT_KEY,
                Record::Channel => CURRENT_CHANNEL_KEY,
            }),
            Operation::Heal => store.heal(),
        }
    }
});
