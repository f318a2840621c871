//! Chaos property tests for the rotation protocol.
//!
//! The allocator runs on `ChaoticStorage` with random read and write failures.
//! After every admission attempt, successful or not:
//! - Counters never move backwards
//! - A failed admission leaves sequence and channel untouched
//! - The recorded channel matches the in-memory channel
//! - The admin vault holds exactly one entry per channel ever committed

use noob_channel_bot::{
    AdminVault, AllocatorConfig, ChannelAllocator, ChaoticStorage, MemoryStorage, NeverReset,
    ResetOnRotate, RotationPolicy, SeededEnv, StoredRotation,
};
use noob_channel_crypto::ChannelDefinition;
use proptest::prelude::*;
use tempfile::tempdir;

type Chaotic = ChaoticStorage<MemoryStorage>;

/// Open an allocator, retrying until the chaotic store lets it through.
fn open_through_chaos(
    store: &Chaotic,
    vault: &AdminVault,
    seed: u64,
    policy: impl Fn() -> Box<dyn RotationPolicy>,
) -> ChannelAllocator<SeededEnv, Chaotic> {
    for _ in 0..1_000 {
        if let Ok(allocator) = ChannelAllocator::open(
            store.clone(),
            SeededEnv::new(seed),
            vault.clone(),
            AllocatorConfig::default(),
            policy(),
        ) {
            return allocator;
        }
    }
    panic!("allocator never opened");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: under random storage failures, state stays consistent with
    /// what was durably recorded.
    #[test]
    fn prop_rotation_survives_chaos(
        failure_rate in 0.0..0.4,
        seed in any::<u64>(),
        cap in 1u64..5,
        joins in 1usize..30,
    ) {
        let dir = tempdir().unwrap();
        let vault = AdminVault::open(dir.path()).unwrap();
        let store = ChaoticStorage::with_seed(MemoryStorage::new(), failure_rate, seed);
        let allocator = open_through_chaos(&store, &vault, seed, || -> Box<dyn RotationPolicy> {
            Box::new(NeverReset { cap })
        });

        for _ in 0..joins {
            let before = allocator.snapshot().unwrap();
            let result = allocator.admit_join();
            let after = allocator.snapshot().unwrap();

            prop_assert!(after.occupancy >= before.occupancy);
            prop_assert!(after.occupancy <= before.occupancy + 1);
            prop_assert!(after.channel_sequence >= before.channel_sequence);

            match result {
                Ok(bytes) => {
                    prop_assert_eq!(after.occupancy, before.occupancy + 1);
                    let handed_out = ChannelDefinition::from_bytes(&bytes).unwrap();
                    prop_assert_eq!(&handed_out, &after.current_channel);
                },
                Err(_) => {
                    prop_assert_eq!(after.channel_sequence, before.channel_sequence);
                    prop_assert_eq!(&after.current_channel, &before.current_channel);
                },
            }

            let stored = StoredRotation::load(store.inner()).unwrap();
            prop_assert_eq!(stored.occupancy, after.occupancy);
            prop_assert!(stored.channel_sequence >= after.channel_sequence);
            prop_assert_eq!(stored.current_channel.as_ref(), Some(&after.current_channel));

            let published = vault.codenames().unwrap().len() as u64;
            prop_assert_eq!(published, after.channel_sequence + 1);
        }
    }

    /// Property: without failures, rotations happen exactly when the policy
    /// says so.
    #[test]
    fn prop_rotation_count_matches_policy(
        seed in any::<u64>(),
        cap in 1u64..6,
        joins in 0u64..25,
        reset in any::<bool>(),
    ) {
        let dir = tempdir().unwrap();
        let vault = AdminVault::open(dir.path()).unwrap();
        let store = ChaoticStorage::targeted(MemoryStorage::new());
        let allocator = open_through_chaos(&store, &vault, seed, || -> Box<dyn RotationPolicy> {
            if reset {
                Box::new(ResetOnRotate { cap })
            } else {
                Box::new(NeverReset { cap })
            }
        });

        // Model of the policy
        let (mut occupancy, mut rotations) = (0u64, 0u64);
        for _ in 0..joins {
            allocator.admit_join().unwrap();
            occupancy += 1;
            if occupancy > cap {
                rotations += 1;
                if reset {
                    occupancy = 1;
                }
            }
        }

        let state = allocator.snapshot().unwrap();
        prop_assert_eq!(state.occupancy, occupancy);
        prop_assert_eq!(state.channel_sequence, rotations);
    }
}
