//! Fuzz target for decoding stored and received bytes
//!
//! Feeds arbitrary bytes to every decoder that reads untrusted or on-disk
//! input: channel definitions, manager identities, codenames, and the
//! rotation records loaded at startup.
//!
//! # Invariants
//!
//! - Decoders NEVER panic; malformed input is an error
//! - A definition that decodes re-encodes to bytes that decode to itself

#![no_main]

use libfuzzer_sys::fuzz_target;
use noob_channel_bot::{
    MemoryStorage, SeededEnv, StoredRotation,
    rotation::{CHANNEL_COUNT_KEY, CURRENT_CHANNEL_KEY, IN_CURRENT_CHANNEL_KEY, store_record},
};
use noob_channel_crypto::{ChannelDefinition, ManagerIdentity, codename};

fuzz_target!(|data: &[u8]| {
    if let Ok(definition) = ChannelDefinition::from_bytes(data) {
        let bytes = definition.to_bytes().expect("decoded definition must encode");
        let again =
            ChannelDefinition::from_bytes(&bytes).expect("re-encoded definition must decode");
        assert_eq!(again, definition);
    }

    let _ = ManagerIdentity::from_bytes(data);
    let _ = codename(data);

    let store = MemoryStorage::new();
    let env = SeededEnv::new(0);
    let split = data.len() / 3;
    for (key, chunk) in [
        (CHANNEL_COUNT_KEY, &data[..split]),
        (IN_CURRENT_CHANNEL_KEY, &data[split..2 * split]),
        (CURRENT_CHANNEL_KEY, &data[2 * split..]),
    ] {
        store_record(&store, &env, key, chunk.to_vec()).expect("memory storage never fails");
    }
    let _ = StoredRotation::load(&store);
});
