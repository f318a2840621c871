//! Deterministic channel codenames.
//!
//! A codename is a pure function of the channel sequence number and a fixed
//! salt, so a restarted bot derives exactly the names it derived before.
//! Codenames double as directory names on admin storage and therefore only
//! contain ASCII letters and digits.

use sha2::{Digest, Sha256};

use crate::error::CryptoError;

/// Hash bytes consumed by [`codename`]
pub const CODENAME_HASH_BYTES: usize = 10;

/// Hash bytes rendered as the hex suffix
const SUFFIX_BYTES: usize = 6;

const ADJECTIVES: [&str; 32] = [
    "amber", "brave", "calm", "clever", "cosmic", "curious", "dapper", "eager", "fancy", "gentle",
    "golden", "happy", "humble", "jolly", "kind", "lively", "lucky", "mellow", "mighty", "nimble",
    "noble", "plucky", "quiet", "rapid", "rustic", "silver", "sleepy", "steady", "sunny", "swift",
    "tidy", "witty",
];

const NOUNS: [&str; 32] = [
    "Badger", "Beacon", "Canyon", "Comet", "Falcon", "Fern", "Forest", "Glacier", "Harbor",
    "Heron", "Island", "Lantern", "Maple", "Meadow", "Meteor", "Otter", "Panda", "Pebble", "Pine",
    "Quasar", "Raven", "Reef", "River", "Robin", "Summit", "Teapot", "Thistle", "Tiger", "Valley",
    "Walrus", "Willow", "Zephyr",
];

/// Seed for the channel with the given sequence number.
///
/// SHA-256 over the decimal form of `sequence` followed by `salt`.
pub fn channel_seed(sequence: u64, salt: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(sequence.to_string().as_bytes());
    hasher.update(salt);
    hasher.finalize().into()
}

/// Human-readable codename for a hash, e.g. `quietHarbor3fa9c01d77e2`.
///
/// The 48-bit hex suffix keeps codenames of distinct sequences apart; the
/// vault refuses a reused codename.
pub fn codename(hash: &[u8]) -> Result<String, CryptoError> {
    if hash.len() < CODENAME_HASH_BYTES {
        return Err(CryptoError::HashTooShort { needed: CODENAME_HASH_BYTES, got: hash.len() });
    }

    let pick = |i: usize| usize::from(u16::from_be_bytes([hash[i], hash[i + 1]]));
    let adjective = ADJECTIVES[pick(0) % ADJECTIVES.len()];
    let noun = NOUNS[pick(2) % NOUNS.len()];
    let suffix = hex::encode(&hash[4..4 + SUFFIX_BYTES]);

    Ok(format!("{adjective}{noun}{suffix}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SALT: &[u8] = b"i'm a little teapot short and stout";

    #[test]
    fn seed_is_deterministic() {
        assert_eq!(channel_seed(5, SALT), channel_seed(5, SALT));
        assert_ne!(channel_seed(5, SALT), channel_seed(6, SALT));
        assert_ne!(channel_seed(5, SALT), channel_seed(5, b"another salt"));
    }

    #[test]
    fn seed_hashes_decimal_sequence() {
        let mut hasher = Sha256::new();
        hasher.update(b"42");
        hasher.update(SALT);
        let expected: [u8; 32] = hasher.finalize().into();

        assert_eq!(channel_seed(42, SALT), expected);
    }

    #[test]
    fn codename_layout() {
        let hash = [0u8, 3, 0, 8, 0, 0, 0, 42, 0xbe, 0xef];
        assert_eq!(codename(&hash).unwrap(), "cleverHarbor0000002abeef");
    }

    #[test]
    fn codename_is_filesystem_safe() {
        for sequence in 0..500 {
            let name = codename(&channel_seed(sequence, SALT)).unwrap();
            assert!(name.chars().all(|c| c.is_ascii_alphanumeric()), "bad codename {name}");
            assert!(!name.is_empty());
        }
    }

    #[test]
    fn short_hash_is_rejected() {
        assert_eq!(codename(&[1, 2, 3]), Err(CryptoError::HashTooShort { needed: 10, got: 3 }));
    }
}
