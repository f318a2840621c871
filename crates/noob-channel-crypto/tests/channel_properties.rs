//! Property tests for channel naming and construction.

use noob_channel_crypto::{
    ChannelDefinition, ChannelParams, ChannelProvider, Ed25519ChannelProvider, PrivacyLevel,
    channel_seed, codename,
};
use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

const SALT: &[u8] = b"i'm a little teapot short and stout";

proptest! {
    /// Two independent derivations for the same sequence agree.
    #[test]
    fn prop_codename_is_pure(sequence in any::<u64>()) {
        let first = codename(&channel_seed(sequence, SALT)).unwrap();
        let second = codename(&channel_seed(sequence, SALT)).unwrap();
        prop_assert_eq!(first, second);
    }

    /// Every generated channel name is accepted by the provider and the
    /// resulting definition decodes back to itself.
    #[test]
    fn prop_generated_channels_decode(sequence in any::<u64>(), rng_seed in any::<u64>()) {
        let name = format!("NC_{}", codename(&channel_seed(sequence, SALT)).unwrap());
        let params = ChannelParams {
            name: &name,
            description: "A channel for you super noobs that need some help",
            level: PrivacyLevel::Public,
            max_message_length: 4096,
        };

        let mut rng = ChaCha20Rng::seed_from_u64(rng_seed);
        let (definition, admin) = Ed25519ChannelProvider.new_channel(&params, &mut rng).unwrap();

        let decoded = ChannelDefinition::from_bytes(&definition.to_bytes().unwrap()).unwrap();
        prop_assert_eq!(&decoded.name, &name);
        prop_assert_eq!(decoded.admin_public_key, admin.public_key());
    }
}
