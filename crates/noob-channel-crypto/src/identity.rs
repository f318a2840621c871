//! Long-lived identity of the bot itself.

use ed25519_dalek::SigningKey;
use rand_core::CryptoRngCore;
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// Marshalled length of a [`ManagerIdentity`]
pub const IDENTITY_LEN: usize = 32;

/// The channel manager's own Ed25519 identity.
///
/// Created on first start and reloaded on every later start. Its public key is
/// published in the bot's contact so joiners can recognise the manager.
pub struct ManagerIdentity {
    signing_key: SigningKey,
}

impl ManagerIdentity {
    /// Generate a fresh identity.
    pub fn generate(rng: &mut dyn CryptoRngCore) -> Self {
        Self { signing_key: SigningKey::generate(&mut *rng) }
    }

    /// Raw secret bytes for storage, wiped when dropped.
    pub fn to_bytes(&self) -> Zeroizing<[u8; IDENTITY_LEN]> {
        Zeroizing::new(self.signing_key.to_bytes())
    }

    /// Restore an identity from [`ManagerIdentity::to_bytes`] output.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let secret: Zeroizing<[u8; IDENTITY_LEN]> =
            Zeroizing::new(bytes.try_into().map_err(|_| {
                CryptoError::KeyEncoding(format!(
                    "manager identity is {} bytes, expected {IDENTITY_LEN}",
                    bytes.len()
                ))
            })?);
        Ok(Self { signing_key: SigningKey::from_bytes(&secret) })
    }

    /// Public key published in the bot's contact.
    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }
}

impl std::fmt::Debug for ManagerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerIdentity")
            .field("public_key", &hex::encode(self.public_key()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    #[test]
    fn identity_survives_marshal() {
        let mut rng = ChaCha20Rng::seed_from_u64(9);
        let identity = ManagerIdentity::generate(&mut rng);

        let restored = ManagerIdentity::from_bytes(identity.to_bytes().as_slice()).unwrap();
        assert_eq!(restored.public_key(), identity.public_key());
    }

    #[test]
    fn exported_secret_is_wiped_on_drop() {
        let mut rng = ChaCha20Rng::seed_from_u64(10);
        let identity = ManagerIdentity::generate(&mut rng);

        let secret: Zeroizing<[u8; IDENTITY_LEN]> = identity.to_bytes();
        assert_eq!(*secret, identity.signing_key.to_bytes());
    }

    #[test]
    fn wrong_length_is_rejected() {
        let result = ManagerIdentity::from_bytes(&[0u8; 31]);
        assert!(matches!(result, Err(CryptoError::KeyEncoding(_))));
    }
}
