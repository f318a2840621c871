//! Production Environment implementation using system time and RNG.
//!
//! `SystemEnv` reads the real wall clock and draws entropy from the OS
//! cryptographic RNG. Production behaviour is therefore non-deterministic.

use crate::env::Environment;

/// Production environment using system time and cryptographic RNG.
///
/// # Security
///
/// The RNG uses getrandom which provides OS-level cryptographic randomness
/// (e.g., /dev/urandom on Linux, `BCryptGenRandom` on Windows). Channel admin
/// keys and secrets are derived from it.
///
/// # Panics
///
/// Panics if the OS RNG fails. A bot that cannot generate admin keys securely
/// must not keep minting channels.
#[derive(Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    #[allow(clippy::disallowed_methods)]
    fn wall_clock_secs(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs())
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer)
            .expect("invariant: OS RNG failure is unrecoverable - bot cannot mint keys securely");
    }
}
