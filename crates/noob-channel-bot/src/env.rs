//! Environment abstraction for deterministic testing.
//!
//! Decouples the allocator from system resources (wall clock, randomness).
//! Production uses [`crate::SystemEnv`]; tests use seeded environments so that
//! generated channels and timestamps are reproducible.

#![allow(clippy::disallowed_types, reason = "Locking simple RNG state")]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering},
};

use rand_chacha::{
    ChaCha20Rng,
    rand_core::{RngCore, SeedableRng},
};

/// Abstract environment providing time and randomness.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `random_bytes()` uses cryptographically secure entropy in production
/// - Methods are infallible except in exceptional circumstances (e.g., OS
///   entropy exhaustion)
pub trait Environment: Clone + Send + Sync + 'static {
    /// Seconds since the Unix epoch, stamped on every stored record.
    fn wall_clock_secs(&self) -> u64;

    /// Fills the provided buffer with random bytes.
    ///
    /// # Invariants
    ///
    /// - Given the same RNG seed, this produces the same sequence of bytes
    /// - Uses cryptographically secure RNG
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// A fresh entropy stream for key generation, seeded from
    /// [`Environment::random_bytes`].
    fn entropy_stream(&self) -> ChaCha20Rng {
        let mut seed = [0u8; 32];
        self.random_bytes(&mut seed);
        ChaCha20Rng::from_seed(seed)
    }
}

/// Deterministic environment for tests and simulation.
///
/// Seeded ChaCha20 randomness and a manually advanced clock. Clones share the
/// same RNG and clock.
#[derive(Clone)]
pub struct SeededEnv {
    rng: Arc<Mutex<ChaCha20Rng>>,
    clock_secs: Arc<AtomicU64>,
}

impl SeededEnv {
    /// Environment whose randomness is fully determined by `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(ChaCha20Rng::seed_from_u64(seed))),
            clock_secs: Arc::new(AtomicU64::new(1_700_000_000)),
        }
    }

    /// Move the wall clock forward.
    pub fn advance_secs(&self, secs: u64) {
        self.clock_secs.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Environment for SeededEnv {
    fn wall_clock_secs(&self) -> u64 {
        self.clock_secs.load(Ordering::SeqCst)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().expect("SeededEnv mutex poisoned").fill_bytes(buffer);
    }
}
