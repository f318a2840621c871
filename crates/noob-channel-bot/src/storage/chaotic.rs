//! Chaotic storage wrapper for fault injection testing
//!
//! Storage wrapper that fails operations to test the allocator's rollback
//! protocol. Failures come from two sources: a seeded random failure rate for
//! chaos properties, and targeted write failures for specific record keys for
//! scenario tests ("the sequence write fails, the occupancy write does not").

#![allow(clippy::disallowed_types, reason = "Locking simple RNG state")]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use super::{Storage, StorageError, VersionedObject};

/// Chaotic storage wrapper that injects failures
///
/// Delegates to an underlying storage implementation. Uses Arc<Mutex<>> for
/// the RNG state and the failing key set, making it Clone and thread-safe;
/// clones share one failure schedule.
#[derive(Clone)]
pub struct ChaoticStorage<S: Storage> {
    inner: S,
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    /// RNG state for deterministic chaos
    rng: Arc<Mutex<ChaoticRng>>,
    /// Keys whose writes fail, with the number of writes still let through
    failing_writes: Arc<Mutex<HashMap<String, usize>>>,
    /// Operation counter
    operation_count: Arc<Mutex<usize>>,
}

/// Simple deterministic RNG for chaos injection
///
/// Uses linear congruential generator (LCG) for fast, deterministic randomness.
/// This ensures chaos tests are reproducible with the same seed.
struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Generate next random value [0.0, 1.0)
    fn next(&mut self) -> f64 {
        // LCG constants from Numerical Recipes
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }

    /// Check if we should fail (returns true with probability = `failure_rate`)
    fn should_fail(&mut self, failure_rate: f64) -> bool {
        self.next() < failure_rate
    }
}

impl<S: Storage> ChaoticStorage<S> {
    /// Create a new chaotic storage wrapper
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x1234_5678_9ABC_DEF0)
    }

    /// Create with explicit seed for reproducible chaos
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    #[allow(clippy::panic)]
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
        );

        Self {
            inner,
            failure_rate,
            rng: Arc::new(Mutex::new(ChaoticRng::new(seed))),
            failing_writes: Arc::new(Mutex::new(HashMap::new())),
            operation_count: Arc::new(Mutex::new(0)),
        }
    }

    /// Wrapper that only fails where told to via [`Self::fail_writes_to`].
    pub fn targeted(inner: S) -> Self {
        Self::new(inner, 0.0)
    }

    /// Underlying storage (for checking invariants after chaos).
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Make every later write to `key` fail until [`Self::heal`] is called.
    pub fn fail_writes_to(&self, key: &str) {
        self.fail_writes_to_after(key, 0);
    }

    /// Let the next `allowed` writes to `key` through, then fail every later
    /// one until [`Self::heal`] is called.
    #[allow(clippy::expect_used)]
    pub fn fail_writes_to_after(&self, key: &str, allowed: usize) {
        self.failing_writes
            .lock()
            .expect("failing_writes mutex poisoned")
            .insert(key.to_string(), allowed);
    }

    /// Stop all targeted failures.
    #[allow(clippy::expect_used)]
    pub fn heal(&self) {
        self.failing_writes.lock().expect("failing_writes mutex poisoned").clear();
    }

    /// Total number of storage operations attempted.
    #[allow(clippy::expect_used)]
    pub fn operation_count(&self) -> usize {
        *self.operation_count.lock().expect("operation_count mutex poisoned")
    }

    #[allow(clippy::expect_used)]
    fn increment_operation_count(&self) {
        let mut count = self.operation_count.lock().expect("operation_count mutex poisoned");
        *count += 1;
    }

    #[allow(clippy::expect_used)]
    fn should_fail(&self) -> bool {
        self.rng.lock().expect("ChaoticRng mutex poisoned").should_fail(self.failure_rate)
    }

    #[allow(clippy::expect_used)]
    fn write_targeted(&self, key: &str) -> bool {
        let mut failing = self.failing_writes.lock().expect("failing_writes mutex poisoned");
        match failing.get_mut(key) {
            None => false,
            Some(0) => true,
            Some(allowed) => {
                *allowed -= 1;
                false
            },
        }
    }
}

impl<S: Storage> Storage for ChaoticStorage<S> {
    fn get(&self, key: &str) -> Result<Option<VersionedObject>, StorageError> {
        self.increment_operation_count();
        if self.should_fail() {
            return Err(StorageError::Io("chaotic failure injection".to_string()));
        }
        self.inner.get(key)
    }

    fn set(&self, key: &str, object: &VersionedObject) -> Result<(), StorageError> {
        self.increment_operation_count();
        if self.write_targeted(key) {
            return Err(StorageError::Io(format!("injected write failure for {key}")));
        }
        if self.should_fail() {
            return Err(StorageError::Io("chaotic failure injection".to_string()));
        }
        self.inner.set(key, object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn object(byte: u8) -> VersionedObject {
        VersionedObject::new(0, 0, vec![byte])
    }

    #[test]
    fn test_chaotic_with_zero_failure_rate() {
        let chaotic = ChaoticStorage::new(MemoryStorage::new(), 0.0);

        for i in 0..100u8 {
            chaotic.set("channelCount", &object(i)).expect("should not fail with 0% rate");
        }

        assert_eq!(chaotic.get("channelCount").unwrap(), Some(object(99)));
        assert_eq!(chaotic.operation_count(), 101);
    }

    #[test]
    fn test_chaotic_with_100_failure_rate() {
        let chaotic = ChaoticStorage::new(MemoryStorage::new(), 1.0);

        assert!(chaotic.set("channelCount", &object(1)).is_err());
        assert!(chaotic.get("channelCount").is_err());
        assert!(chaotic.inner().is_empty());
    }

    #[test]
    fn test_chaotic_deterministic_with_seed() {
        let chaotic1 = ChaoticStorage::with_seed(MemoryStorage::new(), 0.5, 42);
        let chaotic2 = ChaoticStorage::with_seed(MemoryStorage::new(), 0.5, 42);

        for i in 0..100u8 {
            let result1 = chaotic1.set("inCurrentChannel", &object(i));
            let result2 = chaotic2.set("inCurrentChannel", &object(i));

            assert_eq!(result1.is_ok(), result2.is_ok(), "determinism violated at iteration {i}");
        }
    }

    #[test]
    fn test_targeted_failure_only_hits_key() {
        let chaotic = ChaoticStorage::targeted(MemoryStorage::new());
        chaotic.fail_writes_to("channelCount");

        assert!(chaotic.set("channelCount", &object(1)).is_err());
        assert!(chaotic.set("inCurrentChannel", &object(1)).is_ok());
        assert_eq!(chaotic.inner().get("channelCount").unwrap(), None);

        chaotic.heal();
        assert!(chaotic.set("channelCount", &object(2)).is_ok());
    }

    #[test]
    fn test_targeted_failure_after_allowed_writes() {
        let chaotic = ChaoticStorage::targeted(MemoryStorage::new());
        chaotic.fail_writes_to_after("inCurrentChannel", 2);

        assert!(chaotic.set("inCurrentChannel", &object(1)).is_ok());
        assert!(chaotic.set("inCurrentChannel", &object(2)).is_ok());
        assert!(chaotic.set("inCurrentChannel", &object(3)).is_err());
        assert!(chaotic.set("inCurrentChannel", &object(4)).is_err());
        assert_eq!(chaotic.inner().get("inCurrentChannel").unwrap(), Some(object(2)));
    }

    #[test]
    #[should_panic(expected = "failure_rate must be between 0.0 and 1.0")]
    fn test_chaotic_rejects_invalid_failure_rate() {
        let _chaotic = ChaoticStorage::new(MemoryStorage::new(), 1.5);
    }
}
