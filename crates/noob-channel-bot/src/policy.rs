//! Rotation policies.
//!
//! The allocator asks the policy two questions: does this admission overflow
//! the current channel, and what occupancy should be recorded once the
//! replacement channel is committed. Swapping the policy changes capacity and
//! reset behaviour without touching the allocator's persistence protocol.

/// Default number of members per channel
pub const DEFAULT_CAPACITY: u64 = 100;

/// Decides when the current channel is full.
pub trait RotationPolicy: Send + Sync + std::fmt::Debug {
    /// Whether the admission that raised occupancy to `occupancy` must first
    /// rotate to a new channel.
    fn must_rotate(&self, occupancy: u64) -> bool;

    /// Occupancy to record after a rotation triggered at `occupancy` commits.
    fn occupancy_after_rotation(&self, occupancy: u64) -> u64;
}

/// Rotate once occupancy exceeds `cap`; never reset the count.
///
/// Once the first rotation has happened every later admission is above the
/// cap again, so each one mints a fresh channel. This mirrors the deployed
/// bot's behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeverReset {
    /// Members admitted before the first rotation
    pub cap: u64,
}

impl RotationPolicy for NeverReset {
    fn must_rotate(&self, occupancy: u64) -> bool {
        occupancy > self.cap
    }

    fn occupancy_after_rotation(&self, occupancy: u64) -> u64 {
        occupancy
    }
}

impl Default for NeverReset {
    fn default() -> Self {
        Self { cap: DEFAULT_CAPACITY }
    }
}

/// Rotate once occupancy exceeds `cap`, then count the overflowing joiner as
/// the first member of the new channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetOnRotate {
    /// Members per channel
    pub cap: u64,
}

impl RotationPolicy for ResetOnRotate {
    fn must_rotate(&self, occupancy: u64) -> bool {
        occupancy > self.cap
    }

    fn occupancy_after_rotation(&self, _occupancy: u64) -> u64 {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_is_strictly_above_cap() {
        let policy = NeverReset { cap: 100 };

        assert!(!policy.must_rotate(99));
        assert!(!policy.must_rotate(100));
        assert!(policy.must_rotate(101));
    }

    #[test]
    fn never_reset_keeps_count() {
        let policy = NeverReset::default();
        assert_eq!(policy.occupancy_after_rotation(101), 101);
        assert!(policy.must_rotate(102));
    }

    #[test]
    fn reset_starts_new_channel_at_one() {
        let policy = ResetOnRotate { cap: 3 };

        assert!(policy.must_rotate(4));
        assert_eq!(policy.occupancy_after_rotation(4), 1);
        assert!(!policy.must_rotate(2));
    }
}
