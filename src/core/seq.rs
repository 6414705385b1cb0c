//! Wraparound-safe sequence number arithmetic.
//!
//! Sequence numbers live in `0..=MAX_SEQUENCE`. On overflow the space does
//! NOT wrap modularly: the counter steps one unit at a time and clamps back
//! to zero whenever a step would leave the space. Both endpoints rely on the
//! identical rule for every increment and comparison; changing it alters
//! observable ACK and retransmission behavior near the boundary.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::constants::MAX_SEQUENCE;

/// Advance `current` by `increment` within the sequence space.
///
/// If the sum stays inside `0..=MAX_SEQUENCE` it is returned directly.
/// Otherwise the counter is stepped `increment` times, resetting to zero
/// each time it would pass [`MAX_SEQUENCE`].
pub fn next_seq(current: u32, increment: u32) -> u32 {
    let sum = u64::from(current) + u64::from(increment);
    if sum <= u64::from(MAX_SEQUENCE) {
        return sum as u32;
    }

    let mut seq = current;
    for _ in 0..increment {
        seq = if seq >= MAX_SEQUENCE { 0 } else { seq + 1 };
    }
    seq
}

/// Draw an initial sequence number from a seeded PRNG.
///
/// The same seed always yields the same ISN, which keeps test runs and
/// log files reproducible.
pub fn initial_seq(seed: u64) -> u32 {
    let mut rng = StdRng::seed_from_u64(seed);
    rng.gen_range(0..MAX_SEQUENCE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_addition() {
        assert_eq!(next_seq(0, 0), 0);
        assert_eq!(next_seq(0, 512), 512);
        assert_eq!(next_seq(1_000, 24), 1_024);
        assert_eq!(next_seq(MAX_SEQUENCE - 1, 1), MAX_SEQUENCE);
    }

    #[test]
    fn test_overflow_clamps_to_zero() {
        // One step past the top resets to zero rather than wrapping.
        assert_eq!(next_seq(MAX_SEQUENCE, 1), 0);
    }

    #[test]
    fn test_overflow_steps_unit_at_a_time() {
        // From MAX-2, five steps visit MAX-1, MAX, 0, 1, 2.
        assert_eq!(next_seq(MAX_SEQUENCE - 2, 5), 2);
        // From MAX, three steps visit 0, 1, 2.
        assert_eq!(next_seq(MAX_SEQUENCE, 3), 2);
    }

    #[test]
    fn test_overflow_never_negative() {
        // The result always stays inside the sequence space.
        for increment in [1u32, 7, 100, 65_535] {
            let next = next_seq(MAX_SEQUENCE - 3, increment);
            assert!(next <= MAX_SEQUENCE);
        }
    }

    #[test]
    fn test_initial_seq_deterministic() {
        assert_eq!(initial_seq(300), initial_seq(300));
        assert!(initial_seq(300) < MAX_SEQUENCE);
        assert_ne!(initial_seq(300), initial_seq(301));
    }
}
