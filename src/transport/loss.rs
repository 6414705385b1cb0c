//! Seeded packet-loss injection.
//!
//! Loss is simulated on the send side: before a droppable segment reaches
//! the socket, one Bernoulli trial decides whether it is silently discarded
//! instead. Handshake control segments are never passed through the gate.
//! A fixed seed makes the drop/keep sequence identical across runs, which
//! keeps retransmission tests reproducible.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Bernoulli gate applied to droppable outbound segments.
#[derive(Debug)]
pub struct LossGate {
    probability: f32,
    rng: StdRng,
}

impl LossGate {
    /// Create a gate dropping with the given probability in `[0, 1]`.
    pub fn new(probability: f32, seed: u64) -> Self {
        Self {
            probability,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Decide the fate of one segment: `true` means drop it.
    ///
    /// Draws one uniform float per call, advancing the PRNG state whether
    /// or not the segment survives.
    pub fn should_drop(&mut self) -> bool {
        self.rng.gen_range(0.0f32..1.0) <= self.probability
    }
}
