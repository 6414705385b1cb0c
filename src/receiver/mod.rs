//! Receiver endpoint: handshake, reorder buffer, and ordered delivery.

pub mod buffer;
pub mod engine;
pub mod handshake;

pub use buffer::{ReorderBuffer, ReorderEntry};
pub use engine::MtpReceiver;
pub use handshake::ReceiverPhase;

use crate::core::constants::DEFAULT_RECEIVER_SEED;

/// Receiver configuration.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// UDP port to listen on; `0` lets the OS pick one.
    pub listen_port: u16,

    /// Seed for the receiver's initial sequence number draw.
    pub seed: u64,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            listen_port: 50_000,
            seed: DEFAULT_RECEIVER_SEED,
        }
    }
}
