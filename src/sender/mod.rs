//! Sender endpoint: segment store, handshake, and the sliding-window engine.

pub mod engine;
pub mod handshake;
pub mod store;

pub use engine::MtpSender;
pub use handshake::SenderPhase;
pub use store::{Segment, SegmentStatus, SegmentStore};

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::core::constants::DEFAULT_SENDER_PORT;
use crate::core::error::MtpError;

/// Sender configuration.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Address the receiver endpoint is listening on.
    pub receiver_addr: SocketAddr,

    /// Local UDP port to bind; `0` lets the OS pick one.
    pub local_port: u16,

    /// Maximum window size in segments (MWS), negotiated at handshake.
    pub max_window_size: u16,

    /// Maximum segment payload size in bytes (MSS), negotiated at handshake.
    pub max_segment_size: u16,

    /// Retransmission timeout.
    pub timeout: Duration,

    /// Probability in `[0, 1]` that a droppable segment is discarded.
    pub drop_probability: f32,

    /// PRNG seed shared by the loss gate and the ISN draw.
    pub seed: u64,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            receiver_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 50_000),
            local_port: DEFAULT_SENDER_PORT,
            max_window_size: 8,
            max_segment_size: 512,
            timeout: Duration::from_millis(500),
            drop_probability: 0.0,
            seed: 300,
        }
    }
}

impl SenderConfig {
    /// Sliding-window budget in bytes (`MWS * MSS`).
    pub fn window_bytes(&self) -> u64 {
        u64::from(self.max_window_size) * u64::from(self.max_segment_size)
    }

    /// Reject configurations the protocol cannot run with.
    pub fn validate(&self) -> Result<(), MtpError> {
        if self.max_segment_size == 0 {
            return Err(MtpError::Config("max segment size must be at least 1".into()));
        }
        if self.max_window_size == 0 {
            return Err(MtpError::Config("max window size must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.drop_probability) {
            return Err(MtpError::Config(format!(
                "drop probability {} outside [0, 1]",
                self.drop_probability
            )));
        }
        Ok(())
    }
}
