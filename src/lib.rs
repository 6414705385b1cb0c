//! # MTP Protocol
//!
//! **M**essage **T**ransfer **P**rotocol - a reliable byte-stream transfer
//! protocol layered over unreliable UDP datagrams.
//!
//! MTP moves a finite byte stream from a sender endpoint to a receiver
//! endpoint with ordering and at-least-once delivery guarantees despite
//! packet loss. It provides:
//!
//! - **Reliability**: cumulative ACKs, a retransmission timeout, and
//!   fast retransmit on triple duplicate ACK
//! - **Ordering**: in-order delivery through a receiver-side reorder buffer
//! - **Flow control**: a fixed sliding window negotiated at handshake time
//!   (`MWS * MSS` outstanding bytes)
//! - **Loss injection**: a seeded Bernoulli gate that drops outbound data
//!   segments, used to exercise the retransmission paths deterministically
//!
//! ## Modules
//!
//! - [`core`]: sequence arithmetic, errors, constants, and the event observer
//! - [`wire`]: the fixed-layout 21-byte segment header codec
//! - [`transport`]: UDP datagram adapter and the loss gate
//! - [`sender`]: segment store, handshake, and the sliding-window engine
//! - [`receiver`]: handshake, reorder buffer, and the ordered-delivery engine
//!
//! ## Example Usage
//!
//! ```ignore
//! use mtp_protocol::prelude::*;
//!
//! let config = SenderConfig {
//!     receiver_addr: "127.0.0.1:7000".parse()?,
//!     ..SenderConfig::default()
//! };
//! let sender = MtpSender::connect(config, Arc::new(NullObserver)).await?;
//! sender.transfer(&payload).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod core;
pub mod receiver;
pub mod sender;
pub mod transport;
pub mod wire;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::{
        EventObserver, EventRecord, LogWriterObserver, MtpError, NullObserver, SegmentEvent,
        WireError,
    };
    pub use crate::receiver::{MtpReceiver, ReceiverConfig};
    pub use crate::sender::{MtpSender, SegmentStatus, SenderConfig};
    pub use crate::transport::{LossGate, MtpSocket};
    pub use crate::wire::SegmentHeader;
}

// Re-export commonly used items at crate root
pub use self::core::{EventObserver, MtpError, NullObserver, WireError};
pub use self::receiver::{MtpReceiver, ReceiverConfig};
pub use self::sender::{MtpSender, SenderConfig};
pub use self::wire::SegmentHeader;
