//! Core types shared by both MTP endpoints.
//!
//! Everything here is I/O-free: protocol constants, the wraparound-safe
//! sequence arithmetic, error types, and the event observer interface.

pub mod constants;
pub mod error;
pub mod event;
pub mod seq;

pub use constants::{DEFAULT_RECEIVER_SEED, DEFAULT_SENDER_PORT, MAX_SEQUENCE};
pub use error::{MtpError, WireError};
pub use event::{
    EventObserver, EventRecord, EventReporter, LogWriterObserver, NullObserver, SegmentEvent,
};
pub use seq::{initial_seq, next_seq};
