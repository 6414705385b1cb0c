//! Protocol constants fixed by the MTP wire format.
//!
//! These values are shared by both endpoints and MUST NOT diverge between
//! them: mismatched constants desynchronize sequence tracking irrecoverably.

use std::time::Duration;

/// Largest representable sequence number (inclusive).
///
/// The sequence space is the non-negative half of a signed 32-bit integer;
/// see [`crate::core::seq::next_seq`] for the overflow policy.
pub const MAX_SEQUENCE: u32 = 2_147_483_647;

/// Local UDP port the sender binds by default.
pub const DEFAULT_SENDER_PORT: u16 = 50_001;

/// Seed for the receiver's initial sequence number draw.
pub const DEFAULT_RECEIVER_SEED: u64 = 50;

/// How often the receiver's drain loop polls the reorder buffer.
pub const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(2);
