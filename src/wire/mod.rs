//! Wire format for MTP segments.
//!
//! A segment is a fixed 21-byte header followed by `0..=MSS` payload bytes.
//! [`header`] owns the bit-level header codec; [`segment`] assembles and
//! splits full datagrams.

pub mod header;
pub mod segment;

pub use header::{HEADER_BITS, HEADER_SIZE, SegmentHeader};
pub use segment::{assemble, split};
