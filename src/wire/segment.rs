//! Full-segment assembly and splitting.

use super::header::{HEADER_SIZE, SegmentHeader};
use crate::core::error::WireError;

/// Concatenate an encoded header and its payload into one datagram.
pub fn assemble(header: &SegmentHeader, payload: &[u8]) -> Vec<u8> {
    let mut datagram = Vec::with_capacity(HEADER_SIZE + payload.len());
    datagram.extend_from_slice(&header.encode());
    datagram.extend_from_slice(payload);
    datagram
}

/// Split a received datagram into its header and payload.
///
/// The payload length is taken from the header; a datagram shorter than the
/// header claims is a protocol violation and is rejected rather than
/// silently truncated.
pub fn split(datagram: &[u8]) -> Result<(SegmentHeader, &[u8]), WireError> {
    let header = SegmentHeader::decode(datagram)?;
    let payload_len = header.payload_len as usize;
    let available = datagram.len() - HEADER_SIZE;
    if available < payload_len {
        return Err(WireError::PayloadLengthMismatch {
            expected: payload_len,
            actual: available,
        });
    }
    Ok((header, &datagram[HEADER_SIZE..HEADER_SIZE + payload_len]))
}
