//! Error types for the MTP protocol.

use thiserror::Error;

/// Errors raised while encoding or decoding wire segments.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Datagram is too short to hold a full header.
    #[error("datagram too short: expected at least {expected} bytes, got {actual}")]
    TooShort {
        /// Minimum expected size.
        expected: usize,
        /// Actual size received.
        actual: usize,
    },

    /// The fixed terminator bit of the header is not set.
    #[error("header terminator bit is not set")]
    MissingTerminator,

    /// The header's payload length does not match the datagram.
    #[error("payload length mismatch: header says {expected}, but {actual} bytes available")]
    PayloadLengthMismatch {
        /// Payload length claimed by the header.
        expected: usize,
        /// Bytes actually available after the header.
        actual: usize,
    },
}

/// Top-level MTP errors.
#[derive(Debug, Error)]
pub enum MtpError {
    /// Wire format error.
    #[error("wire format error: {0}")]
    Wire(#[from] WireError),

    /// I/O error. Transport failures are fatal for an MTP endpoint.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}
