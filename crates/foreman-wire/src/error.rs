//! Wire-level error types

use crate::codec::CodecError;

/// Result type for wire operations
pub type WireResult<T> = Result<T, WireError>;

/// Errors raised by framing, handshake, protocol, and dump handling
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum WireError {
    /// I/O errors from the underlying stream or the filesystem
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding or decoding failed
    #[error("{0}")]
    Codec(#[from] CodecError),

    /// A frame announced a length beyond the configured limit
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge {
        /// Announced frame length
        len: usize,
        /// Configured limit
        max: usize,
    },

    /// The peer failed (or rejected) the authentication challenge
    #[error("authentication failed")]
    AuthFailed,

    /// The peer closed the connection mid-exchange
    #[error("peer closed the connection")]
    ConnectionClosed,

    /// The peer sent something the protocol does not allow here
    #[error("protocol violation: {detail}")]
    Protocol {
        /// What was violated
        detail: String,
    },

    /// A dump file carried a different kind tag than expected
    #[error("dump {path} holds kind {found:?}, expected {expected:?}")]
    DumpKindMismatch {
        /// Path of the offending dump
        path: String,
        /// Kind tag found in the envelope
        found: String,
        /// Kind tag the caller asked for
        expected: String,
    },
}

impl WireError {
    /// Create a protocol-violation error
    pub fn protocol(detail: impl Into<String>) -> Self {
        Self::Protocol {
            detail: detail.into(),
        }
    }

    /// True for faults that mean the connection is unusable
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::AuthFailed | Self::ConnectionClosed | Self::FrameTooLarge { .. }
        )
    }
}
