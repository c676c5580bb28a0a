//! Client error types

use foreman_wire::{CodecError, WireError};

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Client error types
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ClientError {
    /// Could not reach the server at startup. The only condition a
    /// client process should report with a non-zero exit code.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        /// Address that was dialed
        addr: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The server rejected the presented authentication key
    #[error("server rejected the authentication key")]
    AuthRejected,

    /// An established connection died mid-run. Fatal for the affected
    /// worker, orderly for the pool.
    #[error("connection to the server lost: {detail}")]
    Disconnected {
        /// What was observed
        detail: String,
    },

    /// Wire-layer errors (framing, handshake)
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// Value encoding or decoding failed
    #[error("{0}")]
    Codec(#[from] CodecError),

    /// The server answered something the protocol does not allow here
    #[error("unexpected response: {detail}")]
    Protocol {
        /// What came back
        detail: String,
    },

    /// A worker task panicked (a bug in the pool, not the user function;
    /// user-function panics become failure records)
    #[error("worker panicked: {0}")]
    WorkerPanic(String),

    /// I/O errors outside the connection
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Create a disconnection error
    pub fn disconnected(detail: impl Into<String>) -> Self {
        Self::Disconnected {
            detail: detail.into(),
        }
    }

    /// Create a protocol error
    pub fn protocol(detail: impl Into<String>) -> Self {
        Self::Protocol {
            detail: detail.into(),
        }
    }

    /// Transport-level faults end the worker; everything else is either
    /// recoverable or a programming error.
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Connect { .. } | Self::AuthRejected | Self::Disconnected { .. } | Self::Io(_) => {
                true
            }
            Self::Wire(e) => e.is_fatal(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_classification() {
        assert!(ClientError::disconnected("eof").is_transport());
        assert!(ClientError::Wire(WireError::ConnectionClosed).is_transport());
        assert!(!ClientError::protocol("odd frame").is_transport());
        assert!(!ClientError::Codec(CodecError::decode("bad byte")).is_transport());
    }
}
