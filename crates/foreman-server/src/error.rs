//! Server error types and handling

use std::net::SocketAddr;
use std::path::Path;

use foreman_wire::{CodecError, WireError};

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;

/// Server error types
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ServerError {
    /// A caller violated an API precondition (wrong context, broken
    /// seeding invariant). Loud and descriptive; no dumps are written.
    #[error("precondition violated: {message}")]
    Precondition {
        /// What was violated
        message: String,
    },

    /// The queue transport could not bind its listen address
    #[error("failed to bind queue transport on {addr}: {source}")]
    Bind {
        /// Address that was requested
        addr: SocketAddr,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// I/O errors outside the transport
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Wire-layer errors (framing, handshake, dump envelope)
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// Value encoding or decoding failed
    #[error("{0}")]
    Codec(#[from] CodecError),

    /// The user aggregator failed while folding or finalizing
    #[error("aggregator failed: {message}")]
    Aggregate {
        /// Rendered aggregator error
        message: String,
    },

    /// Writing a shutdown dump failed
    #[error("dump to {path} failed: {source}")]
    Dump {
        /// Target path of the dump
        path: String,
        /// Underlying wire error
        #[source]
        source: WireError,
    },

    /// Internal invariant broke; a bug in the dispatcher itself
    #[error("internal server error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Create a precondition error
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition {
            message: message.into(),
        }
    }

    /// Create an aggregator error
    pub fn aggregate(source: impl std::fmt::Display) -> Self {
        Self::Aggregate {
            message: source.to_string(),
        }
    }

    /// Create a dump error
    pub fn dump(path: &Path, source: WireError) -> Self {
        Self::Dump {
            path: path.display().to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_context() {
        let e = ServerError::precondition("seed arguments through put_arg");
        assert_eq!(
            e.to_string(),
            "precondition violated: seed arguments through put_arg"
        );

        let e = ServerError::dump(Path::new("out/final.dump"), WireError::AuthFailed);
        assert!(e.to_string().contains("out/final.dump"));
    }
}
