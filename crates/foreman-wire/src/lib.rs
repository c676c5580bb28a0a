//! # Foreman Wire Layer
//!
//! Everything that crosses a process boundary in the foreman job-dispatch
//! framework lives here: the pluggable value codec, the length-prefixed
//! frame codec, the symmetric-key handshake, the queue-protocol message
//! set, and the dump envelope used for persisted snapshots.
//!
//! ## Design
//!
//! - **Codec**: values are encoded with a self-describing format so that a
//!   dump written by one host round-trips on another. CBOR is the default;
//!   JSON is available for debugging.
//! - **Opaque values**: arguments and results travel as [`JobValue`] - the
//!   canonical encoded bytes of the user's value. The server never needs
//!   the user's type to do its set bookkeeping.
//! - **Framing**: one request or response per frame, 4-byte big-endian
//!   length prefix, bounded frame size.
//! - **Authentication**: HMAC-SHA256 challenge/response over a pre-shared
//!   key; peers that fail the challenge are disconnected.
//!
//! ## Usage
//!
//! ```rust
//! use foreman_wire::{AnyCodec, JobValue};
//!
//! let codec = AnyCodec::default();
//! let arg = JobValue::from_serialize(&codec, &(7u32, "payload")).unwrap();
//! let (n, s): (u32, String) = arg.decode(&codec).unwrap();
//! assert_eq!((n, s.as_str()), (7, "payload"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod codec;
pub mod dump;
pub mod error;
pub mod frame;
pub mod protocol;
pub mod value;

pub use auth::{join_handshake, serve_handshake, CHALLENGE_LEN};
pub use codec::{AnyCodec, CborCodec, Codec, CodecError, CodecResult, JsonCodec};
pub use dump::{
    read_dump, write_dump, DumpEnvelope, DUMP_KIND_AGGREGATE, DUMP_KIND_ARGS, DUMP_KIND_FAILURES,
};
pub use error::{WireError, WireResult};
pub use frame::{FrameCodec, DEFAULT_MAX_FRAME_LEN};
pub use protocol::{QueueItem, QueueName, Request, Response, DEFAULT_PORT};
pub use value::{FailureRecord, JobValue};
