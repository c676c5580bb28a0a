//! Persisted snapshot envelope
//!
//! Dumps written at shutdown (aggregate, leftover arguments, failures)
//! use the same codec as the transport, wrapped in a small envelope that
//! tags what the file holds and when it was written. The tag guards
//! against feeding the wrong file back into a resume run.

use std::path::Path;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::codec::AnyCodec;
use crate::error::{WireError, WireResult};

/// Kind tag of the aggregate dump
pub const DUMP_KIND_AGGREGATE: &str = "final_result";
/// Kind tag of the leftover-arguments dump
pub const DUMP_KIND_ARGS: &str = "args";
/// Kind tag of the failures dump
pub const DUMP_KIND_FAILURES: &str = "fail";

/// Self-describing wrapper around a dumped payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DumpEnvelope<T> {
    /// What the payload is (one of the `DUMP_KIND_*` tags)
    pub kind: String,
    /// RFC 3339 timestamp of when the dump was written
    pub created: String,
    /// The dumped value
    pub payload: T,
}

/// Write a tagged dump to `path`.
pub fn write_dump<T: Serialize>(
    codec: &AnyCodec,
    path: &Path,
    kind: &str,
    payload: &T,
) -> WireResult<()> {
    let envelope = DumpEnvelope {
        kind: kind.to_owned(),
        created: chrono::Local::now().to_rfc3339(),
        payload,
    };
    let bytes = codec.encode(&envelope)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Read a dump back, verifying its kind tag.
pub fn read_dump<T: DeserializeOwned>(
    codec: &AnyCodec,
    path: &Path,
    expected_kind: &str,
) -> WireResult<T> {
    let bytes = std::fs::read(path)?;
    let envelope: DumpEnvelope<T> = codec.decode(&bytes)?;
    if envelope.kind != expected_kind {
        return Err(WireError::DumpKindMismatch {
            path: path.display().to_string(),
            found: envelope.kind,
            expected: expected_kind.to_owned(),
        });
    }
    Ok(envelope.payload)
}
