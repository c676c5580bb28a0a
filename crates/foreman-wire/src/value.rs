//! Opaque job values and failure records
//!
//! An argument or result crosses the wire as the canonical encoded bytes
//! of the user's value. Keeping the encoded form end-to-end means the
//! server can hash and compare arguments without knowing the user's type,
//! and a worker handing back the exact bytes it received is guaranteed to
//! match the server's outstanding-set entry.

use core::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::codec::{AnyCodec, CodecResult};

/// One opaque user value: an argument, a result, or the constant-args
/// bundle.
///
/// Equality and hashing operate on the encoded representation, which is
/// deterministic for a given codec and value. That makes [`JobValue`]
/// usable as a set member server-side while staying fully generic over
/// the user's types.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct JobValue(Vec<u8>);

impl JobValue {
    /// Encode a user value with the given codec.
    pub fn from_serialize<T: Serialize + ?Sized>(codec: &AnyCodec, value: &T) -> CodecResult<Self> {
        Ok(Self(codec.encode(value)?))
    }

    /// Wrap bytes that are already in the codec's encoding.
    pub fn from_encoded(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Decode back into a user type.
    pub fn decode<T: de::DeserializeOwned>(&self, codec: &AnyCodec) -> CodecResult<T> {
        codec.decode(&self.0)
    }

    /// The encoded representation.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length of the encoded representation in bytes.
    pub fn encoded_len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Debug for JobValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JobValue({} bytes", self.0.len())?;
        // A short hex prefix is enough to tell values apart in logs.
        if !self.0.is_empty() {
            write!(f, ": ")?;
            for byte in self.0.iter().take(8) {
                write!(f, "{byte:02x}")?;
            }
            if self.0.len() > 8 {
                write!(f, "..")?;
            }
        }
        write!(f, ")")
    }
}

// Serialize as a byte string so CBOR stores it compactly; the JSON codec
// falls back to an integer array, which the visitor below also accepts.
impl Serialize for JobValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

struct JobValueVisitor;

impl<'de> Visitor<'de> for JobValueVisitor {
    type Value = JobValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an encoded job value (byte string)")
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
        Ok(JobValue(v.to_vec()))
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
        Ok(JobValue(v))
    }

    fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut bytes = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(byte) = seq.next_element::<u8>()? {
            bytes.push(byte);
        }
        Ok(JobValue(bytes))
    }
}

impl<'de> Deserialize<'de> for JobValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_byte_buf(JobValueVisitor)
    }
}

/// Report of one argument a worker could not process.
///
/// `error_kind` is the symbolic fault-class name (the worker-side error
/// kind, or `"panic"` when the user function panicked); `origin_host` is
/// the hostname of the reporting client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FailureRecord {
    /// The argument that failed
    pub arg: JobValue,
    /// Symbolic name of the fault class
    pub error_kind: String,
    /// Hostname of the client that reported the failure
    pub origin_host: String,
}

impl FailureRecord {
    /// Create a failure record.
    pub fn new(arg: JobValue, error_kind: impl Into<String>, origin_host: impl Into<String>) -> Self {
        Self {
            arg,
            error_kind: error_kind.into(),
            origin_host: origin_host.into(),
        }
    }
}
