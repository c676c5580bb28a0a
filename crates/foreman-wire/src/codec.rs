//! Pluggable value codec
//!
//! The transport and the dump files share one codec so that anything a
//! client serialized can be read back by the server and vice versa. The
//! default is CBOR: binary, self-describing, and able to carry any
//! `serde`-encodable value. JSON is kept around for debugging sessions
//! where a human wants to read frames or dumps directly.

use core::fmt;

use serde::{de::DeserializeOwned, Serialize};

/// Codec error
#[derive(Debug, Clone)]
pub struct CodecError {
    /// Error message
    pub message: String,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "codec error: {}", self.message)
    }
}

impl std::error::Error for CodecError {}

impl CodecError {
    /// Create a new codec error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Create an encoding error
    pub fn encode(message: impl Into<String>) -> Self {
        Self::new(format!("encode: {}", message.into()))
    }

    /// Create a decoding error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(format!("decode: {}", message.into()))
    }
}

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Value codec trait
///
/// Abstracts over serialization formats so the transport and the dump
/// writer stay format-agnostic. Implementations must be self-describing:
/// a value encoded on one host must decode on another without out-of-band
/// schema knowledge.
pub trait Codec: Send + Sync {
    /// Encode a value to bytes
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> CodecResult<Vec<u8>>;

    /// Decode bytes to a value
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> CodecResult<T>;

    /// Content type label (e.g. "application/cbor")
    fn content_type(&self) -> &'static str;

    /// Codec name for logs and diagnostics
    fn name(&self) -> &'static str;
}

/// CBOR codec (default)
///
/// Compact, binary, self-describing. This is the format on the wire and
/// in the dump files unless configured otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct CborCodec;

impl CborCodec {
    /// Create a new CBOR codec
    pub fn new() -> Self {
        Self
    }
}

impl Codec for CborCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> CodecResult<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(value, &mut buf)
            .map_err(|e| CodecError::encode(e.to_string()))?;
        Ok(buf)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> CodecResult<T> {
        ciborium::de::from_reader(bytes).map_err(|e| CodecError::decode(e.to_string()))
    }

    fn content_type(&self) -> &'static str {
        "application/cbor"
    }

    fn name(&self) -> &'static str {
        "cbor"
    }
}

/// JSON codec
///
/// Human-readable alternative for debugging. Byte strings inflate to
/// integer arrays, so prefer CBOR for anything performance-sensitive.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec
    pub fn new() -> Self {
        Self
    }
}

impl Codec for JsonCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> CodecResult<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| CodecError::encode(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> CodecResult<T> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::decode(e.to_string()))
    }

    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn name(&self) -> &'static str {
        "json"
    }
}

/// Enum wrapper over the codec implementations
///
/// [`Codec`] has generic methods and therefore no dyn form; this enum is
/// the unified type that configs and transports hold.
#[derive(Debug, Clone, Copy)]
pub enum AnyCodec {
    /// CBOR codec (default)
    Cbor(CborCodec),
    /// JSON codec
    Json(JsonCodec),
}

impl Default for AnyCodec {
    fn default() -> Self {
        Self::Cbor(CborCodec::new())
    }
}

impl AnyCodec {
    /// Create a codec by name (`"cbor"` or `"json"`)
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "cbor" => Some(Self::Cbor(CborCodec::new())),
            "json" => Some(Self::Json(JsonCodec::new())),
            _ => None,
        }
    }

    /// List available codec names
    pub fn available_names() -> &'static [&'static str] {
        &["cbor", "json"]
    }

    /// Encode a value to bytes
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> CodecResult<Vec<u8>> {
        match self {
            Self::Cbor(c) => c.encode(value),
            Self::Json(c) => c.encode(value),
        }
    }

    /// Decode bytes to a value
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> CodecResult<T> {
        match self {
            Self::Cbor(c) => c.decode(bytes),
            Self::Json(c) => c.decode(bytes),
        }
    }

    /// Get the content type
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Cbor(c) => c.content_type(),
            Self::Json(c) => c.content_type(),
        }
    }

    /// Get the codec name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Cbor(c) => c.name(),
            Self::Json(c) => c.name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sample {
        id: u32,
        label: String,
        weights: Vec<f64>,
    }

    fn sample() -> Sample {
        Sample {
            id: 42,
            label: "probe".into(),
            weights: vec![0.25, 0.5],
        }
    }

    #[test]
    fn cbor_roundtrip() {
        let codec = CborCodec::new();
        let encoded = codec.encode(&sample()).unwrap();
        let decoded: Sample = codec.decode(&encoded).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn json_roundtrip() {
        let codec = JsonCodec::new();
        let encoded = codec.encode(&sample()).unwrap();
        let decoded: Sample = codec.decode(&encoded).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn any_codec_by_name() {
        assert_eq!(AnyCodec::from_name("cbor").unwrap().name(), "cbor");
        assert_eq!(AnyCodec::from_name("json").unwrap().name(), "json");
        assert!(AnyCodec::from_name("pickle").is_none());
        assert!(AnyCodec::available_names().contains(&"cbor"));
    }

    #[test]
    fn decode_garbage_is_an_error() {
        let codec = AnyCodec::default();
        let result: CodecResult<Sample> = codec.decode(b"\xff\xff\xff");
        assert!(result.is_err());
    }
}
