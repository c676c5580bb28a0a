//! Length-prefixed frame codec
//!
//! One codec-encoded message per frame: a 4-byte big-endian length
//! followed by the payload. The length is validated against a configurable
//! limit before any allocation happens, so a malformed or hostile peer
//! cannot make the process balloon.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::WireError;

/// Default frame size limit (16 MiB)
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const LEN_PREFIX: usize = 4;

/// Frame codec for [`tokio_util::codec::Framed`]
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_len: usize,
}

impl FrameCodec {
    /// Create a frame codec with the default size limit
    pub fn new() -> Self {
        Self {
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    /// Create a frame codec with a custom size limit
    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self { max_frame_len }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, WireError> {
        if src.len() < LEN_PREFIX {
            return Ok(None);
        }
        let mut prefix = [0u8; LEN_PREFIX];
        prefix.copy_from_slice(&src[..LEN_PREFIX]);
        let len = u32::from_be_bytes(prefix) as usize;
        if len > self.max_frame_len {
            return Err(WireError::FrameTooLarge {
                len,
                max: self.max_frame_len,
            });
        }
        if src.len() < LEN_PREFIX + len {
            src.reserve(LEN_PREFIX + len - src.len());
            return Ok(None);
        }
        src.advance(LEN_PREFIX);
        Ok(Some(src.split_to(len).freeze()))
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = WireError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), WireError> {
        if item.len() > self.max_frame_len {
            return Err(WireError::FrameTooLarge {
                len: item.len(),
                max: self.max_frame_len,
            });
        }
        dst.reserve(LEN_PREFIX + item.len());
        dst.put_u32(item.len() as u32);
        dst.extend_from_slice(&item);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_survive_partial_arrival() {
        let mut codec = FrameCodec::new();
        let mut wire = BytesMut::new();
        codec.encode(Bytes::from_static(b"hello"), &mut wire).unwrap();
        codec.encode(Bytes::from_static(b"world!"), &mut wire).unwrap();

        // Feed byte by byte; the decoder must never mis-frame.
        let mut rx = BytesMut::new();
        let mut out = Vec::new();
        for byte in wire.iter() {
            rx.extend_from_slice(&[*byte]);
            while let Some(frame) = codec.decode(&mut rx).unwrap() {
                out.push(frame);
            }
        }
        assert_eq!(out, vec![Bytes::from_static(b"hello"), Bytes::from_static(b"world!")]);
        assert!(rx.is_empty());
    }

    #[test]
    fn empty_frame_is_legal() {
        let mut codec = FrameCodec::new();
        let mut wire = BytesMut::new();
        codec.encode(Bytes::new(), &mut wire).unwrap();
        let frame = codec.decode(&mut wire).unwrap().unwrap();
        assert!(frame.is_empty());
    }

    #[test]
    fn oversized_announcement_is_rejected_before_buffering() {
        let mut codec = FrameCodec::with_max_frame_len(16);
        let mut rx = BytesMut::new();
        rx.put_u32(1024);
        match codec.decode(&mut rx) {
            Err(WireError::FrameTooLarge { len: 1024, max: 16 }) => {}
            other => panic!("expected FrameTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn oversized_payload_is_not_sent() {
        let mut codec = FrameCodec::with_max_frame_len(4);
        let mut wire = BytesMut::new();
        assert!(codec.encode(Bytes::from_static(b"too big"), &mut wire).is_err());
        assert!(wire.is_empty());
    }
}
