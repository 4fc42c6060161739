//! Frame encoding and decoding utilities.

use rkyv::api::high::{HighDeserializer, HighSerializer, HighValidator};
use rkyv::bytecheck::CheckBytes;
use rkyv::rancor::Error as RkyvError;
use rkyv::ser::allocator::ArenaHandle;
use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize};

use thiserror::Error;

/// Frame header size in bytes.
pub const FRAME_HEADER_SIZE: usize = 8;

/// Maximum frame size (16 MB).
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Current protocol version.
pub const CURRENT_VERSION: u16 = crate::version::CURRENT;

/// Errors produced by the frame codec.
#[derive(Error, Debug)]
pub enum CodecError {
    /// Unsupported protocol version.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u16),

    /// Message too large.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// Unknown frame type.
    #[error("unknown frame type: {0}")]
    UnknownFrameType(u16),

    /// Serialisation error.
    #[error("serialisation error: {0}")]
    Serialisation(String),

    /// Deserialisation error.
    #[error("deserialisation error: {0}")]
    Deserialisation(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Frame type discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum FrameType {
    /// A typed API request.
    Request = 0x01,
    /// The response terminating a unary call, or the first frame of a
    /// subscription stream.
    Response = 0x02,
    /// A server-push frame on a long-lived subscription.
    Stream = 0x03,
}

impl FrameType {
    /// Creates a frame type from a numeric value.
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x01 => Some(Self::Request),
            0x02 => Some(Self::Response),
            0x03 => Some(Self::Stream),
            _ => None,
        }
    }

    /// Returns the numeric value of this frame type.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }
}

/// Frame header for protocol messages.
///
/// Wire format (8 bytes, big-endian):
/// - Bytes 0-1: Protocol version (u16)
/// - Bytes 2-3: Frame type (u16)
/// - Bytes 4-7: Payload length (u32)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Protocol version.
    pub version: u16,
    /// Frame type discriminant.
    pub frame_type: FrameType,
    /// Length of the payload in bytes.
    pub payload_len: u32,
}

impl FrameHeader {
    /// Creates a new frame header.
    #[must_use]
    pub const fn new(frame_type: FrameType, payload_len: u32) -> Self {
        Self {
            version: CURRENT_VERSION,
            frame_type,
            payload_len,
        }
    }

    /// Encodes the frame header to bytes.
    #[must_use]
    pub fn encode(&self) -> [u8; FRAME_HEADER_SIZE] {
        let mut buf = [0u8; FRAME_HEADER_SIZE];
        buf[0..2].copy_from_slice(&self.version.to_be_bytes());
        buf[2..4].copy_from_slice(&self.frame_type.as_u16().to_be_bytes());
        buf[4..8].copy_from_slice(&self.payload_len.to_be_bytes());
        buf
    }

    /// Decodes a frame header from bytes.
    pub fn decode(bytes: &[u8; FRAME_HEADER_SIZE]) -> Result<Self, CodecError> {
        let version = u16::from_be_bytes([bytes[0], bytes[1]]);
        let frame_type_raw = u16::from_be_bytes([bytes[2], bytes[3]]);
        let payload_len = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);

        let frame_type =
            FrameType::from_u16(frame_type_raw).ok_or(CodecError::UnknownFrameType(frame_type_raw))?;

        Ok(Self {
            version,
            frame_type,
            payload_len,
        })
    }

    /// Checks if this header's version is supported.
    #[must_use]
    pub fn is_version_supported(&self) -> bool {
        self.version >= crate::version::MIN_SUPPORTED && self.version <= crate::version::CURRENT
    }

    /// Validates the payload length.
    pub fn validate_payload_len(&self) -> Result<(), CodecError> {
        let len = self.payload_len as usize;
        if len > MAX_MESSAGE_SIZE {
            return Err(CodecError::FrameTooLarge {
                size: len,
                max: MAX_MESSAGE_SIZE,
            });
        }
        Ok(())
    }
}

/// Codec for encoding and decoding protocol frames.
#[derive(Debug, Default)]
pub struct Codec {
    /// Reusable buffer for encoding.
    buffer: Vec<u8>,
}

impl Codec {
    /// Creates a new codec.
    #[must_use]
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Creates a codec with pre-allocated buffer capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Encodes a frame to bytes (frame header + payload).
    ///
    /// Returns the complete frame including the 8-byte header.
    pub fn encode<T>(
        &mut self,
        frame: &crate::Frame<T>,
        frame_type: FrameType,
    ) -> Result<&[u8], CodecError>
    where
        T: Archive,
        crate::Frame<T>: for<'a> Serialize<HighSerializer<AlignedVec, ArenaHandle<'a>, RkyvError>>,
    {
        let payload =
            rkyv::to_bytes::<RkyvError>(frame).map_err(|e| CodecError::Serialisation(e.to_string()))?;

        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(CodecError::FrameTooLarge {
                size: payload.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }

        let header = FrameHeader::new(frame_type, payload.len() as u32);
        self.buffer.clear();
        self.buffer.extend_from_slice(&header.encode());
        self.buffer.extend_from_slice(&payload);

        Ok(&self.buffer)
    }

    /// Decodes a frame payload from bytes.
    ///
    /// The bytes should NOT include the frame header - just the payload.
    pub fn decode<T>(bytes: &[u8]) -> Result<T, CodecError>
    where
        T: Archive,
        T::Archived: for<'a> CheckBytes<HighValidator<'a, RkyvError>>
            + Deserialize<T, HighDeserializer<RkyvError>>,
    {
        rkyv::from_bytes::<T, RkyvError>(bytes).map_err(|e| CodecError::Deserialisation(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::api::{ApiRequest, ApiResult};
    use crate::messages::state::GetStateRequest;
    use crate::{ApiStatus, Frame, StatusCode};

    #[test]
    fn frame_header_roundtrip() {
        let header = FrameHeader::new(FrameType::Request, 1024);
        let bytes = header.encode();
        let decoded = FrameHeader::decode(&bytes).unwrap();

        assert_eq!(header.version, decoded.version);
        assert_eq!(header.frame_type, decoded.frame_type);
        assert_eq!(header.payload_len, decoded.payload_len);
    }

    #[test]
    fn frame_header_version_check() {
        let header = FrameHeader::new(FrameType::Response, 100);
        assert!(header.is_version_supported());

        let old_header = FrameHeader {
            version: 0,
            frame_type: FrameType::Response,
            payload_len: 100,
        };
        assert!(!old_header.is_version_supported());
    }

    #[test]
    fn frame_header_payload_validation() {
        let valid = FrameHeader::new(FrameType::Stream, 1000);
        assert!(valid.validate_payload_len().is_ok());

        let too_large = FrameHeader::new(FrameType::Stream, (MAX_MESSAGE_SIZE + 1) as u32);
        assert!(too_large.validate_payload_len().is_err());
    }

    #[test]
    fn frame_type_roundtrip() {
        let types = [FrameType::Request, FrameType::Response, FrameType::Stream];

        for t in types {
            let value = t.as_u16();
            let restored = FrameType::from_u16(value);
            assert_eq!(restored, Some(t));
        }

        assert_eq!(FrameType::from_u16(0xFF), None);
    }

    #[test]
    fn codec_encode_decode_request() {
        let mut codec = Codec::new();
        let frame = Frame::new(ApiRequest::GetState(GetStateRequest {
            store_name: "kv".into(),
            key: "order-1".into(),
            consistency: Default::default(),
            metadata: Default::default(),
        }));

        let bytes = codec.encode(&frame, FrameType::Request).unwrap();
        assert!(bytes.len() > FRAME_HEADER_SIZE);

        let header_bytes: [u8; FRAME_HEADER_SIZE] = bytes[..FRAME_HEADER_SIZE].try_into().unwrap();
        let header = FrameHeader::decode(&header_bytes).unwrap();
        assert_eq!(header.frame_type, FrameType::Request);

        let payload = &bytes[FRAME_HEADER_SIZE..];
        let decoded: Frame<ApiRequest> = Codec::decode(payload).unwrap();
        assert_eq!(decoded.meta.correlation_id, frame.meta.correlation_id);
        match decoded.body {
            ApiRequest::GetState(req) => assert_eq!(req.key, "order-1"),
            other => panic!("expected GetState, got {other:?}"),
        }
    }

    #[test]
    fn codec_encode_decode_error_result() {
        let mut codec = Codec::new();
        let frame = Frame::new(ApiResult::Err(ApiStatus::new(
            StatusCode::NotFound,
            "ERR_STATE_STORE_NOT_FOUND",
            "state store kv is not found",
        )));

        let bytes = codec.encode(&frame, FrameType::Response).unwrap().to_vec();
        let decoded: Frame<ApiResult> = Codec::decode(&bytes[FRAME_HEADER_SIZE..]).unwrap();
        match decoded.body {
            ApiResult::Err(status) => assert_eq!(status.kind, StatusCode::NotFound),
            ApiResult::Ok(_) => panic!("expected error result"),
        }
    }
}
