//! Frame header encoding/decoding
//!
//! The frame format uses an 8-byte header:
//! - magic: 1 byte (0xF7)
//! - version: 1 byte
//! - frame_kind: 1 byte (request or response)
//! - reserved: 1 byte (zero)
//! - payload_length: 4 bytes (u32, big-endian)

use bytes::{Buf, BufMut, BytesMut};

use crate::error::ProtocolError;

/// Size of the frame header in bytes
pub const HEADER_SIZE: usize = 8;

/// Maximum payload size (256MB)
///
/// Directory transfers travel as a single base64 tar archive, so this is
/// much larger than a chunked file upload ever needs.
pub const MAX_PAYLOAD_SIZE: usize = 256 * 1024 * 1024;

/// First byte of every frame
pub const MAGIC: u8 = 0xF7;

/// Current protocol version
pub const PROTOCOL_VERSION: u8 = 1;

/// Direction of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    /// Control plane to agent
    Request = 0x01,
    /// Agent to control plane
    Response = 0x02,
}

impl FrameKind {
    /// Convert to the wire byte
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Parse from the wire byte
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(FrameKind::Request),
            0x02 => Some(FrameKind::Response),
            _ => None,
        }
    }

    /// Human readable name
    pub fn name(self) -> &'static str {
        match self {
            FrameKind::Request => "request",
            FrameKind::Response => "response",
        }
    }
}

/// Frame header containing kind and length information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Direction of the frame
    pub kind: FrameKind,
    /// Length of the payload in bytes
    pub payload_length: u32,
}

impl FrameHeader {
    /// Create a new frame header
    pub fn new(kind: FrameKind, payload_length: u32) -> Self {
        Self {
            kind,
            payload_length,
        }
    }

    /// Encode the header into a byte buffer
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_SIZE);
        dst.put_u8(MAGIC);
        dst.put_u8(PROTOCOL_VERSION);
        dst.put_u8(self.kind.as_u8());
        dst.put_u8(0);
        dst.put_u32(self.payload_length);
    }

    /// Decode a header from a byte buffer
    ///
    /// Returns None if there aren't enough bytes in the buffer.
    /// Returns Err if the header is invalid.
    pub fn decode(src: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        // Validate before consuming anything
        if src[0] != MAGIC {
            return Err(ProtocolError::InvalidHeader(format!(
                "bad magic byte 0x{:02x}",
                src[0]
            )));
        }
        if src[1] != PROTOCOL_VERSION {
            return Err(ProtocolError::InvalidHeader(format!(
                "unsupported version {}",
                src[1]
            )));
        }
        let kind = FrameKind::from_u8(src[2]).ok_or(ProtocolError::UnknownFrameKind(src[2]))?;

        src.advance(4);
        let payload_length = src.get_u32();

        Ok(Some(Self {
            kind,
            payload_length,
        }))
    }
}
