//! Tokio codec for framed protocol messages

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::envelope::{AgentRequest, AgentResponse};
use crate::error::ProtocolError;
use crate::frame::{FrameHeader, FrameKind, MAX_PAYLOAD_SIZE};

/// A complete decoded frame
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Request(AgentRequest),
    Response(AgentResponse),
}

impl Frame {
    /// Kind of this frame
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Request(_) => FrameKind::Request,
            Frame::Response(_) => FrameKind::Response,
        }
    }

    /// Unwrap a request frame
    pub fn into_request(self) -> Result<AgentRequest, ProtocolError> {
        match self {
            Frame::Request(req) => Ok(req),
            other => Err(ProtocolError::UnexpectedFrame {
                expected: FrameKind::Request.name(),
                actual: other.kind().name(),
            }),
        }
    }

    /// Unwrap a response frame
    pub fn into_response(self) -> Result<AgentResponse, ProtocolError> {
        match self {
            Frame::Response(resp) => Ok(resp),
            other => Err(ProtocolError::UnexpectedFrame {
                expected: FrameKind::Response.name(),
                actual: other.kind().name(),
            }),
        }
    }
}

/// Codec for encoding/decoding protocol frames
#[derive(Debug, Default)]
pub struct FrameCodec {
    /// Current header being decoded (if any)
    pending_header: Option<FrameHeader>,
}

impl FrameCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self {
            pending_header: None,
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let header = match self.pending_header.take() {
            Some(h) => h,
            None => match FrameHeader::decode(src)? {
                Some(h) => h,
                None => return Ok(None),
            },
        };

        let payload_len = header.payload_length as usize;
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        if src.len() < payload_len {
            src.reserve(payload_len - src.len());
            self.pending_header = Some(header);
            return Ok(None);
        }

        let payload = src.split_to(payload_len).freeze();
        let frame = match header.kind {
            FrameKind::Request => Frame::Request(serde_json::from_slice(&payload)?),
            FrameKind::Response => Frame::Response(serde_json::from_slice(&payload)?),
        };

        Ok(Some(frame))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let kind = frame.kind();
        let payload = match &frame {
            Frame::Request(req) => serde_json::to_vec(req)?,
            Frame::Response(resp) => serde_json::to_vec(resp)?,
        };
        let payload_len = payload.len();

        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        FrameHeader::new(kind, payload_len as u32).encode(dst);
        dst.extend_from_slice(&payload);

        Ok(())
    }
}
