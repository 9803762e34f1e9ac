//! Base64 helpers for binary content carried inside JSON payloads

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::ProtocolError;

/// Encode raw bytes for a `content` field
pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode a `content` field back into raw bytes
pub fn decode(content: &str) -> Result<Vec<u8>, ProtocolError> {
    Ok(STANDARD.decode(content.as_bytes())?)
}
