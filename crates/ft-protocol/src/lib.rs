//! ft-protocol: Wire protocol for fleetterm agents
//!
//! This crate defines the framed request/response protocol used between
//! the control plane and the agents running on remote machines. Every
//! call is one request frame followed by one response frame on a fresh
//! TCP connection.

pub mod action;
pub mod codec;
pub mod content;
pub mod envelope;
pub mod error;
pub mod frame;

pub use action::{
    ActionKind, DownloadData, DownloadResult, ExecuteData, ExecuteResult, TarDownloadData,
    TarDownloadResult, TarUploadData, TarUploadResult, UploadData, UploadResult,
};
pub use codec::{Frame, FrameCodec};
pub use envelope::{AgentRequest, AgentResponse};
pub use error::ProtocolError;
pub use frame::{FrameHeader, FrameKind, HEADER_SIZE, MAX_PAYLOAD_SIZE};

/// Port agents listen on unless configured otherwise
pub const DEFAULT_AGENT_PORT: u16 = 38888;
