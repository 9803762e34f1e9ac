//! Agent actions and their typed payloads
//!
//! Each action carries a `data` object in the request and a set of result
//! fields flattened into the response envelope.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Operation requested from an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Run a command in the agent's persistent shell
    Execute,
    /// Write one chunk of a file
    Upload,
    /// Read one chunk of a file
    Download,
    /// Extract a gzip-tar archive into a directory
    TarUpload,
    /// Pack a directory into a gzip-tar archive
    TarDownload,
}

impl ActionKind {
    /// Wire name of the action
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Execute => "execute",
            ActionKind::Upload => "upload",
            ActionKind::Download => "download",
            ActionKind::TarUpload => "tar_upload",
            ActionKind::TarDownload => "tar_download",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteData {
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteResult {
    /// Combined stdout and stderr of the command
    pub output: String,
    /// Working directory of the shell after the command ran
    pub cwd: String,
    /// The completion marker was not seen before the poll budget ran out
    #[serde(default)]
    pub timed_out: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadData {
    pub path: String,
    /// Base64-encoded chunk
    pub content: String,
    /// Byte offset of this chunk in the target file
    pub offset: u64,
    /// Size of the whole file being uploaded
    pub total_size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    /// Bytes written so far, i.e. offset + chunk length
    pub uploaded: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadData {
    pub path: String,
    pub offset: u64,
    pub chunk_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadResult {
    /// Base64-encoded chunk
    pub content: String,
    /// No bytes remain after this chunk
    pub eof: bool,
    /// Size of the whole remote file
    #[serde(default)]
    pub total_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TarUploadData {
    /// Directory to extract into
    pub path: String,
    /// Base64-encoded gzip-tar archive
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TarUploadResult {
    /// Archive size in bytes
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TarDownloadData {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TarDownloadResult {
    /// Base64-encoded gzip-tar archive
    pub content: String,
    /// Archive size in bytes
    #[serde(default)]
    pub size: u64,
}
