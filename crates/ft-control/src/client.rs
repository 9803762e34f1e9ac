//! Agent client
//!
//! One TCP connection per call: dial with a bounded timeout, send one
//! request frame, read one response frame, close. Calls are never retried.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use ft_core::{FtError, MachineId, Result};
use ft_protocol::{
    content, ActionKind, AgentRequest, AgentResponse, DownloadData, DownloadResult, ExecuteData,
    ExecuteResult, Frame, FrameCodec, TarDownloadData, TarDownloadResult, TarUploadData,
    TarUploadResult, UploadData, UploadResult,
};

/// Where and how to reach one agent
#[derive(Debug, Clone)]
pub struct AgentEndpoint {
    pub machine: MachineId,
    /// `host:port`
    pub address: String,
    pub secret: String,
}

/// One chunk returned by a download call
#[derive(Debug, Clone)]
pub struct DownloadChunk {
    pub bytes: Vec<u8>,
    pub eof: bool,
    pub total_size: u64,
}

/// Client for the agent wire protocol
#[derive(Debug, Clone)]
pub struct AgentClient {
    connect_timeout: Duration,
}

impl AgentClient {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    /// Send one request and return the successful response
    ///
    /// `success=false` and malformed replies are Protocol errors; anything
    /// that goes wrong on the connection itself is a Transport error.
    pub async fn call<D: Serialize>(
        &self,
        endpoint: &AgentEndpoint,
        action: ActionKind,
        data: &D,
    ) -> Result<AgentResponse> {
        let request = AgentRequest::new(action, endpoint.secret.clone(), data)?;

        let stream = match tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect(&endpoint.address),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(FtError::Transport(format!(
                    "failed to connect to {} ({}): {}",
                    endpoint.machine, endpoint.address, e
                )))
            }
            Err(_) => {
                return Err(FtError::Transport(format!(
                    "connecting to {} ({}) timed out after {:?}",
                    endpoint.machine, endpoint.address, self.connect_timeout
                )))
            }
        };

        let mut framed = Framed::new(stream, FrameCodec::new());
        framed.send(Frame::Request(request)).await?;

        let response = match framed.next().await {
            Some(frame) => frame?.into_response()?,
            None => {
                return Err(FtError::Transport(format!(
                    "{} closed the connection before responding",
                    endpoint.machine
                )))
            }
        };

        if let Some(message) = response.failure() {
            return Err(FtError::Protocol(format!(
                "{} failed on {}: {}",
                action, endpoint.machine, message
            )));
        }

        tracing::debug!("{} on {} succeeded", action, endpoint.machine);
        Ok(response)
    }

    async fn call_typed<D, R>(
        &self,
        endpoint: &AgentEndpoint,
        action: ActionKind,
        data: &D,
    ) -> Result<R>
    where
        D: Serialize,
        R: DeserializeOwned,
    {
        let response = self.call(endpoint, action, data).await?;
        response.decode_fields().map_err(|e| {
            FtError::Protocol(format!(
                "malformed {} response from {}: {}",
                action, endpoint.machine, e
            ))
        })
    }

    /// Run a command in the agent's persistent shell
    pub async fn execute(&self, endpoint: &AgentEndpoint, command: &str) -> Result<ExecuteResult> {
        self.call_typed(
            endpoint,
            ActionKind::Execute,
            &ExecuteData {
                command: command.to_string(),
            },
        )
        .await
    }

    /// Write one chunk; returns the cumulative byte count acknowledged
    pub async fn upload(
        &self,
        endpoint: &AgentEndpoint,
        path: &str,
        chunk: &[u8],
        offset: u64,
        total_size: u64,
    ) -> Result<u64> {
        let result: UploadResult = self
            .call_typed(
                endpoint,
                ActionKind::Upload,
                &UploadData {
                    path: path.to_string(),
                    content: content::encode(chunk),
                    offset,
                    total_size,
                },
            )
            .await?;
        Ok(result.uploaded)
    }

    /// Read one chunk starting at `offset`
    pub async fn download(
        &self,
        endpoint: &AgentEndpoint,
        path: &str,
        offset: u64,
        chunk_size: u64,
    ) -> Result<DownloadChunk> {
        let result: DownloadResult = self
            .call_typed(
                endpoint,
                ActionKind::Download,
                &DownloadData {
                    path: path.to_string(),
                    offset,
                    chunk_size,
                },
            )
            .await?;
        Ok(DownloadChunk {
            bytes: content::decode(&result.content)?,
            eof: result.eof,
            total_size: result.total_size,
        })
    }

    /// Send a gzip-tar archive to be extracted into `path`
    pub async fn tar_upload(
        &self,
        endpoint: &AgentEndpoint,
        path: &str,
        archive: &[u8],
    ) -> Result<u64> {
        let result: TarUploadResult = self
            .call_typed(
                endpoint,
                ActionKind::TarUpload,
                &TarUploadData {
                    path: path.to_string(),
                    content: content::encode(archive),
                },
            )
            .await?;
        Ok(result.size)
    }

    /// Fetch the directory at `path` as a gzip-tar archive
    pub async fn tar_download(&self, endpoint: &AgentEndpoint, path: &str) -> Result<Vec<u8>> {
        let result: TarDownloadResult = self
            .call_typed(
                endpoint,
                ActionKind::TarDownload,
                &TarDownloadData {
                    path: path.to_string(),
                },
            )
            .await?;
        Ok(content::decode(&result.content)?)
    }
}
