//! Agent TCP listener
//!
//! Accepts connections and serves each on its own task. A connection
//! normally carries a single request/response pair, but the handler keeps
//! reading until the caller closes it.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use ft_protocol::{AgentResponse, Frame, FrameCodec};

use crate::handler::handle_request;
use crate::state::AgentState;

/// Listener serving the agent wire protocol
pub struct AgentServer {
    listener: TcpListener,
    state: Arc<AgentState>,
    cancel: CancellationToken,
}

impl AgentServer {
    /// Bind the listener
    pub async fn bind(
        bind_addr: &str,
        state: Arc<AgentState>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("Failed to bind to {}", bind_addr))?;
        Ok(Self {
            listener,
            state,
            cancel,
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run until cancelled
    pub async fn run(self) -> Result<()> {
        tracing::info!("Agent listening on {}", self.local_addr()?);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("Agent listener shutting down");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((socket, peer_addr)) => self.handle_connection(socket, peer_addr),
                        Err(e) => {
                            tracing::error!("Failed to accept connection: {}", e);
                        }
                    }
                }
            }
        }

        Ok(())
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        tracing::debug!("New connection from {}", peer_addr);

        let state = Arc::clone(&self.state);
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Connection handler cancelled for {}", peer_addr);
                }
                result = serve(socket, &state) => {
                    if let Err(e) = result {
                        tracing::warn!("Connection from {} closed with error: {}", peer_addr, e);
                    }
                }
            }
        });
    }
}

async fn serve(socket: TcpStream, state: &AgentState) -> Result<()> {
    let mut framed = Framed::new(socket, FrameCodec::new());

    while let Some(frame) = framed.next().await {
        let response = match frame.and_then(Frame::into_request) {
            Ok(request) => handle_request(state, request).await,
            Err(e) => {
                // Framing is lost after a bad frame; answer once and hang up
                framed
                    .send(Frame::Response(AgentResponse::err(format!(
                        "malformed request: {}",
                        e
                    ))))
                    .await?;
                return Err(e.into());
            }
        };
        framed.send(Frame::Response(response)).await?;
    }

    Ok(())
}
