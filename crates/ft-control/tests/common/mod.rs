//! Shared fixtures for control plane integration tests

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use ft_agent::{AgentServer, AgentState, ShellEngine};
use ft_control::registry::{BootstrapRequest, Bootstrapper, RegisterAgent};
use ft_control::ControlState;
use ft_core::config::{AgentConfig, ControlConfig, ShellConfig, SyncConfig};
use ft_core::{MachineId, Result};
use ft_protocol::{
    content, ActionKind, AgentRequest, AgentResponse, DownloadData, DownloadResult, ExecuteData,
    ExecuteResult, Frame, FrameCodec, TarDownloadResult, TarUploadData, TarUploadResult,
    UploadData, UploadResult,
};

pub fn fast_shell(dir: &Path) -> ShellConfig {
    ShellConfig {
        working_dir: Some(dir.to_path_buf()),
        poll_interval: Duration::from_millis(20),
        settle: Duration::from_millis(20),
        ..ShellConfig::default()
    }
}

/// Start a real agent listener on an ephemeral port
pub async fn start_agent(dir: &Path, secret: &str, cancel: CancellationToken) -> u16 {
    let engine = Arc::new(ShellEngine::start(fast_shell(dir)).await.unwrap());
    let state = Arc::new(AgentState::new(
        AgentConfig::default(),
        secret.to_string(),
        engine,
    ));
    let server = AgentServer::bind("127.0.0.1:0", state, cancel).await.unwrap();
    let port = server.local_addr().unwrap().port();
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    port
}

/// A scripted agent whose transfer calls each take `delay`
#[derive(Debug, Clone, Default)]
pub struct SlowAgent {
    pub delay: Duration,
    /// Served to `download`
    pub file: Vec<u8>,
    /// Remote paths reported as directories by the kind check
    pub dirs: Vec<String>,
    /// Served to `tar_download`
    pub archive: Vec<u8>,
}

impl SlowAgent {
    fn respond(&self, request: &AgentRequest) -> AgentResponse {
        let result = match request.action {
            ActionKind::Execute => {
                let data: ExecuteData = request.parse_data().unwrap();
                let is_dir = self.dirs.iter().any(|d| data.command.contains(d.as_str()));
                AgentResponse::ok(&ExecuteResult {
                    output: if is_dir { "__DIR__" } else { "__FILE__" }.to_string(),
                    cwd: "/srv".to_string(),
                    timed_out: false,
                })
            }
            ActionKind::Upload => {
                let data: UploadData = request.parse_data().unwrap();
                let len = content::decode(&data.content).unwrap().len() as u64;
                AgentResponse::ok(&UploadResult {
                    uploaded: data.offset + len,
                })
            }
            ActionKind::Download => {
                let data: DownloadData = request.parse_data().unwrap();
                let total = self.file.len() as u64;
                let start = data.offset.min(total);
                let end = (start + data.chunk_size).min(total);
                AgentResponse::ok(&DownloadResult {
                    content: content::encode(&self.file[start as usize..end as usize]),
                    eof: end >= total,
                    total_size: total,
                })
            }
            ActionKind::TarUpload => {
                let data: TarUploadData = request.parse_data().unwrap();
                AgentResponse::ok(&TarUploadResult {
                    size: content::decode(&data.content).unwrap().len() as u64,
                })
            }
            ActionKind::TarDownload => AgentResponse::ok(&TarDownloadResult {
                content: content::encode(&self.archive),
                size: self.archive.len() as u64,
            }),
        };
        result.unwrap()
    }
}

/// Start a scripted agent on an ephemeral port
pub async fn start_slow_agent(agent: SlowAgent) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let agent = Arc::new(agent);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let agent = Arc::clone(&agent);
            tokio::spawn(async move {
                let mut framed = Framed::new(stream, FrameCodec::new());
                while let Some(Ok(frame)) = framed.next().await {
                    let Ok(request) = frame.into_request() else {
                        return;
                    };
                    if request.action != ActionKind::Execute {
                        tokio::time::sleep(agent.delay).await;
                    }
                    let response = agent.respond(&request);
                    if framed.send(Frame::Response(response)).await.is_err() {
                        return;
                    }
                }
            });
        }
    });
    port
}

/// Installs agents by launching them in-process with the generated secret
pub struct InProcessBootstrapper {
    agent_dir: std::path::PathBuf,
    cancel: CancellationToken,
    slow: Option<SlowAgent>,
    pub installs: Mutex<Vec<String>>,
}

impl InProcessBootstrapper {
    pub fn new(agent_dir: &Path, cancel: CancellationToken) -> Self {
        Self {
            agent_dir: agent_dir.to_path_buf(),
            cancel,
            slow: None,
            installs: Mutex::new(Vec::new()),
        }
    }

    pub fn slow(agent_dir: &Path, cancel: CancellationToken, agent: SlowAgent) -> Self {
        Self {
            slow: Some(agent),
            ..Self::new(agent_dir, cancel)
        }
    }
}

#[async_trait]
impl Bootstrapper for InProcessBootstrapper {
    async fn install(&self, request: &BootstrapRequest) -> Result<String> {
        self.installs.lock().unwrap().push(request.alias.clone());
        let port = match &self.slow {
            Some(agent) => start_slow_agent(agent.clone()).await,
            None => start_agent(&self.agent_dir, &request.secret, self.cancel.clone()).await,
        };
        Ok(format!(
            "installing...\nMACHINE_INFO:{}:127.0.0.1:{}\ndone",
            request.alias, port
        ))
    }
}

/// Control state rooted in `dir`, with the given sync settings
pub async fn control_state(
    dir: &Path,
    sync: SyncConfig,
    bootstrapper: Arc<dyn Bootstrapper>,
) -> Arc<ControlState> {
    let config = ControlConfig {
        registry_path: dir.join("registry.json"),
        shell: fast_shell(dir),
        sync,
        ..ControlConfig::default()
    };
    Arc::new(ControlState::start(config, bootstrapper).await.unwrap())
}

pub async fn register(state: &ControlState, alias: &str) -> MachineId {
    state
        .registry
        .register_agent(RegisterAgent {
            host: "127.0.0.1".into(),
            user: "root".into(),
            credential: "unused".into(),
            alias: alias.into(),
        })
        .await
        .unwrap()
        .id
}
