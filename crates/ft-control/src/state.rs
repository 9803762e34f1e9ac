//! Control plane state

use std::sync::Arc;

use ft_agent::ShellEngine;
use ft_core::config::ControlConfig;
use ft_core::Result;

use crate::approval::ApprovalGate;
use crate::backup::BackupLedger;
use crate::client::AgentClient;
use crate::mutation::FileEditor;
use crate::registry::{Bootstrapper, Registry};
use crate::sync::SyncEngine;

/// Service objects shared by the dispatcher and the console
pub struct ControlState {
    pub config: ControlConfig,
    pub shell: Arc<ShellEngine>,
    pub client: Arc<AgentClient>,
    pub registry: Arc<Registry>,
    pub sync: Arc<SyncEngine>,
    pub ledger: Arc<BackupLedger>,
    pub editor: Arc<FileEditor>,
    pub gate: Arc<ApprovalGate>,
}

impl ControlState {
    /// Start the local shell, load the registry and wire everything together
    pub async fn start(config: ControlConfig, bootstrapper: Arc<dyn Bootstrapper>) -> Result<Self> {
        let shell = Arc::new(ShellEngine::start(config.shell.clone()).await?);
        let client = Arc::new(AgentClient::new(config.agent.connect_timeout));
        let registry = Arc::new(Registry::open(
            &config,
            Arc::clone(&shell),
            Arc::clone(&client),
            bootstrapper,
        )?);
        let sync = Arc::new(SyncEngine::new(
            Arc::clone(&registry),
            Arc::clone(&client),
            config.sync.clone(),
        ));
        let ledger = Arc::new(BackupLedger::new());
        let editor = Arc::new(FileEditor::new(Arc::clone(&ledger)));
        let gate = Arc::new(ApprovalGate::new(&config.approval));

        Ok(Self {
            config,
            shell,
            client,
            registry,
            sync,
            ledger,
            editor,
            gate,
        })
    }

    pub async fn shutdown(&self) {
        self.shell.shutdown().await;
    }
}
