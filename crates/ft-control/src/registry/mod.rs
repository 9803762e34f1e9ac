//! Machine and terminal-slot registry
//!
//! Single source of truth for registered machines and which machine each
//! terminal slot shows. Commands routed through [`Registry::execute`] land
//! in the transcript of every active slot bound to the target machine.

mod bootstrap;
mod slots;
mod store;

pub use bootstrap::{parse_machine_info, BootstrapRequest, Bootstrapper, MachineInfo, ScriptBootstrapper};
pub use slots::{collapse_home, prompt, truncate_lines, TerminalSlot, TranscriptEntry};
pub use store::{RegistryDocument, RegistryStore, SlotBindings};

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use ft_agent::{ShellEngine, ShellOutput};
use ft_core::auth::generate_secret;
use ft_core::config::ControlConfig;
use ft_core::{FtError, Machine, MachineId, MachineKind, Result, SlotId};

use crate::client::{AgentClient, AgentEndpoint};

/// Arguments for registering a new agent
#[derive(Debug, Clone)]
pub struct RegisterAgent {
    pub host: String,
    pub user: String,
    pub credential: String,
    pub alias: String,
}

struct RegistryInner {
    machines: Vec<Machine>,
    slots: [TerminalSlot; 2],
}

impl RegistryInner {
    fn from_document(doc: RegistryDocument) -> Self {
        Self {
            machines: doc.machines,
            slots: [
                TerminalSlot::new(SlotId::Slot1, Some(doc.slots.slot1)),
                TerminalSlot::new(SlotId::Slot2, doc.slots.slot2),
            ],
        }
    }

    fn to_document(&self) -> RegistryDocument {
        RegistryDocument {
            machines: self.machines.clone(),
            slots: SlotBindings {
                slot1: self.slots[0]
                    .machine
                    .clone()
                    .unwrap_or_else(MachineId::local),
                slot2: self.slots[1].machine.clone().filter(|_| self.slots[1].active),
            },
        }
    }

    fn machine(&self, id: &MachineId) -> Result<&Machine> {
        self.machines
            .iter()
            .find(|m| &m.id == id)
            .ok_or_else(|| FtError::not_found("machine", id.as_str()))
    }

    fn machine_mut(&mut self, id: &MachineId) -> Result<&mut Machine> {
        self.machines
            .iter_mut()
            .find(|m| &m.id == id)
            .ok_or_else(|| FtError::not_found("machine", id.as_str()))
    }

    fn slot(&self, id: SlotId) -> &TerminalSlot {
        &self.slots[slot_index(id)]
    }

    fn slot_mut(&mut self, id: SlotId) -> &mut TerminalSlot {
        &mut self.slots[slot_index(id)]
    }
}

fn slot_index(id: SlotId) -> usize {
    match id {
        SlotId::Slot1 => 0,
        SlotId::Slot2 => 1,
    }
}

/// Registry of machines and terminal slots
pub struct Registry {
    inner: RwLock<RegistryInner>,
    store: RegistryStore,
    shell: Arc<ShellEngine>,
    client: Arc<AgentClient>,
    bootstrapper: Arc<dyn Bootstrapper>,
    legacy_secret: Option<String>,
    default_agent_dir: String,
    home: Option<String>,
}

impl Registry {
    /// Load the registry file (or defaults) and wire up collaborators
    pub fn open(
        config: &ControlConfig,
        shell: Arc<ShellEngine>,
        client: Arc<AgentClient>,
        bootstrapper: Arc<dyn Bootstrapper>,
    ) -> Result<Self> {
        let store = RegistryStore::new(&config.registry_path);
        let doc = store.load()?;
        let mut inner = RegistryInner::from_document(doc);

        let local_dir = shell
            .config()
            .start_dir()
            .map(|d| d.to_string_lossy().into_owned());
        if let Ok(local) = inner.machine_mut(&MachineId::local()) {
            local.current_dir = local_dir;
        }
        for machine in inner.machines.iter_mut().filter(|m| m.kind == MachineKind::Agent) {
            machine.current_dir = Some(config.bootstrap.default_agent_dir.clone());
        }

        tracing::info!(
            "Registry loaded from {:?} with {} machines",
            store.path(),
            inner.machines.len()
        );

        Ok(Self {
            inner: RwLock::new(inner),
            store,
            shell,
            client,
            bootstrapper,
            legacy_secret: config.legacy_global_secret.clone(),
            default_agent_dir: config.bootstrap.default_agent_dir.clone(),
            home: dirs::home_dir().map(|h| h.to_string_lossy().into_owned()),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryInner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryInner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Persist while still holding the write lock so saves stay ordered
    fn persist(&self, inner: &RegistryInner) -> Result<()> {
        self.store.save(&inner.to_document()).map_err(|e| {
            tracing::warn!("Registry change kept in memory only: {}", e);
            e
        })
    }

    /// Pick the machine a command should run on
    ///
    /// An explicit id wins, otherwise whatever slot1 shows, otherwise local.
    pub fn route(&self, explicit: Option<&str>) -> Result<MachineId> {
        let inner = self.read();
        if let Some(id) = explicit.map(str::trim).filter(|s| !s.is_empty()) {
            let id = MachineId::new(id);
            inner.machine(&id)?;
            return Ok(id);
        }
        Ok(inner
            .slot(SlotId::Slot1)
            .machine
            .clone()
            .filter(|id| inner.machine(id).is_ok())
            .unwrap_or_else(MachineId::local))
    }

    /// Run a command on a machine and record it in the slots showing it
    pub async fn execute(&self, machine: &MachineId, command: &str) -> Result<ShellOutput> {
        let (kind, typed_in) = {
            let inner = self.read();
            let m = inner.machine(machine)?;
            (m.kind, m.current_dir.clone())
        };

        let result = match kind {
            MachineKind::Local => self.run_local(command).await,
            MachineKind::Agent => self.run_remote(machine, command).await,
        };

        let (output, new_dir) = match &result {
            Ok((out, dir)) => (out.output.clone(), dir.clone()),
            Err(e) => (format!("error: {}", e), None),
        };

        {
            let mut inner = self.write();
            if let Some(dir) = new_dir {
                if let Ok(m) = inner.machine_mut(machine) {
                    m.current_dir = Some(dir);
                }
            }
            for slot in inner.slots.iter_mut().filter(|s| s.shows(machine)) {
                slot.push(TranscriptEntry {
                    machine: machine.clone(),
                    dir: typed_in.clone(),
                    command: command.to_string(),
                    output: output.clone(),
                });
            }
        }

        result.map(|(out, _)| out)
    }

    async fn run_local(&self, command: &str) -> Result<(ShellOutput, Option<String>)> {
        let out = self.shell.run_in_persistent_shell(command).await?;
        let dir = if out.timed_out {
            None
        } else {
            self.shell.current_dir().await.ok()
        };
        Ok((out, dir))
    }

    async fn run_remote(
        &self,
        machine: &MachineId,
        command: &str,
    ) -> Result<(ShellOutput, Option<String>)> {
        let endpoint = self.endpoint(machine)?;
        let result = self.client.execute(&endpoint, command).await?;
        let dir = Some(result.cwd).filter(|d| !d.is_empty());
        Ok((
            ShellOutput {
                output: result.output,
                timed_out: result.timed_out,
            },
            dir,
        ))
    }

    /// Bind slot2 to a machine and show it
    pub fn open_slot(&self, slot: SlotId, machine: &MachineId) -> Result<()> {
        if slot == SlotId::Slot1 {
            return Err(FtError::Validation(
                "slot1 is always open; use switch to rebind it".to_string(),
            ));
        }
        let mut inner = self.write();
        inner.machine(machine)?;
        inner.slot_mut(slot).bind(machine.clone());
        tracing::info!("Opened {} on {}", slot, machine);
        self.persist(&inner)
    }

    /// Close slot2
    pub fn close_slot(&self, slot: SlotId) -> Result<()> {
        if slot == SlotId::Slot1 {
            return Err(FtError::Validation("slot1 cannot be closed".to_string()));
        }
        let mut inner = self.write();
        inner.slot_mut(slot).close();
        tracing::info!("Closed {}", slot);
        self.persist(&inner)
    }

    /// Rebind an open slot to another machine, clearing its transcript
    pub fn switch_slot(&self, slot: SlotId, machine: &MachineId) -> Result<()> {
        let mut inner = self.write();
        inner.machine(machine)?;
        if !inner.slot(slot).active {
            return Err(FtError::Validation(format!(
                "{} is closed; open it first",
                slot
            )));
        }
        inner.slot_mut(slot).bind(machine.clone());
        tracing::info!("Switched {} to {}", slot, machine);
        self.persist(&inner)
    }

    /// Machine a slot is bound to, if the slot is open
    pub fn slot_binding(&self, slot: SlotId) -> Option<MachineId> {
        let inner = self.read();
        let s = inner.slot(slot);
        s.machine.clone().filter(|_| s.active)
    }

    /// Render one slot, or every slot, as a synthetic terminal
    pub fn snapshot(&self, slot: Option<SlotId>) -> String {
        let inner = self.read();
        let wanted: Vec<SlotId> = match slot {
            Some(slot) => vec![slot],
            None => SlotId::ALL.to_vec(),
        };

        wanted
            .into_iter()
            .map(|id| {
                let s = inner.slot(id);
                let live_dir = s
                    .machine
                    .as_ref()
                    .and_then(|m| inner.machine(m).ok())
                    .and_then(|m| m.current_dir.clone());
                s.render(live_dir.as_deref(), self.home.as_deref())
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Install an agent and register it
    pub async fn register_agent(&self, request: RegisterAgent) -> Result<Machine> {
        if request.alias.trim().is_empty() || request.host.trim().is_empty() {
            return Err(FtError::Validation(
                "alias and host are required".to_string(),
            ));
        }
        if MachineId::new(request.alias.as_str()).is_local() {
            return Err(FtError::Validation(
                "\"local\" is reserved for this machine".to_string(),
            ));
        }

        let secret = generate_secret();
        let output = self
            .bootstrapper
            .install(&BootstrapRequest {
                host: request.host.clone(),
                user: request.user.clone(),
                credential: request.credential.clone(),
                alias: request.alias.clone(),
                secret: secret.clone(),
            })
            .await?;

        let info = parse_machine_info(&output)?;
        let id = MachineId::new(info.alias);
        if id.is_local() {
            return Err(FtError::Protocol(
                "installer reported the reserved alias \"local\"".to_string(),
            ));
        }
        let machine = Machine::agent(
            id.clone(),
            info.host,
            info.port,
            secret,
            self.default_agent_dir.clone(),
        );

        let mut inner = self.write();
        if let Some(existing) = inner.machines.iter_mut().find(|m| m.id == id) {
            tracing::info!("Re-registered agent {}", id);
            *existing = machine.clone();
        } else {
            tracing::info!("Registered agent {} at {}", id, machine.address());
            inner.machines.push(machine.clone());
        }
        self.persist(&inner)?;
        Ok(machine)
    }

    /// Forget an agent; slots showing it fall back
    pub fn remove_machine(&self, id: &MachineId) -> Result<Machine> {
        if id.is_local() {
            return Err(FtError::Validation(
                "the local machine cannot be removed".to_string(),
            ));
        }
        let mut inner = self.write();
        let pos = inner
            .machines
            .iter()
            .position(|m| &m.id == id)
            .ok_or_else(|| FtError::not_found("machine", id.as_str()))?;
        let removed = inner.machines.remove(pos);

        if inner.slot(SlotId::Slot1).machine.as_ref() == Some(id) {
            inner.slot_mut(SlotId::Slot1).bind(MachineId::local());
        }
        if inner.slot(SlotId::Slot2).machine.as_ref() == Some(id) {
            inner.slot_mut(SlotId::Slot2).close();
        }

        tracing::info!("Removed machine {}", id);
        self.persist(&inner)?;
        Ok(removed)
    }

    /// Address and secret for calling an agent
    pub fn endpoint(&self, id: &MachineId) -> Result<AgentEndpoint> {
        let inner = self.read();
        let machine = inner.machine(id)?;
        if machine.kind != MachineKind::Agent {
            return Err(FtError::Validation(format!(
                "{} is not an agent machine",
                id
            )));
        }

        let secret = match (&machine.secret, &self.legacy_secret) {
            (Some(secret), _) => secret.clone(),
            (None, Some(legacy)) => {
                tracing::warn!("{} has no secret of its own, using the legacy global key", id);
                legacy.clone()
            }
            (None, None) => {
                return Err(FtError::Validation(format!(
                    "no secret known for {}",
                    id
                )))
            }
        };

        Ok(AgentEndpoint {
            machine: id.clone(),
            address: machine.address(),
            secret,
        })
    }

    /// Cache a machine's working directory
    pub fn record_cwd(&self, id: &MachineId, dir: &str) -> Result<()> {
        let mut inner = self.write();
        inner.machine_mut(id)?.current_dir = Some(dir.to_string());
        Ok(())
    }

    pub fn machine(&self, id: &MachineId) -> Result<Machine> {
        self.read().machine(id).cloned()
    }

    pub fn list_machines(&self) -> Vec<Machine> {
        self.read().machines.clone()
    }
}
