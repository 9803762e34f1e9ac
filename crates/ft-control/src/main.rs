//! fleetterm control console
//!
//! Reads tool calls (JSON, one object or an array per line) or shorthand
//! commands from standard input and runs them against the registered
//! machines.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ft_control::approval::StdinPrompter;
use ft_control::registry::ScriptBootstrapper;
use ft_control::{ControlState, InterruptFlag, ToolAction, ToolCall, ToolDispatcher};
use ft_core::config::{self, ControlConfig};
use ft_core::{SlotId, TaskId};

#[derive(Parser)]
#[command(name = "ft-control")]
#[command(about = "fleetterm control console")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Registry file (overrides config)
    #[arg(long)]
    registry: Option<PathBuf>,

    /// Agent installer script (overrides config)
    #[arg(long)]
    bootstrap_script: Option<PathBuf>,

    /// Run in foreground with verbose output
    #[arg(short, long)]
    foreground: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

const HELP: &str = "\
JSON tool call or array of calls   run through the approval gate
!<command>                         run a command on the slot1 machine
:snapshot [slot1|slot2]            show terminal slots
:machines                          list registered machines
:backups                           list pending file backups
:undo <call-id>                    restore a backed-up file
:commit                            accept all pending file changes
:status <task-id>                  check a background transfer
:help                              this text
:quit                              exit";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.foreground { "debug" } else { &args.log_level };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config: ControlConfig = match &args.config {
        Some(path) => config::load_config(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => config::load_or_default(&config::default_control_config_path())
            .context("Failed to load control config")?,
    };
    if let Some(path) = args.registry {
        config.registry_path = path;
    }
    if let Some(script) = args.bootstrap_script {
        config.bootstrap.script = Some(script);
    }

    let bootstrapper = Arc::new(ScriptBootstrapper::new(config.bootstrap.script.clone()));
    let state = ControlState::start(config, bootstrapper)
        .await
        .context("Failed to start control plane")?;
    let state = Arc::new(state);

    let interrupt = InterruptFlag::new();
    let flag = interrupt.clone();
    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("Failed to listen for Ctrl+C: {}", e);
                return;
            }
            tracing::info!("Interrupt requested; remaining tool calls will be skipped");
            flag.raise();
        }
    });

    let prompter = StdinPrompter::new();
    let dispatcher = ToolDispatcher::new(
        Arc::clone(&state),
        Arc::new(prompter.clone()),
        interrupt,
    );

    println!("fleetterm control ready; :help for commands");
    let mut counter = 0u64;
    while let Some(line) = prompter.read_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == ":quit" || line == ":q" {
            break;
        }

        let calls = if let Some(command) = line.strip_prefix('!') {
            counter += 1;
            vec![ToolCall {
                id: format!("console-{}", counter),
                action: ToolAction::RunCommand {
                    command: command.trim().to_string(),
                    machine: None,
                    interactive: false,
                },
            }]
        } else if let Some(rest) = line.strip_prefix(':') {
            console_command(&state, rest);
            continue;
        } else {
            match parse_calls(line) {
                Ok(calls) => calls,
                Err(e) => {
                    println!("could not parse tool call: {}", e);
                    continue;
                }
            }
        };

        for result in dispatcher.run_batch(calls).await? {
            println!("{}", result);
        }
        if !state.ledger.is_empty() {
            println!("{}", dispatcher.confirm_turn().await?);
        }
    }

    state.shutdown().await;
    tracing::info!("Control console exiting");
    Ok(())
}

fn parse_calls(line: &str) -> serde_json::Result<Vec<ToolCall>> {
    if line.starts_with('[') {
        serde_json::from_str(line)
    } else {
        serde_json::from_str(line).map(|call| vec![call])
    }
}

fn console_command(state: &ControlState, input: &str) {
    let mut parts = input.split_whitespace();
    let command = parts.next().unwrap_or_default();
    let arg = parts.next();

    match command {
        "snapshot" => match arg.map(str::parse::<SlotId>).transpose() {
            Ok(slot) => println!("{}", state.registry.snapshot(slot)),
            Err(e) => println!("{}", e),
        },
        "machines" => {
            for machine in state.registry.list_machines() {
                println!("{}\t{}\t{}", machine.id, machine.kind, machine.address());
            }
        }
        "backups" => {
            let backups = state.ledger.list();
            if backups.is_empty() {
                println!("no pending backups");
            }
            for backup in backups {
                println!("{}", backup);
            }
        }
        "undo" => match arg {
            Some(id) => match state.ledger.undo(id) {
                Ok(report) => println!("{}", report),
                Err(e) => println!("{}", e),
            },
            None => println!("usage: :undo <call-id>"),
        },
        "commit" => println!("committed {} change(s)", state.ledger.commit_all()),
        "status" => match arg {
            Some(id) => match state.sync.status(&TaskId::from(id)) {
                Ok(status) => println!("{}", status),
                Err(e) => println!("{}", e),
            },
            None => println!("usage: :status <task-id>"),
        },
        "help" => println!("{}", HELP),
        other => println!("unknown command :{}; :help for commands", other),
    }
}
