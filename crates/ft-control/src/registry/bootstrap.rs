//! Agent installation
//!
//! Installing an agent on a fresh machine is delegated to an external
//! installer. Its combined output must contain exactly one line of the
//! form `MACHINE_INFO:<alias>:<host>:<port>` describing where the new agent
//! listens.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;

use ft_core::{FtError, Result};

const MACHINE_INFO_PREFIX: &str = "MACHINE_INFO:";

/// Everything the installer needs
#[derive(Debug, Clone)]
pub struct BootstrapRequest {
    pub host: String,
    pub user: String,
    pub credential: String,
    pub alias: String,
    /// Secret the new agent will require
    pub secret: String,
}

/// Installs an agent and returns the installer's combined output
#[async_trait]
pub trait Bootstrapper: Send + Sync {
    async fn install(&self, request: &BootstrapRequest) -> Result<String>;
}

/// Runs an installer script as `<script> <host> <user> <credential> <alias> <secret>`
pub struct ScriptBootstrapper {
    script: Option<PathBuf>,
}

impl ScriptBootstrapper {
    pub fn new(script: Option<PathBuf>) -> Self {
        Self { script }
    }
}

#[async_trait]
impl Bootstrapper for ScriptBootstrapper {
    async fn install(&self, request: &BootstrapRequest) -> Result<String> {
        let script = self.script.as_ref().ok_or_else(|| {
            FtError::Validation("no bootstrap script configured".to_string())
        })?;

        tracing::info!(
            "Installing agent {} on {}@{} via {:?}",
            request.alias,
            request.user,
            request.host,
            script
        );

        let output = tokio::process::Command::new(script)
            .arg(&request.host)
            .arg(&request.user)
            .arg(&request.credential)
            .arg(&request.alias)
            .arg(&request.secret)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| FtError::io(script, e))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            return Err(FtError::Transport(format!(
                "bootstrap of {} failed ({}): {}",
                request.host,
                output.status,
                combined.trim()
            )));
        }
        Ok(combined)
    }
}

/// Where a freshly installed agent listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineInfo {
    pub alias: String,
    pub host: String,
    pub port: u16,
}

/// Find the single `MACHINE_INFO` line in installer output
pub fn parse_machine_info(output: &str) -> Result<MachineInfo> {
    let lines: Vec<&str> = output
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with(MACHINE_INFO_PREFIX))
        .collect();

    let line = match lines.as_slice() {
        [line] => *line,
        [] => {
            return Err(FtError::Protocol(
                "installer output has no MACHINE_INFO line".to_string(),
            ))
        }
        many => {
            return Err(FtError::Protocol(format!(
                "installer output has {} MACHINE_INFO lines, expected 1",
                many.len()
            )))
        }
    };

    let body = &line[MACHINE_INFO_PREFIX.len()..];
    let malformed = || FtError::Protocol(format!("malformed MACHINE_INFO line: {}", line));

    // Split port from the right so IPv6 hosts keep their colons
    let (rest, port) = body.rsplit_once(':').ok_or_else(malformed)?;
    let (alias, host) = rest.split_once(':').ok_or_else(malformed)?;
    let port: u16 = port.trim().parse().map_err(|_| malformed())?;

    if alias.is_empty() || host.is_empty() {
        return Err(malformed());
    }

    Ok(MachineInfo {
        alias: alias.to_string(),
        host: host.to_string(),
        port,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_machine_info() {
        let output = "copying agent...\nstarting\nMACHINE_INFO:web1:10.0.0.5:38888\ndone\n";
        let info = parse_machine_info(output).unwrap();
        assert_eq!(
            info,
            MachineInfo {
                alias: "web1".into(),
                host: "10.0.0.5".into(),
                port: 38888
            }
        );
    }

    #[test]
    fn test_parse_ipv6_host() {
        let info = parse_machine_info("MACHINE_INFO:db:fe80::1:4000").unwrap();
        assert_eq!(info.host, "fe80::1");
        assert_eq!(info.port, 4000);
    }

    #[test]
    fn test_parse_requires_exactly_one_line() {
        assert!(matches!(
            parse_machine_info("nothing useful"),
            Err(FtError::Protocol(_))
        ));
        let twice = "MACHINE_INFO:a:h:1\nMACHINE_INFO:b:h:2";
        assert!(matches!(parse_machine_info(twice), Err(FtError::Protocol(_))));
    }

    #[test]
    fn test_parse_rejects_bad_port() {
        assert!(parse_machine_info("MACHINE_INFO:a:h:notaport").is_err());
        assert!(parse_machine_info("MACHINE_INFO:a:h:99999").is_err());
        assert!(parse_machine_info("MACHINE_INFO::h:1").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_script_bootstrapper_passes_arguments() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("install.sh");
        std::fs::write(&script, "#!/bin/sh\necho \"MACHINE_INFO:$4:$1:38888\"\necho \"key=$5\" >&2\n")
            .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let bootstrapper = ScriptBootstrapper::new(Some(script));
        let output = bootstrapper
            .install(&BootstrapRequest {
                host: "10.1.1.1".into(),
                user: "root".into(),
                credential: "pw".into(),
                alias: "edge".into(),
                secret: "abc".into(),
            })
            .await
            .unwrap();

        assert!(output.contains("key=abc"));
        let info = parse_machine_info(&output).unwrap();
        assert_eq!(info.alias, "edge");
        assert_eq!(info.host, "10.1.1.1");
    }

    #[tokio::test]
    async fn test_missing_script_is_validation() {
        let bootstrapper = ScriptBootstrapper::new(None);
        let err = bootstrapper
            .install(&BootstrapRequest {
                host: "h".into(),
                user: "u".into(),
                credential: "c".into(),
                alias: "a".into(),
                secret: "s".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, FtError::Validation(_)));
    }
}
