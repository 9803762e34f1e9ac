//! Read-only file and directory inspection on any registered machine
//!
//! Nothing here mutates state, so the approval gate lets these calls
//! through without asking.

use std::path::{Path, PathBuf};

use ft_core::time::format_size;
use ft_core::{FtError, MachineId, Result};

use crate::client::AgentClient;
use crate::registry::Registry;
use crate::sync::shell_quote;

/// Whole-file reads longer than this return a summary instead
pub const MAX_UNRANGED_LINES: usize = 1000;

/// Local listings stop after this many entries
pub const MAX_LISTED_ENTRIES: usize = 100;

const DOWNLOAD_CHUNK: u64 = 64 * 1024;
const MISSING_MARKER: &str = "__MISSING__";

/// Roots too large to walk; use `run_command` with `ls` instead
const REFUSED_ROOTS: [&str; 4] = ["/root", "/home", "/usr", "/var"];

/// Optional 1-based inclusive line window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineRange {
    pub start: Option<usize>,
    pub end: Option<usize>,
}

impl LineRange {
    pub fn new(start: Option<usize>, end: Option<usize>) -> Self {
        Self { start, end }
    }

    fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// Read a text file from `machine`, or the routed machine when `None`
pub async fn read_file(
    registry: &Registry,
    client: &AgentClient,
    machine: Option<&str>,
    path: &str,
    range: LineRange,
) -> Result<String> {
    let target = registry.route(machine)?;
    let path = resolve(registry, &target, path)?;

    let bytes = if target.is_local() {
        tokio::fs::read(&path)
            .await
            .map_err(|e| FtError::io(&path, e))?
    } else {
        let endpoint = registry.endpoint(&target)?;
        let mut data = Vec::new();
        loop {
            let chunk = client
                .download(&endpoint, &path, data.len() as u64, DOWNLOAD_CHUNK)
                .await?;
            let empty = chunk.bytes.is_empty();
            data.extend_from_slice(&chunk.bytes);
            if chunk.eof || empty {
                break;
            }
        }
        data
    };

    tracing::debug!("Read {} bytes of {} on {}", bytes.len(), path, target);
    render_file(&path, &bytes, range)
}

/// List a directory on `machine`, defaulting to its working directory
pub async fn list_directory(
    registry: &Registry,
    client: &AgentClient,
    machine: Option<&str>,
    path: Option<&str>,
) -> Result<String> {
    let target = registry.route(machine)?;
    let path = resolve(registry, &target, path.unwrap_or("."))?;

    if target.is_local() {
        let dir = PathBuf::from(&path);
        return tokio::task::spawn_blocking(move || list_local(&dir))
            .await
            .map_err(|e| FtError::Protocol(format!("listing task failed: {}", e)))?;
    }

    let endpoint = registry.endpoint(&target)?;
    let command = format!(
        "ls -lah -- {} 2>&1 || echo {}",
        shell_quote(&path),
        MISSING_MARKER
    );
    let result = client.execute(&endpoint, &command).await?;
    if result.output.lines().any(|l| l.trim() == MISSING_MARKER) {
        return Err(FtError::not_found("directory", path));
    }
    Ok(format!(
        "{} on {}:\n```\n{}\n```",
        path,
        target,
        result.output.trim_end()
    ))
}

/// Absolute paths pass through; relative ones join the machine's last known cwd
fn resolve(registry: &Registry, machine: &MachineId, path: &str) -> Result<String> {
    let path = path.trim();
    if path.is_empty() {
        return Err(FtError::Validation("path is empty".to_string()));
    }
    if Path::new(path).is_absolute() {
        return Ok(path.to_string());
    }

    let base = match registry.machine(machine)?.current_dir {
        Some(dir) => PathBuf::from(dir),
        None if machine.is_local() => {
            std::env::current_dir().map_err(|e| FtError::io(path, e))?
        }
        None => return Ok(path.to_string()),
    };
    Ok(base.join(path).to_string_lossy().into_owned())
}

/// Format file bytes for display, honouring an optional line window
pub fn render_file(path: &str, bytes: &[u8], range: LineRange) -> Result<String> {
    let text = String::from_utf8_lossy(bytes);
    let lines: Vec<&str> = text.lines().collect();
    let total = lines.len();

    if range.is_unbounded() && total > MAX_UNRANGED_LINES {
        return Ok(format!(
            "{}\nToo large to show in full: {}, {} lines.\n\
             Pass start_line and end_line to read a window, e.g. start_line 1, end_line 100.",
            path,
            format_size(bytes.len() as u64),
            total
        ));
    }

    if let (Some(start), Some(end)) = (range.start, range.end) {
        if start > end {
            return Err(FtError::Validation(format!(
                "start_line {} is after end_line {}",
                start, end
            )));
        }
    }
    let start = range.start.unwrap_or(1).max(1);
    let end = range.end.unwrap_or(total).min(total);
    if total == 0 || start > end {
        return Ok(format!("{} ({} lines): nothing in range", path, total));
    }

    let body = lines[start - 1..end].join("\n");
    if start == 1 && end == total {
        Ok(format!("{} ({} lines):\n```\n{}\n```", path, total, body))
    } else {
        Ok(format!(
            "{} (lines {}-{} of {}):\n```\n{}\n```",
            path, start, end, total, body
        ))
    }
}

fn list_local(dir: &Path) -> Result<String> {
    let shown = dir.display().to_string();
    let trimmed = shown.trim_end_matches('/');
    if trimmed.is_empty() || REFUSED_ROOTS.contains(&trimmed) {
        return Err(FtError::Validation(format!(
            "refusing to list {}; use run_command with ls instead",
            shown
        )));
    }

    let entries = std::fs::read_dir(dir).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            FtError::not_found("directory", shown.clone())
        } else {
            FtError::io(dir, e)
        }
    })?;

    let mut rows: Vec<(String, String)> = Vec::new();
    let mut total_size = 0u64;
    let mut files = 0usize;
    for entry in entries {
        let entry = entry.map_err(|e| FtError::io(dir, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let meta = entry.metadata().map_err(|e| FtError::io(entry.path(), e))?;
        if meta.is_dir() {
            rows.push((name.clone(), format!("{}/", name)));
        } else {
            let lines = std::fs::read(entry.path())
                .map(|b| String::from_utf8_lossy(&b).lines().count())
                .unwrap_or(0);
            total_size += meta.len();
            files += 1;
            rows.push((
                name.clone(),
                format!("{} ({} lines, {})", name, lines, format_size(meta.len())),
            ));
        }
    }

    if rows.is_empty() {
        return Ok(format!("{} is empty", shown));
    }

    rows.sort_by(|a, b| a.0.cmp(&b.0));
    let count = rows.len();
    let listing: Vec<String> = rows
        .into_iter()
        .take(MAX_LISTED_ENTRIES)
        .map(|(_, row)| row)
        .collect();

    let mut out = format!("{}:\n{}\n\n", shown, listing.join("\n"));
    if count > MAX_LISTED_ENTRIES {
        out.push_str(&format!(
            "first {} of {} entries shown; {} files, {}",
            MAX_LISTED_ENTRIES,
            count,
            files,
            format_size(total_size)
        ));
    } else {
        out.push_str(&format!("{} files, {}", files, format_size(total_size)));
    }
    Ok(out)
}
