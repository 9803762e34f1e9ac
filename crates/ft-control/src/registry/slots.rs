//! Terminal slots and transcript rendering

use std::collections::VecDeque;

use ft_core::{MachineId, SlotId};

/// Entries kept per slot
pub const TRANSCRIPT_CAPACITY: usize = 50;

/// Entries shown per slot in a snapshot
pub const SNAPSHOT_ENTRIES: usize = 10;

/// Output lines shown per entry in a snapshot
pub const SNAPSHOT_LINES: usize = 15;

/// One command and its output as it appeared in a slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub machine: MachineId,
    /// Directory the command was typed in
    pub dir: Option<String>,
    pub command: String,
    pub output: String,
}

impl TranscriptEntry {
    /// The prompt line, e.g. `root@local:~# ls`
    pub fn prompt_line(&self, home: Option<&str>) -> String {
        format!("{} {}", prompt(&self.machine, self.dir.as_deref(), home), self.command)
    }
}

/// A named binding to a machine plus its transcript
#[derive(Debug, Clone)]
pub struct TerminalSlot {
    pub id: SlotId,
    pub machine: Option<MachineId>,
    pub active: bool,
    transcript: VecDeque<TranscriptEntry>,
}

impl TerminalSlot {
    pub fn new(id: SlotId, machine: Option<MachineId>) -> Self {
        Self {
            id,
            active: machine.is_some(),
            machine,
            transcript: VecDeque::new(),
        }
    }

    /// Whether commands on `machine` show up in this slot
    pub fn shows(&self, machine: &MachineId) -> bool {
        self.active && self.machine.as_ref() == Some(machine)
    }

    pub fn bind(&mut self, machine: MachineId) {
        self.machine = Some(machine);
        self.active = true;
        self.transcript.clear();
    }

    pub fn close(&mut self) {
        self.machine = None;
        self.active = false;
        self.transcript.clear();
    }

    pub fn push(&mut self, entry: TranscriptEntry) {
        if self.transcript.len() == TRANSCRIPT_CAPACITY {
            self.transcript.pop_front();
        }
        self.transcript.push_back(entry);
    }

    pub fn entries(&self) -> impl Iterator<Item = &TranscriptEntry> {
        self.transcript.iter()
    }

    pub fn len(&self) -> usize {
        self.transcript.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transcript.is_empty()
    }

    /// Render the slot as a synthetic terminal
    ///
    /// `live_dir` is the machine's current directory, used for the trailing
    /// prompt; `home` is the local user's home directory.
    pub fn render(&self, live_dir: Option<&str>, home: Option<&str>) -> String {
        let machine = match (&self.machine, self.active) {
            (Some(machine), true) => machine,
            _ => return format!("=== {} (closed) ===", self.id),
        };

        let mut out = vec![format!("=== {} [{}] ===", self.id, machine)];
        if self.transcript.is_empty() {
            out.push("(no output yet)".to_string());
        }

        let skip = self.transcript.len().saturating_sub(SNAPSHOT_ENTRIES);
        for entry in self.transcript.iter().skip(skip) {
            out.push(entry.prompt_line(home));
            if !entry.output.is_empty() {
                out.push(truncate_lines(&entry.output, SNAPSHOT_LINES));
            }
        }

        out.push(format!("{} ", prompt(machine, live_dir, home)));
        out.join("\n")
    }
}

/// `root@<machine>:<dir>#` with known home prefixes collapsed to `~`
pub fn prompt(machine: &MachineId, dir: Option<&str>, home: Option<&str>) -> String {
    let dir = match dir {
        Some(dir) if !dir.is_empty() => {
            let local_home = if machine.is_local() { home } else { None };
            collapse_home(dir, local_home)
        }
        _ => "~".to_string(),
    };
    format!("root@{}:{}#", machine, dir)
}

/// Replace a leading home directory with `~`
///
/// `/root` and `/home/<user>` are always recognized; `local_home` adds the
/// control plane user's own home.
pub fn collapse_home(dir: &str, local_home: Option<&str>) -> String {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        return "/".to_string();
    }

    let mut homes: Vec<String> = Vec::with_capacity(3);
    if let Some(home) = local_home.map(|h| h.trim_end_matches('/')).filter(|h| !h.is_empty()) {
        homes.push(home.to_string());
    }
    homes.push("/root".to_string());
    if let Some(rest) = dir.strip_prefix("/home/") {
        let user = rest.split('/').next().unwrap_or_default();
        if !user.is_empty() {
            homes.push(format!("/home/{}", user));
        }
    }

    for home in homes {
        if dir == home {
            return "~".to_string();
        }
        if let Some(rest) = dir.strip_prefix(&home) {
            if rest.starts_with('/') {
                return format!("~{}", rest);
            }
        }
    }
    dir.to_string()
}

/// Keep the last `max` lines, noting how many were dropped
pub fn truncate_lines(text: &str, max: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() <= max {
        return text.trim_end().to_string();
    }
    let omitted = lines.len() - max;
    let mut out = vec![format!("... ({} lines omitted)", omitted)];
    out.extend(lines[omitted..].iter().map(|l| l.to_string()));
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(command: &str, output: &str) -> TranscriptEntry {
        TranscriptEntry {
            machine: MachineId::local(),
            dir: Some("/root".into()),
            command: command.into(),
            output: output.into(),
        }
    }

    #[test]
    fn test_collapse_home() {
        assert_eq!(collapse_home("/root", None), "~");
        assert_eq!(collapse_home("/root/src/app", None), "~/src/app");
        assert_eq!(collapse_home("/rootless", None), "/rootless");
        assert_eq!(collapse_home("/home/ada/notes", None), "~/notes");
        assert_eq!(collapse_home("/home/ada", None), "~");
        assert_eq!(collapse_home("/Users/ada/x", Some("/Users/ada")), "~/x");
        assert_eq!(collapse_home("/var/log/", None), "/var/log");
        assert_eq!(collapse_home("/", None), "/");
    }

    #[test]
    fn test_prompt_uses_local_home_only_for_local() {
        let home = Some("/Users/ada");
        assert_eq!(
            prompt(&MachineId::local(), Some("/Users/ada/p"), home),
            "root@local:~/p#"
        );
        assert_eq!(
            prompt(&MachineId::new("web1"), Some("/Users/ada/p"), home),
            "root@web1:/Users/ada/p#"
        );
        assert_eq!(prompt(&MachineId::new("web1"), None, None), "root@web1:~#");
    }

    #[test]
    fn test_truncate_lines() {
        let text: Vec<String> = (1..=20).map(|i| format!("l{}", i)).collect();
        let out = truncate_lines(&text.join("\n"), 15);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 16);
        assert_eq!(lines[0], "... (5 lines omitted)");
        assert_eq!(lines[1], "l6");
        assert_eq!(lines[15], "l20");

        assert_eq!(truncate_lines("a\nb\n", 15), "a\nb");
    }

    #[test]
    fn test_transcript_is_bounded() {
        let mut slot = TerminalSlot::new(SlotId::Slot1, Some(MachineId::local()));
        for i in 0..(TRANSCRIPT_CAPACITY + 5) {
            slot.push(entry(&format!("echo {}", i), ""));
        }
        assert_eq!(slot.len(), TRANSCRIPT_CAPACITY);
        assert_eq!(slot.entries().next().unwrap().command, "echo 5");
    }

    #[test]
    fn test_render_shows_last_entries() {
        let mut slot = TerminalSlot::new(SlotId::Slot1, Some(MachineId::local()));
        for i in 0..12 {
            slot.push(entry(&format!("echo {}", i), &format!("{}", i)));
        }
        let text = slot.render(Some("/root/work"), None);

        assert!(text.starts_with("=== slot1 [local] ==="));
        assert!(!text.contains("# echo 1\n"));
        assert!(text.contains("root@local:~# echo 2\n2"));
        assert!(text.contains("root@local:~# echo 11\n11"));
        assert!(text.ends_with("root@local:~/work# "));
    }

    #[test]
    fn test_render_empty_and_closed() {
        let slot = TerminalSlot::new(SlotId::Slot1, Some(MachineId::local()));
        assert!(slot.render(None, None).contains("(no output yet)"));

        let closed = TerminalSlot::new(SlotId::Slot2, None);
        assert_eq!(closed.render(None, None), "=== slot2 (closed) ===");
    }

    #[test]
    fn test_bind_clears_transcript() {
        let mut slot = TerminalSlot::new(SlotId::Slot2, None);
        assert!(!slot.active);
        slot.bind(MachineId::new("web1"));
        slot.push(entry("ls", "a"));
        assert!(slot.shows(&MachineId::new("web1")));

        slot.bind(MachineId::new("db"));
        assert!(slot.is_empty());
        assert!(!slot.shows(&MachineId::new("web1")));

        slot.close();
        assert!(!slot.shows(&MachineId::new("db")));
    }
}
