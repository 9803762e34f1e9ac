//! Bounded line buffer shared between a process's reader tasks and callers

use std::collections::VecDeque;

/// Ring buffer of output lines plus the process's exit state
#[derive(Debug)]
pub(crate) struct OutputBuffer {
    lines: VecDeque<String>,
    capacity: usize,
    exit: Option<Option<i32>>,
}

impl OutputBuffer {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            exit: None,
        }
    }

    /// Append a line, dropping the oldest when full
    pub(crate) fn push(&mut self, line: String) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub(crate) fn clear(&mut self) {
        self.lines.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.lines.len()
    }

    /// Remove and return every buffered line
    pub(crate) fn drain(&mut self) -> Vec<String> {
        self.lines.drain(..).collect()
    }

    /// If a line contains `marker`, return the lines before it and clear
    pub(crate) fn take_until(&mut self, marker: &str) -> Option<Vec<String>> {
        let pos = self.lines.iter().position(|l| l.contains(marker))?;
        let before: Vec<String> = self.lines.drain(..pos).collect();
        self.lines.clear();
        Some(before)
    }

    pub(crate) fn set_exit(&mut self, code: Option<i32>) {
        self.exit = Some(code);
    }

    /// `None` while running, `Some(code)` once exited
    pub(crate) fn exit(&self) -> Option<Option<i32>> {
        self.exit
    }
}
