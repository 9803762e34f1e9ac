//! Where operator answers come from

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};

use ft_core::{FtError, Result};

/// Asks the operator a question and returns the raw answer line
#[async_trait]
pub trait Prompter: Send + Sync {
    async fn ask(&self, question: &str) -> Result<String>;
}

/// Reads answers from the process's standard input
///
/// The same line reader serves the console loop, so answers and commands
/// never race for buffered input.
#[derive(Clone)]
pub struct StdinPrompter {
    lines: Arc<tokio::sync::Mutex<Lines<BufReader<Stdin>>>>,
}

impl StdinPrompter {
    pub fn new() -> Self {
        Self {
            lines: Arc::new(tokio::sync::Mutex::new(
                BufReader::new(tokio::io::stdin()).lines(),
            )),
        }
    }

    /// Next line of input, or None at end of input
    pub async fn read_line(&self) -> Result<Option<String>> {
        self.lines
            .lock()
            .await
            .next_line()
            .await
            .map_err(|e| FtError::io("<stdin>", e))
    }
}

impl Default for StdinPrompter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Prompter for StdinPrompter {
    async fn ask(&self, question: &str) -> Result<String> {
        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(format!("{}\n> ", question).as_bytes())
            .await
            .map_err(|e| FtError::io("<stdout>", e))?;
        stdout
            .flush()
            .await
            .map_err(|e| FtError::io("<stdout>", e))?;
        Ok(self.read_line().await?.unwrap_or_default())
    }
}

/// Replays canned answers; an exhausted script answers with an empty line
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<String>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Questions asked so far
    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[async_trait]
impl Prompter for ScriptedPrompter {
    async fn ask(&self, question: &str) -> Result<String> {
        self.asked
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(question.to_string());
        Ok(self
            .answers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front()
            .unwrap_or_default())
    }
}
