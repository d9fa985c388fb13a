//! Running transcript of the session
//!
//! Kept for record-keeping only; agents do not read it. Optionally mirrored
//! to a JSON-lines file.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub role: Role,
    pub content: String,
    pub at: DateTime<Local>,
}

pub struct TranscriptLog {
    entries: Mutex<Vec<Entry>>,
    file: Option<PathBuf>,
}

impl TranscriptLog {
    pub fn new(system_prompt: &str, file: Option<PathBuf>) -> Self {
        let log = Self {
            entries: Mutex::new(Vec::new()),
            file,
        };
        log.push(Role::System, system_prompt);
        log
    }

    pub fn push_user(&self, content: &str) {
        self.push(Role::User, content);
    }

    pub fn push_assistant(&self, content: &str) {
        self.push(Role::Assistant, content);
    }

    pub fn entries(&self) -> Vec<Entry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn push(&self, role: Role, content: &str) {
        let entry = Entry {
            role,
            content: content.to_string(),
            at: Local::now(),
        };

        if let Some(path) = &self.file {
            if let Err(e) = append_line(path, &entry) {
                warn!(?path, ?e, "failed to persist transcript entry");
            }
        }

        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry);
    }
}

fn append_line(path: &PathBuf, entry: &Entry) -> anyhow::Result<()> {
    let mut line = serde_json::to_vec(entry)?;
    line.push(b'\n');
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(&line)?;
    Ok(())
}
