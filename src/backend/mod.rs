//! External collaborators: recording, transcription, speech and the agent
//!
//! The core only talks to these traits. Concrete adapters shell out to a
//! capture/playback command and call OpenAI-compatible HTTP APIs.

mod agent;
mod recorder;
mod stt;
mod tts;

pub use agent::{ChatAgent, DEFAULT_SYSTEM_PROMPT};
pub use recorder::CommandRecorder;
pub use stt::WhisperTranscriber;
pub use tts::OpenAiSpeech;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::abort::TaskAbort;
use crate::state::ListeningState;

/// Errors raised by collaborators
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{service} API error {status}: {body}")]
    Api {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("agent failed: {0}")]
    Agent(String),

    #[error("agent call was stopped")]
    Stopped,

    #[error("playback failed: {0}")]
    Playback(String),
}

/// Endpoint and credentials for an OpenAI-compatible API
#[derive(Clone)]
pub struct ApiSettings {
    pub api_key: String,
    pub base_url: String,
}

impl ApiSettings {
    /// Join a path onto the base URL
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl std::fmt::Debug for ApiSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiSettings")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Captured audio on disk, owned by exactly one task.
///
/// The file is deleted when the handle is dropped, so whoever consumes it
/// (normally the transcriber) disposes of it on success and failure alike.
#[derive(Debug)]
pub struct AudioHandle {
    path: PathBuf,
}

impl AudioHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for AudioHandle {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = ?self.path, "audio file removed"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => debug!(path = ?self.path, ?e, "failed to remove audio file"),
        }
    }
}

/// Produces one recording per call
#[async_trait]
pub trait Recorder: Send + Sync {
    /// Wait for a start signal, record until a stop signal.
    ///
    /// `Ok(None)` means nothing usable was captured.
    async fn record(&self, state: &ListeningState) -> Result<Option<AudioHandle>, BackendError>;

    fn name(&self) -> &str;
}

/// Speech to text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Consume the audio and return its transcript (possibly empty)
    async fn transcribe(&self, audio: AudioHandle) -> Result<String, BackendError>;

    fn name(&self) -> &str;
}

/// Text to speech, played to completion
#[async_trait]
pub trait SpeechOutput: Send + Sync {
    /// Render and play `text`; returns promptly once `abort` is raised,
    /// whether it lands during synthesis, while waiting for the player, or
    /// mid-playback
    async fn speak(&self, text: &str, abort: &TaskAbort) -> Result<(), BackendError>;
}

/// The long-running remote agent behind one conversation
#[async_trait]
pub trait Agent: Send + Sync {
    /// Turn user text into a response; may take minutes.
    ///
    /// `cancel` is already cancelled if the task was aborted before the call
    /// got going, so a `stop` that raced ahead of the call is not lost.
    async fn run(&self, text: &str, cancel: CancellationToken) -> Result<String, BackendError>;

    /// Best-effort request to abandon the current `run`
    fn stop(&self);
}
