//! Test doubles for the collaborators

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::abort::{AbortCoordinator, AbortFlag, TaskAbort};
use crate::backend::{Agent, AudioHandle, BackendError, Recorder, SpeechOutput, Transcriber};
use crate::control::Controller;
use crate::conversation::ConversationManager;
use crate::queue::TaskQueue;
use crate::signals::{MemorySignalStore, SignalStore};
use crate::state::ListeningState;

/// Audio whose transcript (under [`MockTranscriber`]) is `text`
pub fn clip(text: &str) -> AudioHandle {
    AudioHandle::new(format!("/nonexistent/{text}.wav"))
}

/// Agent answering with a fixed response after a delay
pub struct MockAgent {
    response: String,
    delay: Duration,
    fail: bool,
    runs: AtomicUsize,
    stops: AtomicUsize,
}

impl MockAgent {
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            delay: Duration::ZERO,
            fail: false,
            runs: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn run_count(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Agent for MockAgent {
    async fn run(&self, _text: &str, _cancel: CancellationToken) -> Result<String, BackendError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.fail {
            return Err(BackendError::Agent("browser crashed".to_string()));
        }
        Ok(self.response.clone())
    }

    fn stop(&self) {
        // Counted only; a running call is not interrupted and the token is
        // ignored, like an agent that cannot unwind
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Transcribes a [`clip`] back to its text; `FAIL` errors, `PANIC` panics
#[derive(Default)]
pub struct MockTranscriber {
    delay: Duration,
}

impl MockTranscriber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, audio: AudioHandle) -> Result<String, BackendError> {
        tokio::time::sleep(self.delay).await;
        let text = audio
            .path()
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        match text.as_str() {
            "FAIL" => Err(BackendError::Api {
                service: "mock",
                status: 500,
                body: "unavailable".to_string(),
            }),
            "PANIC" => panic!("transcriber blew up"),
            _ => Ok(text),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Speech output that records what it was asked to say and what it
/// actually finished playing.
///
/// Synthesis ignores abort, like a slow HTTP call; playback polls it.
#[derive(Default)]
pub struct RecordingSpeech {
    spoken: Mutex<Vec<String>>,
    played: Mutex<Vec<String>>,
    synthesis: Duration,
    playback: Duration,
}

impl RecordingSpeech {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_synthesis(mut self, synthesis: Duration) -> Self {
        self.synthesis = synthesis;
        self
    }

    pub fn with_playback(mut self, playback: Duration) -> Self {
        self.playback = playback;
        self
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    pub fn played(&self) -> Vec<String> {
        self.played.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechOutput for RecordingSpeech {
    async fn speak(&self, text: &str, abort: &TaskAbort) -> Result<(), BackendError> {
        self.spoken.lock().unwrap().push(text.to_string());
        tokio::time::sleep(self.synthesis).await;

        let deadline = tokio::time::Instant::now() + self.playback;
        loop {
            if abort.is_raised() {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.played.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Recorder replaying a script of results, one per start/stop cycle
pub struct ScriptedRecorder {
    script: Mutex<VecDeque<Option<AudioHandle>>>,
}

impl ScriptedRecorder {
    pub fn new(script: Vec<Option<AudioHandle>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
        }
    }
}

#[async_trait]
impl Recorder for ScriptedRecorder {
    async fn record(&self, state: &ListeningState) -> Result<Option<AudioHandle>, BackendError> {
        state.wait_for_start().await;
        state.wait_for_stop().await;
        let next = self.script.lock().unwrap().pop_front();
        Ok(next.flatten())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Controller over in-memory state with no conversations
pub fn create_controller() -> Controller {
    let (tx, _) = broadcast::channel(64);
    let store: Arc<dyn SignalStore> = Arc::new(MemorySignalStore::new());
    let state = ListeningState::new(store, tx.clone(), Duration::from_millis(5));
    let abort = Arc::new(AbortCoordinator::new(
        AbortFlag::new(Duration::from_millis(200)),
        tx.clone(),
    ));
    let queue = Arc::new(TaskQueue::new(tx.clone()));
    let conversations = Arc::new(ConversationManager::new(
        Box::new(|_: &str| Arc::new(MockAgent::new("ok")) as Arc<dyn Agent>),
        tx,
    ));
    Controller::new(state, abort, queue, conversations)
}
