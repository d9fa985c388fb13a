//! Core listening state machine
//!
//! The mode itself lives in the [`SignalStore`] so that external processes can
//! read it; this module owns the transition rules and applies them with a
//! read-modify-write that is serialized within the daemon.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::abort::AbortFlag;
use crate::events::StateEvent;
use crate::signals::{Signal, SignalStore};

/// The three listening modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Not recording, no task in flight
    #[default]
    Inactive,
    /// Recording in progress
    Active,
    /// A dequeued task is being worked on
    Processing,
}

impl Mode {
    /// Wire/file representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Inactive => "inactive",
            Mode::Active => "active",
            Mode::Processing => "processing",
        }
    }

    /// Parse the wire/file representation, `None` for anything unknown
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "inactive" => Some(Mode::Inactive),
            "active" => Some(Mode::Active),
            "processing" => Some(Mode::Processing),
            _ => None,
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs that can move the mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// A start signal was observed by the recorder
    Start,
    /// A stop signal was observed by the recorder
    Stop,
    /// The worker dequeued a task
    BeginTask,
    /// The worker finished a task (success, skip, abort or error)
    FinishTask,
}

/// Compute the mode after `transition`, or `None` if it does not apply.
///
/// `task_in_flight` is whether the worker holds a task once `transition`
/// has been applied. Start is accepted whenever nothing is being recorded,
/// so a new recording can begin while an earlier task is still processing.
/// BeginTask and FinishTask never overwrite an in-progress recording; a
/// recording that stops mid-task hands the mode back to that task.
pub fn next_mode(current: Mode, transition: Transition, task_in_flight: bool) -> Option<Mode> {
    match (current, transition) {
        (Mode::Inactive | Mode::Processing, Transition::Start) => Some(Mode::Active),
        (Mode::Active, Transition::Stop) if task_in_flight => Some(Mode::Processing),
        (Mode::Active, Transition::Stop) => Some(Mode::Inactive),
        (Mode::Inactive, Transition::BeginTask) => Some(Mode::Processing),
        (Mode::Processing, Transition::FinishTask) => Some(Mode::Inactive),
        _ => None,
    }
}

/// What a toggle request turned into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToggleOutcome {
    /// A start signal was raised
    Started,
    /// A stop signal was raised
    Stopped,
    /// An abort is in flight; nothing was raised
    Rejected,
}

/// Shared handle over the signal store that applies mode transitions
#[derive(Clone)]
pub struct ListeningState {
    store: Arc<dyn SignalStore>,
    /// Serializes read-modify-write of the mode inside this process
    write_lock: Arc<Mutex<()>>,
    /// Whether the worker holds a task, whatever the mode says
    task_in_flight: Arc<AtomicBool>,
    event_tx: broadcast::Sender<StateEvent>,
    poll_interval: Duration,
}

impl ListeningState {
    /// Create a new handle; `poll_interval` paces the start/stop waits
    pub fn new(
        store: Arc<dyn SignalStore>,
        event_tx: broadcast::Sender<StateEvent>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            write_lock: Arc::new(Mutex::new(())),
            task_in_flight: Arc::new(AtomicBool::new(false)),
            event_tx,
            poll_interval,
        }
    }

    /// Current mode; never blocks on the recorder or worker
    pub fn mode(&self) -> Mode {
        self.store.mode()
    }

    /// The underlying signal store
    pub fn store(&self) -> &Arc<dyn SignalStore> {
        &self.store
    }

    /// Apply a transition, returning the new mode if it changed anything
    pub fn apply(&self, transition: Transition) -> Option<Mode> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let task_in_flight = match transition {
            Transition::BeginTask => true,
            Transition::FinishTask => false,
            Transition::Start | Transition::Stop => self.task_in_flight.load(Ordering::SeqCst),
        };
        self.task_in_flight.store(task_in_flight, Ordering::SeqCst);

        let from = self.store.mode();
        let to = next_mode(from, transition, task_in_flight)?;

        self.store.set_mode(to);
        info!(%from, %to, ?transition, "mode transition");
        let _ = self.event_tx.send(StateEvent::ModeChanged { from, to });
        Some(to)
    }

    /// Consume a pending start signal; true if recording should begin
    pub fn observe_start(&self) -> bool {
        if !self.store.take(Signal::Start) {
            return false;
        }

        if self.apply(Transition::Start).is_none() {
            debug!("start signal ignored, already recording");
            return false;
        }

        // A stop raised before this recording began belongs to nobody
        self.store.clear(Signal::Stop);
        true
    }

    /// Consume a pending stop signal; true if recording should end
    pub fn observe_stop(&self) -> bool {
        if !self.store.take(Signal::Stop) {
            return false;
        }
        self.apply(Transition::Stop);
        true
    }

    /// Wait until a start signal is observed
    pub async fn wait_for_start(&self) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            ticker.tick().await;
            if self.observe_start() {
                return;
            }
        }
    }

    /// Wait until a stop signal is observed
    pub async fn wait_for_stop(&self) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            ticker.tick().await;
            if self.observe_stop() {
                return;
            }
        }
    }

    /// Raise the start signal
    pub fn request_start(&self) {
        self.store.raise(Signal::Start);
    }

    /// Raise the stop signal
    pub fn request_stop(&self) {
        self.store.raise(Signal::Stop);
    }

    /// Stop if recording or processing, start otherwise.
    ///
    /// Rejected while an abort is in flight so two cancellations never race.
    pub fn toggle(&self, abort: &AbortFlag) -> ToggleOutcome {
        if abort.is_raised() {
            warn!("abort in flight, ignoring toggle");
            return ToggleOutcome::Rejected;
        }

        match self.mode() {
            Mode::Active | Mode::Processing => {
                self.request_stop();
                ToggleOutcome::Stopped
            }
            Mode::Inactive => {
                self.request_start();
                ToggleOutcome::Started
            }
        }
    }

    /// Worker picked up a task
    pub fn begin_task(&self) {
        self.apply(Transition::BeginTask);
    }

    /// Worker is done with a task
    pub fn finish_task(&self) {
        self.apply(Transition::FinishTask);
    }

    /// Recording ended without an observed stop (device failure etc.)
    pub fn end_recording(&self) {
        self.apply(Transition::Stop);
    }
}
