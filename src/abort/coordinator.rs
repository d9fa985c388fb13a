//! Turns "abort requested" into cancellation of the task in flight

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::backend::Agent;
use crate::events::StateEvent;
use crate::signals::{Signal, SignalStore};

use super::AbortFlag;

/// Per-task view of the abort latch, handed to every blocking call the task
/// makes.
///
/// Unlike the shared flag the latch never auto-clears, so an abort raised
/// early in a long agent call or synthesis is still seen when it returns.
#[derive(Debug, Clone)]
pub struct TaskAbort {
    task_id: u64,
    token: CancellationToken,
    flag: AbortFlag,
    /// Flag generation when the task began
    since: u64,
}

impl TaskAbort {
    pub fn task_id(&self) -> u64 {
        self.task_id
    }

    /// Whether abort has been raised since the task began
    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Like [`is_aborted`](Self::is_aborted), but also sees a raise that
    /// lands after the task was unregistered, while spawned speech from it
    /// is still playing
    pub fn is_raised(&self) -> bool {
        self.token.is_cancelled() || (self.flag.is_raised() && self.flag.generation() > self.since)
    }

    /// Resolves once abort is raised for this task
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Resolves once [`is_raised`](Self::is_raised) turns true
    pub async fn raised(&self, poll: Duration) {
        let mut ticker = tokio::time::interval(poll);
        loop {
            tokio::select! {
                _ = self.token.cancelled() => return,
                _ = ticker.tick() => {
                    if self.is_raised() {
                        return;
                    }
                }
            }
        }
    }

    /// Cancellation handle for collaborator calls
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

struct InFlight {
    task_id: u64,
    token: CancellationToken,
    agent: Option<Arc<dyn Agent>>,
}

/// Raises the shared flag and cancels whatever the current task is blocked on
pub struct AbortCoordinator {
    flag: AbortFlag,
    in_flight: Mutex<Option<InFlight>>,
    event_tx: broadcast::Sender<StateEvent>,
}

impl AbortCoordinator {
    pub fn new(flag: AbortFlag, event_tx: broadcast::Sender<StateEvent>) -> Self {
        Self {
            flag,
            in_flight: Mutex::new(None),
            event_tx,
        }
    }

    /// The shared flag polled by playback
    pub fn flag(&self) -> &AbortFlag {
        &self.flag
    }

    /// Raise abort. Safe from any thread at any time.
    ///
    /// Returns true if this call cancelled an in-flight task. Repeated raises
    /// only extend the flag's grace window; the agent is stopped at most once
    /// per task.
    pub fn raise(&self) -> bool {
        if self.flag.raise() {
            info!("abort raised");
            let _ = self.event_tx.send(StateEvent::AbortRaised);
        }

        let agent = {
            let mut guard = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            match guard.as_mut() {
                Some(current) if !current.token.is_cancelled() => {
                    info!(task_id = current.task_id, "cancelling task in flight");
                    current.token.cancel();
                    Some(current.agent.take())
                }
                _ => None,
            }
        };

        match agent {
            Some(Some(agent)) => {
                debug!("asking agent to stop");
                agent.stop();
                true
            }
            Some(None) => true,
            None => false,
        }
    }

    /// Register the task the worker just picked up
    pub fn begin_task(&self, task_id: u64) -> TaskAbort {
        let token = CancellationToken::new();
        let mut guard = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(InFlight {
            task_id,
            token: token.clone(),
            agent: None,
        });
        TaskAbort {
            task_id,
            token,
            flag: self.flag.clone(),
            since: self.flag.generation(),
        }
    }

    /// Record the agent the task is about to wait on so abort can stop it.
    ///
    /// Returns false if the task was already aborted; the call must not start.
    pub fn attach_agent(&self, task: &TaskAbort, agent: Arc<dyn Agent>) -> bool {
        let mut guard = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_mut() {
            Some(current) if current.task_id == task.task_id && !current.token.is_cancelled() => {
                current.agent = Some(agent);
                true
            }
            _ => false,
        }
    }

    /// The agent call returned; nothing left to stop
    pub fn detach_agent(&self, task: &TaskAbort) {
        let mut guard = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(current) = guard.as_mut() {
            if current.task_id == task.task_id {
                current.agent = None;
            }
        }
    }

    /// Unregister the task; later raises are no-ops until the next task
    pub fn end_task(&self, task: &TaskAbort) {
        let mut guard = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if guard.as_ref().is_some_and(|c| c.task_id == task.task_id) {
            *guard = None;
        }
    }

    /// Poll the signal store for external aborts, whatever the mode.
    ///
    /// Runs for the life of the daemon; each detected signal is consumed and
    /// raised exactly like a keyboard or IPC abort.
    pub async fn watch_signals(&self, store: Arc<dyn SignalStore>, poll_interval: Duration) {
        let mut ticker = tokio::time::interval(poll_interval);
        loop {
            ticker.tick().await;
            if store.take(Signal::Abort) {
                info!("abort signal detected");
                self.raise();
            }
        }
    }
}
