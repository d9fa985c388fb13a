//! Events module for observers of the daemon
//!
//! Provides structured event types for mode transitions, task lifecycle,
//! aborts and conversation changes. Broadcast to the IPC server and logs.

use serde::{Deserialize, Serialize};

use crate::state::Mode;

/// How a task left the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    /// Response (or command confirmation) was spoken
    Completed,
    /// No speech in the recording
    Skipped,
    /// Abort was detected at a checkpoint
    Aborted,
    /// A collaborator failed; logged and discarded
    Failed,
}

/// Events emitted by the daemon core
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateEvent {
    /// Listening mode changed
    ModeChanged { from: Mode, to: Mode },

    /// A recording was appended to the queue
    TaskQueued {
        task_id: u64,
        /// Queue length after the append
        queue_len: usize,
    },

    /// The worker picked up the head task
    TaskStarted { task_id: u64 },

    /// The head task was removed
    TaskFinished {
        task_id: u64,
        outcome: TaskOutcome,
        /// Wall time spent on the task
        duration_ms: u64,
    },

    /// Abort was raised
    AbortRaised,

    /// A new conversation was created and made active
    ConversationCreated { session_id: String },

    /// The active conversation changed
    ConversationSwitched { session_id: String },
}

impl std::fmt::Display for StateEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateEvent::ModeChanged { from, to } => write!(f, "MODE_CHANGED ({from} -> {to})"),
            StateEvent::TaskQueued { task_id, queue_len } => {
                write!(f, "TASK_QUEUED #{task_id} (queue {queue_len})")
            }
            StateEvent::TaskStarted { task_id } => write!(f, "TASK_STARTED #{task_id}"),
            StateEvent::TaskFinished {
                task_id,
                outcome,
                duration_ms,
            } => write!(f, "TASK_FINISHED #{task_id} {outcome:?} ({duration_ms}ms)"),
            StateEvent::AbortRaised => write!(f, "ABORT_RAISED"),
            StateEvent::ConversationCreated { session_id } => {
                write!(f, "CONVERSATION_CREATED {session_id}")
            }
            StateEvent::ConversationSwitched { session_id } => {
                write!(f, "CONVERSATION_SWITCHED {session_id}")
            }
        }
    }
}
