//! User-facing actions shared by the keyboard listener and the IPC server

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::abort::AbortCoordinator;
use crate::conversation::SessionRegistry;
use crate::queue::{TaskQueue, TaskSnapshot};
use crate::state::{ListeningState, Mode, ToggleOutcome};

/// Full daemon status snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Current listening mode
    pub mode: Mode,

    /// Tasks waiting or in progress
    pub queue_len: usize,

    /// The queue, head first
    pub tasks: Vec<TaskSnapshot>,

    pub active_conversation: Option<String>,

    pub conversations: Vec<String>,

    /// Whether the abort flag is currently raised
    pub abort_in_flight: bool,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

#[derive(Clone)]
pub struct Controller {
    state: ListeningState,
    abort: Arc<AbortCoordinator>,
    queue: Arc<TaskQueue>,
    conversations: Arc<dyn SessionRegistry>,
    started_at: Instant,
}

impl Controller {
    pub fn new(
        state: ListeningState,
        abort: Arc<AbortCoordinator>,
        queue: Arc<TaskQueue>,
        conversations: Arc<dyn SessionRegistry>,
    ) -> Self {
        Self {
            state,
            abort,
            queue,
            conversations,
            started_at: Instant::now(),
        }
    }

    pub fn start(&self) {
        info!("start requested");
        self.state.request_start();
    }

    pub fn stop(&self) {
        info!("stop requested");
        self.state.request_stop();
    }

    pub fn toggle(&self) -> ToggleOutcome {
        let outcome = self.state.toggle(self.abort.flag());
        info!(?outcome, "toggle requested");
        outcome
    }

    /// Returns true if a task in flight was cancelled
    pub fn abort(&self) -> bool {
        self.abort.raise()
    }

    pub fn status(&self) -> DaemonStatus {
        let tasks = self.queue.snapshot();
        DaemonStatus {
            version: env!("CARGO_PKG_VERSION").to_string(),
            mode: self.state.mode(),
            queue_len: tasks.len(),
            tasks,
            active_conversation: self.conversations.active_id(),
            conversations: self.conversations.list_ids(),
            abort_in_flight: self.abort.flag().is_raised(),
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::Signal;
    use crate::testing::{clip, create_controller};

    #[test]
    fn test_initial_status() {
        let controller = create_controller();
        let status = controller.status();
        assert_eq!(status.mode, Mode::Inactive);
        assert_eq!(status.queue_len, 0);
        assert!(status.active_conversation.is_none());
        assert!(!status.abort_in_flight);
    }

    #[test]
    fn test_status_reflects_queue_and_sessions() {
        let controller = create_controller();
        controller.queue.enqueue(clip("find cats"));
        controller.conversations.create();

        let status = controller.status();
        assert_eq!(status.queue_len, 1);
        assert_eq!(status.tasks[0].status, crate::queue::TaskStatus::Queued);
        assert_eq!(status.active_conversation.as_deref(), Some("session-1"));
        assert_eq!(status.conversations, vec!["session-1"]);
    }

    #[tokio::test]
    async fn test_toggle_and_abort() {
        let controller = create_controller();
        let store = Arc::clone(controller.state.store());

        assert_eq!(controller.toggle(), ToggleOutcome::Started);
        assert!(store.is_raised(Signal::Start));

        assert!(!controller.abort());
        assert!(controller.status().abort_in_flight);
        assert_eq!(controller.toggle(), ToggleOutcome::Rejected);
    }

    #[tokio::test]
    async fn test_external_abort_while_idle_rejects_toggle() {
        let controller = create_controller();
        let store = Arc::clone(controller.state.store());

        let abort = Arc::clone(&controller.abort);
        let watched = Arc::clone(&store);
        let watcher = tokio::spawn(async move {
            abort
                .watch_signals(watched, std::time::Duration::from_millis(10))
                .await
        });

        store.raise(Signal::Abort);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert!(controller.status().abort_in_flight);
        assert_eq!(controller.toggle(), ToggleOutcome::Rejected);
        assert!(!store.is_raised(Signal::Start));
        watcher.abort();
    }
}
