//! Producer loop: one recording per start/stop cycle, pushed onto the queue

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::backend::Recorder;
use crate::queue::TaskQueue;
use crate::state::{ListeningState, Mode};

pub struct RecordingLoop {
    recorder: Arc<dyn Recorder>,
    state: ListeningState,
    queue: Arc<TaskQueue>,
}

impl RecordingLoop {
    pub fn new(recorder: Arc<dyn Recorder>, state: ListeningState, queue: Arc<TaskQueue>) -> Self {
        Self {
            recorder,
            state,
            queue,
        }
    }

    /// Record forever; never blocks on the worker
    pub async fn run(&self) {
        info!(recorder = self.recorder.name(), "recording loop started");
        loop {
            self.record_once().await;
        }
    }

    /// Run one recording cycle, enqueueing the result if there is one
    pub async fn record_once(&self) -> Option<u64> {
        let task_id = match self.recorder.record(&self.state).await {
            Ok(Some(audio)) => {
                let task_id = self.queue.enqueue(audio);
                info!(task_id, queue_len = self.queue.len(), "recording queued");
                Some(task_id)
            }
            Ok(None) => {
                debug!("nothing captured");
                None
            }
            Err(e) => {
                warn!(error = %e, "recording failed");
                None
            }
        };

        // A failed capture can leave the mode stuck in Active
        if self.state.mode() == Mode::Active {
            self.state.end_recording();
        }
        task_id
    }
}
