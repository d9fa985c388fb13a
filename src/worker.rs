//! Worker loop: the single consumer of the task queue
//!
//! For each head task: transcribe, confirm, classify, dispatch, speak. Abort
//! is checked at fixed checkpoints and latched per task, so the first
//! detection wins. A failing or panicking task is logged and removed; it
//! never stops the loop.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::abort::{AbortCoordinator, TaskAbort};
use crate::backend::{Agent, BackendError, SpeechOutput, Transcriber};
use crate::command::{classify, Command};
use crate::conversation::SessionRegistry;
use crate::events::{StateEvent, TaskOutcome};
use crate::queue::{ActiveTask, TaskQueue};
use crate::signals::Signal;
use crate::state::ListeningState;
use crate::transcript::TranscriptLog;

pub const NO_ACTIVE_CONVERSATION: &str =
    "No active conversation available. Please create a new conversation.";

/// Everything the worker reads from or writes to
pub struct WorkerContext {
    pub queue: Arc<TaskQueue>,
    pub state: ListeningState,
    pub abort: Arc<AbortCoordinator>,
    pub conversations: Arc<dyn SessionRegistry>,
    pub transcriber: Arc<dyn Transcriber>,
    pub speech: Arc<dyn SpeechOutput>,
    pub log: Arc<TranscriptLog>,
    pub event_tx: broadcast::Sender<StateEvent>,
}

pub struct Worker {
    ctx: WorkerContext,
}

impl Worker {
    pub fn new(ctx: WorkerContext) -> Self {
        Self { ctx }
    }

    /// Consume tasks forever
    pub async fn run(&self) {
        info!(
            transcriber = self.ctx.transcriber.name(),
            "worker started"
        );

        loop {
            self.ctx.queue.wait_for_task().await;
            self.process_next().await;
        }
    }

    /// Drive the head task to completion and remove it from the queue
    pub async fn process_next(&self) -> Option<TaskOutcome> {
        let ctx = &self.ctx;
        let task = ctx.queue.dequeue_head()?;
        let task_id = task.id;
        let started = Instant::now();

        info!(task_id, queue_len = ctx.queue.len(), "processing task");
        let _ = ctx.event_tx.send(StateEvent::TaskStarted { task_id });
        ctx.state.begin_task();

        // An abort raised while idle had nothing to cancel
        ctx.state.store().clear(Signal::Abort);
        let abort = ctx.abort.begin_task(task_id);

        let outcome = match AssertUnwindSafe(self.drive(task, &abort))
            .catch_unwind()
            .await
        {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!(task_id, error = %e, "error processing task");
                TaskOutcome::Failed
            }
            Err(panic) => {
                error!(task_id, panic = panic_message(&*panic), "task panicked");
                TaskOutcome::Failed
            }
        };

        ctx.abort.end_task(&abort);
        ctx.queue.remove_head();
        ctx.state.finish_task();

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(task_id, ?outcome, duration_ms, "task finished");
        let _ = ctx.event_tx.send(StateEvent::TaskFinished {
            task_id,
            outcome,
            duration_ms,
        });
        Some(outcome)
    }

    async fn drive(&self, task: ActiveTask, abort: &TaskAbort) -> Result<TaskOutcome, BackendError> {
        let ctx = &self.ctx;
        let task_id = task.id;

        let Some(audio) = task.audio else {
            warn!(task_id, "task has no audio");
            return Ok(TaskOutcome::Skipped);
        };

        // Transcription cannot be cancelled; an abort only discards its result
        let transcript = ctx.transcriber.transcribe(audio).await?;
        if abort.is_aborted() {
            info!(task_id, "aborted during transcription");
            ctx.abort.flag().clear();
            return Ok(TaskOutcome::Aborted);
        }

        let transcript = transcript.trim();
        if transcript.is_empty() {
            info!(task_id, "no speech detected, skipping task");
            return Ok(TaskOutcome::Skipped);
        }

        ctx.queue.set_head_transcript(transcript);
        ctx.log.push_user(transcript);
        info!(task_id, %transcript, "user");
        self.confirm(transcript, abort);

        let response = match classify(transcript) {
            Command::NewConversation => {
                let id = ctx.conversations.create();
                format!("Created new conversation with ID {id}. You are now using this conversation.")
            }
            Command::SwitchConversation(n) => match ctx.conversations.switch_to_index(n) {
                Ok(id) => format!("Switched to conversation {n} (ID: {id})"),
                Err(count) => {
                    format!("Could not find conversation {n}. Available conversations: {count}")
                }
            },
            Command::Request => match ctx.conversations.active() {
                None => NO_ACTIVE_CONVERSATION.to_string(),
                Some((session_id, agent)) => {
                    match self.ask_agent(&session_id, agent, transcript, abort).await? {
                        Some(response) => response,
                        None => return Ok(TaskOutcome::Aborted),
                    }
                }
            },
        };

        if abort.is_aborted() {
            info!(task_id, "aborted before speaking the response");
            return Ok(TaskOutcome::Aborted);
        }

        info!(task_id, %response, "assistant");
        ctx.speech.speak(&response, abort).await?;
        if abort.is_aborted() {
            info!(task_id, "response playback aborted");
            return Ok(TaskOutcome::Aborted);
        }

        ctx.log.push_assistant(&response);
        Ok(TaskOutcome::Completed)
    }

    /// Run the agent until it answers or the task is aborted.
    ///
    /// `Ok(None)` means aborted. The call itself is left to finish in the
    /// background; whatever it returns afterwards is dropped.
    async fn ask_agent(
        &self,
        session_id: &str,
        agent: Arc<dyn Agent>,
        text: &str,
        abort: &TaskAbort,
    ) -> Result<Option<String>, BackendError> {
        let task_id = abort.task_id();
        if !self.ctx.abort.attach_agent(abort, Arc::clone(&agent)) {
            info!(task_id, "aborted before the agent call");
            return Ok(None);
        }

        info!(task_id, session_id, "dispatching to agent");
        let text = text.to_string();
        let cancel = abort.token();
        let call = tokio::spawn(async move { agent.run(&text, cancel).await });

        tokio::select! {
            biased;
            _ = abort.cancelled() => {
                info!(task_id, "task aborted before the agent answered");
                Ok(None)
            }
            joined = call => {
                self.ctx.abort.detach_agent(abort);
                match joined {
                    Ok(result) => result.map(Some),
                    Err(e) => Err(BackendError::Agent(e.to_string())),
                }
            }
        }
    }

    /// Echo the transcript without blocking the turn
    fn confirm(&self, transcript: &str, abort: &TaskAbort) {
        let speech = Arc::clone(&self.ctx.speech);
        let abort = abort.clone();
        let text = format!("Message received: {transcript}");

        tokio::spawn(async move {
            if let Err(e) = speech.speak(&text, &abort).await {
                warn!(error = %e, "confirmation speech failed");
            }
        });
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
