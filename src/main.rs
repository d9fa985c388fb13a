//! syri-daemon: voice-driven control loop
//!
//! Records while the user holds the floor, queues each recording, and works
//! the queue one task at a time: transcribe, classify, hand to the active
//! conversation's agent, speak the answer. Control comes from:
//! - the keyboard (Enter toggles, `a` aborts, `q` quits)
//! - trigger files under the trigger directory
//! - the IPC socket

mod abort;
mod backend;
mod command;
mod config;
mod control;
mod conversation;
mod events;
mod hotkey;
mod ipc;
mod lifecycle;
mod queue;
mod recording;
mod signals;
mod state;
mod transcript;
mod worker;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::abort::{AbortCoordinator, AbortFlag};
use crate::backend::{
    Agent, ChatAgent, CommandRecorder, OpenAiSpeech, WhisperTranscriber, DEFAULT_SYSTEM_PROMPT,
};
use crate::config::Config;
use crate::control::Controller;
use crate::conversation::{ConversationManager, SessionRegistry};
use crate::events::StateEvent;
use crate::hotkey::HotkeyListener;
use crate::ipc::Server;
use crate::lifecycle::ShutdownSignal;
use crate::queue::TaskQueue;
use crate::recording::RecordingLoop;
use crate::signals::{FileSignalStore, SignalStore};
use crate::state::ListeningState;
use crate::transcript::TranscriptLog;
use crate::worker::{Worker, WorkerContext};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "syri-daemon starting");

    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(?config.socket_path, "configuration loaded");

    let shutdown = ShutdownSignal::new();
    let (event_tx, _event_rx) = broadcast::channel::<StateEvent>(256);

    let file_store = FileSignalStore::open(&config.trigger_dir)?;
    info!(trigger_dir = ?file_store.dir(), "trigger files are watched here");
    let store: Arc<dyn SignalStore> = Arc::new(file_store);
    let state = ListeningState::new(Arc::clone(&store), event_tx.clone(), config.trigger_poll);
    let abort = Arc::new(AbortCoordinator::new(
        AbortFlag::new(config.abort_grace),
        event_tx.clone(),
    ));
    let queue = Arc::new(TaskQueue::new(event_tx.clone()));

    let api = config.api.clone();
    let chat_model = config.chat_model.clone();
    let conversations = Arc::new(ConversationManager::new(
        Box::new(move |session_id: &str| {
            Arc::new(ChatAgent::new(
                api.clone(),
                chat_model.clone(),
                session_id,
                DEFAULT_SYSTEM_PROMPT,
            )) as Arc<dyn Agent>
        }),
        event_tx.clone(),
    ));
    if config.initial_conversation {
        conversations.create();
    }

    let transcriber = Arc::new(WhisperTranscriber::new(
        config.api.clone(),
        config.stt_model.clone(),
    )?);
    let speech = Arc::new(OpenAiSpeech::new(
        config.api.clone(),
        config.tts_model.clone(),
        config.tts_voice.clone(),
        config.tts_speed,
        config.player_command.clone(),
    )?);
    let recorder = Arc::new(CommandRecorder::new(config.record_command.clone())?);
    let log = Arc::new(TranscriptLog::new(
        DEFAULT_SYSTEM_PROMPT,
        config.transcript_file.clone(),
    ));

    let worker = Worker::new(WorkerContext {
        queue: Arc::clone(&queue),
        state: state.clone(),
        abort: Arc::clone(&abort),
        conversations: conversations.clone(),
        transcriber,
        speech,
        log,
        event_tx: event_tx.clone(),
    });
    let producer = RecordingLoop::new(recorder, state.clone(), Arc::clone(&queue));
    let controller = Controller::new(state, Arc::clone(&abort), queue, conversations.clone());

    // Keyboard listener -> controller
    let (hotkey_tx, hotkey_rx) = mpsc::channel(32);
    let hotkey_listener = HotkeyListener::new(hotkey_tx);
    match hotkey_listener.start() {
        Ok(()) => info!("keyboard listener started"),
        Err(e) => {
            error!(?e, "failed to start keyboard listener");
            warn!("continuing without keyboard control");
        }
    }

    let server = Server::new(&config.socket_path, controller.clone(), event_tx.clone())?;
    let mut event_rx = event_tx.subscribe();

    info!("daemon initialized, press Enter to start or stop recording");

    tokio::select! {
        _ = worker.run() => {
            info!("worker exited");
        }

        _ = producer.run() => {
            info!("recording loop exited");
        }

        _ = abort.watch_signals(Arc::clone(&store), config.abort_poll) => {
            info!("abort watcher exited");
        }

        _ = async {
            hotkey::handle_events(hotkey_rx, controller.clone(), shutdown.clone()).await;
            // Closed input is not a reason to stop
            std::future::pending::<()>().await
        } => {}

        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        _ = async {
            loop {
                match event_rx.recv().await {
                    Ok(event) => debug!(%event, "state event"),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "state event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        } => {
            info!("state event handler exited");
        }

        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    info!("shutting down...");

    hotkey_listener.stop();
    conversations.stop_all();
    server.shutdown().await;
    store.reset();

    info!("syri-daemon stopped");

    Ok(())
}
