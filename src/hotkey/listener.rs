//! Keyboard listener reading lines from stdin
//!
//! Runs on a dedicated thread since stdin reads block.

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::keys::KeyCommand;

/// Events sent from the keyboard listener to the handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HotkeyEvent {
    /// A recognised command was typed
    Command(KeyCommand),
    /// Input reached end of file (no terminal attached)
    InputClosed,
}

/// Listener forwarding keyboard commands over a channel
pub struct HotkeyListener {
    event_tx: mpsc::Sender<HotkeyEvent>,
    running: Arc<AtomicBool>,
}

impl HotkeyListener {
    /// Create a new keyboard listener
    pub fn new(event_tx: mpsc::Sender<HotkeyEvent>) -> Self {
        Self {
            event_tx,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start reading stdin on a dedicated thread
    pub fn start(&self) -> Result<(), HotkeyError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(HotkeyError::AlreadyRunning);
        }

        let event_tx = self.event_tx.clone();
        let running = Arc::clone(&self.running);

        thread::Builder::new()
            .name("hotkey-listener".to_string())
            .spawn(move || {
                info!("keyboard listener thread started");

                let stdin = std::io::stdin();
                if let Err(e) = read_commands(stdin.lock(), &event_tx, &running) {
                    error!(?e, "keyboard listener error");
                }

                running.store(false, Ordering::SeqCst);
                info!("keyboard listener thread stopped");
            })
            .map_err(|e| HotkeyError::ThreadSpawn(e.to_string()))?;

        Ok(())
    }

    /// Stop forwarding; the thread exits after its next line
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Check if the listener is currently running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Errors that can occur in the keyboard listener
#[derive(Debug, thiserror::Error)]
pub enum HotkeyError {
    #[error("keyboard listener is already running")]
    AlreadyRunning,

    #[error("failed to spawn listener thread: {0}")]
    ThreadSpawn(String),

    #[error("failed to read input: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to send event to channel")]
    ChannelSend,
}

/// Forward commands from `input` until EOF, stop, or the receiver goes away
fn read_commands<R: BufRead>(
    input: R,
    event_tx: &mpsc::Sender<HotkeyEvent>,
    running: &AtomicBool,
) -> Result<(), HotkeyError> {
    for line in input.lines() {
        if !running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let line = line?;
        let Some(command) = KeyCommand::parse(&line) else {
            warn!(input = %line.trim(), "unrecognised input, press Enter, 'a' or 'q'");
            continue;
        };

        debug!(?command, "key command");
        event_tx
            .blocking_send(HotkeyEvent::Command(command))
            .map_err(|_| HotkeyError::ChannelSend)?;
    }

    event_tx
        .blocking_send(HotkeyEvent::InputClosed)
        .map_err(|_| HotkeyError::ChannelSend)
}
