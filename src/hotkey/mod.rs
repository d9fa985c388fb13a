//! Hotkey module for keyboard control
//!
//! A stdin line listener on a dedicated thread feeds commands to
//! [`handle_events`], which drives the [`Controller`].

mod keys;
mod listener;

pub use keys::KeyCommand;
pub use listener::{HotkeyEvent, HotkeyListener};

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::control::Controller;
use crate::lifecycle::ShutdownSignal;
use crate::state::ToggleOutcome;

/// Apply keyboard events until the listener goes away
pub async fn handle_events(
    mut event_rx: mpsc::Receiver<HotkeyEvent>,
    controller: Controller,
    shutdown: ShutdownSignal,
) {
    while let Some(event) = event_rx.recv().await {
        match event {
            HotkeyEvent::Command(KeyCommand::Toggle) => {
                if controller.toggle() == ToggleOutcome::Rejected {
                    warn!("abort in progress, toggle ignored");
                }
            }
            HotkeyEvent::Command(KeyCommand::Abort) => {
                controller.abort();
            }
            HotkeyEvent::Command(KeyCommand::Quit) => {
                info!("quit requested from keyboard");
                shutdown.trigger();
            }
            HotkeyEvent::InputClosed => {
                info!("keyboard input closed, use IPC or trigger files to control the daemon");
            }
        }
    }
}
