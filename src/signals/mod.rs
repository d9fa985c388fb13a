//! Signal store: the shared start/stop/abort flags and the listening mode
//!
//! Any thread or external process may raise or clear a signal. Reads never
//! block and never fail; an unreadable backing store reads as lowered /
//! `inactive`.

mod file;
mod memory;

pub use file::FileSignalStore;
pub use memory::MemorySignalStore;

use crate::state::Mode;

/// The edge-triggered signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// Begin recording
    Start,
    /// End recording
    Stop,
    /// Cancel whatever is in flight
    Abort,
}

impl Signal {
    pub const ALL: [Signal; 3] = [Signal::Start, Signal::Stop, Signal::Abort];
}

/// Storage for signals and the mode
pub trait SignalStore: Send + Sync {
    /// Raise a signal; idempotent
    fn raise(&self, signal: Signal);

    /// Lower a signal if raised; returns whether it was raised
    fn take(&self, signal: Signal) -> bool;

    /// Whether a signal is raised, without consuming it
    fn is_raised(&self, signal: Signal) -> bool;

    /// Current listening mode
    fn mode(&self) -> Mode;

    /// Overwrite the listening mode; idempotent
    fn set_mode(&self, mode: Mode);

    /// Lower a signal
    fn clear(&self, signal: Signal) {
        self.take(signal);
    }

    /// Lower every signal and go back to `inactive`
    fn reset(&self) {
        for signal in Signal::ALL {
            self.clear(signal);
        }
        self.set_mode(Mode::Inactive);
    }
}
