//! In-process signal store backed by atomics

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::state::Mode;

use super::{Signal, SignalStore};

/// Lock-free signal store for a single process
#[derive(Debug, Default)]
pub struct MemorySignalStore {
    start: AtomicBool,
    stop: AtomicBool,
    abort: AtomicBool,
    mode: AtomicU8,
}

impl MemorySignalStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn flag(&self, signal: Signal) -> &AtomicBool {
        match signal {
            Signal::Start => &self.start,
            Signal::Stop => &self.stop,
            Signal::Abort => &self.abort,
        }
    }
}

fn mode_to_u8(mode: Mode) -> u8 {
    match mode {
        Mode::Inactive => 0,
        Mode::Active => 1,
        Mode::Processing => 2,
    }
}

fn mode_from_u8(v: u8) -> Mode {
    match v {
        1 => Mode::Active,
        2 => Mode::Processing,
        _ => Mode::Inactive,
    }
}

impl SignalStore for MemorySignalStore {
    fn raise(&self, signal: Signal) {
        self.flag(signal).store(true, Ordering::SeqCst);
    }

    fn take(&self, signal: Signal) -> bool {
        self.flag(signal).swap(false, Ordering::SeqCst)
    }

    fn is_raised(&self, signal: Signal) -> bool {
        self.flag(signal).load(Ordering::SeqCst)
    }

    fn mode(&self) -> Mode {
        mode_from_u8(self.mode.load(Ordering::SeqCst))
    }

    fn set_mode(&self, mode: Mode) {
        self.mode.store(mode_to_u8(mode), Ordering::SeqCst);
    }
}
