//! Listening state machine
//!
//! Provides the process-wide tri-state listening mode:
//! - Inactive: not recording, no task in flight
//! - Active: recording in progress
//! - Processing: a dequeued task is being transcribed/dispatched/spoken

mod machine;

pub use machine::{ListeningState, Mode, ToggleOutcome};
