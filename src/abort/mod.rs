//! Abort module: cooperative cancellation of in-flight work
//!
//! Two mechanisms work together:
//! - [`AbortFlag`], a shared flag that auto-lowers after a grace window and
//!   that toggling checks
//! - [`AbortCoordinator`], which latches the abort into the current task's
//!   [`TaskAbort`] and asks the in-flight agent call to stop
//!
//! Blocking calls (synthesis, playback, the agent) are handed the task's
//! [`TaskAbort`], so they still see an abort after the flag has dropped.

mod coordinator;
mod flag;

pub use coordinator::{AbortCoordinator, TaskAbort};
pub use flag::AbortFlag;
