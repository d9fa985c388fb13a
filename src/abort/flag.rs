//! Auto-clearing abort flag

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

/// Shared abort flag; visible to every reader for `grace`, then lowered
#[derive(Debug, Clone)]
pub struct AbortFlag {
    inner: Arc<FlagInner>,
}

#[derive(Debug)]
struct FlagInner {
    raised: AtomicBool,
    /// Bumped on every raise so only the latest timer lowers the flag
    generation: AtomicU64,
    grace: Duration,
}

impl AbortFlag {
    /// Create a lowered flag
    pub fn new(grace: Duration) -> Self {
        Self {
            inner: Arc::new(FlagInner {
                raised: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                grace,
            }),
        }
    }

    /// Raise the flag and (re)start the grace window.
    ///
    /// Returns true if the flag was lowered before this call.
    pub fn raise(&self) -> bool {
        let newly = !self.inner.raised.swap(true, Ordering::SeqCst);
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        schedule_clear(Arc::clone(&self.inner), generation);
        newly
    }

    /// Whether the flag is currently raised
    pub fn is_raised(&self) -> bool {
        self.inner.raised.load(Ordering::SeqCst)
    }

    /// Lower the flag immediately
    pub fn clear(&self) {
        self.inner.raised.store(false, Ordering::SeqCst);
    }

    /// Number of raises so far
    pub(super) fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }
}

fn schedule_clear(inner: Arc<FlagInner>, generation: u64) {
    let grace = inner.grace;
    let clear = move || {
        if inner.generation.load(Ordering::SeqCst) == generation {
            inner.raised.store(false, Ordering::SeqCst);
            debug!("abort flag auto-cleared");
        }
    };

    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                tokio::time::sleep(grace).await;
                clear();
            });
        }
        Err(_) => {
            std::thread::spawn(move || {
                std::thread::sleep(grace);
                clear();
            });
        }
    }
}
