//! File-backed signal store for control from other processes
//!
//! Layout under the trigger directory:
//! - `start_listening`, `stop_listening`, `abort_execution`: a signal is
//!   raised while its file exists; taking it removes the file
//! - `listening_state`: the mode as `inactive`, `active` or `processing`

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::state::Mode;

use super::{Signal, SignalStore};

const STATE_FILE: &str = "listening_state";

fn file_name(signal: Signal) -> &'static str {
    match signal {
        Signal::Start => "start_listening",
        Signal::Stop => "stop_listening",
        Signal::Abort => "abort_execution",
    }
}

/// Signal store that external scripts can drive with `touch`/`cat`
#[derive(Debug)]
pub struct FileSignalStore {
    dir: PathBuf,
}

impl FileSignalStore {
    /// Open the store, creating the directory and clearing stale triggers
    pub fn open(dir: &Path) -> std::io::Result<Self> {
        fs::create_dir_all(dir)?;
        let store = Self {
            dir: dir.to_owned(),
        };
        store.reset();
        info!(?dir, "file signal store ready");
        Ok(store)
    }

    /// Directory holding the trigger files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn signal_path(&self, signal: Signal) -> PathBuf {
        self.dir.join(file_name(signal))
    }

    fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }
}

impl SignalStore for FileSignalStore {
    fn raise(&self, signal: Signal) {
        let path = self.signal_path(signal);
        if let Err(e) = fs::write(&path, b"") {
            warn!(?path, ?e, "failed to raise signal");
        }
    }

    fn take(&self, signal: Signal) -> bool {
        // Removal is atomic, so exactly one reader wins a raised signal
        let path = self.signal_path(signal);
        match fs::remove_file(&path) {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => {
                debug!(?path, ?e, "failed to take signal");
                false
            }
        }
    }

    fn is_raised(&self, signal: Signal) -> bool {
        self.signal_path(signal).exists()
    }

    fn mode(&self) -> Mode {
        match fs::read_to_string(self.state_path()) {
            Ok(contents) => Mode::parse(&contents).unwrap_or_default(),
            Err(e) => {
                debug!(?e, "state file unreadable, assuming inactive");
                Mode::Inactive
            }
        }
    }

    fn set_mode(&self, mode: Mode) {
        let path = self.state_path();
        if let Err(e) = fs::write(&path, mode.as_str()) {
            warn!(?path, ?e, "failed to write state file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_clears_stale_triggers() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("start_listening"), b"").unwrap();
        fs::write(dir.path().join("abort_execution"), b"").unwrap();
        fs::write(dir.path().join(STATE_FILE), "processing").unwrap();

        let store = FileSignalStore::open(dir.path()).unwrap();
        assert!(!store.is_raised(Signal::Start));
        assert!(!store.is_raised(Signal::Abort));
        assert_eq!(store.mode(), Mode::Inactive);
    }

    #[test]
    fn test_external_touch_is_observed() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSignalStore::open(dir.path()).unwrap();

        fs::write(dir.path().join("stop_listening"), b"").unwrap();
        assert!(store.take(Signal::Stop));
        assert!(!dir.path().join("stop_listening").exists());
        assert!(!store.take(Signal::Stop));
    }

    #[test]
    fn test_mode_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSignalStore::open(dir.path()).unwrap();

        store.set_mode(Mode::Active);
        assert_eq!(
            fs::read_to_string(dir.path().join(STATE_FILE)).unwrap(),
            "active"
        );
        assert_eq!(store.mode(), Mode::Active);
    }

    #[test]
    fn test_unreadable_state_defaults_to_inactive() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSignalStore::open(dir.path()).unwrap();

        fs::write(dir.path().join(STATE_FILE), "garbage").unwrap();
        assert_eq!(store.mode(), Mode::Inactive);

        fs::remove_file(dir.path().join(STATE_FILE)).unwrap();
        assert_eq!(store.mode(), Mode::Inactive);
    }
}
