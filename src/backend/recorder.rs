//! Microphone capture through an external command
//!
//! The command is started when recording begins, with the output WAV path
//! appended as its last argument, and killed when recording ends.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::state::ListeningState;

use super::{AudioHandle, BackendError, Recorder};

/// A WAV file no larger than its header holds no audio
const WAV_HEADER_LEN: u64 = 44;

pub struct CommandRecorder {
    command: Vec<String>,
}

impl CommandRecorder {
    /// # Errors
    ///
    /// Returns error if the command is empty
    pub fn new(command: Vec<String>) -> Result<Self, BackendError> {
        if command.is_empty() {
            return Err(BackendError::Config("record command is empty".to_string()));
        }
        Ok(Self { command })
    }
}

#[async_trait]
impl Recorder for CommandRecorder {
    async fn record(&self, state: &ListeningState) -> Result<Option<AudioHandle>, BackendError> {
        state.wait_for_start().await;

        let path = tempfile::Builder::new()
            .prefix("syri-rec-")
            .suffix(".wav")
            .tempfile()?
            .into_temp_path()
            .keep()
            .map_err(|e| e.error)?;
        let audio = AudioHandle::new(path);

        let mut child = Command::new(&self.command[0])
            .args(&self.command[1..])
            .arg(audio.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        info!(path = ?audio.path(), "recording started");

        state.wait_for_stop().await;

        if let Some(status) = child.try_wait()? {
            warn!(%status, "capture command exited before recording stopped");
        } else {
            child.start_kill()?;
            let _ = child.wait().await;
        }

        let len = tokio::fs::metadata(audio.path())
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        info!(bytes = len, "recording stopped");

        if len <= WAV_HEADER_LEN {
            debug!("recording is empty, discarding");
            return Ok(None);
        }
        Ok(Some(audio))
    }

    fn name(&self) -> &str {
        &self.command[0]
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::broadcast;

    use super::*;
    use crate::signals::{MemorySignalStore, SignalStore};
    use crate::state::Mode;

    fn create_state() -> ListeningState {
        let (tx, _) = broadcast::channel(16);
        let store: Arc<dyn SignalStore> = Arc::new(MemorySignalStore::new());
        ListeningState::new(store, tx, Duration::from_millis(5))
    }

    async fn record_with(command: &[&str]) -> Option<AudioHandle> {
        let recorder =
            CommandRecorder::new(command.iter().map(|s| s.to_string()).collect()).unwrap();
        let state = create_state();
        state.request_start();

        let observer = state.clone();
        let stopper = tokio::spawn(async move {
            while observer.mode() != Mode::Active {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
            observer.request_stop();
        });

        let audio = tokio::time::timeout(Duration::from_secs(2), recorder.record(&state))
            .await
            .unwrap()
            .unwrap();
        stopper.await.unwrap();
        audio
    }

    #[test]
    fn test_rejects_empty_command() {
        assert!(CommandRecorder::new(Vec::new()).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_silent_capture_is_discarded() {
        // `true` exits immediately and leaves the temp file empty
        assert!(record_with(&["true"]).await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_capture_is_returned() {
        let audio = record_with(&["sh", "-c", "head -c 4096 /dev/zero > \"$0\""])
            .await
            .unwrap();
        let len = std::fs::metadata(audio.path()).unwrap().len();
        assert_eq!(len, 4096);

        let path = audio.path().to_path_buf();
        drop(audio);
        assert!(!path.exists());
    }
}
