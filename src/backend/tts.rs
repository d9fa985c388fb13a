//! Text-to-speech: synthesize over HTTP, play through an external player

use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::process::Command;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info};

use crate::abort::TaskAbort;

use super::{ApiSettings, BackendError, SpeechOutput};

/// How often waits for the player check for abort
const PLAYBACK_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    speed: f32,
}

/// Synthesized speech played one utterance at a time
pub struct OpenAiSpeech {
    client: reqwest::Client,
    api: ApiSettings,
    model: String,
    voice: String,
    speed: f32,
    player: Vec<String>,
    /// Held for the duration of one playback
    playing: Mutex<()>,
}

impl OpenAiSpeech {
    /// # Errors
    ///
    /// Returns error if the API key or player command is missing
    pub fn new(
        api: ApiSettings,
        model: String,
        voice: String,
        speed: f32,
        player: Vec<String>,
    ) -> Result<Self, BackendError> {
        if api.api_key.is_empty() {
            return Err(BackendError::Config("API key required for speech".to_string()));
        }
        if player.is_empty() {
            return Err(BackendError::Config("player command is empty".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api,
            model,
            voice,
            speed,
            player,
            playing: Mutex::new(()),
        })
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, BackendError> {
        let request = SpeechRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed: self.speed,
        };

        let response = self
            .client
            .post(self.api.url("audio/speech"))
            .bearer_auth(&self.api.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, %body, "speech API error");
            return Err(BackendError::Api {
                service: "speech",
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.bytes().await?.to_vec())
    }

    /// Wait for the previous utterance to finish; `None` if aborted meanwhile
    async fn acquire_player(&self, abort: &TaskAbort) -> Option<MutexGuard<'_, ()>> {
        loop {
            if abort.is_raised() {
                return None;
            }
            if let Ok(guard) = self.playing.try_lock() {
                return Some(guard);
            }
            tokio::time::sleep(PLAYBACK_POLL).await;
        }
    }

    async fn play(&self, path: &Path, abort: &TaskAbort) -> Result<(), BackendError> {
        let mut child = Command::new(&self.player[0])
            .args(&self.player[1..])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let mut ticker = tokio::time::interval(PLAYBACK_POLL);
        loop {
            tokio::select! {
                status = child.wait() => {
                    let status = status?;
                    if !status.success() {
                        return Err(BackendError::Playback(format!("player exited with {status}")));
                    }
                    return Ok(());
                }
                _ = ticker.tick() => {
                    if abort.is_raised() {
                        break;
                    }
                }
            }
        }

        info!("playback aborted");
        child.kill().await?;
        Ok(())
    }
}

#[async_trait]
impl SpeechOutput for OpenAiSpeech {
    async fn speak(&self, text: &str, abort: &TaskAbort) -> Result<(), BackendError> {
        if text.trim().is_empty() || abort.is_raised() {
            return Ok(());
        }

        let audio = tokio::select! {
            biased;
            _ = abort.raised(PLAYBACK_POLL) => {
                debug!("speech discarded, abort raised during synthesis");
                return Ok(());
            }
            audio = self.synthesize(text) => audio?,
        };

        let mut file = tempfile::Builder::new()
            .prefix("syri-tts-")
            .suffix(".mp3")
            .tempfile()?;
        file.write_all(&audio)?;
        let path = file.into_temp_path();

        let Some(_guard) = self.acquire_player(abort).await else {
            info!("waiting for playback aborted");
            return Ok(());
        };
        debug!(bytes = audio.len(), "playing speech");
        self.play(&path, abort).await
    }
}
