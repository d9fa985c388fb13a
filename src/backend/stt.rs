//! Speech-to-text over an OpenAI-compatible transcription endpoint

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, error};

use super::{ApiSettings, AudioHandle, BackendError, Transcriber};

/// Response from the transcription API
#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Whisper-style transcriber
pub struct WhisperTranscriber {
    client: reqwest::Client,
    api: ApiSettings,
    model: String,
}

impl WhisperTranscriber {
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new(api: ApiSettings, model: String) -> Result<Self, BackendError> {
        if api.api_key.is_empty() {
            return Err(BackendError::Config(
                "API key required for transcription".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api,
            model,
        })
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, audio: AudioHandle) -> Result<String, BackendError> {
        let bytes = tokio::fs::read(audio.path()).await?;
        debug!(audio_bytes = bytes.len(), "starting transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes)
                    .file_name("audio.wav")
                    .mime_str("audio/wav")?,
            )
            .text("model", self.model.clone());

        let response = self
            .client
            .post(self.api.url("audio/transcriptions"))
            .bearer_auth(&self.api.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, %body, "transcription API error");
            return Err(BackendError::Api {
                service: "transcription",
                status: status.as_u16(),
                body,
            });
        }

        let result: TranscriptionResponse = response.json().await?;
        debug!(chars = result.text.len(), "transcription complete");
        Ok(result.text)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_api_key() {
        let api = ApiSettings {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
        };
        assert!(matches!(
            WhisperTranscriber::new(api, "whisper-1".to_string()),
            Err(BackendError::Config(_))
        ));
    }

    #[test]
    fn test_parse_response() {
        let parsed: TranscriptionResponse =
            serde_json::from_str(r#"{"text":" find cats ","duration":1.2}"#).unwrap();
        assert_eq!(parsed.text, " find cats ");
    }

    #[tokio::test]
    async fn test_missing_audio_is_io_error() {
        let api = ApiSettings {
            api_key: "sk-test".to_string(),
            base_url: "http://127.0.0.1:9".to_string(),
        };
        let transcriber = WhisperTranscriber::new(api, "whisper-1".to_string()).unwrap();
        let result = transcriber
            .transcribe(AudioHandle::new("/nonexistent/clip.wav"))
            .await;
        assert!(matches!(result, Err(BackendError::Io(_))));
    }
}
