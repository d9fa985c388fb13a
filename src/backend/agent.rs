//! Chat-completion agent bound to one conversation

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{Agent, ApiSettings, BackendError};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Syri, a voice assistant. \
     Your replies are spoken aloud, so keep them short and plain, without markdown.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl ChatMessage {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// The call `stop` would cancel
struct InFlight {
    run_id: u64,
    token: CancellationToken,
}

/// Agent keeping its own message history
pub struct ChatAgent {
    client: reqwest::Client,
    api: ApiSettings,
    model: String,
    session_id: String,
    history: Mutex<Vec<ChatMessage>>,
    next_run: AtomicU64,
    in_flight: Mutex<Option<InFlight>>,
}

impl ChatAgent {
    pub fn new(api: ApiSettings, model: String, session_id: &str, system_prompt: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api,
            model,
            session_id: session_id.to_string(),
            history: Mutex::new(vec![ChatMessage::new("system", system_prompt)]),
            next_run: AtomicU64::new(1),
            in_flight: Mutex::new(None),
        }
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, BackendError> {
        let request = ChatRequest {
            model: &self.model,
            messages,
        };

        let response = self
            .client
            .post(self.api.url("chat/completions"))
            .bearer_auth(&self.api.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(session_id = %self.session_id, %status, %body, "chat API error");
            return Err(BackendError::Api {
                service: "chat",
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| BackendError::Agent("response had no choices".to_string()))
    }

    #[cfg(test)]
    fn history_len(&self) -> usize {
        self.history.lock().unwrap().len()
    }
}

#[async_trait]
impl Agent for ChatAgent {
    async fn run(&self, text: &str, cancel: CancellationToken) -> Result<String, BackendError> {
        let run_id = self.next_run.fetch_add(1, Ordering::SeqCst);
        let token = cancel.child_token();
        *self.in_flight.lock().unwrap_or_else(|e| e.into_inner()) = Some(InFlight {
            run_id,
            token: token.clone(),
        });

        let messages = {
            let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
            let mut messages = history.clone();
            messages.push(ChatMessage::new("user", text));
            messages
        };
        debug!(session_id = %self.session_id, run_id, messages = messages.len(), "calling chat API");

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => Err(BackendError::Stopped),
            reply = self.complete(&messages) => reply,
        };

        {
            // A newer run may have registered meanwhile
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            if in_flight.as_ref().is_some_and(|f| f.run_id == run_id) {
                *in_flight = None;
            }
        }

        let reply = result?;
        if token.is_cancelled() {
            return Err(BackendError::Stopped);
        }
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.push(ChatMessage::new("user", text));
        history.push(ChatMessage::new("assistant", &reply));
        Ok(reply)
    }

    fn stop(&self) {
        if let Some(current) = self
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
        {
            info!(session_id = %self.session_id, run_id = current.run_id, "stopping agent call");
            current.token.cancel();
        }
    }
}
