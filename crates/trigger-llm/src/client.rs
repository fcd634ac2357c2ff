use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::prompt::ChatMessage;

/// Fixed low temperature for rule evaluation — deterministic-leaning,
/// not creative (spec.md §4.4 step 4).
const TEMPERATURE: f64 = 0.2;

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// What can go wrong calling the model, coarsened to the kinds
/// spec.md §4.4/§7 names: timeout, network, and non-2xx (bucketed as
/// "5xx"-equivalent regardless of the exact status, since the engine
/// has no retry logic to differentiate on).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Network,
    Http,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportErrorKind::Timeout => write!(f, "timeout"),
            TransportErrorKind::Network => write!(f, "network"),
            TransportErrorKind::Http => write!(f, "http"),
        }
    }
}

/// Thin wrapper around an OpenAI-compatible `/chat/completions`
/// endpoint. Bearer auth and the model name are fixed at construction;
/// `api_key` is never logged and never appears in the prompt body.
#[derive(Clone)]
pub struct ChatCompletionClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl ChatCompletionClient {
    pub fn new(base_url: String, api_key: String, model: String, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            base_url,
            api_key,
            model,
            timeout,
        }
    }

    /// Call the chat-completions endpoint and return the first
    /// choice's message content. An outer `tokio::time::timeout`
    /// belt-and-braces the `reqwest` client timeout, matching the
    /// teacher's `scheduler.rs` pattern of wrapping suspension points
    /// in an explicit deadline rather than trusting one layer alone.
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String, TransportErrorKind> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature: TEMPERATURE,
        };

        let call = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send();

        let response = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) if e.is_timeout() => return Err(TransportErrorKind::Timeout),
            Ok(Err(_)) => return Err(TransportErrorKind::Network),
            Err(_) => return Err(TransportErrorKind::Timeout),
        };

        if !response.status().is_success() {
            return Err(TransportErrorKind::Http);
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|_| TransportErrorKind::Network)?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(TransportErrorKind::Http)
    }
}
