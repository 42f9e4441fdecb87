//! Streaming chat client over an OpenAI-compatible HTTP API.

use std::time::Duration;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use super::models::{ChatMessage, ChatRequest, ChatResponse, ModelInfo, ModelsResponse};
use super::ApiError;
use crate::core::settings::builtin::NS_LLM;
use crate::core::settings::SharedSettings;

/// The boundary every conversation collaborator implements. Streaming
/// deltas are pushed through the callback; the full reply is returned
/// once the stream finishes.
#[async_trait::async_trait]
pub trait ChatClient: Send + Sync {
    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        on_delta: &mut (dyn for<'a> FnMut(&'a str) + Send),
        cancel: &CancellationToken,
    ) -> Result<String, ApiError>;

    async fn list_models(&self, cancel: &CancellationToken) -> Result<Vec<ModelInfo>, ApiError>;
}

/// Backend parameters resolved from the settings registry at call time,
/// so a `/set llm:...` takes effect on the next request without any
/// client rebuild.
struct BackendConfig {
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

pub struct HttpChatClient {
    http: reqwest::Client,
    settings: SharedSettings,
}

impl HttpChatClient {
    pub fn new(settings: SharedSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
        }
    }

    fn backend(&self) -> BackendConfig {
        let registry = self.settings.read().expect("settings lock poisoned");
        let get_str = |key: &str| {
            registry
                .get(NS_LLM, key)
                .ok()
                .and_then(|value| value.as_str().map(str::to_string))
                .unwrap_or_default()
        };
        let timeout_secs = registry
            .get(NS_LLM, "request_timeout_secs")
            .ok()
            .and_then(|value| value.as_int())
            .unwrap_or(120);
        BackendConfig {
            base_url: get_str("base_url").trim_end_matches('/').to_string(),
            api_key: get_str("api_key"),
            model: get_str("model"),
            timeout: Duration::from_secs(timeout_secs as u64),
        }
    }
}

#[async_trait::async_trait]
impl ChatClient for HttpChatClient {
    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        on_delta: &mut (dyn for<'a> FnMut(&'a str) + Send),
        cancel: &CancellationToken,
    ) -> Result<String, ApiError> {
        let backend = self.backend();
        let request = ChatRequest {
            model: backend.model.clone(),
            messages: messages.to_vec(),
            stream: true,
        };

        let mut builder = self
            .http
            .post(format!("{}/chat/completions", backend.base_url))
            .timeout(backend.timeout)
            .json(&request);
        if !backend.api_key.is_empty() {
            builder = builder.bearer_auth(&backend.api_key);
        }

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ApiError::Cancelled),
            response = builder.send() => response.map_err(|e| ApiError::Http(e.to_string()))?,
        };
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut content = String::new();
        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return Err(ApiError::Cancelled),
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = chunk else { break };
            let bytes = chunk.map_err(|e| ApiError::Http(e.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&bytes));

            // SSE frames are newline-delimited; keep any partial line in
            // the buffer for the next chunk.
            while let Some(newline) = buffer.find('\n') {
                let line = buffer[..newline].trim().to_string();
                buffer.drain(..=newline);
                let Some(delta) = parse_sse_line(&line)? else {
                    continue;
                };
                if !delta.is_empty() {
                    on_delta(&delta);
                    content.push_str(&delta);
                }
            }
        }
        Ok(content)
    }

    async fn list_models(&self, cancel: &CancellationToken) -> Result<Vec<ModelInfo>, ApiError> {
        let backend = self.backend();
        let mut builder = self
            .http
            .get(format!("{}/models", backend.base_url))
            .timeout(backend.timeout);
        if !backend.api_key.is_empty() {
            builder = builder.bearer_auth(&backend.api_key);
        }
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ApiError::Cancelled),
            response = builder.send() => response.map_err(|e| ApiError::Http(e.to_string()))?,
        };
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                code: status.as_u16(),
                body,
            });
        }
        let parsed: ModelsResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
        let mut models = parsed.data;
        models.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(models)
    }
}

/// Extract the content delta from one SSE line, if it carries one.
/// Returns `Ok(None)` for comments, empty lines, and the `[DONE]` marker.
fn parse_sse_line(line: &str) -> Result<Option<String>, ApiError> {
    let Some(data) = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")) else {
        return Ok(None);
    };
    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return Ok(None);
    }
    let parsed: ChatResponse = serde_json::from_str(data)
        .map_err(|e| ApiError::InvalidResponse(format!("bad stream chunk: {e}")))?;
    Ok(Some(
        parsed
            .choices
            .first()
            .and_then(|choice| choice.delta.content.clone())
            .unwrap_or_default(),
    ))
}
