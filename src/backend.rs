use crate::types::{ChatError, ChatMessage, Result};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Backend credential that an administrator may replace while the server runs.
/// Read once per request; the last write wins.
#[derive(Debug, Default)]
pub struct ApiKey(RwLock<Option<String>>);

impl ApiKey {
    pub fn new(key: Option<String>) -> Self {
        Self(RwLock::new(key.filter(|k| !k.is_empty())))
    }

    pub fn get(&self) -> Option<String> {
        match self.0.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn set(&self, key: Option<String>) {
        let key = key.filter(|k| !k.is_empty());
        match self.0.write() {
            Ok(mut guard) => *guard = key,
            Err(poisoned) => *poisoned.into_inner() = key,
        }
    }

    pub fn is_set(&self) -> bool {
        self.get().is_some()
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

/// Client for an Ollama-compatible chat backend (`/api/chat`, `/api/tags`).
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Arc<ApiKey>,
    request_timeout: Duration,
    list_timeout: Duration,
}

impl BackendClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: Arc<ApiKey>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            request_timeout: Duration::from_secs(120),
            list_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeouts(mut self, request_timeout: Duration, list_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self.list_timeout = list_timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> &ApiKey {
        &self.api_key
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.api_key.get() {
            Some(key) => request.header("Authorization", format!("Bearer {}", key)),
            None => request,
        }
    }

    fn classify(&self, error: reqwest::Error) -> ChatError {
        if error.is_timeout() {
            ChatError::BackendTimeout
        } else if error.is_connect() {
            ChatError::BackendConnection(self.base_url.clone())
        } else {
            ChatError::BackendTransport(error.to_string())
        }
    }

    /// Sends the conversation and returns the assistant's reply text.
    #[tracing::instrument(name = "backend.chat", skip_all, fields(model = %model, messages = messages.len()))]
    pub async fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<String> {
        let url = format!("{}/api/chat", self.base_url);
        let body = ChatRequest {
            model,
            messages,
            stream: false,
        };

        let started = std::time::Instant::now();
        let response = self
            .authorize(self.client.post(&url))
            .timeout(self.request_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = match response.text().await {
                Ok(text) => text,
                Err(_) => "Unknown error".to_string(),
            };
            return Err(ChatError::BackendTransport(format!("{}: {}", status, error_body)).into());
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| self.classify(e))?;
        let content = parsed
            .message
            .and_then(|m| m.content)
            .unwrap_or_else(|| "No response received".to_string());

        tracing::info!(
            "Backend replied in {}ms ({} chars)",
            started.elapsed().as_millis(),
            content.len()
        );
        Ok(content)
    }

    /// Names of the installed models. Failures are logged and yield an empty list.
    pub async fn list_models(&self) -> Vec<String> {
        let url = format!("{}/api/tags", self.base_url);
        let response = match self
            .authorize(self.client.get(&url))
            .timeout(self.list_timeout)
            .send()
            .await
            .and_then(|r| r.error_for_status())
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Error listing models: {}", e);
                return Vec::new();
            }
        };

        match response.json::<TagsResponse>().await {
            Ok(tags) => tags.models.into_iter().map(|m| m.name).collect(),
            Err(e) => {
                tracing::warn!("Malformed model list from backend: {}", e);
                Vec::new()
            }
        }
    }
}
