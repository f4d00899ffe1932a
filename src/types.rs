use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing_error::SpanTrace;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Role {
    type Error = ChatError;

    fn try_from(value: &str) -> std::result::Result<Self, Self::Error> {
        match value {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(ChatError::InvalidRequest(format!("unknown role: {}", other))),
        }
    }
}

/// One entry of the conversation as sent to the model backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// An uploaded file after it has been written to disk and run through the extractor.
#[derive(Debug, Clone, Serialize)]
pub struct FileInfo {
    /// Name on disk: timestamp and random prefix, then the sanitised name.
    pub filename: String,
    pub original_filename: String,
    pub file_path: String,
    pub file_size: i64,
    pub mime_type: String,
    pub processed_content: String,
    pub sha256: String,
}

#[derive(Debug, Clone)]
pub struct NewMessage<'a> {
    pub session_id: &'a str,
    pub role: Role,
    pub content: &'a str,
    pub formatted_content: Option<String>,
    pub model: Option<&'a str>,
}

/// A message row as shown to the browser when a session is loaded.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StoredMessage {
    pub id: i64,
    pub role: String,
    pub content: String,
    pub formatted_content: Option<String>,
    pub timestamp: Option<String>,
    pub has_file: bool,
    pub file_name: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionRow {
    pub id: String,
    pub title: Option<String>,
    pub created_at: Option<String>,
    pub last_active: Option<String>,
    pub message_count: i64,
    pub last_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionSummary {
    pub session_id: String,
    pub title: String,
    pub created_at: Option<String>,
    pub last_active: Option<String>,
    pub message_count: i64,
    pub last_message: String,
}

impl From<SessionRow> for SessionSummary {
    fn from(row: SessionRow) -> Self {
        let title = match row.title {
            Some(t) if !t.is_empty() => t,
            _ => format!("Session {}", crate::str_utils::prefix_chars(&row.id, 8)),
        };
        Self {
            title,
            created_at: row.created_at,
            last_active: row.last_active,
            message_count: row.message_count,
            last_message: row.last_message.unwrap_or_else(|| "No messages".to_string()),
            session_id: row.id,
        }
    }
}

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot connect to the model backend. Make sure it is running on {0}")]
    BackendConnection(String),

    #[error("Request timed out. The model might be taking too long to respond.")]
    BackendTimeout,

    #[error("Model backend request failed: {0}")]
    BackendTransport(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("File type not allowed")]
    FileNotAllowed(String),

    #[error("File too large. Maximum size is {0}MB.")]
    PayloadTooLarge(usize),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Markdown rendering failed: {0}")]
    Format(String),

    #[error("Internal error: {0}")]
    Internal(String, SpanTrace),
}

impl ChatError {
    pub fn status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            ChatError::InvalidRequest(_) | ChatError::FileNotAllowed(_) => StatusCode::BAD_REQUEST,
            ChatError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ChatError::Forbidden(_) => StatusCode::FORBIDDEN,
            ChatError::NotFound(_) => StatusCode::NOT_FOUND,
            ChatError::BackendConnection(_) => StatusCode::BAD_GATEWAY,
            ChatError::BackendTimeout => StatusCode::GATEWAY_TIMEOUT,
            ChatError::BackendTransport(_)
            | ChatError::Database(_)
            | ChatError::Migration(_)
            | ChatError::Serialization(_)
            | ChatError::Io(_)
            | ChatError::Format(_)
            | ChatError::Internal(_, _) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            ChatError::BackendConnection(_)
                | ChatError::BackendTimeout
                | ChatError::BackendTransport(_)
        )
    }
}

#[derive(Debug)]
pub struct ObservedError {
    pub inner: ChatError,
    pub span_trace: SpanTrace,
}

impl fmt::Display for ObservedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl std::error::Error for ObservedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.inner)
    }
}

impl<E> From<E> for ObservedError
where
    E: Into<ChatError>,
{
    fn from(error: E) -> Self {
        Self {
            inner: error.into(),
            span_trace: SpanTrace::capture(),
        }
    }
}

impl axum::response::IntoResponse for ObservedError {
    fn into_response(self) -> axum::response::Response {
        let status = self.inner.status();
        if self.inner.is_backend() {
            tracing::warn!("Backend request failed: {}", self.inner);
        } else if status.is_server_error() {
            tracing::error!(
                "Request failed: {}\n\nSpan Trace:\n{}",
                self.inner,
                self.span_trace
            );
        }
        (
            status,
            axum::Json(serde_json::json!({
                "success": false,
                "error": self.inner.to_string(),
            })),
        )
            .into_response()
    }
}

pub type Result<T> = std::result::Result<T, ObservedError>;
