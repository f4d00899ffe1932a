use crate::constants::SESSION_COOKIE;
use crate::db;
use crate::extract::{guess_mime, is_allowed, secure_filename};
use crate::health;
use crate::logging::request_id_middleware;
use crate::prompt::{build_context, enhance_prompt, enhance_prompt_with_file};
use crate::state::AppState;
use crate::str_utils::preview;
use crate::types::{ChatError, FileInfo, NewMessage, ObservedError, Result, Role};
use axum::{
    extract::{DefaultBodyLimit, FromRequest, Multipart, Path, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware,
    response::{Html, IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use bytes::Bytes;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub fn router(state: Arc<AppState>) -> Router {
    let static_dir = ServeDir::new(&state.args.static_dir);
    Router::new()
        .route("/", get(index))
        .route("/api/chat", post(chat))
        .route("/api/models", get(models))
        .route("/api/sessions", get(sessions))
        .route("/api/session/new", post(new_session))
        .route("/api/session/:session_id/load", post(load_session))
        .route("/api/session/:session_id/delete", delete(delete_session))
        .route("/api/admin/api-key", post(health::set_api_key))
        .route("/health", get(health::liveness))
        .route("/readyz", get(health::readiness))
        .nest_service("/static", static_dir)
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(state.args.max_file_size))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// --- session cookie ---

fn valid_session_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

pub fn session_from_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|id| valid_session_id(id))
}

fn set_session_cookie(response: &mut Response, session_id: &str) {
    let cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, session_id);
    if let Ok(val) = HeaderValue::from_str(&cookie) {
        response.headers_mut().append(header::SET_COOKIE, val);
    }
}

fn clear_session_cookie(response: &mut Response) {
    let cookie = format!("{}=; Path=/; Max-Age=0", SESSION_COOKIE);
    if let Ok(val) = HeaderValue::from_str(&cookie) {
        response.headers_mut().append(header::SET_COOKIE, val);
    }
}

fn with_session(body: serde_json::Value, session_id: &str) -> Response {
    let mut response = Json(body).into_response();
    set_session_cookie(&mut response, session_id);
    response
}

// --- request body ---

#[derive(Debug, Default, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: String,
    model: Option<String>,
    session_id: Option<String>,
}

struct Upload {
    file_name: String,
    data: Bytes,
}

#[derive(Default)]
struct ChatPayload {
    request: ChatRequest,
    upload: Option<Upload>,
}

fn body_rejection(status: StatusCode, detail: String, limit_mb: usize) -> ObservedError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        ChatError::PayloadTooLarge(limit_mb).into()
    } else {
        ChatError::InvalidRequest(detail).into()
    }
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"))
}

/// Accepts either a JSON body or a multipart form carrying an optional file.
async fn read_chat_payload(state: &Arc<AppState>, request: Request) -> Result<ChatPayload> {
    let limit_mb = state.args.max_file_size_mb();

    if !is_multipart(request.headers()) {
        return match Json::<ChatRequest>::from_request(request, state).await {
            Ok(Json(request)) => Ok(ChatPayload {
                request,
                upload: None,
            }),
            Err(rej) => Err(body_rejection(rej.status(), rej.body_text(), limit_mb)),
        };
    }

    let mut multipart = match Multipart::from_request(request, state).await {
        Ok(m) => m,
        Err(rej) => return Err(body_rejection(rej.status(), rej.body_text(), limit_mb)),
    };

    let mut payload = ChatPayload::default();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(f)) => f,
            Ok(None) => break,
            Err(e) => return Err(body_rejection(e.status(), e.body_text(), limit_mb)),
        };
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let data = match field.bytes().await {
                    Ok(d) => d,
                    Err(e) => return Err(body_rejection(e.status(), e.body_text(), limit_mb)),
                };
                if !file_name.is_empty() {
                    payload.upload = Some(Upload { file_name, data });
                }
            }
            "message" | "model" | "session_id" => {
                let text = match field.text().await {
                    Ok(t) => t,
                    Err(e) => return Err(body_rejection(e.status(), e.body_text(), limit_mb)),
                };
                match name.as_str() {
                    "message" => payload.request.message = text,
                    "model" => payload.request.model = Some(text),
                    _ => payload.request.session_id = Some(text),
                }
            }
            other => tracing::debug!("Ignoring form field {}", other),
        }
    }
    Ok(payload)
}

/// Writes an allowed upload under a timestamped name and extracts its text.
/// `<timestamp>_<random>_<name>`: readable on disk, unique per upload.
fn stored_file_name(original_filename: &str) -> String {
    let nonce = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}",
        chrono::Local::now().format("%Y%m%d_%H%M%S"),
        &nonce[..8],
        original_filename
    )
}

async fn store_upload(state: &AppState, upload: Upload) -> Result<FileInfo> {
    let original_filename = secure_filename(&upload.file_name);
    let filename = stored_file_name(&original_filename);
    let path = std::path::Path::new(&state.args.upload_dir).join(&filename);
    // create_new: a name clash fails the request instead of replacing another session's file.
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .await?;
    file.write_all(&upload.data).await?;
    file.flush().await?;

    let mut hasher = Sha256::new();
    hasher.update(&upload.data);
    let sha256 = format!("{:x}", hasher.finalize());

    let mime_type = guess_mime(&path);
    let extractor = state.extractor;
    let (extract_path, name, mime) = (path.clone(), original_filename.clone(), mime_type.clone());
    let processed_content =
        match tokio::task::spawn_blocking(move || extractor.extract(&extract_path, &name, &mime)).await {
            Ok(text) => text,
            Err(e) => {
                return Err(ChatError::Internal(
                    format!("File extraction task failed: {}", e),
                    tracing_error::SpanTrace::capture(),
                )
                .into())
            }
        };

    tracing::info!(
        "Stored upload {} ({} bytes, {})",
        filename,
        upload.data.len(),
        mime_type
    );

    Ok(FileInfo {
        filename,
        original_filename,
        file_path: path.to_string_lossy().into_owned(),
        file_size: upload.data.len() as i64,
        mime_type,
        processed_content,
        sha256,
    })
}

// --- handlers ---

async fn index(State(state): State<Arc<AppState>>) -> Response {
    let path = std::path::Path::new(&state.args.static_dir).join("index.html");
    match tokio::fs::read_to_string(&path).await {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::warn!("Cannot serve {}: {}", path.display(), e);
            (StatusCode::NOT_FOUND, "index.html not found").into_response()
        }
    }
}

async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    request: Request,
) -> Result<Response> {
    let ChatPayload { request: body, upload } = read_chat_payload(&state, request).await?;

    let message = body.message.trim().to_string();
    if message.is_empty() && upload.is_none() {
        return Err(ChatError::InvalidRequest("Empty message and no file".to_string()).into());
    }
    if let Some(upload) = &upload {
        if !is_allowed(&secure_filename(&upload.file_name), &state.capabilities) {
            return Err(ChatError::FileNotAllowed(upload.file_name.clone()).into());
        }
    }

    let model = match body.model.filter(|m| !m.trim().is_empty()) {
        Some(m) => m,
        None => state.args.default_model.clone(),
    };
    let requested_session = body
        .session_id
        .filter(|id| valid_session_id(id))
        .or_else(|| session_from_cookie(&headers));
    let session_id = db::create_session(&state.db, requested_session).await;

    let file_info = match upload {
        Some(upload) => Some(store_upload(&state, upload).await?),
        None => None,
    };

    tracing::info!(
        session_id = %session_id,
        model = %model,
        "Chat message: {}",
        preview(&message, 80)
    );

    db::add_message(
        &state.db,
        NewMessage {
            session_id: &session_id,
            role: Role::User,
            content: &message,
            formatted_content: None,
            model: Some(&model),
        },
        file_info.as_ref(),
    )
    .await;

    let history = match db::recent_context(&state.db, &session_id, state.args.context_limit).await {
        Ok(h) => h,
        Err(e) => {
            tracing::error!("Error loading context for {}: {}", session_id, e);
            Vec::new()
        }
    };
    let enhanced = match &file_info {
        Some(f) => enhance_prompt_with_file(&message, &f.processed_content, &f.original_filename),
        None => enhance_prompt(&message),
    };
    let messages = build_context(history, enhanced);

    match state.backend.chat(&model, &messages).await {
        Ok(reply) => {
            let formatted = state.formatter.format(&reply);
            db::add_message(
                &state.db,
                NewMessage {
                    session_id: &session_id,
                    role: Role::Assistant,
                    content: &reply,
                    formatted_content: Some(formatted.clone()),
                    model: Some(&model),
                },
                None,
            )
            .await;

            Ok(with_session(
                serde_json::json!({
                    "success": true,
                    "message": {
                        "content": reply,
                        "formatted_content": formatted,
                    },
                    "session_id": session_id,
                }),
                &session_id,
            ))
        }
        Err(e) => {
            let error_text = format!("Error: {}", e);
            db::add_message(
                &state.db,
                NewMessage {
                    session_id: &session_id,
                    role: Role::Assistant,
                    content: &error_text,
                    formatted_content: None,
                    model: Some(&model),
                },
                None,
            )
            .await;

            let mut response = e.into_response();
            set_session_cookie(&mut response, &session_id);
            Ok(response)
        }
    }
}

async fn models(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let mut models = state.backend.list_models().await;
    if models.is_empty() {
        models = state.args.fallback_models.clone();
    }
    Json(serde_json::json!({
        "success": true,
        "models": models,
    }))
}

async fn sessions(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>> {
    let sessions = db::list_sessions(&state.db).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "sessions": sessions,
    })))
}

async fn load_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Response> {
    if !valid_session_id(&session_id) {
        return Err(ChatError::InvalidRequest("Invalid session id".to_string()).into());
    }
    let messages = db::session_messages(&state.db, &session_id, state.args.history_limit).await?;
    Ok(with_session(
        serde_json::json!({
            "success": true,
            "messages": messages,
            "session_id": session_id,
        }),
        &session_id,
    ))
}

async fn delete_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Result<Response> {
    if !valid_session_id(&session_id) {
        return Err(ChatError::InvalidRequest("Invalid session id".to_string()).into());
    }
    let paths = db::delete_session(&state.db, &session_id).await?;
    for path in &paths {
        if let Err(e) = tokio::fs::remove_file(path).await {
            tracing::warn!("Error deleting file {}: {}", path, e);
        }
    }
    tracing::info!("Deleted session {} ({} files)", session_id, paths.len());

    let mut response = Json(serde_json::json!({ "success": true })).into_response();
    if session_from_cookie(&headers).as_deref() == Some(session_id.as_str()) {
        clear_session_cookie(&mut response);
    }
    Ok(response)
}

async fn new_session(State(state): State<Arc<AppState>>) -> Response {
    let session_id = db::create_session(&state.db, None).await;
    with_session(
        serde_json::json!({
            "success": true,
            "session_id": session_id,
        }),
        &session_id,
    )
}

async fn not_found() -> ObservedError {
    ChatError::NotFound("Endpoint not found".to_string()).into()
}
