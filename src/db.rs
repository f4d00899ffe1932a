use crate::constants::DB_PRAGMAS;
use crate::str_utils::preview;
use crate::types::{
    ChatError, ChatMessage, FileInfo, NewMessage, Result, Role, SessionRow, SessionSummary,
    StoredMessage,
};
use sqlx::sqlite::SqlitePool;
use std::path::Path;

pub type DbPool = SqlitePool;

const NOW: &str = "strftime('%Y-%m-%d %H:%M:%f', 'now')";

pub async fn init_db<P: AsRef<Path>>(path: P) -> Result<DbPool> {
    let path_str = match path.as_ref().to_str() {
        Some(s) => s,
        None => {
            return Err(ChatError::Internal(
                "Invalid database path: Path contains non-UTF8 characters".to_string(),
                tracing_error::SpanTrace::capture(),
            )
            .into())
        }
    };
    let url = format!("sqlite:{}?mode=rwc", path_str);

    let pool = match SqlitePool::connect(&url).await {
        Ok(p) => p,
        Err(e) => return Err(ChatError::Database(e).into()),
    };

    configure_db(&pool).await?;

    if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
        return Err(ChatError::Migration(e.to_string()).into());
    }

    verify_schema_version(&pool).await;

    Ok(pool)
}

async fn configure_db(pool: &DbPool) -> Result<()> {
    for pragma in DB_PRAGMAS {
        if let Err(e) = sqlx::query(pragma).execute(pool).await {
            return Err(ChatError::Database(e).into());
        }
    }
    Ok(())
}

async fn verify_schema_version(pool: &DbPool) {
    let version_row: std::result::Result<(String,), sqlx::Error> =
        sqlx::query_as("SELECT value FROM schema_metadata WHERE key = 'schema_version'")
            .fetch_one(pool)
            .await;

    match version_row {
        Ok((version,)) => {
            tracing::info!("Database initialized. Schema version: {}", version);
        }
        Err(e) => {
            tracing::warn!("Could not verify schema version: {}", e);
        }
    }
}

pub async fn ping(pool: &DbPool) -> Result<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Creates the session row if it does not exist yet and returns its id. A
/// failed insert is logged; the id is still handed back so the chat can go on.
pub async fn create_session(pool: &DbPool, session_id: Option<String>) -> String {
    let id = session_id
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let title = format!(
        "Chat Session {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M")
    );

    if let Err(e) = sqlx::query("INSERT OR IGNORE INTO sessions (id, title) VALUES (?, ?)")
        .bind(&id)
        .bind(&title)
        .execute(pool)
        .await
    {
        tracing::error!("Error creating session {}: {}", id, e);
    }
    id
}

/// Appends a message (and its attachment, if any) to the log. Returns the new
/// message id, or `None` when the write failed.
pub async fn add_message(
    pool: &DbPool,
    message: NewMessage<'_>,
    file: Option<&FileInfo>,
) -> Option<i64> {
    match insert_message(pool, &message, file).await {
        Ok(id) => Some(id),
        Err(e) => {
            tracing::error!(
                "Error adding {} message to session {}: {}",
                message.role,
                message.session_id,
                e
            );
            None
        }
    }
}

async fn insert_message(
    pool: &DbPool,
    message: &NewMessage<'_>,
    file: Option<&FileInfo>,
) -> Result<i64> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query(
        "INSERT INTO messages (session_id, role, content, model, has_file, file_name, file_type, formatted_content)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(message.session_id)
    .bind(message.role.as_str())
    .bind(message.content)
    .bind(message.model)
    .bind(file.is_some())
    .bind(file.map(|f| f.original_filename.as_str()))
    .bind(file.map(|f| f.mime_type.as_str()))
    .bind(message.formatted_content.as_deref())
    .execute(&mut *tx)
    .await?;
    let message_id = row.last_insert_rowid();

    if let Some(f) = file {
        sqlx::query(
            "INSERT INTO file_attachments
             (message_id, filename, original_filename, file_path, file_size, mime_type, processed_content, sha256)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(message_id)
        .bind(&f.filename)
        .bind(&f.original_filename)
        .bind(&f.file_path)
        .bind(f.file_size)
        .bind(&f.mime_type)
        .bind(&f.processed_content)
        .bind(&f.sha256)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query(&format!("UPDATE sessions SET last_active = {} WHERE id = ?", NOW))
        .bind(message.session_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(message_id)
}

/// The last `limit` messages of a session, oldest first.
pub async fn session_messages(
    pool: &DbPool,
    session_id: &str,
    limit: i64,
) -> Result<Vec<StoredMessage>> {
    let rows = sqlx::query_as::<_, StoredMessage>(
        "SELECT * FROM (
             SELECT m.id, m.role, m.content, m.formatted_content, m.timestamp, m.has_file,
                    COALESCE(fa.original_filename, m.file_name) AS file_name, m.model
             FROM messages m
             LEFT JOIN file_attachments fa ON fa.message_id = m.id
             WHERE m.session_id = ?
             ORDER BY m.id DESC
             LIMIT ?
         ) ORDER BY id ASC",
    )
    .bind(session_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// The conversation as replayed to the model: the last `limit` messages, oldest
/// first, with any attachment text folded into its message.
pub async fn recent_context(
    pool: &DbPool,
    session_id: &str,
    limit: i64,
) -> Result<Vec<ChatMessage>> {
    let rows: Vec<(i64, String, String, Option<String>)> = sqlx::query_as(
        "SELECT * FROM (
             SELECT m.id, m.role, m.content, fa.processed_content
             FROM messages m
             LEFT JOIN file_attachments fa ON fa.message_id = m.id
             WHERE m.session_id = ?
             ORDER BY m.id DESC
             LIMIT ?
         ) ORDER BY id ASC",
    )
    .bind(session_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let mut context = Vec::with_capacity(rows.len());
    for (id, role, content, file_text) in rows {
        let role = match Role::try_from(role.as_str()) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Skipping message {} in context: {}", id, e);
                continue;
            }
        };
        let content = match file_text {
            Some(text) if !text.is_empty() => format!("{}\n\nFile content:\n{}", content, text),
            _ => content,
        };
        context.push(ChatMessage::new(role, content));
    }
    Ok(context)
}

pub async fn list_sessions(pool: &DbPool) -> Result<Vec<SessionSummary>> {
    let rows = sqlx::query_as::<_, SessionRow>(
        "SELECT s.id, s.title, s.created_at, s.last_active,
                COUNT(m.id) AS message_count,
                (SELECT content FROM messages WHERE session_id = s.id ORDER BY id DESC LIMIT 1) AS last_message
         FROM sessions s
         LEFT JOIN messages m ON m.session_id = s.id
         GROUP BY s.id
         ORDER BY s.last_active DESC, s.rowid DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|mut row| {
            row.last_message = row.last_message.map(|m| preview(&m, 100).into_owned());
            SessionSummary::from(row)
        })
        .collect())
}

/// Removes a session with its messages and attachment rows. Returns the paths
/// of the attachment files so the caller can remove them from disk.
pub async fn delete_session(pool: &DbPool, session_id: &str) -> Result<Vec<String>> {
    let mut tx = pool.begin().await?;

    let paths: Vec<(String,)> = sqlx::query_as(
        "SELECT fa.file_path FROM file_attachments fa
         JOIN messages m ON fa.message_id = m.id
         WHERE m.session_id = ?",
    )
    .bind(session_id)
    .fetch_all(&mut *tx)
    .await?;

    sqlx::query(
        "DELETE FROM file_attachments
         WHERE message_id IN (SELECT id FROM messages WHERE session_id = ?)",
    )
    .bind(session_id)
    .execute(&mut *tx)
    .await?;
    sqlx::query("DELETE FROM messages WHERE session_id = ?")
        .bind(session_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM sessions WHERE id = ?")
        .bind(session_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(paths.into_iter().map(|(p,)| p).collect())
}
