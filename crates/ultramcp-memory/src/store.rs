//! SQLite-backed conversation store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::Row;
use std::path::Path;
use tracing::{debug, warn};

use crate::context::{self, ConversationContext};
use crate::tokens;
use crate::{MemoryError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Archived,
    Deleted,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Archived => "archived",
            SessionStatus::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SessionStatus::Active),
            "archived" => Some(SessionStatus::Archived),
            "deleted" => Some(SessionStatus::Deleted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Tool,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
            MessageRole::Tool => "tool",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "assistant" => MessageRole::Assistant,
            "system" => MessageRole::System,
            "tool" => MessageRole::Tool,
            _ => MessageRole::User,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: String,
    pub name: Option<String>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationMessage {
    pub id: String,
    pub session_id: String,
    pub message_index: i64,
    pub role: MessageRole,
    pub content: String,
    pub tool_name: Option<String>,
    pub parent_message_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationFile {
    pub id: String,
    pub session_id: String,
    pub file_path: String,
    pub file_content: String,
    pub content_hash: String,
    pub added_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub access_count: i64,
    pub is_relevant: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationBudget {
    pub session_id: String,
    pub max_tokens: Option<i64>,
    pub max_cost_usd: Option<f64>,
    pub max_duration_ms: Option<i64>,
    pub used_tokens: i64,
    pub used_cost_usd: f64,
    pub used_duration_ms: i64,
}

/// Input to [`MemoryStore::add_files`].
#[derive(Debug, Clone)]
pub struct NewFile {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AddFilesResult {
    /// Files inserted as new rows
    pub inserted: usize,
    /// Already-present files whose access count was bumped
    pub deduplicated: usize,
}

/// Per-dimension budget flags. A dimension with no configured cap never
/// reads exceeded; reaching a cap counts as exceeding it.
#[derive(Debug, Clone, Copy, Serialize, Default)]
pub struct BudgetStatus {
    pub has_budget: bool,
    pub tokens_exceeded: bool,
    pub cost_exceeded: bool,
    pub duration_exceeded: bool,
    pub within_limits: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub name: Option<String>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub last_activity: Option<DateTime<Utc>>,
    pub message_count: i64,
    pub file_count: i64,
    pub total_tokens: i64,
    pub total_cost_usd: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionPage {
    pub sessions: Vec<SessionSummary>,
    pub total_count: i64,
    pub has_more: bool,
}

fn db_err(e: impl std::fmt::Display) -> MemoryError {
    MemoryError::Database(e.to_string())
}

fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Conversation store over a single-file SQLite database.
///
/// Cloning shares the pool. Each public operation runs in its own
/// transaction where atomicity matters; the UNIQUE indexes on
/// `(session_id, message_index)` and `(session_id, content_hash)` back up
/// the transactional discipline.
#[derive(Clone)]
pub struct MemoryStore {
    pool: SqlitePool,
}

impl MemoryStore {
    pub async fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(db_err)?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(db_path)
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Wal)
                    .synchronous(SqliteSynchronous::Normal)
                    .foreign_keys(true),
            )
            .await
            .map_err(db_err)?;

        Self::initialize_schema(&pool).await?;
        Ok(Self { pool })
    }

    async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                name TEXT,
                status TEXT NOT NULL DEFAULT 'active'
                    CHECK (status IN ('active', 'archived', 'deleted')),
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                last_message_at TIMESTAMP,
                metadata TEXT
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                message_index INTEGER NOT NULL,
                role TEXT NOT NULL CHECK (role IN ('user', 'assistant', 'system', 'tool')),
                content TEXT NOT NULL,
                tool_name TEXT,
                parent_message_id TEXT,
                timestamp TIMESTAMP NOT NULL,
                metadata TEXT
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_session_index
             ON messages(session_id, message_index)",
        )
        .execute(pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS files (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                file_path TEXT NOT NULL,
                file_content TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                added_at TIMESTAMP NOT NULL,
                last_accessed_at TIMESTAMP NOT NULL,
                access_count INTEGER NOT NULL DEFAULT 0,
                is_relevant INTEGER NOT NULL DEFAULT 1
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_files_session_hash
             ON files(session_id, content_hash)",
        )
        .execute(pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_files_accessed
             ON files(session_id, last_accessed_at DESC)",
        )
        .execute(pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS budgets (
                session_id TEXT PRIMARY KEY REFERENCES sessions(id) ON DELETE CASCADE,
                max_tokens INTEGER,
                max_cost_usd REAL,
                max_duration_ms INTEGER,
                used_tokens INTEGER NOT NULL DEFAULT 0,
                used_cost_usd REAL NOT NULL DEFAULT 0,
                used_duration_ms INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    /// Fetch a session by id, creating it lazily when absent.
    pub async fn get_or_create_session(
        &self,
        id: Option<&str>,
        name: Option<&str>,
    ) -> Result<Session> {
        if let Some(id) = id {
            if let Some(session) = self.find_session(id).await? {
                return Ok(session);
            }
        }

        let session = Session {
            id: id.map(str::to_string)
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            name: name.map(str::to_string),
            status: SessionStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_message_at: None,
            metadata: None,
        };

        sqlx::query(
            r#"
            INSERT INTO sessions (id, name, status, created_at, updated_at)
            VALUES (?, ?, 'active', ?, ?)
            "#,
        )
        .bind(&session.id)
        .bind(&session.name)
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        debug!(session_id = %session.id, "Created session");
        Ok(session)
    }

    async fn find_session(&self, id: &str) -> Result<Option<Session>> {
        let row = sqlx::query(
            "SELECT id, name, status, created_at, updated_at, last_message_at, metadata
             FROM sessions WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.as_ref().map(session_from_row))
    }

    async fn require_session(&self, id: &str) -> Result<Session> {
        self.find_session(id)
            .await?
            .ok_or_else(|| MemoryError::SessionNotFound(id.to_string()))
    }

    /// Append a message, computing the next dense index inside one
    /// transaction so concurrent callers can never produce duplicates.
    #[allow(clippy::too_many_arguments)]
    pub async fn add_message(
        &self,
        session_id: &str,
        role: MessageRole,
        content: &str,
        tool_name: Option<&str>,
        parent_message_id: Option<&str>,
        metadata: Option<serde_json::Value>,
    ) -> Result<ConversationMessage> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let next_index: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(message_index) + 1, 0) FROM messages WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        let message = ConversationMessage {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            message_index: next_index,
            role,
            content: content.to_string(),
            tool_name: tool_name.map(str::to_string),
            parent_message_id: parent_message_id.map(str::to_string),
            timestamp: Utc::now(),
            metadata,
        };

        sqlx::query(
            r#"
            INSERT INTO messages
                (id, session_id, message_index, role, content, tool_name,
                 parent_message_id, timestamp, metadata)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&message.id)
        .bind(&message.session_id)
        .bind(message.message_index)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(&message.tool_name)
        .bind(&message.parent_message_id)
        .bind(message.timestamp)
        .bind(message.metadata.as_ref().map(|m| m.to_string()))
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        sqlx::query("UPDATE sessions SET last_message_at = ?, updated_at = ? WHERE id = ?")
            .bind(message.timestamp)
            .bind(message.timestamp)
            .bind(session_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(message)
    }

    /// Attach files, deduplicating on content hash.
    ///
    /// All lookups and writes share one transaction: a file whose
    /// `(session_id, content_hash)` already exists gets its access count
    /// bumped and `last_accessed_at` refreshed instead of a new row.
    pub async fn add_files(&self, session_id: &str, files: &[NewFile]) -> Result<AddFilesResult> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let mut result = AddFilesResult::default();
        let now = Utc::now();

        for file in files {
            let hash = content_hash(&file.content);

            let existing: Option<String> = sqlx::query_scalar(
                "SELECT id FROM files WHERE session_id = ? AND content_hash = ?",
            )
            .bind(session_id)
            .bind(&hash)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;

            match existing {
                Some(id) => {
                    sqlx::query(
                        "UPDATE files SET access_count = access_count + 1, last_accessed_at = ?
                         WHERE id = ?",
                    )
                    .bind(now)
                    .bind(&id)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err)?;
                    result.deduplicated += 1;
                }
                None => {
                    sqlx::query(
                        r#"
                        INSERT INTO files
                            (id, session_id, file_path, file_content, content_hash,
                             added_at, last_accessed_at, access_count, is_relevant)
                        VALUES (?, ?, ?, ?, ?, ?, ?, 0, 1)
                        "#,
                    )
                    .bind(uuid::Uuid::new_v4().to_string())
                    .bind(session_id)
                    .bind(&file.path)
                    .bind(&file.content)
                    .bind(&hash)
                    .bind(now)
                    .bind(now)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err)?;
                    result.inserted += 1;
                }
            }
        }

        tx.commit().await.map_err(db_err)?;
        Ok(result)
    }

    /// Load the session view, counting tokens with the model-appropriate
    /// encoder and pruning to `max_tokens` when set.
    pub async fn get_conversation_context(
        &self,
        session_id: &str,
        max_tokens: Option<usize>,
        include_files: bool,
        model: &str,
    ) -> Result<ConversationContext> {
        self.require_session(session_id).await?;

        let rows = sqlx::query(
            "SELECT id, session_id, message_index, role, content, tool_name,
                    parent_message_id, timestamp, metadata
             FROM messages WHERE session_id = ? ORDER BY message_index",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        let messages: Vec<ConversationMessage> = rows.iter().map(message_from_row).collect();

        let files: Vec<ConversationFile> = if include_files {
            let rows = sqlx::query(
                "SELECT id, session_id, file_path, file_content, content_hash,
                        added_at, last_accessed_at, access_count, is_relevant
                 FROM files
                 WHERE session_id = ? AND is_relevant = 1
                 ORDER BY last_accessed_at DESC",
            )
            .bind(session_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
            rows.iter().map(file_from_row).collect()
        } else {
            Vec::new()
        };

        let mut approximate = false;
        let message_costs: Vec<usize> = messages
            .iter()
            .map(|m| {
                let count = tokens::count_message(model, &m.content, m.tool_name.as_deref());
                approximate |= count.approximate;
                count.tokens
            })
            .collect();
        let file_costs: Vec<usize> = files
            .iter()
            .map(|f| {
                let count = tokens::count_text_for_model(model, &f.file_content);
                approximate |= count.approximate;
                count.tokens
            })
            .collect();

        let total = view_tokens(&message_costs, &file_costs);

        let (messages, files, total, pruned) = match max_tokens {
            Some(max) if total > max => {
                let (message_budget, file_budget) = context::split_budget(max);

                let kept_messages = context::select_messages(&message_costs, message_budget);
                let kept_files = context::select_files(&file_costs, file_budget);

                let kept_message_costs: Vec<usize> =
                    kept_messages.iter().map(|&i| message_costs[i]).collect();
                let kept_file_costs: Vec<usize> =
                    kept_files.iter().map(|&i| file_costs[i]).collect();

                let messages: Vec<ConversationMessage> = keep_indices(messages, &kept_messages);
                let files: Vec<ConversationFile> = keep_indices(files, &kept_files);

                let total = view_tokens(&kept_message_costs, &kept_file_costs);
                (messages, files, total, true)
            }
            _ => (messages, files, total, false),
        };

        Ok(ConversationContext {
            messages,
            files,
            total_tokens: total,
            approximate,
            pruned,
        })
    }

    /// Upsert the single budget row. Re-setting caps preserves the used
    /// counters.
    pub async fn set_budget(
        &self,
        session_id: &str,
        max_tokens: Option<i64>,
        max_cost_usd: Option<f64>,
        max_duration_ms: Option<i64>,
    ) -> Result<()> {
        self.require_session(session_id).await?;

        sqlx::query(
            r#"
            INSERT INTO budgets (session_id, max_tokens, max_cost_usd, max_duration_ms)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(session_id) DO UPDATE SET
                max_tokens = excluded.max_tokens,
                max_cost_usd = excluded.max_cost_usd,
                max_duration_ms = excluded.max_duration_ms
            "#,
        )
        .bind(session_id)
        .bind(max_tokens)
        .bind(max_cost_usd)
        .bind(max_duration_ms)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    /// Atomically add to the used counters.
    ///
    /// Budget tracking is best-effort: database errors are logged and
    /// swallowed, and a session without a budget row is a silent no-op.
    pub async fn update_budget_usage(
        &self,
        session_id: &str,
        delta_tokens: i64,
        delta_cost_usd: f64,
        delta_duration_ms: i64,
    ) {
        let outcome = sqlx::query(
            r#"
            UPDATE budgets
            SET used_tokens = used_tokens + ?,
                used_cost_usd = used_cost_usd + ?,
                used_duration_ms = used_duration_ms + ?
            WHERE session_id = ?
            "#,
        )
        .bind(delta_tokens)
        .bind(delta_cost_usd)
        .bind(delta_duration_ms)
        .bind(session_id)
        .execute(&self.pool)
        .await;

        if let Err(e) = outcome {
            warn!(session_id, "Budget usage update failed: {e}");
        }
    }

    pub async fn get_budget(&self, session_id: &str) -> Result<Option<ConversationBudget>> {
        let row = sqlx::query(
            "SELECT session_id, max_tokens, max_cost_usd, max_duration_ms,
                    used_tokens, used_cost_usd, used_duration_ms
             FROM budgets WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(|row| ConversationBudget {
            session_id: row.get("session_id"),
            max_tokens: row.get("max_tokens"),
            max_cost_usd: row.get("max_cost_usd"),
            max_duration_ms: row.get("max_duration_ms"),
            used_tokens: row.get("used_tokens"),
            used_cost_usd: row.get("used_cost_usd"),
            used_duration_ms: row.get("used_duration_ms"),
        }))
    }

    /// Per-dimension flags plus the aggregate. Enforcement is the
    /// caller's decision; nothing here refuses work.
    pub async fn check_budget_limits(&self, session_id: &str) -> Result<BudgetStatus> {
        let Some(budget) = self.get_budget(session_id).await? else {
            return Ok(BudgetStatus {
                has_budget: false,
                within_limits: true,
                ..Default::default()
            });
        };

        let tokens_exceeded = budget
            .max_tokens
            .is_some_and(|max| budget.used_tokens >= max);
        let cost_exceeded = budget
            .max_cost_usd
            .is_some_and(|max| budget.used_cost_usd >= max);
        let duration_exceeded = budget
            .max_duration_ms
            .is_some_and(|max| budget.used_duration_ms >= max);

        Ok(BudgetStatus {
            has_budget: true,
            tokens_exceeded,
            cost_exceeded,
            duration_exceeded,
            within_limits: !(tokens_exceeded || cost_exceeded || duration_exceeded),
        })
    }

    /// Paginated session summaries with per-session aggregates.
    pub async fn list_sessions(
        &self,
        status: Option<SessionStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<SessionPage> {
        let status_str = status.map(|s| s.as_str());

        let total_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sessions WHERE (? IS NULL OR status = ?)",
        )
        .bind(status_str)
        .bind(status_str)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        let rows = sqlx::query(
            r#"
            SELECT s.id, s.name, s.status, s.created_at, s.last_message_at,
                   (SELECT COUNT(*) FROM messages m WHERE m.session_id = s.id) AS message_count,
                   (SELECT COUNT(*) FROM files f WHERE f.session_id = s.id) AS file_count,
                   COALESCE(b.used_tokens, 0) AS total_tokens,
                   COALESCE(b.used_cost_usd, 0.0) AS total_cost_usd
            FROM sessions s
            LEFT JOIN budgets b ON b.session_id = s.id
            WHERE (? IS NULL OR s.status = ?)
            ORDER BY COALESCE(s.last_message_at, s.updated_at) DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(status_str)
        .bind(status_str)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let sessions: Vec<SessionSummary> = rows
            .iter()
            .map(|row| {
                let status: String = row.get("status");
                SessionSummary {
                    id: row.get("id"),
                    name: row.get("name"),
                    status: SessionStatus::parse(&status).unwrap_or(SessionStatus::Active),
                    created_at: row.get("created_at"),
                    last_activity: row.get("last_message_at"),
                    message_count: row.get("message_count"),
                    file_count: row.get("file_count"),
                    total_tokens: row.get("total_tokens"),
                    total_cost_usd: row.get("total_cost_usd"),
                }
            })
            .collect();

        let has_more = offset + (sessions.len() as i64) < total_count;
        Ok(SessionPage {
            sessions,
            total_count,
            has_more,
        })
    }

    pub async fn update_session_status(&self, id: &str, status: SessionStatus) -> Result<()> {
        let updated = sqlx::query("UPDATE sessions SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        if updated.rows_affected() == 0 {
            return Err(MemoryError::SessionNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Hard-delete a session. The cascade removes its messages, files,
    /// and budget; this is the only path that removes them.
    pub async fn delete_session(&self, id: &str) -> Result<()> {
        let deleted = sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        if deleted.rows_affected() == 0 {
            return Err(MemoryError::SessionNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Messages of a session in index order (test and CLI helper).
    pub async fn messages(&self, session_id: &str) -> Result<Vec<ConversationMessage>> {
        let rows = sqlx::query(
            "SELECT id, session_id, message_index, role, content, tool_name,
                    parent_message_id, timestamp, metadata
             FROM messages WHERE session_id = ? ORDER BY message_index",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.iter().map(message_from_row).collect())
    }

    /// Files of a session by recency of access (test and CLI helper).
    pub async fn files(&self, session_id: &str) -> Result<Vec<ConversationFile>> {
        let rows = sqlx::query(
            "SELECT id, session_id, file_path, file_content, content_hash,
                    added_at, last_accessed_at, access_count, is_relevant
             FROM files WHERE session_id = ? ORDER BY last_accessed_at DESC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.iter().map(file_from_row).collect())
    }
}

/// Token total of a view: message costs, assistant priming when any
/// message is present, file costs.
fn view_tokens(message_costs: &[usize], file_costs: &[usize]) -> usize {
    let messages: usize = message_costs.iter().sum();
    let priming = if message_costs.is_empty() {
        0
    } else {
        tokens::ASSISTANT_PRIMING
    };
    messages + priming + file_costs.iter().sum::<usize>()
}

fn keep_indices<T>(items: Vec<T>, indices: &[usize]) -> Vec<T> {
    let keep: std::collections::HashSet<usize> = indices.iter().copied().collect();
    items
        .into_iter()
        .enumerate()
        .filter_map(|(i, item)| keep.contains(&i).then_some(item))
        .collect()
}

fn session_from_row(row: &SqliteRow) -> Session {
    let status: String = row.get("status");
    let metadata: Option<String> = row.get("metadata");
    Session {
        id: row.get("id"),
        name: row.get("name"),
        status: SessionStatus::parse(&status).unwrap_or(SessionStatus::Active),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        last_message_at: row.get("last_message_at"),
        metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
    }
}

fn message_from_row(row: &SqliteRow) -> ConversationMessage {
    let role: String = row.get("role");
    let metadata: Option<String> = row.get("metadata");
    ConversationMessage {
        id: row.get("id"),
        session_id: row.get("session_id"),
        message_index: row.get("message_index"),
        role: MessageRole::parse(&role),
        content: row.get("content"),
        tool_name: row.get("tool_name"),
        parent_message_id: row.get("parent_message_id"),
        timestamp: row.get("timestamp"),
        metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
    }
}

fn file_from_row(row: &SqliteRow) -> ConversationFile {
    ConversationFile {
        id: row.get("id"),
        session_id: row.get("session_id"),
        file_path: row.get("file_path"),
        file_content: row.get("file_content"),
        content_hash: row.get("content_hash"),
        added_at: row.get("added_at"),
        last_accessed_at: row.get("last_accessed_at"),
        access_count: row.get("access_count"),
        is_relevant: row.get("is_relevant"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn store_in(dir: &TempDir) -> MemoryStore {
        MemoryStore::new(&dir.path().join("memory.db")).await.unwrap()
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;

        let a = store
            .get_or_create_session(Some("s1"), Some("first"))
            .await
            .unwrap();
        let b = store.get_or_create_session(Some("s1"), None).await.unwrap();

        assert_eq!(a.id, b.id);
        assert_eq!(b.name.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn message_indices_are_dense_from_zero() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;
        let session = store.get_or_create_session(None, None).await.unwrap();

        for content in ["a", "b", "c"] {
            store
                .add_message(&session.id, MessageRole::User, content, None, None, None)
                .await
                .unwrap();
        }

        let messages = store.messages(&session.id).await.unwrap();
        let indices: Vec<i64> = messages.iter().map(|m| m.message_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn add_message_updates_last_message_at() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;
        let session = store.get_or_create_session(None, None).await.unwrap();
        assert!(session.last_message_at.is_none());

        store
            .add_message(&session.id, MessageRole::User, "hi", None, None, None)
            .await
            .unwrap();

        let session = store
            .get_or_create_session(Some(&session.id), None)
            .await
            .unwrap();
        assert!(session.last_message_at.is_some());
    }

    #[tokio::test]
    async fn duplicate_file_bumps_access_count() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;
        let session = store.get_or_create_session(None, None).await.unwrap();

        let file = NewFile {
            path: "/x.ts".to_string(),
            content: "HELLO".to_string(),
        };

        let first = store.add_files(&session.id, &[file.clone()]).await.unwrap();
        assert_eq!(first.inserted, 1);
        assert_eq!(first.deduplicated, 0);

        let second = store.add_files(&session.id, &[file]).await.unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.deduplicated, 1);

        let files = store.files(&session.id).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].access_count, 1);
        assert!(files[0].last_accessed_at >= files[0].added_at);
    }

    #[tokio::test]
    async fn same_content_different_path_still_deduplicates() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;
        let session = store.get_or_create_session(None, None).await.unwrap();

        store
            .add_files(
                &session.id,
                &[NewFile {
                    path: "/a.ts".to_string(),
                    content: "SAME".to_string(),
                }],
            )
            .await
            .unwrap();
        let second = store
            .add_files(
                &session.id,
                &[NewFile {
                    path: "/b.ts".to_string(),
                    content: "SAME".to_string(),
                }],
            )
            .await
            .unwrap();

        assert_eq!(second.deduplicated, 1);
        assert_eq!(store.files(&session.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn budget_upsert_preserves_used_counters() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;
        let session = store.get_or_create_session(None, None).await.unwrap();

        store
            .set_budget(&session.id, Some(1000), Some(1.0), None)
            .await
            .unwrap();
        store.update_budget_usage(&session.id, 400, 0.25, 1500).await;

        // Re-setting the caps must not clear usage
        store
            .set_budget(&session.id, Some(2000), Some(2.0), Some(60_000))
            .await
            .unwrap();

        let budget = store.get_budget(&session.id).await.unwrap().unwrap();
        assert_eq!(budget.max_tokens, Some(2000));
        assert_eq!(budget.used_tokens, 400);
        assert!((budget.used_cost_usd - 0.25).abs() < 1e-9);
        assert_eq!(budget.used_duration_ms, 1500);
    }

    #[tokio::test]
    async fn budget_usage_without_budget_is_silent_noop() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;
        let session = store.get_or_create_session(None, None).await.unwrap();

        store.update_budget_usage(&session.id, 100, 0.1, 10).await;
        assert!(store.get_budget(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn budget_limits_flags() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;
        let session = store.get_or_create_session(None, None).await.unwrap();

        // No budget: within limits
        let status = store.check_budget_limits(&session.id).await.unwrap();
        assert!(!status.has_budget);
        assert!(status.within_limits);

        store
            .set_budget(&session.id, Some(100), Some(1.0), None)
            .await
            .unwrap();
        store.update_budget_usage(&session.id, 100, 0.5, 0).await;

        let status = store.check_budget_limits(&session.id).await.unwrap();
        assert!(status.tokens_exceeded);
        assert!(!status.cost_exceeded);
        // Duration has no cap configured
        assert!(!status.duration_exceeded);
        assert!(!status.within_limits);
    }

    #[tokio::test]
    async fn context_without_budget_returns_everything() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;
        let session = store.get_or_create_session(None, None).await.unwrap();

        store
            .add_message(&session.id, MessageRole::User, "hello there", None, None, None)
            .await
            .unwrap();
        store
            .add_files(
                &session.id,
                &[NewFile {
                    path: "/f.rs".to_string(),
                    content: "fn main() {}".to_string(),
                }],
            )
            .await
            .unwrap();

        let context = store
            .get_conversation_context(&session.id, None, true, "gpt-4o")
            .await
            .unwrap();

        assert_eq!(context.messages.len(), 1);
        assert_eq!(context.files.len(), 1);
        assert!(!context.pruned);
        assert!(context.total_tokens > 0);
    }

    #[tokio::test]
    async fn context_with_zero_budget_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;
        let session = store.get_or_create_session(None, None).await.unwrap();

        store
            .add_message(&session.id, MessageRole::User, "hello", None, None, None)
            .await
            .unwrap();
        store
            .add_files(
                &session.id,
                &[NewFile {
                    path: "/f.rs".to_string(),
                    content: "content".to_string(),
                }],
            )
            .await
            .unwrap();

        let context = store
            .get_conversation_context(&session.id, Some(0), true, "gpt-4o")
            .await
            .unwrap();

        assert!(context.messages.is_empty());
        assert!(context.files.is_empty());
        assert!(context.pruned);
    }

    #[tokio::test]
    async fn context_pruning_keeps_newest_messages() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;
        let session = store.get_or_create_session(None, None).await.unwrap();

        let long = "word ".repeat(200);
        store
            .add_message(&session.id, MessageRole::User, &long, None, None, None)
            .await
            .unwrap();
        store
            .add_message(&session.id, MessageRole::Assistant, "short answer", None, None, None)
            .await
            .unwrap();

        // Budget fits the short message but not the long one
        let context = store
            .get_conversation_context(&session.id, Some(50), false, "gpt-4o")
            .await
            .unwrap();

        assert!(context.pruned);
        assert_eq!(context.messages.len(), 1);
        assert_eq!(context.messages[0].content, "short answer");
    }

    #[tokio::test]
    async fn context_excludes_files_when_not_requested() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;
        let session = store.get_or_create_session(None, None).await.unwrap();

        store
            .add_files(
                &session.id,
                &[NewFile {
                    path: "/f.rs".to_string(),
                    content: "content".to_string(),
                }],
            )
            .await
            .unwrap();

        let context = store
            .get_conversation_context(&session.id, None, false, "gpt-4o")
            .await
            .unwrap();
        assert!(context.files.is_empty());
    }

    #[tokio::test]
    async fn list_sessions_paginates_with_counts() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;

        for i in 0..3 {
            let session = store
                .get_or_create_session(None, Some(&format!("session-{i}")))
                .await
                .unwrap();
            store
                .add_message(&session.id, MessageRole::User, "hi", None, None, None)
                .await
                .unwrap();
        }

        let page = store
            .list_sessions(Some(SessionStatus::Active), 2, 0)
            .await
            .unwrap();
        assert_eq!(page.total_count, 3);
        assert_eq!(page.sessions.len(), 2);
        assert!(page.has_more);
        assert_eq!(page.sessions[0].message_count, 1);

        let rest = store
            .list_sessions(Some(SessionStatus::Active), 2, 2)
            .await
            .unwrap();
        assert_eq!(rest.sessions.len(), 1);
        assert!(!rest.has_more);
    }

    #[tokio::test]
    async fn status_transitions_and_filtering() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;
        let session = store.get_or_create_session(None, None).await.unwrap();

        store
            .update_session_status(&session.id, SessionStatus::Archived)
            .await
            .unwrap();

        let active = store
            .list_sessions(Some(SessionStatus::Active), 10, 0)
            .await
            .unwrap();
        assert_eq!(active.total_count, 0);

        let archived = store
            .list_sessions(Some(SessionStatus::Archived), 10, 0)
            .await
            .unwrap();
        assert_eq!(archived.total_count, 1);
    }

    #[tokio::test]
    async fn delete_cascades_to_owned_rows() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;
        let session = store.get_or_create_session(None, None).await.unwrap();

        store
            .add_message(&session.id, MessageRole::User, "hi", None, None, None)
            .await
            .unwrap();
        store
            .add_files(
                &session.id,
                &[NewFile {
                    path: "/f".to_string(),
                    content: "c".to_string(),
                }],
            )
            .await
            .unwrap();
        store.set_budget(&session.id, Some(10), None, None).await.unwrap();

        store.delete_session(&session.id).await.unwrap();

        assert!(store.messages(&session.id).await.unwrap().is_empty());
        assert!(store.files(&session.id).await.unwrap().is_empty());
        assert!(store.get_budget(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_session_errors() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;

        let err = store
            .get_conversation_context("missing", None, true, "gpt-4o")
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::SessionNotFound(_)));

        let err = store
            .update_session_status("missing", SessionStatus::Archived)
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::SessionNotFound(_)));
    }
}
