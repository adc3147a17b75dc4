//! SQLite-backed request tracker

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::Row;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};
use ultramcp_core::types::{FinishReason, ProviderKind, Usage};
use ultramcp_pricing::PricingService;

use crate::{Result, TrackingError};

/// Context captured when a model call starts.
#[derive(Debug, Clone)]
pub struct StartContext {
    pub provider: ProviderKind,
    pub model: String,
    pub tool_name: Option<String>,
    /// Prompt text retained in the sanitized request snapshot. API keys
    /// never pass through here.
    pub prompt: String,
}

/// Terminal data for a successful call.
#[derive(Debug, Clone)]
pub struct CompletionOutcome {
    pub response_text: String,
    pub usage: Option<Usage>,
    pub finish_reason: Option<FinishReason>,
    pub ended_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Success,
    Error,
}

impl RequestStatus {
    fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Success => "success",
            RequestStatus::Error => "error",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "success" => RequestStatus::Success,
            "error" => RequestStatus::Error,
            _ => RequestStatus::Pending,
        }
    }
}

/// One row of the request log.
#[derive(Debug, Clone, Serialize)]
pub struct RequestRecord {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub provider: String,
    pub model: String,
    pub tool_name: Option<String>,
    pub status: RequestStatus,
    pub request_payload: Option<String>,
    pub response_payload: Option<String>,
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
    pub total_tokens: Option<i64>,
    pub cost_usd: Option<f64>,
    pub duration_ms: Option<i64>,
    pub finish_reason: Option<String>,
    pub error_message: Option<String>,
}

/// Aggregate view for the `db stats` command.
#[derive(Debug, Clone, Serialize, Default)]
pub struct TrackerStats {
    pub total_requests: i64,
    pub success_count: i64,
    pub error_count: i64,
    pub pending_count: i64,
    pub total_tokens: i64,
    pub total_cost_usd: f64,
}

/// Request tracker over a single-file SQLite store.
///
/// Cloning is cheap; clones share the pool and pricing handle.
#[derive(Clone)]
pub struct RequestTracker {
    pool: SqlitePool,
    pricing: Arc<PricingService>,
}

impl RequestTracker {
    /// Open (creating if missing) the tracking store and apply the schema.
    pub async fn new(db_path: &Path, pricing: Arc<PricingService>) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TrackingError::Database(e.to_string()))?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(db_path)
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Wal)
                    .synchronous(SqliteSynchronous::Normal),
            )
            .await
            .map_err(|e| TrackingError::Database(e.to_string()))?;

        Self::initialize_schema(&pool).await?;

        Ok(Self { pool, pricing })
    }

    async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS requests (
                id TEXT PRIMARY KEY,
                started_at TIMESTAMP NOT NULL,
                ended_at TIMESTAMP,
                provider TEXT NOT NULL,
                model TEXT NOT NULL,
                tool_name TEXT,
                request_payload TEXT,
                status TEXT NOT NULL DEFAULT 'pending'
                    CHECK (status IN ('pending', 'success', 'error')),
                input_tokens INTEGER,
                output_tokens INTEGER,
                total_tokens INTEGER,
                cost_usd REAL,
                duration_ms INTEGER,
                finish_reason TEXT,
                response_payload TEXT,
                error_message TEXT
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(|e| TrackingError::Database(e.to_string()))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_requests_started ON requests(started_at DESC)",
        )
        .execute(pool)
        .await
        .map_err(|e| TrackingError::Database(e.to_string()))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_requests_provider ON requests(provider, started_at DESC)",
        )
        .execute(pool)
        .await
        .map_err(|e| TrackingError::Database(e.to_string()))?;

        Ok(())
    }

    /// Insert a `pending` record and return its id.
    pub async fn start(&self, ctx: StartContext) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();

        let payload = serde_json::json!({
            "prompt": ctx.prompt,
            "model": ctx.model,
            "provider": ctx.provider.as_str(),
            "tool_name": ctx.tool_name,
        });

        sqlx::query(
            r#"
            INSERT INTO requests (id, started_at, provider, model, tool_name, request_payload, status)
            VALUES (?, ?, ?, ?, ?, ?, 'pending')
            "#,
        )
        .bind(&id)
        .bind(started_at)
        .bind(ctx.provider.as_str())
        .bind(&ctx.model)
        .bind(&ctx.tool_name)
        .bind(payload.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| TrackingError::Database(e.to_string()))?;

        debug!(request_id = %id, provider = %ctx.provider, model = %ctx.model, "Opened tracking record");
        Ok(id)
    }

    /// Open a record and wrap it in a scope guard.
    pub async fn start_tracked(&self, ctx: StartContext) -> Result<TrackedCall> {
        let request_id = self.start(ctx).await?;
        Ok(TrackedCall {
            tracker: self.clone(),
            request_id,
            closed: false,
        })
    }

    /// Close a record as `success`, resolving cost from reported usage.
    ///
    /// A failed cost lookup never fails completion: the record closes with
    /// `cost_usd = 0`.
    pub async fn complete(&self, request_id: &str, outcome: CompletionOutcome) -> Result<()> {
        let started_at = self.started_at(request_id).await?;
        let duration_ms = (outcome.ended_at - started_at).num_milliseconds();

        let (input_tokens, output_tokens, total_tokens, cost_usd) = match outcome.usage {
            Some(usage) => {
                let model = self.model_of(request_id).await?;
                let cost = match self
                    .pricing
                    .calculate_cost(&model, usage.input_tokens as u64, usage.output_tokens as u64)
                    .await
                {
                    Ok(Some(breakdown)) => breakdown.total_cost,
                    Ok(None) => {
                        debug!(model = %model, "No pricing entry for model, recording zero cost");
                        0.0
                    }
                    Err(e) => {
                        warn!("Cost resolution failed ({e}), recording zero cost");
                        0.0
                    }
                };
                (
                    Some(usage.input_tokens as i64),
                    Some(usage.output_tokens as i64),
                    Some(usage.total_tokens as i64),
                    Some(cost),
                )
            }
            None => (None, None, None, None),
        };

        let updated = sqlx::query(
            r#"
            UPDATE requests
            SET status = 'success',
                ended_at = ?,
                duration_ms = ?,
                input_tokens = ?,
                output_tokens = ?,
                total_tokens = ?,
                cost_usd = ?,
                finish_reason = ?,
                response_payload = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(outcome.ended_at)
        .bind(duration_ms)
        .bind(input_tokens)
        .bind(output_tokens)
        .bind(total_tokens)
        .bind(cost_usd)
        .bind(outcome.finish_reason.map(|r| r.as_str().to_string()))
        .bind(&outcome.response_text)
        .bind(request_id)
        .execute(&self.pool)
        .await
        .map_err(|e| TrackingError::Database(e.to_string()))?;

        if updated.rows_affected() == 0 {
            warn!(request_id, "Ignoring second terminal update on tracking record");
        }
        Ok(())
    }

    /// Close a record as `error`. Token and cost fields stay NULL.
    pub async fn fail(
        &self,
        request_id: &str,
        error_message: &str,
        ended_at: DateTime<Utc>,
    ) -> Result<()> {
        let started_at = self.started_at(request_id).await?;
        let duration_ms = (ended_at - started_at).num_milliseconds();

        let updated = sqlx::query(
            r#"
            UPDATE requests
            SET status = 'error', ended_at = ?, duration_ms = ?, error_message = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(ended_at)
        .bind(duration_ms)
        .bind(error_message)
        .bind(request_id)
        .execute(&self.pool)
        .await
        .map_err(|e| TrackingError::Database(e.to_string()))?;

        if updated.rows_affected() == 0 {
            warn!(request_id, "Ignoring second terminal update on tracking record");
        }
        Ok(())
    }

    async fn started_at(&self, request_id: &str) -> Result<DateTime<Utc>> {
        sqlx::query_scalar("SELECT started_at FROM requests WHERE id = ?")
            .bind(request_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| TrackingError::Database(e.to_string()))?
            .ok_or_else(|| TrackingError::NotFound(request_id.to_string()))
    }

    async fn model_of(&self, request_id: &str) -> Result<String> {
        sqlx::query_scalar("SELECT model FROM requests WHERE id = ?")
            .bind(request_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| TrackingError::Database(e.to_string()))?
            .ok_or_else(|| TrackingError::NotFound(request_id.to_string()))
    }

    /// Fetch one record by id.
    pub async fn get(&self, request_id: &str) -> Result<RequestRecord> {
        let row = sqlx::query(
            r#"
            SELECT id, started_at, ended_at, provider, model, tool_name, status,
                   request_payload, response_payload,
                   input_tokens, output_tokens, total_tokens, cost_usd,
                   duration_ms, finish_reason, error_message
            FROM requests WHERE id = ?
            "#,
        )
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| TrackingError::Database(e.to_string()))?
        .ok_or_else(|| TrackingError::NotFound(request_id.to_string()))?;

        Ok(record_from_row(&row))
    }

    /// Most recent records, newest first.
    pub async fn recent(&self, limit: i64) -> Result<Vec<RequestRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, started_at, ended_at, provider, model, tool_name, status,
                   request_payload, response_payload,
                   input_tokens, output_tokens, total_tokens, cost_usd,
                   duration_ms, finish_reason, error_message
            FROM requests ORDER BY started_at DESC LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| TrackingError::Database(e.to_string()))?;

        Ok(rows.iter().map(record_from_row).collect())
    }

    /// Aggregate stats over the whole log.
    pub async fn stats(&self) -> Result<TrackerStats> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total,
                   COALESCE(SUM(status = 'success'), 0) AS successes,
                   COALESCE(SUM(status = 'error'), 0) AS errors,
                   COALESCE(SUM(status = 'pending'), 0) AS pending,
                   COALESCE(SUM(total_tokens), 0) AS tokens,
                   COALESCE(SUM(cost_usd), 0.0) AS cost
            FROM requests
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| TrackingError::Database(e.to_string()))?;

        Ok(TrackerStats {
            total_requests: row.get("total"),
            success_count: row.get("successes"),
            error_count: row.get("errors"),
            pending_count: row.get("pending"),
            total_tokens: row.get("tokens"),
            total_cost_usd: row.get("cost"),
        })
    }
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> RequestRecord {
    let status: String = row.get("status");
    RequestRecord {
        id: row.get("id"),
        started_at: row.get("started_at"),
        ended_at: row.get("ended_at"),
        provider: row.get("provider"),
        model: row.get("model"),
        tool_name: row.get("tool_name"),
        status: RequestStatus::parse(&status),
        request_payload: row.get("request_payload"),
        response_payload: row.get("response_payload"),
        input_tokens: row.get("input_tokens"),
        output_tokens: row.get("output_tokens"),
        total_tokens: row.get("total_tokens"),
        cost_usd: row.get("cost_usd"),
        duration_ms: row.get("duration_ms"),
        finish_reason: row.get("finish_reason"),
        error_message: row.get("error_message"),
    }
}

/// Scope guard tying a tracking record to a call.
///
/// Every exit path closes the record exactly once: `complete` and `fail`
/// consume the guard, and dropping it without a terminal update marks the
/// record canceled from a spawned task (Drop cannot await).
pub struct TrackedCall {
    tracker: RequestTracker,
    request_id: String,
    closed: bool,
}

impl TrackedCall {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub async fn complete(mut self, outcome: CompletionOutcome) -> Result<()> {
        self.closed = true;
        self.tracker.complete(&self.request_id, outcome).await
    }

    pub async fn fail(mut self, error_message: &str) -> Result<()> {
        self.closed = true;
        self.tracker.fail(&self.request_id, error_message, Utc::now()).await
    }
}

impl Drop for TrackedCall {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let tracker = self.tracker.clone();
        let request_id = std::mem::take(&mut self.request_id);
        tokio::spawn(async move {
            if let Err(e) = tracker.fail(&request_id, "canceled", Utc::now()).await {
                warn!(request_id, "Failed to mark canceled record: {e}");
            }
        });
    }
}
