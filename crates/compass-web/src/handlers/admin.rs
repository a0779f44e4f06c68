//! Admin-only maintenance: request log and LLM call inspection, backup and restore.

use axum::{
    body::Bytes,
    extract::{Query, State},
    Json,
};
use compass_store::{Backup, Operation, RequestLogEntry, RestoreSummary};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::auth::AdminContext;
use crate::error::ApiResult;
use crate::handlers::{json_body, limit_or};
use crate::state::SharedState;

const DEFAULT_LOG_LIMIT: usize = 200;
const DEFAULT_CALL_LIMIT: usize = 50;

#[derive(Debug, Default, Deserialize)]
pub struct LogFilters {
    pub limit: Option<usize>,
    pub collection: Option<String>,
    pub operation: Option<Operation>,
    pub success: Option<bool>,
}

impl LogFilters {
    fn matches(&self, entry: &RequestLogEntry) -> bool {
        self.collection.as_ref().map_or(true, |c| &entry.collection == c)
            && self.operation.map_or(true, |op| entry.operation == op)
            && self.success.map_or(true, |s| entry.success == s)
    }
}

/// Newest first; filters apply before the limit.
pub async fn request_logs(
    _admin: AdminContext,
    State(state): State<SharedState>,
    Query(filters): Query<LogFilters>,
) -> ApiResult<Json<Value>> {
    let limit = limit_or(filters.limit, DEFAULT_LOG_LIMIT);
    let logs: Vec<RequestLogEntry> = state
        .request_log
        .list(usize::MAX)
        .await?
        .into_iter()
        .filter(|entry| filters.matches(entry))
        .take(limit)
        .collect();

    Ok(Json(json!({
        "logs": logs,
        "count": logs.len(),
        "filters": {
            "collection": filters.collection,
            "operation": filters.operation,
            "success": filters.success,
        },
    })))
}

#[derive(Debug, Default, Deserialize)]
pub struct CallsQuery {
    pub limit: Option<usize>,
}

/// Recent LLM calls with their token usage and cost, newest first.
pub async fn llm_calls(
    _admin: AdminContext,
    State(state): State<SharedState>,
    Query(query): Query<CallsQuery>,
) -> Json<Value> {
    let calls = state.ai.recent_calls(limit_or(query.limit, DEFAULT_CALL_LIMIT));
    let total_cost: f64 = calls.iter().map(|c| c.cost_usd).sum();
    Json(json!({
        "calls": calls,
        "count": calls.len(),
        "totalCostUsd": total_cost,
    }))
}

pub async fn backup(AdminContext(ctx): AdminContext, State(state): State<SharedState>) -> Json<Backup> {
    let backup = state.backup.backup().await;
    info!(
        user = %ctx.user_id,
        collections = backup.metadata.collections_count,
        documents = backup.metadata.documents_count,
        "Backup created"
    );
    let entry = RequestLogEntry::new(Operation::Read, "Backup", true).user(Some(ctx.user_id), ctx.email);
    state.request_log.log_request(entry).await;
    Json(backup)
}

pub async fn restore(
    AdminContext(ctx): AdminContext,
    State(state): State<SharedState>,
    body: Bytes,
) -> ApiResult<Json<RestoreSummary>> {
    let content = json_body(&body)?;
    let result = state.backup.restore(&content).await;

    let mut entry =
        RequestLogEntry::new(Operation::Write, "Restore", result.is_ok()).user(Some(ctx.user_id), ctx.email);
    if let Err(e) = &result {
        entry = entry.error(e.to_string());
    }
    state.request_log.log_request(entry).await;
    Ok(Json(result?))
}
