//! Statistics update endpoints.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use compass_common::TemplateKey;
use compass_stats::{Progress, Result as StatsResult, UpdateOptions, UpdateReport, UpdateStatus};
use compass_store::{Operation, RequestLogEntry, RequestMetadata};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::info;

use crate::auth::{AdminContext, AuthContext};
use crate::error::ApiError;
use crate::handlers::json_body;
use crate::sse::{channel_response, typed_event};
use crate::state::SharedState;

const INVALID_TEMPLATE: &str = r#"Invalid template. Must be "empire" or "nlp4re""#;
const INVALID_LIMIT: &str = "Limit must be a positive integer if provided";

#[derive(Debug, Clone, Copy)]
struct UpdateParams {
    options: UpdateOptions,
    stream: bool,
}

fn parse_template(value: Option<&Value>) -> Result<TemplateKey, ApiError> {
    value
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ApiError::BadRequest(INVALID_TEMPLATE.into()))
}

/// Only an absent `limit` means no limit; a provided one must be an integer of at least 1.
fn parse_params(body: &Value) -> Result<UpdateParams, ApiError> {
    let limit = match body.get("limit") {
        None => None,
        Some(v) => Some(
            v.as_u64()
                .filter(|n| *n >= 1)
                .ok_or_else(|| ApiError::BadRequest(INVALID_LIMIT.into()))? as usize,
        ),
    };
    let persist = body.get("updateFirebase").and_then(Value::as_bool).unwrap_or(true);
    let stream = body.get("stream").and_then(Value::as_bool).unwrap_or(false);
    Ok(UpdateParams { options: UpdateOptions { limit, persist }, stream })
}

pub async fn update(
    AdminContext(ctx): AdminContext,
    State(state): State<SharedState>,
    body: Bytes,
) -> Response {
    let parsed = json_body(&body).and_then(|body| {
        let template = parse_template(body.get("template"))?;
        let params = parse_params(&body)?;
        Ok((template, params, body))
    });
    match parsed {
        Ok((template, params, body)) => run_update(state, ctx, template, params, body).await,
        Err(e) => e.into_response(),
    }
}

pub async fn update_empire(
    AdminContext(ctx): AdminContext,
    State(state): State<SharedState>,
    body: Bytes,
) -> Response {
    update_fixed(state, ctx, TemplateKey::Empire, body).await
}

pub async fn update_nlp4re(
    AdminContext(ctx): AdminContext,
    State(state): State<SharedState>,
    body: Bytes,
) -> Response {
    update_fixed(state, ctx, TemplateKey::Nlp4re, body).await
}

async fn update_fixed(state: SharedState, ctx: AuthContext, template: TemplateKey, body: Bytes) -> Response {
    let parsed = json_body(&body).and_then(|body| Ok((parse_params(&body)?, body)));
    match parsed {
        Ok((params, body)) => run_update(state, ctx, template, params, body).await,
        Err(e) => e.into_response(),
    }
}

pub async fn progress(
    _admin: AdminContext,
    State(state): State<SharedState>,
    Path(template): Path<String>,
) -> Result<Json<Progress>, ApiError> {
    let template = parse_template(Some(&Value::String(template)))?;
    Ok(Json(state.statistics.progress(template)))
}

async fn run_update(
    state: SharedState,
    ctx: AuthContext,
    template: TemplateKey,
    params: UpdateParams,
    body: Value,
) -> Response {
    info!(%template, limit = ?params.options.limit, persist = params.options.persist, stream = params.stream, "Statistics update requested");

    if params.stream {
        return stream_update(state, ctx, template, params.options, body).into_response();
    }

    // Detached so a client that disconnects does not abandon the run half way.
    let task = tokio::spawn(async move {
        let result = state.statistics.update_statistics(template, params.options).await;
        log_update(&state, &ctx, template, &result, body).await;
        result
    });
    let result = match task.await {
        Ok(result) => result,
        Err(e) => {
            let body = json!({ "success": false, "error": format!("Statistics update aborted: {e}") });
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
        }
    };

    match result {
        Ok(report) => Json(json!({
            "success": true,
            "globalStats": report.global_stats,
            "firebaseUpdated": report.persisted,
            "message": format!("Statistics updated successfully for {template}"),
        }))
        .into_response(),
        Err(e) => {
            let (status, error) = match ApiError::from(e) {
                ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
                other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
            };
            (status, Json(json!({ "success": false, "error": error }))).into_response()
        }
    }
}

/// Runs the update in the background and forwards its progress as `progress` events,
/// followed by a single `complete` event.
fn stream_update(
    state: SharedState,
    ctx: AuthContext,
    template: TemplateKey,
    options: UpdateOptions,
    body: Value,
) -> impl IntoResponse {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut events = state.statistics.subscribe();

    tokio::spawn(async move {
        let forward = |progress: Progress, tx: &mpsc::UnboundedSender<_>| {
            if progress.template == template && progress.status == UpdateStatus::Running {
                let _ = tx.send(typed_event("progress", &progress));
            }
        };

        let run = state.statistics.update_statistics(template, options);
        tokio::pin!(run);
        let result = loop {
            tokio::select! {
                result = &mut run => break result,
                Ok(progress) = events.recv() => forward(progress, &tx),
            }
        };
        while let Ok(progress) = events.try_recv() {
            forward(progress, &tx);
        }

        log_update(&state, &ctx, template, &result, body).await;
        let complete = match &result {
            Ok(report) => json!({
                "success": true,
                "globalStats": report.global_stats,
                "firebaseUpdated": report.persisted,
            }),
            Err(e) => json!({ "success": false, "error": e.to_string() }),
        };
        let _ = tx.send(typed_event("complete", &complete));
    });

    channel_response(rx)
}

async fn log_update(
    state: &SharedState,
    ctx: &AuthContext,
    template: TemplateKey,
    result: &StatsResult<UpdateReport>,
    body: Value,
) {
    let mut entry = RequestLogEntry::new(Operation::Write, "Statistics", result.is_ok())
        .document(format!("update-{template}"))
        .user(Some(ctx.user_id.clone()), ctx.email.clone())
        .metadata(RequestMetadata { method: Some("POST".into()), ..Default::default() });
    let response = match result {
        Ok(report) => serde_json::to_value(&report.global_stats).ok(),
        Err(e) => {
            entry = entry.error(e.to_string());
            None
        }
    };
    state.request_log.log_request(entry.bodies(Some(body), response)).await;
}
