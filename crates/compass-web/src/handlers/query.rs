//! Question → SPARQL generation, direct query execution and result processing.

use axum::{
    body::Bytes,
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use compass_common::Row;
use compass_query::{execute_blocks, process_dynamic_data, GenerationRequest, ProcessingFunction};
use compass_sparql::parse_sparql_blocks;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::auth::AuthContext;
use crate::error::{ApiError, ApiResult};
use crate::handlers::parse_body;
use crate::sse::{channel_response, typed_event};
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateBody {
    #[serde(flatten)]
    request: GenerationRequest,
    #[serde(default)]
    stream: bool,
}

pub async fn generate(ctx: AuthContext, State(state): State<SharedState>, body: Bytes) -> ApiResult<Response> {
    let GenerateBody { mut request, stream } = parse_body(&body)?;
    if request.question.trim().is_empty() {
        return Err(ApiError::BadRequest("question is required".into()));
    }
    request.session_id.get_or_insert_with(|| ctx.user_id.clone());
    info!(user = %ctx.user_id, stream, "Query generation requested");

    if !stream {
        let outcome = state.generator.generate(&request, None).await?;
        return Ok(Json(outcome).into_response());
    }

    // Iteration events are forwarded as they happen; the outcome closes the stream.
    let (tx, rx) = mpsc::unbounded_channel();
    let (iter_tx, mut iter_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let forward = tx.clone();
        let relay = tokio::spawn(async move {
            while let Some(event) = iter_rx.recv().await {
                let _ = forward.send(typed_event("iteration", &event));
            }
        });
        let result = state.generator.generate(&request, Some(iter_tx)).await;
        let _ = relay.await;
        let event = match result {
            Ok(outcome) => typed_event("complete", &outcome),
            Err(e) => typed_event("error", &json!({ "error": e.to_string() })),
        };
        let _ = tx.send(event);
    });
    Ok(channel_response(rx).into_response())
}

#[derive(Debug, Deserialize)]
struct ExecuteBody {
    query: String,
}

/// Runs every `# id:` block of a query. A failing block is reported in `error`, with the
/// rows gathered before it.
pub async fn execute(_ctx: AuthContext, State(state): State<SharedState>, body: Bytes) -> ApiResult<Json<Value>> {
    let ExecuteBody { query } = parse_body(&body)?;
    let blocks = parse_sparql_blocks(&query);
    if blocks.is_empty() {
        return Err(ApiError::BadRequest("query is required".into()));
    }

    let execution = execute_blocks(state.sparql.as_ref(), &blocks).await;
    Ok(Json(json!({
        "blocks": blocks,
        "rows": execution.rows,
        "datasets": execution.datasets,
        "error": execution.error,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProcessBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    question: Option<String>,
    rows: Vec<Row>,
}

/// Reshape rows with a `processData` function. Without code, one is generated for the
/// question when given; otherwise the generic transformer is used.
pub async fn process(_ctx: AuthContext, State(state): State<SharedState>, body: Bytes) -> ApiResult<Json<Value>> {
    let ProcessBody { code, question, rows } = parse_body(&body)?;

    if let Some(code) = code.filter(|c| !c.trim().is_empty()) {
        let function = ProcessingFunction::compile(&code).await.map_err(|e| ApiError::BadRequest(e.to_string()))?;
        let data = function.apply_or_fallback(&rows).await;
        return Ok(Json(json!({ "data": data, "code": code, "generated": false })));
    }

    if let Some(question) = question.filter(|q| !q.trim().is_empty()) {
        match state.processing.generate(&rows, &question).await {
            Ok(Some(generated)) => {
                let data = generated.function.apply_or_fallback(&rows).await;
                return Ok(Json(json!({ "data": data, "code": generated.code, "generated": true })));
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Processing function generation failed, using generic transform"),
        }
    }

    Ok(Json(json!({ "data": process_dynamic_data(&rows), "code": null, "generated": false })))
}
