//! Saved dynamic questions: the curated list and community submissions.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    Json,
};
use compass_common::entities::DynamicQuestion;
use compass_common::DynamicQuestionState;
use compass_store::questions::{DEFAULT_LIST_LIMIT, DYNAMIC_QUESTIONS};
use compass_store::{ImportSummary, Operation, RequestLogEntry};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::auth::{check_admin, AdminContext, AuthContext};
use crate::error::{ApiError, ApiResult};
use crate::handlers::{json_body, limit_or, parse_body};
use crate::state::SharedState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub limit: Option<usize>,
    pub template_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CommunityParam {
    #[serde(default)]
    pub community: bool,
}

/// Body of a save. `id` and `timestamp` are filled in when absent.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewQuestion {
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(default)]
    timestamp: Option<i64>,
    state: DynamicQuestionState,
    #[serde(default)]
    template_id: Option<String>,
    #[serde(default)]
    is_community: bool,
    #[serde(default)]
    creator_name: Option<String>,
}

pub async fn list(
    State(state): State<SharedState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<DynamicQuestion>>> {
    let limit = limit_or(params.limit, DEFAULT_LIST_LIMIT);
    let questions = match params.template_id.as_deref() {
        Some(template_id) => state.questions.list_by_template(template_id, limit).await?,
        None => state.questions.list(limit).await?,
    };
    Ok(Json(questions))
}

pub async fn list_community(
    State(state): State<SharedState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<DynamicQuestion>>> {
    let limit = limit_or(params.limit, DEFAULT_LIST_LIMIT);
    Ok(Json(state.questions.list_community(limit).await?))
}

pub async fn get(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(param): Query<CommunityParam>,
) -> ApiResult<Json<DynamicQuestion>> {
    state
        .questions
        .get_in(&id, param.community)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Question not found".into()))
}

/// Curated questions need an admin; any signed-in user may submit a community question.
pub async fn save(ctx: AuthContext, State(state): State<SharedState>, body: Bytes) -> ApiResult<Json<Value>> {
    let new: NewQuestion = parse_body(&body)?;
    if new.state.question.trim().is_empty() {
        return Err(ApiError::BadRequest("state.question is required".into()));
    }
    if new.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name is required".into()));
    }
    if !new.is_community {
        check_admin(&state, &ctx).await?;
    }

    let question = DynamicQuestion {
        id: new.id.unwrap_or_default(),
        name: new.name,
        timestamp: new.timestamp.unwrap_or_else(|| chrono::Utc::now().timestamp_millis()),
        state: new.state,
        template_id: new.template_id,
        is_community: new.is_community,
        created_by: Some(ctx.user_id.clone()),
        creator_name: new.creator_name.or_else(|| ctx.email.clone()),
    };

    let result = state.questions.save(&question).await;
    let entry = RequestLogEntry::new(Operation::Write, DYNAMIC_QUESTIONS, result.is_ok())
        .user(Some(ctx.user_id.clone()), ctx.email.clone());
    let id = match result {
        Ok(id) => {
            state.request_log.log_request(entry.document(id.clone())).await;
            id
        }
        Err(e) => {
            state.request_log.log_request(entry.error(e.to_string())).await;
            return Err(e.into());
        }
    };

    info!(id = %id, community = question.is_community, "Dynamic question saved");
    Ok(Json(json!({ "id": id, "name": question.name, "timestamp": question.timestamp })))
}

pub async fn delete(
    AdminContext(ctx): AdminContext,
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(param): Query<CommunityParam>,
) -> ApiResult<Json<Value>> {
    if !state.questions.delete(&id, param.community).await? {
        return Err(ApiError::NotFound("Question not found".into()));
    }
    let entry = RequestLogEntry::new(Operation::Delete, DYNAMIC_QUESTIONS, true)
        .document(id.clone())
        .user(Some(ctx.user_id), ctx.email);
    state.request_log.log_request(entry).await;
    Ok(Json(json!({ "success": true, "id": id })))
}

pub async fn import(
    _admin: AdminContext,
    State(state): State<SharedState>,
    body: Bytes,
) -> ApiResult<Json<ImportSummary>> {
    let payload = json_body(&body)?;
    let summary = state.questions.import(&payload).await?;
    info!(success = summary.success, failed = summary.failed, "Questions imported");
    Ok(Json(summary))
}
