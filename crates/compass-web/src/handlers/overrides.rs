//! Versioned overrides of a question's title, analysis text and chart settings.

use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};
use compass_store::overrides::QUESTION_OVERRIDES;
use compass_store::{Operation, QuestionOverrideDocument, QuestionVersion, RequestLogEntry, VersionDraft};

use crate::auth::AdminContext;
use crate::error::{ApiError, ApiResult};
use crate::handlers::{json_body, parse_body};
use crate::state::SharedState;

pub async fn get(
    State(state): State<SharedState>,
    Path(uid): Path<String>,
) -> ApiResult<Json<QuestionOverrideDocument>> {
    state
        .overrides
        .get(&uid)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Question overrides document not found".into()))
}

pub async fn save(
    AdminContext(ctx): AdminContext,
    State(state): State<SharedState>,
    Path(uid): Path<String>,
    body: Bytes,
) -> ApiResult<Json<QuestionVersion>> {
    let mut draft: VersionDraft = parse_body(&body)?;
    if draft.author_name.is_none() {
        draft.author_name = ctx.email.clone();
    }

    let version = state.overrides.save_version(&uid, &ctx.user_id, draft).await?;
    let entry = RequestLogEntry::new(Operation::Write, QUESTION_OVERRIDES, true)
        .document(uid)
        .user(Some(ctx.user_id), ctx.email);
    state.request_log.log_request(entry).await;
    Ok(Json(version))
}

pub async fn restore(
    AdminContext(ctx): AdminContext,
    State(state): State<SharedState>,
    Path((uid, version_id)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<Json<QuestionVersion>> {
    let author_name = json_body(&body)?
        .get("authorName")
        .and_then(|v| v.as_str())
        .map(String::from)
        .or_else(|| ctx.email.clone());

    let result = state.overrides.restore_version(&uid, &version_id, &ctx.user_id, author_name).await;
    let mut entry = RequestLogEntry::new(Operation::Update, QUESTION_OVERRIDES, result.is_ok())
        .document(uid)
        .user(Some(ctx.user_id), ctx.email);
    if let Err(e) = &result {
        entry = entry.error(e.to_string());
    }
    state.request_log.log_request(entry).await;
    Ok(Json(result?))
}
