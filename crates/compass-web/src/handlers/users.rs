//! User profile sync and lookup.

use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};
use compass_store::users::USERS;
use compass_store::{Operation, RequestLogEntry, UserProfile};
use serde::Deserialize;

use crate::auth::AuthContext;
use crate::error::{ApiError, ApiResult};
use crate::handlers::parse_body;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
struct SyncBody {
    #[serde(default)]
    id: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    display_name: Option<String>,
}

/// Create or refresh the caller's profile. The admin flag follows the configured admin list.
pub async fn sync(ctx: AuthContext, State(state): State<SharedState>, body: Bytes) -> ApiResult<Json<UserProfile>> {
    let body: SyncBody = parse_body(&body)?;
    let missing: Vec<&str> = [("id", body.id.is_empty()), ("email", body.email.is_empty())]
        .into_iter()
        .filter_map(|(field, empty)| empty.then_some(field))
        .collect();
    if !missing.is_empty() {
        return Err(ApiError::BadRequest(format!("Missing required fields: {}", missing.join(", "))));
    }

    let result = state
        .users
        .sync_user(&body.id, &body.email, body.display_name.as_deref(), &state.admin_emails)
        .await;
    let mut entry = RequestLogEntry::new(Operation::Write, USERS, result.is_ok())
        .document(body.id.clone())
        .user(Some(ctx.user_id), ctx.email);
    if let Err(e) = &result {
        entry = entry.error(e.to_string());
    }
    state.request_log.log_request(entry).await;
    Ok(Json(result?))
}

pub async fn get(
    _ctx: AuthContext,
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<UserProfile>> {
    state.users.get(&id).await?.map(Json).ok_or_else(|| ApiError::NotFound("User not found".into()))
}
