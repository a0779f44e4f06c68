//! Per-user budget on the LLM-backed routes.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use compass_store::RateLimitStatus;
use serde_json::json;
use tracing::{info, warn};

use crate::auth::{check_admin, AuthContext, AuthError};
use crate::state::SharedState;

fn set_headers(headers: &mut HeaderMap, status: &RateLimitStatus) {
    let pairs = [
        ("x-ratelimit-limit", status.limit as i64),
        ("x-ratelimit-remaining", status.remaining as i64),
        ("x-ratelimit-reset", status.reset_at.timestamp()),
    ];
    for (name, value) in pairs {
        headers.insert(name, HeaderValue::from(value));
    }
}

fn exceeded(status: &RateLimitStatus) -> Response {
    let reset_in = (status.reset_at - Utc::now()).num_seconds().max(0);
    let body = json!({
        "error": "AI request limit exceeded",
        "message": format!(
            "You have reached your limit of {} AI requests. Please try again later.",
            status.limit
        ),
        "limit": status.limit,
        "remaining": 0,
        "resetIn": reset_in,
        "resetAt": status.reset_at.to_rfc3339(),
    });
    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    set_headers(response.headers_mut(), status);
    response
}

/// Counts the caller's request against their window. Admins pass untouched. A store
/// failure lets the request through.
pub async fn ai_rate_limit(
    State(state): State<SharedState>,
    ctx: AuthContext,
    request: Request,
    next: Next,
) -> Response {
    if !state.ai_limits.is_enabled() {
        return next.run(request).await;
    }
    match check_admin(&state, &ctx).await {
        Ok(()) => return next.run(request).await,
        Err(AuthError::AdminRequired) => {}
        Err(e) => warn!(user = %ctx.user_id, error = %e, "Admin check failed, applying AI rate limit"),
    }

    let status = match state.ai_limits.consume(&ctx.user_id, Utc::now()).await {
        Ok(status) => status,
        Err(e) => {
            warn!(user = %ctx.user_id, error = %e, "AI rate limit check failed, allowing request");
            return next.run(request).await;
        }
    };
    if !status.allowed {
        info!(user = %ctx.user_id, reset_at = %status.reset_at, "AI request refused");
        return exceeded(&status);
    }

    let mut response = next.run(request).await;
    set_headers(response.headers_mut(), &status);
    response
}
