//! Liveness and configuration summary.

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::SharedState;

pub async fn health(State(state): State<SharedState>) -> Json<Value> {
    let providers: Vec<&str> = state.ai.configured_providers().iter().map(|p| p.as_str()).collect();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "llmConfigured": state.ai.is_configured(),
        "defaultProvider": state.ai.default_provider().as_str(),
        "providers": providers,
    }))
}
