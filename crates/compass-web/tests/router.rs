//! End-to-end checks of the API router: auth, validation and the main flows.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use compass_common::Row;
use compass_llm::{AiService, LlmBackend, LlmError, LlmRequest, LlmResponse, Provider};
use compass_sparql::{SparqlError, SparqlExecutor};
use compass_stats::{OrkgClient, RetryConfig, StatisticsService};
use compass_store::{DocumentStore, MemoryStore, RateLimitPolicy, StatisticsRepository, AI_RATE_LIMITS};
use compass_web::{build_router, AppState, AuthConfig};
use http_body_util::BodyExt;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tower::ServiceExt;

const ADMIN: (&str, &str) = ("admin-1", "admin@example.org");
const USER: (&str, &str) = ("user-1", "user@example.org");

struct FixedRows;

#[async_trait]
impl SparqlExecutor for FixedRows {
    async fn select(&self, query: &str) -> Result<Vec<Row>, SparqlError> {
        if query.contains("FAIL") {
            return Err(SparqlError::Endpoint("syntax error".into()));
        }
        let row = json!({"paper": "R1", "year": "2020"});
        Ok(vec![row.as_object().cloned().unwrap_or_default()])
    }
}

/// Never produces a query block; counts how often it was asked.
struct Unhelpful {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl LlmBackend for Unhelpful {
    async fn complete(&self, _req: LlmRequest) -> Result<LlmResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(LlmResponse {
            content: "I cannot write that query.".into(),
            model: "mistral-large-latest".into(),
            prompt_tokens: 100,
            completion_tokens: 20,
        })
    }
    fn model_id(&self) -> &str { "mistral-large-latest" }
    fn is_local(&self) -> bool { false }
    fn max_output_tokens(&self) -> u32 { 4096 }
}

struct Harness {
    router: Router,
    store: Arc<MemoryStore>,
}

fn build(orkg: OrkgClient, ai: AiService, tune: impl FnOnce(AppState) -> AppState) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let docs: Arc<dyn DocumentStore> = store.clone();
    let statistics = Arc::new(StatisticsService::new(orkg, StatisticsRepository::new(docs.clone())));
    let auth = AuthConfig {
        jwt_secret: Some("router-secret".into()),
        admin_emails: vec![ADMIN.1.to_string()],
        dev_header_auth: true,
    };
    let state = AppState::new(docs, Arc::new(ai), Arc::new(FixedRows), statistics, auth).unwrap();
    Harness { router: build_router(Arc::new(tune(state))), store }
}

fn harness_with(orkg: OrkgClient) -> Harness {
    build(orkg, AiService::new(Provider::default()), |state| state)
}

fn local_orkg() -> OrkgClient {
    OrkgClient::new("http://localhost:9/triplestore", "http://localhost:9/api").unwrap()
}

/// An AI service whose default provider never yields a query, and its call counter.
fn unhelpful_ai() -> (AiService, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut ai = AiService::new(Provider::Mistral);
    ai.register_backend(Provider::Mistral, Arc::new(Unhelpful { calls: calls.clone() }));
    (ai, calls)
}

fn harness() -> Harness {
    harness_with(local_orkg())
}

fn request(method: &str, uri: &str, who: Option<(&str, &str)>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some((id, email)) = who {
        builder = builder.header("x-user-id", id).header("x-user-email", email);
    }
    let body = match body {
        Some(v) => {
            builder = builder.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    builder.body(body).unwrap()
}

async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()));
    (status, body)
}

#[tokio::test]
async fn health_is_public() {
    let h = harness();
    let (status, body) = send(&h.router, request("GET", "/api/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["llmConfigured"], false);
}

#[tokio::test]
async fn statistics_update_requires_auth_before_validation() {
    let h = harness();
    let (status, body) =
        send(&h.router, request("POST", "/api/statistics/update", None, Some(json!({"template": "bogus"})))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Missing or invalid authorization header");

    let invalid = Request::builder()
        .method("POST")
        .uri("/api/statistics/update")
        .header("authorization", "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&h.router, invalid).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid token");
}

#[tokio::test]
async fn statistics_update_requires_admin() {
    let h = harness();
    let (status, body) =
        send(&h.router, request("POST", "/api/statistics/update", Some(USER), Some(json!({"template": "empire"})))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Admin access required");
}

#[tokio::test]
async fn statistics_update_validates_template_and_limit() {
    let h = harness();
    let cases = [
        (json!({}), r#"Invalid template. Must be "empire" or "nlp4re""#),
        (json!({"template": "other"}), r#"Invalid template. Must be "empire" or "nlp4re""#),
        (json!({"template": "empire", "limit": 0}), "Limit must be a positive integer if provided"),
        (json!({"template": "empire", "limit": -3}), "Limit must be a positive integer if provided"),
        (json!({"template": "nlp4re", "limit": "10"}), "Limit must be a positive integer if provided"),
        (json!({"template": "nlp4re", "limit": null}), "Limit must be a positive integer if provided"),
    ];
    for (payload, expected) in cases {
        let (status, body) =
            send(&h.router, request("POST", "/api/statistics/update", Some(ADMIN), Some(payload.clone()))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "payload {payload}");
        assert_eq!(body["error"], expected);
    }

    let (status, _) = send(&h.router, request("POST", "/api/statistics/update/empire", Some(ADMIN), Some(json!({"limit": 0})))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn stored_admin_flag_grants_access() {
    let h = harness();
    let mut profile = serde_json::Map::new();
    profile.insert("is_admin".into(), json!(true));
    h.store.set("Users", USER.0, profile, false).await.unwrap();

    let (status, _) = send(&h.router, request("POST", "/api/statistics/update", Some(USER), Some(json!({})))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

async fn orkg_server() -> mockito::ServerGuard {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/triplestore")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_body(
            r#"{"results": {"bindings": [
                {"paper": {"type": "uri", "value": "http://orkg.org/orkg/resource/R1"}},
                {"paper": {"type": "uri", "value": "http://orkg.org/orkg/resource/R2"}}
            ]}}"#,
        )
        .create_async()
        .await;
    server
        .mock("GET", mockito::Matcher::Regex(r"^/api/statements/R\d+/bundle$".into()))
        .with_status(200)
        .with_body(
            r#"{"statements": [
                {"subject": {"id": "R1", "_class": "resource"}, "predicate": {"id": "P31"}, "object": {"id": "L1", "_class": "literal"}}
            ]}"#,
        )
        .create_async()
        .await;
    server
}

fn orkg_for(server: &mockito::ServerGuard) -> OrkgClient {
    OrkgClient::new(&format!("{}/triplestore", server.url()), &format!("{}/api", server.url()))
        .unwrap()
        .with_retry(RetryConfig { max_attempts: 1, base_delay: Duration::from_millis(1) })
}

#[tokio::test]
async fn statistics_update_runs_and_logs() {
    let server = orkg_server().await;
    let h = harness_with(orkg_for(&server));

    let (status, body) =
        send(&h.router, request("POST", "/api/statistics/update", Some(ADMIN), Some(json!({"template": "empire"})))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["firebaseUpdated"], true);
    assert_eq!(body["globalStats"]["paperCount"], 2);
    assert_eq!(body["message"], "Statistics updated successfully for empire");

    let (status, progress) = send(&h.router, request("GET", "/api/statistics/progress/empire", Some(ADMIN), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(progress["status"], "completed");

    let (status, logs) = send(&h.router, request("GET", "/api/request-logs?collection=Statistics", Some(ADMIN), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(logs["count"], 1);
    assert_eq!(logs["logs"][0]["documentId"], "update-empire");
    assert_eq!(logs["logs"][0]["userEmail"], ADMIN.1);
}

#[tokio::test]
async fn statistics_update_streams_progress_then_complete() {
    let server = orkg_server().await;
    let h = harness_with(orkg_for(&server));

    let req = request(
        "POST",
        "/api/statistics/update",
        Some(ADMIN),
        Some(json!({"template": "nlp4re", "stream": true, "updateFirebase": false})),
    );
    let (status, body) = send(&h.router, req).await;
    assert_eq!(status, StatusCode::OK);
    let text = body.as_str().unwrap();
    assert!(text.contains("event: progress"));
    assert!(text.contains("event: complete"));
    assert!(text.rfind("event: progress") < text.find("event: complete"));
    assert!(text.contains(r#""firebaseUpdated":false"#));
}

#[tokio::test]
async fn progress_rejects_unknown_template() {
    let h = harness();
    let (status, _) = send(&h.router, request("GET", "/api/statistics/progress/other", Some(ADMIN), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn dynamic_question_lifecycle() {
    let h = harness();
    let question = json!({
        "name": "Survey usage",
        "state": {"question": "How often are surveys used?", "sparqlQuery": "SELECT ?p WHERE {}"},
        "templateId": "R186491"
    });

    let (status, _) = send(&h.router, request("POST", "/api/dynamic-questions", Some(USER), Some(question.clone()))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, saved) = send(&h.router, request("POST", "/api/dynamic-questions", Some(ADMIN), Some(question))).await;
    assert_eq!(status, StatusCode::OK);
    let id = saved["id"].as_str().unwrap().to_string();
    assert!(id.starts_with("question_"));

    let (status, fetched) = send(&h.router, request("GET", &format!("/api/dynamic-questions/{id}"), None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["state"]["question"], "How often are surveys used?");
    assert_eq!(fetched["createdBy"], ADMIN.0);

    let (_, listed) = send(&h.router, request("GET", "/api/dynamic-questions?templateId=R186491", None, None)).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, _) = send(&h.router, request("DELETE", &format!("/api/dynamic-questions/{id}"), Some(ADMIN), None)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(&h.router, request("GET", &format!("/api/dynamic-questions/{id}"), None, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Question not found");
}

#[tokio::test]
async fn community_question_needs_only_login() {
    let h = harness();
    let question = json!({"name": "Mine", "isCommunity": true, "state": {"question": "Which methods?"}});
    let (status, _) = send(&h.router, request("POST", "/api/dynamic-questions", Some(USER), Some(question))).await;
    assert_eq!(status, StatusCode::OK);

    let (_, listed) = send(&h.router, request("GET", "/api/community-questions", None, None)).await;
    assert_eq!(listed[0]["creatorName"], USER.1);

    let missing = json!({"name": "Empty", "isCommunity": true, "state": {}});
    let (status, body) = send(&h.router, request("POST", "/api/dynamic-questions", Some(USER), Some(missing))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "state.question is required");
}

#[tokio::test]
async fn overrides_save_and_restore() {
    let h = harness();
    let uid = "/api/overrides/empire-q1";

    let (status, _) = send(&h.router, request("POST", uid, Some(USER), Some(json!({"title": "x"})))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, first) = send(&h.router, request("POST", uid, Some(ADMIN), Some(json!({"title": "First"})))).await;
    send(&h.router, request("POST", uid, Some(ADMIN), Some(json!({"title": "Second"})))).await;
    let first_id = first["versionId"].as_str().unwrap();

    let (status, restored) =
        send(&h.router, request("POST", &format!("{uid}/restore/{first_id}"), Some(ADMIN), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(restored["title"], "First");
    assert_eq!(restored["changeDescription"], format!("Restored from version {first_id}"));

    let (_, doc) = send(&h.router, request("GET", uid, None, None)).await;
    assert_eq!(doc["versions"].as_array().unwrap().len(), 3);
    assert_eq!(doc["latestVersion"]["title"], "First");

    let (status, body) = send(&h.router, request("POST", &format!("{uid}/restore/v_missing"), Some(ADMIN), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Version not found");
}

#[tokio::test]
async fn query_execute_and_process() {
    let h = harness();
    let (status, _) = send(&h.router, request("POST", "/api/query/execute", None, Some(json!({"query": "SELECT"})))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) =
        send(&h.router, request("POST", "/api/query/execute", Some(USER), Some(json!({"query": "SELECT ?paper WHERE {}"})))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rows"][0]["paper"], "R1");
    assert_eq!(body["error"], Value::Null);

    let (_, body) =
        send(&h.router, request("POST", "/api/query/execute", Some(USER), Some(json!({"query": "SELECT FAIL"})))).await;
    assert!(body["error"].as_str().unwrap().contains("syntax error"));

    let code = "const processData = (rows) => rows.map(r => ({...r, x: 1}));";
    let (status, body) = send(
        &h.router,
        request("POST", "/api/query/process", Some(USER), Some(json!({"code": code, "rows": [{"a": 1}]}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([{"a": 1, "x": 1}]));
}

#[tokio::test]
async fn query_generate_rejects_blank_question() {
    let h = harness();
    let (status, body) =
        send(&h.router, request("POST", "/api/query/generate", Some(USER), Some(json!({"question": "  "})))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "question is required");
}

#[tokio::test]
async fn user_sync_and_admin_flag() {
    let h = harness();
    let (status, profile) = send(
        &h.router,
        request("POST", "/api/users/sync", Some(ADMIN), Some(json!({"id": ADMIN.0, "email": ADMIN.1, "display_name": "Admin"}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["is_admin"], true);

    let (status, body) =
        send(&h.router, request("POST", "/api/users/sync", Some(USER), Some(json!({"id": USER.0})))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing required fields: email");

    let (status, _) = send(&h.router, request("GET", "/api/users/nobody", Some(USER), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn backup_and_restore_are_admin_only() {
    let h = harness();
    let (status, _) = send(&h.router, request("POST", "/api/backup", Some(USER), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    send(&h.router, request("POST", "/api/overrides/q1", Some(ADMIN), Some(json!({"title": "T"})))).await;
    let (status, backup) = send(&h.router, request("POST", "/api/backup", Some(ADMIN), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(backup["data"]["QuestionOverrides"].as_array().is_some_and(|docs| docs.len() == 1));

    let (status, body) = send(&h.router, request("POST", "/api/restore", Some(ADMIN), Some(json!(["not", "a", "backup"])))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid backup file format");

    let (status, summary) = send(&h.router, request("POST", "/api/restore", Some(ADMIN), Some(backup))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["success"], true);
}

#[tokio::test]
async fn requested_iterations_are_capped_by_configuration() {
    let (ai, calls) = unhelpful_ai();
    let h = build(local_orkg(), ai, |state| state.with_max_iterations(2));

    let (status, body) = send(
        &h.router,
        request(
            "POST",
            "/api/query/generate",
            Some(ADMIN),
            Some(json!({"question": "How many papers per year?", "maxIterations": 100000})),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("SPARQL code block"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn ai_routes_enforce_per_user_budget() {
    let policy = RateLimitPolicy { max_requests: 2, window: chrono::Duration::hours(1) };
    let h = build(local_orkg(), AiService::new(Provider::default()), |state| state.with_ai_rate_limit(policy));
    let process = |who| {
        request("POST", "/api/query/process", Some(who), Some(json!({"code": "function processData(rows) { return rows; }", "rows": []})))
    };

    let first = h.router.clone().oneshot(process(USER)).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()["x-ratelimit-limit"], "2");
    assert_eq!(first.headers()["x-ratelimit-remaining"], "1");

    let (status, _) = send(&h.router, process(USER)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&h.router, process(USER)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "AI request limit exceeded");
    assert_eq!(body["limit"], 2);
    assert_eq!(body["remaining"], 0);
    assert!(body["resetAt"].is_string());
    assert!(body["resetIn"].as_i64().unwrap() > 0);

    // Generation shares the budget; the refusal happens before body validation.
    let (status, _) =
        send(&h.router, request("POST", "/api/query/generate", Some(USER), Some(json!({"question": " "})))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    let counter = h.store.get(AI_RATE_LIMITS, USER.0).await.unwrap().unwrap();
    assert_eq!(counter["count"], 2);

    // Admins and non-AI routes are not counted.
    for _ in 0..3 {
        let (status, _) = send(&h.router, process(ADMIN)).await;
        assert_eq!(status, StatusCode::OK);
    }
    assert!(h.store.get(AI_RATE_LIMITS, ADMIN.0).await.unwrap().is_none());
    let (status, _) = send(
        &h.router,
        request("POST", "/api/query/execute", Some(USER), Some(json!({"query": "SELECT ?paper WHERE { ?paper ?p ?o }"}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&h.router, request("POST", "/api/query/process", None, Some(json!({"rows": []})))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn llm_call_audit_is_admin_only() {
    let (ai, calls) = unhelpful_ai();
    let h = build(local_orkg(), ai, |state| state.with_max_iterations(1));

    let (status, _) =
        send(&h.router, request("POST", "/api/query/generate", Some(USER), Some(json!({"question": "Which venues?"})))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let (status, _) = send(&h.router, request("GET", "/api/llm/calls", Some(USER), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&h.router, request("GET", "/api/llm/calls?limit=10", Some(ADMIN), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    let call = &body["calls"][0];
    assert_eq!(call["provider"], "mistral");
    assert_eq!(call["session_id"], USER.0);
    assert_eq!(call["prompt_tokens"], 100);
    assert!(body["totalCostUsd"].as_f64().unwrap() > 0.0);
}
