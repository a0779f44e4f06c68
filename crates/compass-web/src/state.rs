//! Shared application state for the web server.

use std::sync::Arc;

use compass_llm::AiService;
use compass_query::{ProcessingGenerator, PromptBuilder, QueryGenerator};
use compass_sparql::SparqlExecutor;
use compass_stats::StatisticsService;
use compass_store::{
    AiRateLimitRepository, BackupService, DocumentStore, DynamicQuestionRepository, QuestionOverrideRepository,
    RateLimitPolicy, RequestLogger, UserRepository,
};

use crate::auth::{Authenticator, BearerTokenAuth, DevHeaderAuth, MultiAuth};

#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// HS256 secret for bearer tokens. Without it bearer auth is disabled.
    pub jwt_secret: Option<String>,
    pub admin_emails: Vec<String>,
    /// Accept `x-user-id` / `x-user-email` headers.
    pub dev_header_auth: bool,
}

impl AuthConfig {
    fn authenticator(&self) -> MultiAuth {
        let mut strategies: Vec<Arc<dyn Authenticator>> = Vec::new();
        if let Some(secret) = self.jwt_secret.as_deref().filter(|s| !s.is_empty()) {
            strategies.push(Arc::new(BearerTokenAuth::new(secret)));
        }
        if self.dev_header_auth {
            strategies.push(Arc::new(DevHeaderAuth));
        }
        MultiAuth::new(strategies)
    }
}

/// Shared state injected into every Axum handler.
pub struct AppState {
    pub questions: DynamicQuestionRepository,
    pub overrides: QuestionOverrideRepository,
    pub users: UserRepository,
    pub request_log: RequestLogger,
    pub ai_limits: AiRateLimitRepository,
    pub backup: BackupService,
    pub statistics: Arc<StatisticsService>,
    pub ai: Arc<AiService>,
    pub sparql: Arc<dyn SparqlExecutor>,
    pub generator: QueryGenerator,
    pub processing: ProcessingGenerator,
    pub authenticator: Arc<dyn Authenticator>,
    pub admin_emails: Vec<String>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        ai: Arc<AiService>,
        sparql: Arc<dyn SparqlExecutor>,
        statistics: Arc<StatisticsService>,
        auth: AuthConfig,
    ) -> anyhow::Result<Self> {
        let prompts = Arc::new(PromptBuilder::new()?);
        Ok(Self {
            questions: DynamicQuestionRepository::new(store.clone()),
            overrides: QuestionOverrideRepository::new(store.clone()),
            users: UserRepository::new(store.clone()),
            request_log: RequestLogger::new(store.clone()),
            ai_limits: AiRateLimitRepository::new(store.clone(), RateLimitPolicy::default()),
            backup: BackupService::new(store),
            statistics,
            generator: QueryGenerator::new(ai.clone(), sparql.clone(), prompts.clone()),
            processing: ProcessingGenerator::new(ai.clone(), prompts),
            ai,
            sparql,
            authenticator: Arc::new(auth.authenticator()),
            admin_emails: auth.admin_emails,
        })
    }

    /// Upper bound on repair-loop iterations when a request does not name one.
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.generator = self.generator.with_max_iterations(max_iterations);
        self
    }

    /// Per-user budget for the LLM-backed routes. Admins are exempt.
    pub fn with_ai_rate_limit(mut self, policy: RateLimitPolicy) -> Self {
        self.ai_limits = self.ai_limits.with_policy(policy);
        self
    }
}

pub type SharedState = Arc<AppState>;
