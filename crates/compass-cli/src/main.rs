//! EmpiRE-Compass: ORKG question answering and statistics service.
//! Entry point for the `compass` binary.

mod commands;
mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use compass_common::TemplateKey;
use compass_llm::backend::{GeminiBackend, OllamaBackend, OpenAiBackend, OpenAiCompatibleBackend};
use compass_llm::{AiService, LlmBackend, Provider};
use compass_sparql::{SparqlClient, SparqlExecutor};
use compass_stats::{OrkgClient, RetryConfig, StatisticsService};
use compass_store::{DocumentStore, FileStore, MemoryStore, StatisticsRepository};
use compass_web::{build_router, AppState, AuthConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, LlmConfig, StoreBackend, StoreConfig};

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

#[derive(Debug, Parser)]
#[command(name = "compass", version, about = "Question answering and RPL statistics over the ORKG")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP API (default).
    Serve {
        /// Overrides `server.bind`.
        #[arg(long)]
        bind: Option<String>,
    },
    /// Generate SPARQL for a question, run it and print the outcome.
    Ask {
        question: String,
        #[arg(long)]
        template_id: Option<String>,
        /// May lower `generation.max_iterations`, never raise it.
        #[arg(long)]
        max_iterations: Option<u32>,
        /// Keep the resulting question in the local saved list under this name.
        #[arg(long)]
        save: Option<String>,
    },
    /// Recompute RPL statistics for a template (`empire` or `nlp4re`).
    Stats {
        template: TemplateKey,
        #[arg(long)]
        limit: Option<usize>,
        /// Skip writing the result to the store.
        #[arg(long)]
        no_persist: bool,
    },
    /// Write a JSON backup of every collection.
    Backup {
        #[arg(long, default_value = "compass-backup.json")]
        out: PathBuf,
    },
    /// Restore collections from a backup file.
    Restore { file: PathBuf },
}

fn provider_key(llm: &LlmConfig, provider: Provider, configured: &str) -> String {
    if !configured.is_empty() {
        return configured.to_string();
    }
    if llm.use_environment_keys {
        std::env::var(provider.env_key()).unwrap_or_default()
    } else {
        String::new()
    }
}

/// Register a backend for every provider that has a section in the config, or whose
/// key is present in the environment.
fn build_ai_service(llm: &LlmConfig) -> AiService {
    let mut service = AiService::new(llm.provider);

    for provider in Provider::ALL {
        let section = llm.provider_config(provider).cloned();
        let section_present = section.is_some();
        let section = section.unwrap_or_default();
        let model = section.model.clone().unwrap_or_else(|| provider.default_model().to_string());

        if provider == Provider::Ollama {
            if section_present {
                let base_url = section.base_url.unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
                service.register_backend(provider, Arc::new(OllamaBackend::new(base_url, model)));
            }
            continue;
        }

        let key = provider_key(llm, provider, &section.api_key);
        if key.is_empty() {
            if section_present {
                tracing::warn!(
                    "{} configured but no API key found (set llm.{}.api_key or {})",
                    provider.as_str(),
                    provider.as_str(),
                    provider.env_key()
                );
            }
            continue;
        }

        let backend: Arc<dyn LlmBackend> = match (provider, section.base_url) {
            (_, Some(base_url)) => Arc::new(OpenAiCompatibleBackend::new(base_url, model, Some(key))),
            (Provider::OpenAi, None) => Arc::new(OpenAiBackend::new(key, model)),
            (Provider::Groq, None) => Arc::new(OpenAiCompatibleBackend::groq(key, model)),
            (Provider::Mistral, None) => Arc::new(OpenAiCompatibleBackend::mistral(key, model)),
            (Provider::Google, None) => Arc::new(GeminiBackend::new(key, model)),
            (Provider::Ollama, None) => continue,
        };
        service.register_backend(provider, backend);
    }

    if !service.is_configured() {
        tracing::warn!(
            "Default LLM provider '{}' has no backend. Query generation will fail until a key is set.",
            llm.provider.as_str()
        );
    }
    service
}

async fn open_store(config: &StoreConfig) -> anyhow::Result<Arc<dyn DocumentStore>> {
    Ok(match config.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; nothing survives a restart");
            Arc::new(MemoryStore::new())
        }
        StoreBackend::File => Arc::new(FileStore::open(&config.path).await?),
    })
}

fn statistics_service(config: &Config, store: Arc<dyn DocumentStore>) -> anyhow::Result<StatisticsService> {
    let orkg = OrkgClient::new(&config.sparql.endpoint, &config.sparql.api_base)?.with_retry(RetryConfig {
        max_attempts: config.statistics.retries.max(1),
        base_delay: Duration::from_millis(config.statistics.base_delay_ms),
    });
    Ok(StatisticsService::new(orkg, StatisticsRepository::new(store)))
}

async fn serve(config: Config, bind: Option<String>) -> anyhow::Result<()> {
    let store = open_store(&config.store).await?;
    let ai = Arc::new(build_ai_service(&config.llm));
    info!("✅ LLM ready: {} providers registered.", ai.configured_providers().len());

    let sparql: Arc<dyn SparqlExecutor> = Arc::new(SparqlClient::new(&config.sparql.endpoint)?);
    let statistics = Arc::new(statistics_service(&config, store.clone())?);

    let auth = AuthConfig {
        jwt_secret: config.jwt_secret(),
        admin_emails: config.auth.admin_emails.clone(),
        dev_header_auth: config.server.dev_header_auth,
    };
    if auth.jwt_secret.is_none() && !auth.dev_header_auth {
        tracing::warn!("No JWT secret and dev header auth disabled: every authenticated route will answer 401");
    }

    let state = AppState::new(store, ai, sparql, statistics, auth)?
        .with_max_iterations(config.generation.max_iterations)
        .with_ai_rate_limit(config.rate_limit.policy());
    let router = build_router(Arc::new(state));

    let bind_addr = bind.unwrap_or(config.server.bind);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("🌐 API listening on http://{}", bind_addr);
    info!("   Health: http://{}/api/health", bind_addr);

    axum::serve(listener, router).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("compass=debug,info")),
        )
        .init();

    let cli = Cli::parse();
    info!("🧭 EmpiRE-Compass {}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    info!(
        "Configuration loaded. LLM provider: {}, SPARQL endpoint: {}",
        config.llm.provider.as_str(),
        config.sparql.endpoint
    );

    match cli.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => serve(config, bind).await,
        Command::Ask { question, template_id, max_iterations, save } => {
            commands::ask(&config, &question, template_id, max_iterations, save).await
        }
        Command::Stats { template, limit, no_persist } => {
            commands::stats(&config, template, limit, !no_persist).await
        }
        Command::Backup { out } => commands::backup(&config, &out).await,
        Command::Restore { file } => commands::restore(&config, &file).await,
    }
}
