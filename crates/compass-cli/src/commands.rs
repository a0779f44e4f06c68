//! One-shot commands: ask, stats, backup, restore.

use std::path::Path;
use std::sync::Arc;

use compass_common::TemplateKey;
use compass_query::{GenerationRequest, IterationEvent, PromptBuilder, QueryGenerator};
use compass_sparql::{SparqlClient, SparqlExecutor};
use compass_stats::{UpdateOptions, UpdateStatus};
use compass_store::{AiContentKind, AiHistory, BackupService, DynamicQuestionSession, LocalStore, SavedQuestions};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::{build_ai_service, open_store, statistics_service};

/// The question, the accepted query and its rows become the local session state.
pub async fn ask(
    config: &Config,
    question: &str,
    template_id: Option<String>,
    max_iterations: Option<u32>,
    save: Option<String>,
) -> anyhow::Result<()> {
    let ai = Arc::new(build_ai_service(&config.llm));
    let sparql: Arc<dyn SparqlExecutor> = Arc::new(SparqlClient::new(&config.sparql.endpoint)?);
    let generator = QueryGenerator::new(ai, sparql, Arc::new(PromptBuilder::new()?))
        .with_max_iterations(config.generation.max_iterations);

    let local = Arc::new(LocalStore::open(&config.state.dir).await?);
    let session = DynamicQuestionSession::load(local.clone()).await;
    session.update_question(question).await?;
    session.set_template(template_id.clone(), None, None).await?;

    let mut request = GenerationRequest::new(question);
    request.max_iterations = max_iterations;
    request.schema.template_id = template_id;

    let (tx, mut rx) = mpsc::unbounded_channel::<IterationEvent>();
    let relay = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            debug!(iteration = event.iteration, phase = ?event.phase, "Generation step");
        }
    });
    let result = generator.generate(&request, Some(tx)).await;
    let _ = relay.await;
    let outcome = result?;

    if outcome.degraded {
        warn!("No attempt was accepted; showing the best result found");
    }
    session.update_sparql_query(&outcome.combined_query, Some(outcome.final_prompt.clone())).await?;
    session.update_query_results(outcome.rows.clone()).await?;
    AiHistory::load(local.clone())
        .await
        .add(AiContentKind::Sparql, outcome.combined_query.clone(), question, None)
        .await?;

    if let Some(name) = save {
        let saved = SavedQuestions::load(local).await.save(&name, &session.snapshot()).await?;
        info!(id = %saved.id, "Question saved locally");
    }

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

pub async fn stats(config: &Config, template: TemplateKey, limit: Option<usize>, persist: bool) -> anyhow::Result<()> {
    let store = open_store(&config.store).await?;
    let service = statistics_service(config, store)?;

    let mut events = service.subscribe();
    let reporter = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(progress) if progress.status == UpdateStatus::Running => info!(
                    processed = progress.processed,
                    total = progress.total,
                    paper = progress.current_paper.as_deref().unwrap_or(""),
                    "Analysing papers"
                ),
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
    });

    let report = service.update_statistics(template, UpdateOptions { limit, persist }).await;
    reporter.abort();
    let report = report?;

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "template": report.template,
            "globalStats": report.global_stats,
            "persisted": report.persisted,
        }))?
    );
    Ok(())
}

pub async fn backup(config: &Config, out: &Path) -> anyhow::Result<()> {
    let store = open_store(&config.store).await?;
    let backup = BackupService::new(store).backup().await;
    tokio::fs::write(out, serde_json::to_vec_pretty(&backup)?).await?;
    info!(collections = backup.data.len(), path = %out.display(), "Backup written");
    Ok(())
}

pub async fn restore(config: &Config, file: &Path) -> anyhow::Result<()> {
    let content: serde_json::Value = serde_json::from_slice(&tokio::fs::read(file).await?)?;
    let store = open_store(&config.store).await?;
    let summary = BackupService::new(store).restore(&content).await?;
    info!(
        collections = summary.collections_restored,
        documents = summary.documents_restored,
        "Restore complete"
    );
    Ok(())
}
