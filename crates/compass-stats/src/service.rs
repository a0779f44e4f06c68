//! The statistics update pipeline and its per-template progress.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use compass_common::TemplateKey;
use compass_store::StatisticsRepository;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{error, info, instrument, warn};

use crate::analysis::{analyze_paper, GlobalStatistics, PaperAnalysis};
use crate::error::{Result, StatsError};
use crate::orkg::OrkgClient;

const CRITICAL_FIELDS: &[&str] = &["totalStatements", "paperCount", "globalDistinctResources"];
const CANCELLED: &str = "Update cancelled before completion";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateStatus {
    Idle,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub template: TemplateKey,
    pub status: UpdateStatus,
    pub processed: usize,
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_paper: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Progress {
    pub fn idle(template: TemplateKey) -> Self {
        Self { template, status: UpdateStatus::Idle, processed: 0, total: 0, current_paper: None, error: None }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOptions {
    pub limit: Option<usize>,
    /// Write the result to the store and verify it.
    pub persist: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReport {
    pub template: TemplateKey,
    pub results: Vec<PaperAnalysis>,
    pub global_stats: GlobalStatistics,
    /// `true` only when the statistics were written and read back.
    pub persisted: bool,
}

pub struct StatisticsService {
    orkg: OrkgClient,
    repo: StatisticsRepository,
    progress: Mutex<HashMap<TemplateKey, Progress>>,
    events: broadcast::Sender<Progress>,
}

impl StatisticsService {
    pub fn new(orkg: OrkgClient, repo: StatisticsRepository) -> Self {
        let (events, _) = broadcast::channel(64);
        Self { orkg, repo, progress: Mutex::new(HashMap::new()), events }
    }

    /// Progress events for every template, starting with the next change.
    pub fn subscribe(&self) -> broadcast::Receiver<Progress> {
        self.events.subscribe()
    }

    fn progress_map(&self) -> MutexGuard<'_, HashMap<TemplateKey, Progress>> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn progress(&self, template: TemplateKey) -> Progress {
        self.progress_map().get(&template).cloned().unwrap_or_else(|| Progress::idle(template))
    }

    fn publish(&self, progress: Progress) {
        self.progress_map().insert(progress.template, progress.clone());
        // No subscribers is fine.
        let _ = self.events.send(progress);
    }

    pub async fn update_empire(&self, options: UpdateOptions) -> Result<UpdateReport> {
        self.update_statistics(TemplateKey::Empire, options).await
    }

    pub async fn update_nlp4re(&self, options: UpdateOptions) -> Result<UpdateReport> {
        self.update_statistics(TemplateKey::Nlp4re, options).await
    }

    /// Recompute a template's statistics. Papers are processed one at a time; a paper whose
    /// bundle cannot be fetched is recorded with zero counts.
    #[instrument(skip_all, fields(template = %template))]
    pub async fn update_statistics(&self, template: TemplateKey, options: UpdateOptions) -> Result<UpdateReport> {
        {
            let mut progress = self.progress_map();
            if progress.get(&template).is_some_and(|p| p.status == UpdateStatus::Running) {
                return Err(StatsError::AlreadyRunning(template.to_string()));
            }
            progress.insert(template, Progress { status: UpdateStatus::Running, ..Progress::idle(template) });
        }

        let guard = RunGuard { service: self, template, armed: true };
        let result = self.run(template, options).await;
        guard.disarm();

        match result {
            Ok(report) => {
                let processed = report.results.len();
                self.publish(Progress {
                    status: UpdateStatus::Completed,
                    processed,
                    total: processed,
                    ..Progress::idle(template)
                });
                Ok(report)
            }
            Err(e) => {
                error!(error = %e, "Statistics update failed");
                self.mark_failed(template, e.to_string());
                Err(e)
            }
        }
    }

    fn mark_failed(&self, template: TemplateKey, error: String) {
        let mut failed = self.progress(template);
        failed.status = UpdateStatus::Failed;
        failed.current_paper = None;
        failed.error = Some(error);
        self.publish(failed);
    }

    async fn run(&self, template: TemplateKey, options: UpdateOptions) -> Result<UpdateReport> {
        let config = template.config();
        info!(name = config.name, "Fetching papers from ORKG");
        let mut paper_ids = self.orkg.paper_ids(config.paper_query).await?;
        if let Some(limit) = options.limit {
            paper_ids.truncate(limit);
        }
        let total = paper_ids.len();
        info!(papers = total, "Processing papers");

        let mut results = Vec::with_capacity(total);
        for (i, paper_id) in paper_ids.iter().enumerate() {
            self.publish(Progress {
                status: UpdateStatus::Running,
                processed: i,
                total,
                current_paper: Some(paper_id.clone()),
                ..Progress::idle(template)
            });

            let analysis = match self.orkg.statements_bundle(paper_id).await {
                Ok(statements) => analyze_paper(paper_id, &statements),
                Err(e) => {
                    warn!(paper = %paper_id, error = %e, "Paper failed, recording zero counts");
                    PaperAnalysis::empty(paper_id)
                }
            };
            results.push(analysis);
        }

        let global_stats = GlobalStatistics::from_papers(&results);
        let (resource_reuse, literal_reuse, predicate_reuse) = global_stats.reuse_ratios();
        info!(
            papers = global_stats.paper_count,
            statements = global_stats.total_statements,
            distinct_resources = global_stats.global_distinct_resources,
            distinct_literals = global_stats.global_distinct_literals,
            distinct_predicates = global_stats.global_distinct_predicates,
            resource_reuse = %format!("{resource_reuse:.2}"),
            literal_reuse = %format!("{literal_reuse:.2}"),
            predicate_reuse = %format!("{predicate_reuse:.2}"),
            "Statistics computed"
        );

        let persisted = if options.persist { self.persist(template, &global_stats).await } else { false };
        Ok(UpdateReport { template, results, global_stats, persisted })
    }

    /// Store failures are reported as `false`, never as an error.
    async fn persist(&self, template: TemplateKey, stats: &GlobalStatistics) -> bool {
        let config = template.config();
        match self.repo.save(config.template_id, config.statistic_id, stats).await {
            Ok(true) => {
                if let Ok(Some(doc)) = self.repo.get(config.template_id, config.statistic_id).await {
                    let missing: Vec<_> = CRITICAL_FIELDS.iter().filter(|f| !doc.contains_key(**f)).collect();
                    if !missing.is_empty() {
                        warn!(?missing, "Persisted statistics are missing fields");
                    }
                }
                true
            }
            Ok(false) => false,
            Err(e) => {
                error!(error = %e, "Failed to persist statistics");
                false
            }
        }
    }
}

/// Releases a template's `Running` status if the update future is dropped mid-run.
struct RunGuard<'a> {
    service: &'a StatisticsService,
    template: TemplateKey,
    armed: bool,
}

impl RunGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!(template = %self.template, "Statistics update dropped while running");
            self.service.mark_failed(self.template, CANCELLED.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orkg::RetryConfig;
    use std::sync::Arc;
    use compass_store::{DocumentStore, MemoryStore};
    use std::time::Duration;

    const PAPERS: &str = r#"{"results": {"bindings": [
        {"paper": {"type": "uri", "value": "http://orkg.org/orkg/resource/R1"}},
        {"paper": {"type": "uri", "value": "http://orkg.org/orkg/resource/R2"}},
        {"paper": {"type": "uri", "value": "http://orkg.org/orkg/resource/R3"}}
    ]}}"#;

    const BUNDLE: &str = r#"{"statements": [
        {"subject": {"id": "R1", "_class": "resource"}, "predicate": {"id": "P31"}, "object": {"id": "R9", "_class": "resource"}},
        {"subject": {"id": "R9", "_class": "resource"}, "predicate": {"id": "P29"}, "object": {"id": "L1", "_class": "literal"}}
    ]}"#;

    async fn service(server: &mut mockito::Server, store: Arc<MemoryStore>) -> StatisticsService {
        server
            .mock("GET", "/triplestore")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(PAPERS)
            .create_async()
            .await;
        server.mock("GET", "/api/statements/R1/bundle").with_status(200).with_body(BUNDLE).create_async().await;
        server.mock("GET", "/api/statements/R2/bundle").with_status(500).create_async().await;
        server.mock("GET", "/api/statements/R3/bundle").with_status(404).create_async().await;

        let orkg = OrkgClient::new(&format!("{}/triplestore", server.url()), &format!("{}/api", server.url()))
            .unwrap()
            .with_retry(RetryConfig { max_attempts: 2, base_delay: Duration::from_millis(1) });
        StatisticsService::new(orkg, StatisticsRepository::new(store))
    }

    #[tokio::test]
    async fn test_update_persists_and_tolerates_failed_papers() {
        let mut server = mockito::Server::new_async().await;
        let store = Arc::new(MemoryStore::new());
        let service = service(&mut server, store.clone()).await;

        let report = service.update_empire(UpdateOptions { limit: None, persist: true }).await.unwrap();
        assert_eq!(report.global_stats.paper_count, 3);
        assert_eq!(report.global_stats.total_statements, 2);
        assert_eq!(report.results[1], PaperAnalysis::empty("R2"));
        assert!(report.persisted);

        let doc = store.get("Templates/R186491/Statistics", "empire-statistics").await.unwrap().unwrap();
        assert_eq!(doc["paperCount"], 3);
        assert_eq!(doc["globalDistinctResources"], 2);

        let progress = service.progress(TemplateKey::Empire);
        assert_eq!(progress.status, UpdateStatus::Completed);
        assert_eq!(progress.processed, 3);
        assert_eq!(service.progress(TemplateKey::Nlp4re).status, UpdateStatus::Idle);
    }

    #[tokio::test]
    async fn test_limit_and_no_persist() {
        let mut server = mockito::Server::new_async().await;
        let store = Arc::new(MemoryStore::new());
        let service = service(&mut server, store.clone()).await;
        let mut events = service.subscribe();

        let report = service.update_nlp4re(UpdateOptions { limit: Some(1), persist: false }).await.unwrap();
        assert_eq!(report.results.len(), 1);
        assert!(!report.persisted);
        assert!(store.get("Templates/R1544125/Statistics", "nlp4re-statistics").await.unwrap().is_none());

        let first = events.recv().await.unwrap();
        assert_eq!(first.status, UpdateStatus::Running);
        assert_eq!(first.current_paper.as_deref(), Some("R1"));
        assert_eq!(events.recv().await.unwrap().status, UpdateStatus::Completed);
    }

    #[tokio::test]
    async fn test_paper_list_failure_marks_failed() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/triplestore").match_query(mockito::Matcher::Any).with_status(503).create_async().await;
        let orkg = OrkgClient::new(&format!("{}/triplestore", server.url()), &format!("{}/api", server.url())).unwrap();
        let service = StatisticsService::new(orkg, StatisticsRepository::new(Arc::new(MemoryStore::new())));

        assert!(service.update_empire(UpdateOptions::default()).await.is_err());
        let progress = service.progress(TemplateKey::Empire);
        assert_eq!(progress.status, UpdateStatus::Failed);
        assert!(progress.error.unwrap().contains("503"));
    }
}
