//! Statistics runs against a mocked ORKG, persisted to the filesystem store.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use compass_common::TemplateKey;
use compass_stats::{OrkgClient, RetryConfig, StatisticsService, StatsError, UpdateOptions, UpdateStatus};
use compass_store::{FileStore, StatisticsRepository};
use pretty_assertions::assert_eq;

const PAPERS: &str = r#"{"results": {"bindings": [
    {"paper": {"type": "uri", "value": "http://orkg.org/orkg/resource/R10"}},
    {"paper": {"type": "uri", "value": "http://orkg.org/orkg/resource/R11"}}
]}}"#;

const BUNDLE: &str = r#"{"statements": [
    {"subject": {"id": "R10", "_class": "resource"}, "predicate": {"id": "P31"}, "object": {"id": "R20", "_class": "resource"}},
    {"subject": {"id": "R20", "_class": "resource"}, "predicate": {"id": "P29"}, "object": {"id": "L7", "_class": "literal"}},
    {"subject": {"id": "R20", "_class": "resource"}, "predicate": {"id": "P30"}, "object": {"id": "L8", "_class": "literal"}}
]}"#;

async fn mock_orkg(server: &mut mockito::Server) {
    server
        .mock("GET", "/triplestore")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_body(PAPERS)
        .create_async()
        .await;
}

fn orkg(server: &mockito::Server) -> OrkgClient {
    OrkgClient::new(&format!("{}/triplestore", server.url()), &format!("{}/api", server.url()))
        .unwrap()
        .with_retry(RetryConfig { max_attempts: 1, base_delay: Duration::from_millis(1) })
}

#[tokio::test]
async fn test_statistics_survive_store_reopen() {
    let mut server = mockito::Server::new_async().await;
    mock_orkg(&mut server).await;
    server
        .mock("GET", mockito::Matcher::Regex(r"^/api/statements/R1[01]/bundle$".into()))
        .with_status(200)
        .with_body(BUNDLE)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::open(dir.path()).await.unwrap());
    let service = StatisticsService::new(orkg(&server), StatisticsRepository::new(store));

    let report = service.update_statistics(TemplateKey::Empire, UpdateOptions { limit: None, persist: true }).await.unwrap();
    assert!(report.persisted);
    assert_eq!(report.global_stats.paper_count, 2);
    assert_eq!(report.global_stats.total_statements, 6);

    let reopened = Arc::new(FileStore::open(dir.path()).await.unwrap());
    let doc = StatisticsRepository::new(reopened)
        .get("R186491", "empire-statistics")
        .await
        .unwrap()
        .expect("statistics document");
    assert_eq!(doc["paperCount"], 2);
    assert_eq!(doc["totalStatements"], 6);
}

#[tokio::test]
async fn test_concurrent_run_for_same_template_is_rejected() {
    let mut server = mockito::Server::new_async().await;
    mock_orkg(&mut server).await;
    server
        .mock("GET", mockito::Matcher::Regex(r"^/api/statements/R1[01]/bundle$".into()))
        .with_status(200)
        .with_chunked_body(|w| {
            std::thread::sleep(Duration::from_millis(300));
            w.write_all(BUNDLE.as_bytes())
        })
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::open(dir.path()).await.unwrap());
    let service = Arc::new(StatisticsService::new(orkg(&server), StatisticsRepository::new(store)));

    let first = {
        let service = service.clone();
        tokio::spawn(async move {
            service.update_statistics(TemplateKey::Nlp4re, UpdateOptions { limit: None, persist: false }).await
        })
    };

    for _ in 0..100 {
        if service.progress(TemplateKey::Nlp4re).status == UpdateStatus::Running {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let second = service.update_statistics(TemplateKey::Nlp4re, UpdateOptions { limit: None, persist: false }).await;
    assert!(matches!(second, Err(StatsError::AlreadyRunning(_))));

    let report = first.await.unwrap().unwrap();
    assert_eq!(report.results.len(), 2);
    assert!(!report.persisted);
    assert_eq!(service.progress(TemplateKey::Nlp4re).status, UpdateStatus::Completed);
}

#[tokio::test]
async fn test_abandoned_run_releases_the_template() {
    let mut server = mockito::Server::new_async().await;
    mock_orkg(&mut server).await;
    server
        .mock("GET", mockito::Matcher::Regex(r"^/api/statements/R1[01]/bundle$".into()))
        .with_status(200)
        .with_chunked_body(|w| {
            std::thread::sleep(Duration::from_millis(300));
            w.write_all(BUNDLE.as_bytes())
        })
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::open(dir.path()).await.unwrap());
    let service = StatisticsService::new(orkg(&server), StatisticsRepository::new(store));
    let options = UpdateOptions { limit: None, persist: false };

    // The caller gives up mid-run, as a disconnecting HTTP client does.
    let abandoned =
        tokio::time::timeout(Duration::from_millis(100), service.update_statistics(TemplateKey::Empire, options)).await;
    assert!(abandoned.is_err());

    let progress = service.progress(TemplateKey::Empire);
    assert_eq!(progress.status, UpdateStatus::Failed);
    assert_eq!(progress.error.as_deref(), Some("Update cancelled before completion"));

    let report = service.update_statistics(TemplateKey::Empire, options).await.unwrap();
    assert_eq!(report.results.len(), 2);
    assert_eq!(service.progress(TemplateKey::Empire).status, UpdateStatus::Completed);
}
