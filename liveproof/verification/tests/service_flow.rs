use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use liveproof_verification::{
    search::SearchError, ArtifactKind, ExecuteRequest, MemoryResultStore, RawRecord, Searcher,
    ServiceError, SessionCache, StubSearcher, VerificationPipeline, VerificationService,
    VerifyRequest,
};
use serde_json::json;

struct ScriptedSearcher {
    records: Vec<RawRecord>,
}

impl ScriptedSearcher {
    fn with_urls(urls: &[&str]) -> Self {
        let records = urls
            .iter()
            .filter_map(|url| {
                json!({
                    "name": format!("Doc {url}"),
                    "link": url,
                    "description": format!("Evidence published at {url}."),
                })
                .as_object()
                .cloned()
            })
            .collect();
        Self { records }
    }
}

#[async_trait]
impl Searcher for ScriptedSearcher {
    async fn search(&self, _query: &str) -> Result<Vec<RawRecord>, SearchError> {
        Ok(self.records.clone())
    }
}

fn service_with(searcher: Arc<dyn Searcher>) -> (VerificationService, MemoryResultStore) {
    let store = MemoryResultStore::default();
    let service = VerificationService::new(
        VerificationPipeline::new(searcher),
        SessionCache::new(64),
        Arc::new(store.clone()),
    );
    (service, store)
}

#[tokio::test]
async fn verify_then_generate_every_artifact() {
    let (service, store) = service_with(Arc::new(StubSearcher));
    let session = service
        .verify(
            VerifyRequest::new("How do I write async HTTP clients in Python?")
                .mode("execute")
                .topic("Python Async"),
        )
        .await
        .unwrap();
    assert!(session.can_execute);
    assert_eq!(store.len(), 1);

    for (action, kind) in [
        ("source_snippet", ArtifactKind::SourceSnippet),
        ("report_document", ArtifactKind::ReportDocument),
        ("config_block", ArtifactKind::ConfigBlock),
    ] {
        let artifact = service
            .execute(ExecuteRequest {
                session_id: session.session_id.clone(),
                action_type: action.into(),
            })
            .await
            .unwrap();
        assert_eq!(artifact.kind, kind);
        assert!(!artifact.content.is_empty());
        assert!(!artifact.safety_notes.is_empty());
    }

    let report = service
        .execute(ExecuteRequest {
            session_id: session.session_id.clone(),
            action_type: "report_document".into(),
        })
        .await
        .unwrap();
    let pdf = STANDARD.decode(report.content).unwrap();
    assert!(pdf.starts_with(b"%PDF-1.4"));
}

#[tokio::test]
async fn aliased_records_normalize_and_duplicates_collapse() {
    let searcher = ScriptedSearcher::with_urls(&[
        "https://a.example",
        "https://b.example",
        "https://a.example",
        "https://c.example",
        "https://d.example",
    ]);
    let (service, _) = service_with(Arc::new(searcher));
    let session = service
        .verify(VerifyRequest::new("aliases").mode("execute"))
        .await
        .unwrap();
    assert_eq!(session.citations.len(), 4);
    assert_eq!(session.claims.len(), 4);
    assert_eq!(session.citations[0].title, "Doc https://a.example");
    assert!((session.reliability_score - 0.87).abs() < 1e-9);
    assert!(session.can_execute);
    for (index, claim) in session.claims.iter().enumerate() {
        assert_eq!(claim.citation_ids, vec![index]);
        assert!(claim.citation_ids.iter().all(|id| *id < session.citations.len()));
    }
}

#[tokio::test]
async fn thin_evidence_keeps_gate_closed() {
    let searcher = ScriptedSearcher::with_urls(&["https://only.example"]);
    let (service, _) = service_with(Arc::new(searcher));
    let session = service
        .verify(VerifyRequest::new("thin").mode("execute"))
        .await
        .unwrap();
    assert!(!session.can_execute);
    assert!(session.next_question.is_some());
    let err = service
        .execute(ExecuteRequest {
            session_id: session.session_id,
            action_type: "config_block".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::GateClosed));
}

#[tokio::test]
async fn concurrent_verifications_are_independent() {
    let (service, store) = service_with(Arc::new(StubSearcher));
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .verify(VerifyRequest::new(format!("question {i}")).topic("shared"))
                    .await
            })
        })
        .collect();
    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap().session_id);
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 8);
    assert_eq!(store.len(), 8);
    assert_eq!(service.compare_topic("shared").await.unwrap().len(), 8);
}

#[tokio::test]
async fn sessions_survive_a_cold_cache() {
    let store = MemoryResultStore::default();
    let writer = VerificationService::new(
        VerificationPipeline::new(Arc::new(StubSearcher)),
        SessionCache::new(4),
        Arc::new(store.clone()),
    );
    let session = writer.verify(VerifyRequest::new("persist me")).await.unwrap();

    let reader = VerificationService::new(
        VerificationPipeline::new(Arc::new(StubSearcher)),
        SessionCache::new(4),
        Arc::new(store),
    );
    let fetched = reader.get_session(&session.session_id).await.unwrap();
    assert_eq!(fetched, session);
}
