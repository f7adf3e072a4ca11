//! Request boundary over the pipeline, dispatcher, cache and result store.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;
use thiserror::Error;

use crate::{
    execute::{ActionKind, Artifact, ExecuteDispatcher},
    pipeline::{PipelineError, VerificationPipeline},
    session::{Session, SessionSummary, TopSource, VerifyMode},
    store::{ResultStore, SessionCache, StoreError},
    telemetry::VerificationTelemetry,
};

/// Maximum question length in characters.
pub const QUESTION_LIMIT: usize = 2_000;
/// Maximum topic length in characters.
pub const TOPIC_LIMIT: usize = 200;
/// Sources returned by [`VerificationService::top_sources`] when no limit is given.
pub const DEFAULT_SOURCE_LIMIT: usize = 20;
/// Detail reported when execution is refused.
pub const GATE_CLOSED_DETAIL: &str =
    "Execution not allowed: reliability below threshold. Ask for clarification.";
/// Service label reported by [`VerificationService::health`].
pub const SERVICE_NAME: &str = "liveproof-api";

/// Inbound verification request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyRequest {
    /// Question to verify, 1 to 2000 characters.
    pub question: String,
    /// `answer` or `execute`.
    #[serde(default = "default_mode")]
    pub mode: String,
    /// Optional topic label, at most 200 characters.
    #[serde(default)]
    pub topic: Option<String>,
}

impl VerifyRequest {
    /// Answer-mode request without a topic.
    #[must_use]
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            mode: default_mode(),
            topic: None,
        }
    }

    /// Sets the mode label.
    #[must_use]
    pub fn mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = mode.into();
        self
    }

    /// Sets the topic.
    #[must_use]
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }
}

fn default_mode() -> String {
    VerifyMode::Answer.as_str().to_string()
}

/// Inbound artifact request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    /// Session to execute against.
    pub session_id: String,
    /// One of `source_snippet`, `report_document`, `config_block` (legacy labels accepted).
    pub action_type: String,
}

/// Liveness payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    /// Always `ok` while the process serves requests.
    pub status: &'static str,
    /// Service label.
    pub service: &'static str,
}

/// Malformed request input, rejected before the pipeline runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Question is empty.
    #[error("question must not be empty")]
    EmptyQuestion,
    /// Question exceeds [`QUESTION_LIMIT`].
    #[error("question exceeds 2000 characters ({0})")]
    QuestionTooLong(usize),
    /// Topic exceeds [`TOPIC_LIMIT`].
    #[error("topic exceeds 200 characters ({0})")]
    TopicTooLong(usize),
    /// Mode label is not recognized.
    #[error(transparent)]
    Mode(#[from] crate::session::UnknownMode),
    /// Action label is not recognized.
    #[error(transparent)]
    Action(#[from] crate::execute::UnknownAction),
}

/// Failures returned across the service boundary.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Request rejected by validation.
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),
    /// Session id unknown to both cache and store.
    #[error("session not found: {0}")]
    NotFound(String),
    /// Session exists but execution is not permitted.
    #[error("{}", GATE_CLOSED_DETAIL)]
    GateClosed,
    /// Verification pipeline failed.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    /// Result store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServiceError {
    /// HTTP status an outer layer should answer with.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 422,
            Self::NotFound(_) => 404,
            Self::GateClosed => 400,
            Self::Pipeline(_) | Self::Store(_) => 502,
        }
    }
}

/// Service facade an HTTP or CLI layer calls into.
#[derive(Clone)]
pub struct VerificationService {
    pipeline: VerificationPipeline,
    dispatcher: ExecuteDispatcher,
    cache: SessionCache,
    store: Arc<dyn ResultStore>,
    telemetry: Option<VerificationTelemetry>,
}

impl std::fmt::Debug for VerificationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationService")
            .field("store", &self.store.name())
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl VerificationService {
    /// Wires the service from its collaborators.
    #[must_use]
    pub fn new(pipeline: VerificationPipeline, cache: SessionCache, store: Arc<dyn ResultStore>) -> Self {
        Self {
            pipeline,
            dispatcher: ExecuteDispatcher::new(),
            cache,
            store,
            telemetry: None,
        }
    }

    /// Attaches telemetry to the service and its dispatcher.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: VerificationTelemetry) -> Self {
        self.dispatcher = self.dispatcher.with_telemetry(telemetry.clone());
        self.telemetry = Some(telemetry);
        self
    }

    /// Label of the backing result store.
    #[must_use]
    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }

    /// Validates and verifies a question, caching and persisting the session.
    pub async fn verify(&self, request: VerifyRequest) -> Result<Session, ServiceError> {
        let mode = validate_verify(&request)?;
        let session = self
            .pipeline
            .verify(&request.question, mode, request.topic.as_deref())
            .await?;
        self.cache.insert(session.clone());
        if let Err(err) = self.store.upsert(&session).await {
            self.log(
                LogLevel::Error,
                "service.session.persist_failed",
                json!({ "session_id": session.session_id, "store": self.store.name(), "error": err.to_string() }),
            );
            return Err(err.into());
        }
        self.log(
            LogLevel::Info,
            "service.session.persisted",
            json!({ "session_id": session.session_id, "store": self.store.name() }),
        );
        Ok(session)
    }

    /// Looks a session up in the cache, then the store.
    pub async fn get_session(&self, session_id: &str) -> Result<Session, ServiceError> {
        if let Some(session) = self.cache.get(session_id) {
            return Ok(session);
        }
        match self.store.get_by_id(session_id).await? {
            Some(session) => {
                self.cache.insert(session.clone());
                Ok(session)
            }
            None => Err(ServiceError::NotFound(session_id.to_string())),
        }
    }

    /// Generates an artifact for a session whose execution gate is open.
    pub async fn execute(&self, request: ExecuteRequest) -> Result<Artifact, ServiceError> {
        let kind: ActionKind = request
            .action_type
            .parse()
            .map_err(ValidationError::from)?;
        let session = self.get_session(&request.session_id).await?;
        if !session.can_execute {
            self.log(
                LogLevel::Warn,
                "service.execute.rejected",
                json!({
                    "session_id": session.session_id,
                    "action": kind.as_str(),
                    "reliability_score": session.reliability_score,
                }),
            );
            if let Some(tel) = &self.telemetry {
                let _ = tel
                    .event(
                        "service.execute.rejected",
                        json!({ "session_id": session.session_id, "action": kind.as_str() }),
                    )
                    .await;
            }
            return Err(ServiceError::GateClosed);
        }
        let artifact = self.dispatcher.execute_kind(&session, kind);
        if let Some(tel) = &self.telemetry {
            let _ = tel
                .event(
                    "execute.artifact.generated",
                    json!({ "session_id": session.session_id, "action": kind.as_str() }),
                )
                .await;
        }
        Ok(artifact)
    }

    /// Prior sessions on the same topic slug, newest first.
    pub async fn compare_topic(&self, topic: &str) -> Result<Vec<SessionSummary>, ServiceError> {
        let length = topic.chars().count();
        if length > TOPIC_LIMIT {
            return Err(ValidationError::TopicTooLong(length).into());
        }
        Ok(self.store.list_by_topic(topic).await?)
    }

    /// Most-cited sources; `None` means [`DEFAULT_SOURCE_LIMIT`].
    pub async fn top_sources(&self, limit: Option<usize>) -> Result<Vec<TopSource>, ServiceError> {
        let limit = limit.unwrap_or(DEFAULT_SOURCE_LIMIT);
        Ok(self.store.top_sources(limit).await?)
    }

    /// Liveness payload for health checks.
    #[must_use]
    pub const fn health(&self) -> HealthStatus {
        HealthStatus {
            status: "ok",
            service: SERVICE_NAME,
        }
    }

    /// Replaces the cached copy of a session. Administrative and test use only; the store is untouched.
    pub fn override_session(&self, session: Session) {
        self.log(
            LogLevel::Warn,
            "service.session.overridden",
            json!({ "session_id": session.session_id, "can_execute": session.can_execute }),
        );
        self.cache.insert(session);
    }

    fn log(&self, level: LogLevel, message: &str, metadata: serde_json::Value) {
        if let Some(tel) = &self.telemetry {
            let _ = tel.log(level, message, metadata);
        }
    }
}

fn validate_verify(request: &VerifyRequest) -> Result<VerifyMode, ValidationError> {
    if request.question.is_empty() {
        return Err(ValidationError::EmptyQuestion);
    }
    let length = request.question.chars().count();
    if length > QUESTION_LIMIT {
        return Err(ValidationError::QuestionTooLong(length));
    }
    if let Some(topic) = &request.topic {
        let length = topic.chars().count();
        if length > TOPIC_LIMIT {
            return Err(ValidationError::TopicTooLong(length));
        }
    }
    Ok(request.mode.parse()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        citation::RawRecord,
        execute::ArtifactKind,
        search::{SearchError, Searcher, StubSearcher},
        store::MemoryResultStore,
    };
    use async_trait::async_trait;
    use shared_logging::MemoryLogger;

    struct EmptySearcher;

    #[async_trait]
    impl Searcher for EmptySearcher {
        async fn search(&self, _query: &str) -> Result<Vec<RawRecord>, SearchError> {
            Ok(Vec::new())
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl ResultStore for BrokenStore {
        async fn upsert(&self, _session: &Session) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("offline".into()))
        }

        async fn get_by_id(&self, _session_id: &str) -> Result<Option<Session>, StoreError> {
            Err(StoreError::Unavailable("offline".into()))
        }

        async fn list_by_topic(&self, _topic: &str) -> Result<Vec<SessionSummary>, StoreError> {
            Ok(Vec::new())
        }

        async fn top_sources(&self, _limit: usize) -> Result<Vec<TopSource>, StoreError> {
            Ok(Vec::new())
        }

        fn name(&self) -> &'static str {
            "broken"
        }
    }

    fn service(searcher: Arc<dyn Searcher>) -> (VerificationService, MemoryResultStore) {
        let store = MemoryResultStore::default();
        let service = VerificationService::new(
            VerificationPipeline::new(searcher),
            SessionCache::new(16),
            Arc::new(store.clone()),
        );
        (service, store)
    }

    #[tokio::test]
    async fn verify_caches_and_persists() {
        let (service, store) = service(Arc::new(StubSearcher));
        let session = service
            .verify(VerifyRequest::new("How does asyncio work?").mode("execute"))
            .await
            .unwrap();
        assert!(session.can_execute);
        assert_eq!(store.len(), 1);
        let fetched = service.get_session(&session.session_id).await.unwrap();
        assert_eq!(fetched, session);
    }

    #[tokio::test]
    async fn validation_rejects_before_pipeline() {
        let (service, store) = service(Arc::new(StubSearcher));
        let empty = service.verify(VerifyRequest::new("")).await.unwrap_err();
        assert_eq!(empty.status_code(), 422);
        assert!(matches!(
            empty,
            ServiceError::Validation(ValidationError::EmptyQuestion)
        ));
        let long = service
            .verify(VerifyRequest::new("q".repeat(QUESTION_LIMIT + 1)))
            .await
            .unwrap_err();
        assert!(matches!(
            long,
            ServiceError::Validation(ValidationError::QuestionTooLong(2_001))
        ));
        let mode = service
            .verify(VerifyRequest::new("q").mode("run"))
            .await
            .unwrap_err();
        assert!(matches!(mode, ServiceError::Validation(ValidationError::Mode(_))));
        let topic = service
            .verify(VerifyRequest::new("q").topic("t".repeat(TOPIC_LIMIT + 1)))
            .await
            .unwrap_err();
        assert!(matches!(topic, ServiceError::Validation(ValidationError::TopicTooLong(_))));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn question_at_limit_is_accepted() {
        let (service, _) = service(Arc::new(StubSearcher));
        assert!(service
            .verify(VerifyRequest::new("q".repeat(QUESTION_LIMIT)))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn whitespace_question_and_topic_are_accepted() {
        let (service, store) = service(Arc::new(StubSearcher));
        let session = service
            .verify(VerifyRequest::new("   ").topic("  "))
            .await
            .unwrap();
        assert_eq!(session.question, "   ");
        assert_eq!(session.topic, "  ");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let (service, _) = service(Arc::new(StubSearcher));
        let err = service.get_session("missing").await.unwrap_err();
        assert_eq!(err.status_code(), 404);
        let err = service
            .execute(ExecuteRequest {
                session_id: "missing".into(),
                action_type: "config_block".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn closed_gate_refuses_execution() {
        let sink = Arc::new(MemoryLogger::new(16));
        let telemetry = VerificationTelemetry::builder("service")
            .log_sink(sink.clone())
            .build()
            .unwrap();
        let (service, _) = service(Arc::new(EmptySearcher));
        let service = service.with_telemetry(telemetry);
        let session = service
            .verify(VerifyRequest::new("obscure").mode("execute"))
            .await
            .unwrap();
        assert!(!session.can_execute);
        let err = service
            .execute(ExecuteRequest {
                session_id: session.session_id,
                action_type: "source_snippet".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.to_string(), GATE_CLOSED_DETAIL);
        assert!(sink.messages().contains(&"service.execute.rejected".to_string()));
    }

    #[tokio::test]
    async fn override_opens_gate_for_execution() {
        let (service, _) = service(Arc::new(EmptySearcher));
        let mut session = service.verify(VerifyRequest::new("q")).await.unwrap();
        session.can_execute = true;
        service.override_session(session.clone());
        let artifact = service
            .execute(ExecuteRequest {
                session_id: session.session_id,
                action_type: "pdf_report".into(),
            })
            .await
            .unwrap();
        assert_eq!(artifact.kind, ArtifactKind::ReportDocument);
    }

    #[tokio::test]
    async fn unknown_action_is_a_validation_error() {
        let (service, _) = service(Arc::new(StubSearcher));
        let session = service
            .verify(VerifyRequest::new("q").mode("execute"))
            .await
            .unwrap();
        let err = service
            .execute(ExecuteRequest {
                session_id: session.session_id,
                action_type: "shell".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(ValidationError::Action(_))));
    }

    #[tokio::test]
    async fn store_failure_propagates() {
        let service = VerificationService::new(
            VerificationPipeline::new(Arc::new(StubSearcher)),
            SessionCache::new(4),
            Arc::new(BrokenStore),
        );
        let err = service.verify(VerifyRequest::new("q")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Store(StoreError::Unavailable(_))));
        assert_eq!(err.status_code(), 502);
        assert!(matches!(
            service.get_session("x").await.unwrap_err(),
            ServiceError::Store(_)
        ));
    }

    #[tokio::test]
    async fn compare_and_sources_read_the_store() {
        let (service, _) = service(Arc::new(StubSearcher));
        service
            .verify(VerifyRequest::new("first").topic("Python Async"))
            .await
            .unwrap();
        service
            .verify(VerifyRequest::new("second").topic("python async"))
            .await
            .unwrap();
        let summaries = service.compare_topic("PYTHON ASYNC").await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert!(summaries.iter().all(|s| s.claims_count == 3));
        let sources = service.top_sources(None).await.unwrap();
        assert_eq!(sources.len(), 3);
        assert!(sources.iter().all(|s| s.citation_count == 2));
        assert_eq!(service.top_sources(Some(1)).await.unwrap().len(), 1);
    }

    #[test]
    fn health_reports_service_name() {
        let (service, _) = service(Arc::new(StubSearcher));
        let health = service.health();
        assert_eq!(health.status, "ok");
        assert_eq!(health.service, "liveproof-api");
    }
}
