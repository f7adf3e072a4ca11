//! Runtime assembly: chooses collaborators from configuration and wires the service.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;
use shared_event_bus::FileEventPublisher;
use shared_logging::LogLevel;

use crate::{
    config::ServiceConfig,
    pipeline::VerificationPipeline,
    sanity::SanityStore,
    search::{Searcher, StubSearcher, YouSearcher},
    service::VerificationService,
    store::{MemoryResultStore, ResultStore, SessionCache},
    telemetry::VerificationTelemetry,
};

/// Module label stamped on runtime telemetry.
pub const TELEMETRY_MODULE: &str = "liveproof.verification";

/// Fully wired verification runtime.
#[derive(Debug, Clone)]
pub struct VerificationRuntime {
    service: VerificationService,
    telemetry: Option<VerificationTelemetry>,
}

impl VerificationRuntime {
    /// Offline runtime: stub search, in-memory store, no telemetry.
    #[must_use]
    pub fn bootstrap() -> Self {
        let pipeline = VerificationPipeline::new(Arc::new(StubSearcher));
        let service = VerificationService::new(
            pipeline,
            SessionCache::default(),
            Arc::new(MemoryResultStore::default()),
        );
        Self {
            service,
            telemetry: None,
        }
    }

    /// Builds collaborators from configuration.
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        let telemetry = build_telemetry(config)?;

        let searcher: Arc<dyn Searcher> = if config.search.use_stub() {
            Arc::new(StubSearcher)
        } else {
            Arc::new(YouSearcher::new(&config.search).context("configuring search client")?)
        };
        let store: Arc<dyn ResultStore> = if config.store.remote_enabled() {
            Arc::new(SanityStore::new(&config.store).context("configuring result store")?)
        } else {
            Arc::new(MemoryResultStore::default())
        };

        let mut pipeline = VerificationPipeline::new(searcher);
        if let Some(tel) = &telemetry {
            pipeline = pipeline.with_telemetry(tel.clone());
        }
        let mut service =
            VerificationService::new(pipeline, SessionCache::new(config.cache.capacity), store);
        if let Some(tel) = &telemetry {
            service = service.with_telemetry(tel.clone());
            let _ = tel.log(
                LogLevel::Info,
                "runtime.bootstrap.complete",
                json!({
                    "search": if config.search.use_stub() { "stub" } else { "you" },
                    "store": service.store_name(),
                    "cache_capacity": config.cache.capacity,
                }),
            );
        }
        Ok(Self { service, telemetry })
    }

    /// Resolves configuration from an optional file plus the environment, then builds.
    pub fn from_environment(path: Option<&std::path::Path>) -> Result<Self> {
        let config = ServiceConfig::resolve(path)?;
        Self::from_config(&config)
    }

    /// Service boundary.
    #[must_use]
    pub const fn service(&self) -> &VerificationService {
        &self.service
    }

    /// Accesses the telemetry handle.
    #[must_use]
    pub const fn telemetry(&self) -> Option<&VerificationTelemetry> {
        self.telemetry.as_ref()
    }
}

fn build_telemetry(config: &ServiceConfig) -> Result<Option<VerificationTelemetry>> {
    let settings = &config.telemetry;
    if settings.log_path.is_none() && settings.event_log.is_none() {
        return Ok(None);
    }
    let mut builder = VerificationTelemetry::builder(TELEMETRY_MODULE).min_level(settings.min_level);
    if let Some(path) = &settings.log_path {
        builder = builder.log_path(path);
    }
    if let Some(path) = &settings.event_log {
        let publisher = FileEventPublisher::new(path)
            .with_context(|| format!("opening event log {}", path.display()))?;
        builder = builder.event_publisher(Arc::new(publisher));
    }
    builder.build().map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{ExecuteRequest, VerifyRequest};
    use tempfile::tempdir;

    #[tokio::test]
    async fn bootstrap_runtime_verifies_and_executes() {
        let runtime = VerificationRuntime::bootstrap();
        let session = runtime
            .service()
            .verify(VerifyRequest::new("How does asyncio work?").mode("execute"))
            .await
            .unwrap();
        let artifact = runtime
            .service()
            .execute(ExecuteRequest {
                session_id: session.session_id,
                action_type: "config_block".into(),
            })
            .await
            .unwrap();
        assert!(artifact.content.contains("reliability_score"));
        assert_eq!(runtime.service().store_name(), "memory");
    }

    #[tokio::test]
    async fn configured_runtime_writes_logs_and_events() {
        let dir = tempdir().unwrap();
        let mut config = ServiceConfig::default();
        config.telemetry.log_path = Some(dir.path().join("logs/verification.log"));
        config.telemetry.event_log = Some(dir.path().join("events/verification.jsonl"));
        let runtime = VerificationRuntime::from_config(&config).unwrap();
        assert!(runtime.telemetry().is_some());
        runtime
            .service()
            .verify(VerifyRequest::new("q").topic("rust"))
            .await
            .unwrap();
        let logs = std::fs::read_to_string(dir.path().join("logs/verification.log")).unwrap();
        assert!(logs.contains("runtime.bootstrap.complete"));
        assert!(logs.contains("service.session.persisted"));
        let events = std::fs::read_to_string(dir.path().join("events/verification.jsonl")).unwrap();
        assert!(events.contains("verification.session.created"));
    }

    #[test]
    fn remote_store_requires_credentials() {
        let mut config = ServiceConfig::default();
        config.store.project_id = Some("proj".into());
        let runtime = VerificationRuntime::from_config(&config).unwrap();
        assert_eq!(runtime.service().store_name(), "memory");
    }
}
