#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! LiveProof verification core: citation-backed claims, reliability gating and artifact generation.

/// Citation records and the raw-record normalizer.
#[path = "../citation.rs"]
pub mod citation;

/// Claim synthesis over deduplicated citations.
#[path = "../claims.rs"]
pub mod claims;

/// Reliability scoring and the execution gate.
#[path = "../reliability.rs"]
pub mod reliability;

/// Session records, topic slugs and timestamps.
#[path = "../session.rs"]
pub mod session;

/// Web search collaborators.
#[path = "../search.rs"]
pub mod search;

/// Result store trait, in-memory store and session cache.
#[path = "../store.rs"]
pub mod store;

/// Sanity document store.
#[path = "../sanity.rs"]
pub mod sanity;

/// Service configuration.
#[path = "../config.rs"]
pub mod config;

/// Telemetry helpers.
#[path = "../telemetry.rs"]
pub mod telemetry;

/// PDF report rendering.
#[path = "../report.rs"]
pub mod report;

/// Verification orchestrator.
#[path = "../pipeline.rs"]
pub mod pipeline;

/// Artifact dispatcher.
#[path = "../execute.rs"]
pub mod execute;

/// Request boundary.
#[path = "../service.rs"]
pub mod service;

/// Runtime assembly entry point.
#[path = "../main.rs"]
pub mod runtime;

pub use citation::{Citation, CitationNormalizer, RawRecord};
pub use claims::{Claim, ClaimBuilder, EvidenceSet, Stance};
pub use config::ServiceConfig;
pub use execute::{ActionKind, Artifact, ArtifactKind, ExecuteDispatcher};
pub use pipeline::{PipelineError, VerificationPipeline};
pub use reliability::{execution_permitted, score, RELIABILITY_THRESHOLD};
pub use runtime::VerificationRuntime;
pub use sanity::SanityStore;
pub use search::{SearchError, Searcher, StubSearcher, YouSearcher};
pub use service::{
    ExecuteRequest, HealthStatus, ServiceError, ValidationError, VerificationService,
    VerifyRequest,
};
pub use session::{Session, SessionSummary, TopSource, VerifyMode};
pub use store::{MemoryResultStore, ResultStore, SessionCache, StoreError};
pub use telemetry::{VerificationTelemetry, VerificationTelemetryBuilder};
