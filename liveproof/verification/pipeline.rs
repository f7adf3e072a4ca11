//! Verification orchestration: search, claim synthesis, scoring, gating and answer text.

use std::sync::Arc;

use serde_json::json;
use shared_logging::LogLevel;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    claims::{Claim, ClaimBuilder, EvidenceSet},
    reliability::{self, RELIABILITY_THRESHOLD},
    search::{SearchError, Searcher},
    session::{now, truncate_chars, Session, VerifyMode, DEFAULT_TOPIC},
    telemetry::VerificationTelemetry,
};

/// Answer used when no claim carries text.
pub const INSUFFICIENT_EVIDENCE: &str = "Insufficient evidence to form a confident answer.";
/// Guidance returned when execution was requested but the gate stayed closed.
pub const CLARIFICATION_PROMPT: &str = "Reliability is below threshold. Could you narrow your question or add context so we can gather more evidence?";
/// Claims contributing to the answer text.
pub const ANSWER_CLAIMS: usize = 3;
/// Characters taken from each contributing claim.
pub const ANSWER_CLAIM_LIMIT: usize = 150;

/// Failures surfaced by [`VerificationPipeline::verify`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The search collaborator failed; no session is produced.
    #[error("evidence search failed: {0}")]
    Search(#[from] SearchError),
}

/// Orchestrates one verification request end to end.
#[derive(Clone)]
pub struct VerificationPipeline {
    searcher: Arc<dyn Searcher>,
    builder: ClaimBuilder,
    telemetry: Option<VerificationTelemetry>,
}

impl std::fmt::Debug for VerificationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationPipeline")
            .field("telemetry", &self.telemetry)
            .finish_non_exhaustive()
    }
}

impl VerificationPipeline {
    /// Creates a pipeline over the given searcher with the default claim builder.
    #[must_use]
    pub fn new(searcher: Arc<dyn Searcher>) -> Self {
        Self {
            searcher,
            builder: ClaimBuilder::default(),
            telemetry: None,
        }
    }

    /// Replaces the claim builder.
    #[must_use]
    pub fn with_builder(mut self, builder: ClaimBuilder) -> Self {
        self.builder = builder;
        self
    }

    /// Attaches telemetry sinks.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: VerificationTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Runs search, claim synthesis and scoring, producing a fresh session.
    ///
    /// Search failures propagate unchanged; the pipeline never retries.
    pub async fn verify(
        &self,
        question: &str,
        mode: VerifyMode,
        topic: Option<&str>,
    ) -> Result<Session, PipelineError> {
        self.log(
            LogLevel::Debug,
            "verification.search.start",
            json!({ "question_chars": question.chars().count(), "mode": mode.as_str() }),
        );
        let raw = match self.searcher.search(question).await {
            Ok(raw) => raw,
            Err(err) => {
                self.log(
                    LogLevel::Error,
                    "verification.search.failed",
                    json!({ "error": err.to_string() }),
                );
                return Err(err.into());
            }
        };
        self.log(
            LogLevel::Debug,
            "verification.search.complete",
            json!({ "records": raw.len() }),
        );

        let EvidenceSet { claims, citations } = self.builder.build(&raw);
        let score = reliability::score(&claims, &citations);
        let can_execute = reliability::execution_permitted(score, mode == VerifyMode::Execute);
        let next_question =
            (mode == VerifyMode::Execute && !can_execute).then(|| CLARIFICATION_PROMPT.to_string());

        let session = Session {
            session_id: Uuid::new_v4().to_string(),
            question: question.to_string(),
            topic: topic
                .filter(|value| !value.is_empty())
                .unwrap_or(DEFAULT_TOPIC)
                .to_string(),
            answer: synthesize_answer(&claims),
            reliability_score: score,
            claims,
            citations,
            can_execute,
            next_question,
            created_at: now(),
        };

        self.log(
            LogLevel::Info,
            "verification.session.scored",
            json!({
                "session_id": session.session_id,
                "claims": session.claims.len(),
                "reliability_score": score,
                "threshold": RELIABILITY_THRESHOLD,
                "can_execute": can_execute,
            }),
        );
        if let Some(tel) = &self.telemetry {
            let _ = tel
                .event(
                    "verification.session.created",
                    json!({
                        "session_id": session.session_id,
                        "topic": session.topic,
                        "reliability_score": score,
                        "can_execute": can_execute,
                    }),
                )
                .await;
        }
        Ok(session)
    }

    fn log(&self, level: LogLevel, message: &str, metadata: serde_json::Value) {
        if let Some(tel) = &self.telemetry {
            let _ = tel.log(level, message, metadata);
        }
    }
}

/// Joins the leading claims into a short answer, or returns [`INSUFFICIENT_EVIDENCE`].
#[must_use]
pub fn synthesize_answer(claims: &[Claim]) -> String {
    let answer = claims
        .iter()
        .take(ANSWER_CLAIMS)
        .map(|claim| truncate_chars(&claim.text, ANSWER_CLAIM_LIMIT))
        .collect::<Vec<_>>()
        .join(" ");
    let answer = answer.trim();
    if answer.is_empty() {
        INSUFFICIENT_EVIDENCE.to_string()
    } else {
        answer.to_string()
    }
}
