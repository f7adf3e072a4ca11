use std::{fmt, str::FromStr};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;

use crate::{
    report::ReportDocument,
    session::{truncate_chars, Session},
    telemetry::VerificationTelemetry,
};

/// Safety note attached to every artifact.
pub const IN_MEMORY_NOTE: &str =
    "All artifacts generated in-memory; no shell or file system execution.";
/// Safety note appended when the requested action is not recognized.
pub const UNKNOWN_ACTION_NOTE: &str = "Unknown action_type.";
/// Title rendered at the top of report documents.
pub const REPORT_TITLE: &str = "LiveProof AI - Verification Report";

const SNIPPET_QUESTION_LIMIT: usize = 80;
const SNIPPET_ANSWER_LIMIT: usize = 500;
const CONFIG_QUESTION_LIMIT: usize = 200;
const CONFIG_ANSWER_LIMIT: usize = 300;

/// Artifact generation requests accepted at the service boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Source-code scaffolding.
    #[serde(alias = "code_snippet")]
    SourceSnippet,
    /// Base64-encoded PDF report.
    #[serde(alias = "pdf_report")]
    ReportDocument,
    /// Key-value configuration text.
    #[serde(alias = "config")]
    ConfigBlock,
}

impl ActionKind {
    /// Wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SourceSnippet => "source_snippet",
            Self::ReportDocument => "report_document",
            Self::ConfigBlock => "config_block",
        }
    }

    /// Kind of artifact produced by the action.
    #[must_use]
    pub const fn artifact_kind(self) -> ArtifactKind {
        match self {
            Self::SourceSnippet => ArtifactKind::SourceSnippet,
            Self::ReportDocument => ArtifactKind::ReportDocument,
            Self::ConfigBlock => ArtifactKind::ConfigBlock,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unrecognized action label.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("action_type must be one of source_snippet, report_document, config_block; got '{0}'")]
pub struct UnknownAction(pub String);

impl FromStr for ActionKind {
    type Err = UnknownAction;

    /// Accepts the canonical labels and the legacy `code_snippet`, `pdf_report`, `config`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "source_snippet" | "code_snippet" => Ok(Self::SourceSnippet),
            "report_document" | "pdf_report" => Ok(Self::ReportDocument),
            "config_block" | "config" => Ok(Self::ConfigBlock),
            other => Err(UnknownAction(other.to_string())),
        }
    }
}

/// Kind of generated artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Source text.
    SourceSnippet,
    /// Base64 of a PDF document.
    ReportDocument,
    /// Configuration text.
    ConfigBlock,
}

/// Transient output of the dispatcher; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Text content, or base64 for report documents.
    pub content: String,
    /// Artifact kind.
    pub kind: ArtifactKind,
    /// Diagnostic log lines.
    pub logs: Vec<String>,
    /// Safety notes.
    pub safety_notes: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ConfigBlock<'a> {
    topic: &'a str,
    question: &'a str,
    reliability_score: f64,
    answer_preview: &'a str,
    generated_at: String,
}

/// Turns a verified session into an artifact.
///
/// The caller guarantees the session exists and its gate is open; nothing is re-checked here.
#[derive(Debug, Clone, Default)]
pub struct ExecuteDispatcher {
    telemetry: Option<VerificationTelemetry>,
}

impl ExecuteDispatcher {
    /// Creates a dispatcher without telemetry.
    #[must_use]
    pub const fn new() -> Self {
        Self { telemetry: None }
    }

    /// Attaches telemetry sinks.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: VerificationTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Dispatches a raw action label. Unknown labels yield an empty config artifact.
    #[must_use]
    pub fn execute(&self, session: &Session, action: &str) -> Artifact {
        match action.parse::<ActionKind>() {
            Ok(kind) => self.execute_kind(session, kind),
            Err(_) => {
                if let Some(tel) = &self.telemetry {
                    let _ = tel.log(
                        LogLevel::Warn,
                        "execute.action.unknown",
                        json!({ "session_id": session.session_id, "action": action }),
                    );
                }
                Artifact {
                    content: String::new(),
                    kind: ArtifactKind::ConfigBlock,
                    logs: Vec::new(),
                    safety_notes: vec![IN_MEMORY_NOTE.to_string(), UNKNOWN_ACTION_NOTE.to_string()],
                }
            }
        }
    }

    /// Dispatches a validated action.
    #[must_use]
    pub fn execute_kind(&self, session: &Session, kind: ActionKind) -> Artifact {
        let generated_at = Utc::now();
        let (content, log) = match kind {
            ActionKind::SourceSnippet => (
                source_snippet(session, generated_at),
                "Generating source snippet from verified context.",
            ),
            ActionKind::ReportDocument => (report_document(session), "Generating PDF report."),
            ActionKind::ConfigBlock => (
                config_block(session, generated_at),
                "Generating config block.",
            ),
        };
        if let Some(tel) = &self.telemetry {
            let _ = tel.log(
                LogLevel::Info,
                "execute.artifact.generated",
                json!({
                    "session_id": session.session_id,
                    "action": kind.as_str(),
                    "bytes": content.len(),
                }),
            );
        }
        Artifact {
            content,
            kind: kind.artifact_kind(),
            logs: vec![log.to_string()],
            safety_notes: vec![IN_MEMORY_NOTE.to_string()],
        }
    }
}

fn source_snippet(session: &Session, generated_at: DateTime<Utc>) -> String {
    let mut out = format!(
        "// Verified context: {}\n// Q: {}...\n// Generated: {}\n\n",
        single_line(&session.topic),
        single_line(truncate_chars(&session.question, SNIPPET_QUESTION_LIMIT)),
        generated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
    );
    for line in truncate_chars(&session.answer, SNIPPET_ANSWER_LIMIT).lines() {
        if line.is_empty() {
            out.push_str("//!\n");
        } else {
            out.push_str("//! ");
            out.push_str(&single_line(line));
            out.push('\n');
        }
    }
    out.push_str("\nfn main() {\n    // Implement based on verified evidence above\n}\n");
    out
}

fn report_document(session: &Session) -> String {
    let document = ReportDocument {
        title: REPORT_TITLE.to_string(),
        topic: session.topic.clone(),
        question: session.question.clone(),
        answer: session.answer.clone(),
        reliability_score: session.reliability_score,
    };
    STANDARD.encode(document.render_pdf())
}

fn config_block(session: &Session, generated_at: DateTime<Utc>) -> String {
    let block = ConfigBlock {
        topic: &session.topic,
        question: truncate_chars(&session.question, CONFIG_QUESTION_LIMIT),
        reliability_score: session.reliability_score,
        answer_preview: truncate_chars(&session.answer, CONFIG_ANSWER_LIMIT),
        generated_at: generated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
    };
    let body = toml::to_string(&block).unwrap_or_default();
    format!(
        "# LiveProof AI - config for topic: {}\n{body}",
        single_line(&session.topic)
    )
}

/// Control characters (newlines included) become spaces so text stays inside one comment line.
fn single_line(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}
