use std::{fmt, str::FromStr};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::{citation::Citation, claims::Claim};

/// Topic assigned when a request names none.
pub const DEFAULT_TOPIC: &str = "general";
/// Maximum topic slug length in characters.
pub const TOPIC_SLUG_LIMIT: usize = 50;

/// Requested verification intent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifyMode {
    /// Answer only; execution is never unlocked.
    #[default]
    Answer,
    /// Answer and request execution capability.
    Execute,
}

impl VerifyMode {
    /// Wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Answer => "answer",
            Self::Execute => "execute",
        }
    }
}

impl fmt::Display for VerifyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unrecognized mode label.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("mode must be 'answer' or 'execute', got '{0}'")]
pub struct UnknownMode(pub String);

impl FromStr for VerifyMode {
    type Err = UnknownMode;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "answer" => Ok(Self::Answer),
            "execute" => Ok(Self::Execute),
            other => Err(UnknownMode(other.to_string())),
        }
    }
}

/// Immutable record of one verification request and its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Globally unique id.
    pub session_id: String,
    /// Question as asked.
    pub question: String,
    /// Topic label, [`DEFAULT_TOPIC`] when none was given.
    pub topic: String,
    /// Answer synthesized from the leading claims.
    pub answer: String,
    /// Reliability score in `[0, 1]`.
    pub reliability_score: f64,
    /// Claims in citation order.
    pub claims: Vec<Claim>,
    /// Deduplicated citations.
    pub citations: Vec<Citation>,
    /// Execution gate.
    pub can_execute: bool,
    /// Clarification prompt when execution was requested but refused.
    #[serde(default)]
    pub next_question: Option<String>,
    /// Creation time (UTC).
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Slug identifying the session's topic in the result store.
    #[must_use]
    pub fn topic_slug(&self) -> String {
        topic_slug(&self.topic)
    }

    /// Creation time in the textual form used on the wire.
    #[must_use]
    pub fn created_at_text(&self) -> String {
        timestamp::format(&self.created_at)
    }
}

/// Compact session view used for topic comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Session id.
    pub session_id: String,
    /// Question.
    pub question: String,
    /// Answer.
    pub answer: String,
    /// Reliability score.
    pub reliability_score: f64,
    /// Creation time.
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    /// Number of claims.
    pub claims_count: usize,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.session_id.clone(),
            question: session.question.clone(),
            answer: session.answer.clone(),
            reliability_score: session.reliability_score,
            created_at: session.created_at,
            claims_count: session.claims.len(),
        }
    }
}

/// Source ranked by how many claims cite it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopSource {
    /// Source URL.
    pub url: String,
    /// Source title, if known.
    #[serde(default)]
    pub title: Option<String>,
    /// Number of stored claims referencing the source.
    pub citation_count: usize,
}

/// Derives the store identity of a topic: spaces hyphenated, lower-cased, first 50 characters.
#[must_use]
pub fn topic_slug(topic: &str) -> String {
    topic
        .replace(' ', "-")
        .to_lowercase()
        .chars()
        .take(TOPIC_SLUG_LIMIT)
        .collect()
}

/// Returns the first `limit` characters of `text` without splitting a code point.
#[must_use]
pub fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// RFC3339 with microseconds and a `Z` suffix.
pub mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    /// Formats a timestamp.
    #[must_use]
    pub fn format(value: &DateTime<Utc>) -> String {
        value.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    /// Parses any RFC3339 timestamp into UTC.
    pub fn parse(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        DateTime::parse_from_rfc3339(value).map(|parsed| parsed.with_timezone(&Utc))
    }

    /// Serde serializer.
    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(value))
    }

    /// Serde deserializer.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Current time truncated to the precision kept on the wire.
#[must_use]
pub fn now() -> DateTime<Utc> {
    let text = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
    timestamp::parse(&text).unwrap_or_else(|_| Utc::now())
}
