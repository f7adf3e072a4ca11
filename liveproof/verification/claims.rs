use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    citation::{Citation, CitationNormalizer, RawRecord},
    session::truncate_chars,
};

/// Claims are generated for at most this many surviving citations.
pub const MAX_CLAIMS: usize = 10;
/// Maximum claim text length in characters.
pub const CLAIM_TEXT_LIMIT: usize = 200;
/// Placeholder confidence attached to every synthesized claim.
pub const PLACEHOLDER_CONFIDENCE: f64 = 0.85;
/// Claim text used when a citation has neither snippet nor title.
pub const NO_SNIPPET: &str = "No snippet";

/// Position of a claim relative to the question.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stance {
    /// Evidence supports the answer.
    Support,
    /// Evidence contradicts the answer.
    Oppose,
    /// No stance assigned.
    #[default]
    Neutral,
}

impl Stance {
    /// Wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Support => "support",
            Self::Oppose => "oppose",
            Self::Neutral => "neutral",
        }
    }
}

/// Short statement derived from one citation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    /// Position-based identifier, `cl-{index}`.
    pub id: String,
    /// Derived text, at most [`CLAIM_TEXT_LIMIT`] characters.
    pub text: String,
    /// Stance tag.
    #[serde(default)]
    pub stance: Stance,
    /// Indices into the owning session's citation list.
    pub citation_ids: Vec<usize>,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
}

/// Deduplicated citations plus the claims synthesized from them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvidenceSet {
    /// Claims in citation order.
    pub claims: Vec<Claim>,
    /// Citations in first-seen order, unique by URL.
    pub citations: Vec<Citation>,
}

/// Deduplicates citations by URL and synthesizes one claim per surviving citation.
#[derive(Debug, Clone, Default)]
pub struct ClaimBuilder {
    normalizer: CitationNormalizer,
}

impl ClaimBuilder {
    /// Creates a builder around a specific normalizer.
    #[must_use]
    pub const fn new(normalizer: CitationNormalizer) -> Self {
        Self { normalizer }
    }

    /// Normalizes and deduplicates `raw`, then builds claims for the first [`MAX_CLAIMS`] citations.
    ///
    /// Records with an empty URL are skipped, and a repeated URL keeps its first occurrence.
    /// Output is a pure function of input order.
    #[must_use]
    pub fn build(&self, raw: &[RawRecord]) -> EvidenceSet {
        let mut by_url: IndexMap<String, Citation> = IndexMap::new();
        for record in raw {
            let citation = self.normalizer.normalize(record);
            if citation.url.is_empty() || by_url.contains_key(&citation.url) {
                continue;
            }
            by_url.insert(citation.url.clone(), citation);
        }
        let citations: Vec<Citation> = by_url.into_values().collect();

        let claims = citations
            .iter()
            .take(MAX_CLAIMS)
            .enumerate()
            .map(|(index, citation)| Claim {
                id: format!("cl-{index}"),
                text: claim_text(citation),
                stance: Stance::Neutral,
                citation_ids: vec![index],
                confidence: PLACEHOLDER_CONFIDENCE,
            })
            .collect();

        EvidenceSet { claims, citations }
    }
}

fn claim_text(citation: &Citation) -> String {
    let snippet = truncate_chars(&citation.snippet, CLAIM_TEXT_LIMIT);
    if !snippet.is_empty() {
        return snippet.to_string();
    }
    if !citation.title.is_empty() {
        return citation.title.clone();
    }
    NO_SNIPPET.to_string()
}

/// Builds claims with the default normalizer.
#[must_use]
pub fn build_claims(raw: &[RawRecord]) -> EvidenceSet {
    ClaimBuilder::default().build(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn records(values: Vec<Value>) -> Vec<RawRecord> {
        values
            .into_iter()
            .map(|value| value.as_object().cloned().unwrap())
            .collect()
    }

    #[test]
    fn empty_input_yields_nothing() {
        let evidence = build_claims(&[]);
        assert!(evidence.claims.is_empty());
        assert!(evidence.citations.is_empty());
    }

    #[test]
    fn dedupes_by_url_keeping_first() {
        let evidence = build_claims(&records(vec![
            json!({"url": "https://a.com", "title": "A", "snippet": "Snippet A"}),
            json!({"url": "https://a.com", "title": "A again", "snippet": "Duplicate"}),
            json!({"url": "https://b.com", "title": "B", "snippet": "Snippet B"}),
        ]));
        let urls: Vec<&str> = evidence.citations.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.com", "https://b.com"]);
        assert_eq!(evidence.claims.len(), 2);
        assert_eq!(evidence.claims[0].citation_ids, vec![0]);
        assert_eq!(evidence.claims[0].text, "Snippet A");
        assert_eq!(evidence.citations[0].title, "A");
    }

    #[test]
    fn skips_empty_url() {
        let evidence = build_claims(&records(vec![
            json!({"url": "", "title": "No URL", "snippet": "x"}),
            json!({"title": "Missing URL"}),
            json!({"url": "https://ok.com", "title": "OK", "snippet": "y"}),
        ]));
        assert_eq!(evidence.citations.len(), 1);
        assert_eq!(evidence.citations[0].url, "https://ok.com");
        assert_eq!(evidence.claims.len(), 1);
        assert_eq!(evidence.claims[0].citation_ids, vec![0]);
    }

    #[test]
    fn claim_shape_uses_placeholders() {
        let evidence = build_claims(&records(vec![
            json!({"url": "https://x.com", "title": "X", "snippet": "Some text here."}),
        ]));
        let claim = &evidence.claims[0];
        assert_eq!(claim.id, "cl-0");
        assert_eq!(claim.text, "Some text here.");
        assert_eq!(claim.stance, Stance::Neutral);
        assert_eq!(claim.citation_ids, vec![0]);
        assert!((claim.confidence - 0.85).abs() < f64::EPSILON);
    }

    #[test]
    fn text_falls_back_to_title_then_marker() {
        let evidence = build_claims(&records(vec![
            json!({"url": "https://t.com", "title": "Only title"}),
            json!({"url": "https://n.com"}),
        ]));
        assert_eq!(evidence.claims[0].text, "Only title");
        assert_eq!(evidence.claims[1].text, NO_SNIPPET);
    }

    #[test]
    fn text_is_truncated_by_characters() {
        let long = "é".repeat(300);
        let evidence = build_claims(&records(vec![json!({"url": "https://l.com", "snippet": long})]));
        assert_eq!(evidence.claims[0].text.chars().count(), CLAIM_TEXT_LIMIT);
    }

    #[test]
    fn claims_capped_but_citations_retained() {
        let raw: Vec<Value> = (0..14)
            .map(|i| json!({"url": format!("https://s{i}.com"), "snippet": format!("s{i}")}))
            .collect();
        let evidence = build_claims(&records(raw));
        assert_eq!(evidence.citations.len(), 14);
        assert_eq!(evidence.claims.len(), MAX_CLAIMS);
        assert_eq!(evidence.claims[9].id, "cl-9");
        assert_eq!(evidence.claims[9].citation_ids, vec![9]);
    }

    #[test]
    fn identical_input_is_deterministic() {
        let raw = records(vec![
            json!({"link": "https://b.com", "name": "B", "body": "b"}),
            json!({"url": "https://a.com", "description": "a"}),
            json!({"url": "https://b.com", "snippet": "dup"}),
        ]);
        assert_eq!(build_claims(&raw), build_claims(&raw));
    }

    #[test]
    fn citation_ids_resolve_within_session() {
        let raw: Vec<Value> = (0..20)
            .map(|i| json!({"url": format!("https://d{}.com", i % 7), "snippet": "x"}))
            .collect();
        let evidence = build_claims(&records(raw));
        for claim in &evidence.claims {
            for id in &claim.citation_ids {
                assert!(*id < evidence.citations.len());
            }
        }
    }
}
