use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw search-provider record. Field names vary between provider response shapes.
pub type RawRecord = serde_json::Map<String, Value>;

/// Canonical evidence source. The URL is the deduplication identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// Page title.
    #[serde(default)]
    pub title: String,
    /// Source URL.
    #[serde(default)]
    pub url: String,
    /// Provider snippet.
    #[serde(default)]
    pub snippet: String,
    /// Publication date as reported by the provider.
    #[serde(default)]
    pub published_at: Option<String>,
    /// Publisher or site name.
    #[serde(default)]
    pub source_name: Option<String>,
}

impl Citation {
    /// Creates a citation with the required fields.
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        snippet: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            snippet: snippet.into(),
            published_at: None,
            source_name: None,
        }
    }
}

/// Citation attribute populated by a [`FieldRule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CitationField {
    /// `Citation::title`.
    Title,
    /// `Citation::url`.
    Url,
    /// `Citation::snippet`.
    Snippet,
    /// `Citation::published_at`.
    PublishedAt,
    /// `Citation::source_name`.
    SourceName,
}

/// Ordered alias list for one citation attribute. The first non-empty alias wins.
#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    /// Attribute being resolved.
    pub target: CitationField,
    /// Raw field names in priority order.
    pub aliases: &'static [&'static str],
}

impl FieldRule {
    /// Resolves the rule against a raw record.
    #[must_use]
    pub fn resolve(&self, raw: &RawRecord) -> Option<String> {
        self.aliases
            .iter()
            .find_map(|alias| raw.get(*alias).and_then(non_empty_text))
    }
}

/// Alias table covering the provider shapes seen in practice.
pub const DEFAULT_FIELD_RULES: &[FieldRule] = &[
    FieldRule {
        target: CitationField::Title,
        aliases: &["title", "name"],
    },
    FieldRule {
        target: CitationField::Url,
        aliases: &["url", "link"],
    },
    FieldRule {
        target: CitationField::Snippet,
        aliases: &["snippet", "description", "body"],
    },
    FieldRule {
        target: CitationField::PublishedAt,
        aliases: &["published_at", "date"],
    },
    FieldRule {
        target: CitationField::SourceName,
        aliases: &["source", "source_name"],
    },
];

fn non_empty_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Maps heterogeneous raw records into [`Citation`]s. Never fails; missing fields default.
#[derive(Debug, Clone)]
pub struct CitationNormalizer {
    rules: Vec<FieldRule>,
}

impl Default for CitationNormalizer {
    fn default() -> Self {
        Self::with_rules(DEFAULT_FIELD_RULES.to_vec())
    }
}

impl CitationNormalizer {
    /// Creates a normalizer from a custom rule table.
    #[must_use]
    pub fn with_rules(rules: Vec<FieldRule>) -> Self {
        Self { rules }
    }

    /// Active rule table.
    #[must_use]
    pub fn rules(&self) -> &[FieldRule] {
        &self.rules
    }

    /// Normalizes one raw record.
    #[must_use]
    pub fn normalize(&self, raw: &RawRecord) -> Citation {
        let mut citation = Citation::new("", "", "");
        for rule in &self.rules {
            let Some(value) = rule.resolve(raw) else {
                continue;
            };
            match rule.target {
                CitationField::Title if citation.title.is_empty() => citation.title = value,
                CitationField::Url if citation.url.is_empty() => citation.url = value,
                CitationField::Snippet if citation.snippet.is_empty() => citation.snippet = value,
                CitationField::PublishedAt if citation.published_at.is_none() => {
                    citation.published_at = Some(value);
                }
                CitationField::SourceName if citation.source_name.is_none() => {
                    citation.source_name = Some(value);
                }
                _ => {}
            }
        }
        citation
    }
}

/// Normalizes a record with the default alias table.
#[must_use]
pub fn normalize(raw: &RawRecord) -> Citation {
    CitationNormalizer::default().normalize(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> RawRecord {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn maps_primary_field_names() {
        let citation = normalize(&record(json!({
            "title": "My Title",
            "url": "https://example.com",
            "snippet": "A snippet.",
            "published_at": "2024-01-01",
            "source": "Example",
        })));
        assert_eq!(citation.title, "My Title");
        assert_eq!(citation.url, "https://example.com");
        assert_eq!(citation.snippet, "A snippet.");
        assert_eq!(citation.published_at.as_deref(), Some("2024-01-01"));
        assert_eq!(citation.source_name.as_deref(), Some("Example"));
    }

    #[test]
    fn maps_alternate_field_names() {
        let citation = normalize(&record(json!({
            "name": "Name",
            "link": "https://link.com",
            "description": "Desc",
            "date": "2023-01-01",
            "source_name": "Site",
        })));
        assert_eq!(citation.title, "Name");
        assert_eq!(citation.url, "https://link.com");
        assert_eq!(citation.snippet, "Desc");
        assert_eq!(citation.published_at.as_deref(), Some("2023-01-01"));
        assert_eq!(citation.source_name.as_deref(), Some("Site"));
    }

    #[test]
    fn empty_alias_falls_through_to_next() {
        let citation = normalize(&record(json!({
            "title": "",
            "name": "Fallback",
            "snippet": "",
            "description": null,
            "body": "Body text",
        })));
        assert_eq!(citation.title, "Fallback");
        assert_eq!(citation.snippet, "Body text");
    }

    #[test]
    fn missing_fields_default() {
        let citation = normalize(&RawRecord::new());
        assert_eq!(citation, Citation::new("", "", ""));
        assert!(citation.published_at.is_none());
        assert!(citation.source_name.is_none());
    }

    #[test]
    fn custom_rules_are_honoured() {
        let normalizer = CitationNormalizer::with_rules(vec![FieldRule {
            target: CitationField::Url,
            aliases: &["href"],
        }]);
        let citation = normalizer.normalize(&record(json!({ "href": "https://h.io", "url": "x" })));
        assert_eq!(citation.url, "https://h.io");
        assert!(citation.title.is_empty());
    }

    #[test]
    fn default_rules_cover_every_field_once() {
        let normalizer = CitationNormalizer::default();
        let targets: Vec<CitationField> =
            normalizer.rules().iter().map(|rule| rule.target).collect();
        assert_eq!(
            targets,
            vec![
                CitationField::Title,
                CitationField::Url,
                CitationField::Snippet,
                CitationField::PublishedAt,
                CitationField::SourceName,
            ]
        );
        assert_eq!(normalizer.rules()[1].aliases, &["url", "link"]);
    }
}
