//! Sanity document store: sessions, claims, sources and topics as linked documents.

use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use reqwest::Client;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::{
    citation::Citation,
    claims::{Claim, Stance, PLACEHOLDER_CONFIDENCE},
    config::StoreSettings,
    session::{timestamp, topic_slug, Session, SessionSummary, TopSource},
    store::{ResultStore, StoreError},
};

const SESSION_QUERY: &str = r#"*[_type == "session" && _id == $id][0]{
    _id, question, answer, reliabilityScore, canExecute, nextQuestion, createdAt,
    "topic": topic->title,
    citations[]->{ _id, url, title, snippet, sourceName, publishedAt },
    claims[]->{ _id, claimId, text, stance, confidence, "sources": sources[]._ref }
}"#;

const TOPIC_QUERY: &str = r#"*[_type == "session" && topic->slug == $slug] | order(createdAt desc) {
    _id, question, answer, reliabilityScore, createdAt,
    "claims_count": count(claims)
}"#;

const TOP_SOURCES_QUERY: &str = r#"*[_type == "source"] {
    url, title,
    "citation_count": count(*[_type == "claim" && references(^._id)])
} | order(citation_count desc) [0...$limit] { url, title, citation_count }"#;

/// Document id of a source: `source-` plus the first 16 hex digits of the URL's SHA-256.
#[must_use]
pub fn source_document_id(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    format!("source-{}", &hex::encode(digest)[..16])
}

/// Document id of a topic.
#[must_use]
pub fn topic_document_id(topic: &str) -> String {
    format!("topic-{}", topic_slug(topic))
}

fn reference(id: &str) -> Value {
    json!({ "_type": "reference", "_ref": id })
}

/// `createOrReplace` mutations persisting a session and its linked documents.
#[must_use]
pub fn session_mutations(session: &Session) -> Vec<Value> {
    let topic_id = topic_document_id(&session.topic);
    let mut mutations = vec![json!({
        "createOrReplace": {
            "_id": topic_id,
            "_type": "topic",
            "slug": session.topic_slug(),
            "title": session.topic,
        }
    })];

    let mut source_ids: Vec<Option<String>> = Vec::with_capacity(session.citations.len());
    for citation in &session.citations {
        if citation.url.is_empty() {
            source_ids.push(None);
            continue;
        }
        let id = source_document_id(&citation.url);
        mutations.push(json!({
            "createOrReplace": {
                "_id": id,
                "_type": "source",
                "url": citation.url,
                "title": citation.title,
                "snippet": citation.snippet,
                "sourceName": citation.source_name,
                "publishedAt": citation.published_at,
            }
        }));
        source_ids.push(Some(id));
    }

    let mut claim_refs = Vec::with_capacity(session.claims.len());
    for (index, claim) in session.claims.iter().enumerate() {
        let claim_doc_id = format!("claim-{}-{index}", session.session_id);
        let sources: Vec<Value> = claim
            .citation_ids
            .iter()
            .filter_map(|cid| source_ids.get(*cid).and_then(Option::as_deref))
            .map(reference)
            .collect();
        mutations.push(json!({
            "createOrReplace": {
                "_id": claim_doc_id,
                "_type": "claim",
                "claimId": claim.id,
                "session": reference(&session.session_id),
                "topic": reference(&topic_id),
                "text": claim.text,
                "stance": claim.stance.as_str(),
                "confidence": claim.confidence,
                "sources": sources,
            }
        }));
        claim_refs.push(reference(&claim_doc_id));
    }

    let citation_refs: Vec<Value> = source_ids
        .iter()
        .filter_map(Option::as_deref)
        .map(reference)
        .collect();
    mutations.push(json!({
        "createOrReplace": {
            "_id": session.session_id,
            "_type": "session",
            "topic": reference(&topic_id),
            "question": session.question,
            "answer": session.answer,
            "reliabilityScore": session.reliability_score,
            "canExecute": session.can_execute,
            "nextQuestion": session.next_question,
            "claims": claim_refs,
            "citations": citation_refs,
            "createdAt": session.created_at_text(),
        }
    }));
    mutations
}

fn text(node: &Value, key: &str) -> String {
    node.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn optional_text(node: &Value, key: &str) -> Option<String> {
    node.get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn parse_created_at(node: &Value) -> Result<chrono::DateTime<chrono::Utc>, StoreError> {
    let raw = text(node, "createdAt");
    timestamp::parse(&raw).map_err(|err| StoreError::Decode(format!("createdAt '{raw}': {err}")))
}

fn parse_stance(raw: &str) -> Stance {
    match raw {
        "support" => Stance::Support,
        "oppose" => Stance::Oppose,
        _ => Stance::Neutral,
    }
}

/// Rebuilds a [`Session`] from a hydrated session document.
///
/// Source references on claims are mapped back to indices into the session's citation list.
pub fn hydrate_session(document: &Value) -> Result<Option<Session>, StoreError> {
    if document.is_null() {
        return Ok(None);
    }
    let Some(session_id) = optional_text(document, "_id") else {
        return Ok(None);
    };

    let mut citations: IndexMap<String, Citation> = IndexMap::new();
    for node in document
        .get("citations")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        if let Some(id) = optional_text(node, "_id") {
            citations.entry(id).or_insert_with(|| Citation {
                title: text(node, "title"),
                url: text(node, "url"),
                snippet: text(node, "snippet"),
                published_at: optional_text(node, "publishedAt"),
                source_name: optional_text(node, "sourceName"),
            });
        }
    }

    let mut claims = Vec::new();
    for (position, node) in document
        .get("claims")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .enumerate()
    {
        let citation_ids = node
            .get("sources")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .filter_map(|source_ref| citations.get_index_of(source_ref))
            .collect();
        claims.push(Claim {
            id: optional_text(node, "claimId").unwrap_or_else(|| format!("cl-{position}")),
            text: text(node, "text"),
            stance: parse_stance(&text(node, "stance")),
            citation_ids,
            confidence: node
                .get("confidence")
                .and_then(Value::as_f64)
                .unwrap_or(PLACEHOLDER_CONFIDENCE),
        });
    }

    Ok(Some(Session {
        session_id,
        question: text(document, "question"),
        topic: optional_text(document, "topic").unwrap_or_else(|| crate::session::DEFAULT_TOPIC.into()),
        answer: text(document, "answer"),
        reliability_score: document
            .get("reliabilityScore")
            .and_then(Value::as_f64)
            .unwrap_or_default(),
        claims,
        citations: citations.into_values().collect(),
        can_execute: document
            .get("canExecute")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        next_question: optional_text(document, "nextQuestion"),
        created_at: parse_created_at(document)?,
    }))
}

fn rows(result: Value) -> Vec<Value> {
    match result {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

/// [`ResultStore`] backed by the Sanity HTTP API.
#[derive(Debug, Clone)]
pub struct SanityStore {
    client: Client,
    base_url: String,
    dataset: String,
    token: String,
}

impl SanityStore {
    /// Builds a store from settings; requires project id and token.
    pub fn new(settings: &StoreSettings) -> Result<Self, StoreError> {
        let (Some(project), Some(token)) = (settings.project_id.as_deref(), settings.token.as_deref())
        else {
            return Err(StoreError::Unavailable(
                "project id and token are required".into(),
            ));
        };
        let client = Client::builder()
            .user_agent("liveproof-verification/0.1")
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()
            .map_err(|err| StoreError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            base_url: format!("https://{project}.api.sanity.io/{}", settings.api_version),
            dataset: settings.dataset.clone(),
            token: token.to_string(),
        })
    }

    async fn mutate(&self, mutations: Vec<Value>) -> Result<(), StoreError> {
        let url = format!("{}/data/mutate/{}", self.base_url, self.dataset);
        tracing::debug!(%url, count = mutations.len(), "store mutate");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&json!({ "mutations": mutations }))
            .send()
            .await
            .map_err(|err| StoreError::Transport(err.to_string()))?;
        Self::check(response).await.map(|_| ())
    }

    async fn query(&self, groq: &str, params: &[(&str, Value)]) -> Result<Value, StoreError> {
        let url = format!("{}/data/query/{}", self.base_url, self.dataset);
        let mut pairs = vec![("query".to_string(), groq.to_string())];
        for (name, value) in params {
            pairs.push((format!("${name}"), value.to_string()));
        }
        tracing::debug!(%url, "store query");
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(&pairs)
            .send()
            .await
            .map_err(|err| StoreError::Transport(err.to_string()))?;
        let mut body = Self::check(response).await?;
        Ok(body.get_mut("result").map(Value::take).unwrap_or(Value::Null))
    }

    async fn check(response: reqwest::Response) -> Result<Value, StoreError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body: body.chars().take(512).collect(),
            });
        }
        response
            .json::<Value>()
            .await
            .map_err(|err| StoreError::Decode(err.to_string()))
    }
}

#[async_trait]
impl ResultStore for SanityStore {
    async fn upsert(&self, session: &Session) -> Result<(), StoreError> {
        self.mutate(session_mutations(session)).await
    }

    async fn get_by_id(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        let result = self.query(SESSION_QUERY, &[("id", json!(session_id))]).await?;
        hydrate_session(&result)
    }

    async fn list_by_topic(&self, topic: &str) -> Result<Vec<SessionSummary>, StoreError> {
        let result = self
            .query(TOPIC_QUERY, &[("slug", json!(topic_slug(topic)))])
            .await?;
        rows(result)
            .iter()
            .map(|row| -> Result<SessionSummary, StoreError> {
                Ok(SessionSummary {
                    session_id: text(row, "_id"),
                    question: text(row, "question"),
                    answer: text(row, "answer"),
                    reliability_score: row
                        .get("reliabilityScore")
                        .and_then(Value::as_f64)
                        .unwrap_or_default(),
                    created_at: parse_created_at(row)?,
                    claims_count: row
                        .get("claims_count")
                        .and_then(Value::as_u64)
                        .and_then(|count| usize::try_from(count).ok())
                        .unwrap_or_default(),
                })
            })
            .collect()
    }

    async fn top_sources(&self, limit: usize) -> Result<Vec<TopSource>, StoreError> {
        let result = self.query(TOP_SOURCES_QUERY, &[("limit", json!(limit))]).await?;
        Ok(rows(result)
            .iter()
            .map(|row| TopSource {
                url: text(row, "url"),
                title: optional_text(row, "title"),
                citation_count: row
                    .get("citation_count")
                    .and_then(Value::as_u64)
                    .and_then(|count| usize::try_from(count).ok())
                    .unwrap_or_default(),
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "sanity"
    }
}
