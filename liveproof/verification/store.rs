use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;

use crate::session::{topic_slug, Session, SessionSummary, TopSource};

/// Errors emitted by result store collaborators.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Request could not be sent or timed out.
    #[error("store transport error: {0}")]
    Transport(String),
    /// Store answered with a non-success status.
    #[error("store returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body (possibly truncated).
        body: String,
    },
    /// Stored document could not be decoded.
    #[error("store document malformed: {0}")]
    Decode(String),
    /// Store is not configured or reachable.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Persistent, authoritative home of verification sessions.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Creates or replaces the session (last write wins).
    async fn upsert(&self, session: &Session) -> Result<(), StoreError>;

    /// Fetches a session by id.
    async fn get_by_id(&self, session_id: &str) -> Result<Option<Session>, StoreError>;

    /// Sessions sharing the topic's slug, newest first.
    async fn list_by_topic(&self, topic: &str) -> Result<Vec<SessionSummary>, StoreError>;

    /// Sources ranked by citing claim count, highest first.
    async fn top_sources(&self, limit: usize) -> Result<Vec<TopSource>, StoreError>;

    /// Short label for telemetry.
    fn name(&self) -> &'static str;
}

/// In-process result store used when no remote store is configured.
#[derive(Debug, Default, Clone)]
pub struct MemoryResultStore {
    sessions: Arc<RwLock<IndexMap<String, Session>>>,
}

impl MemoryResultStore {
    /// Number of stored sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// True when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn upsert(&self, session: &Session) -> Result<(), StoreError> {
        self.sessions
            .write()
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn get_by_id(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.read().get(session_id).cloned())
    }

    async fn list_by_topic(&self, topic: &str) -> Result<Vec<SessionSummary>, StoreError> {
        let slug = topic_slug(topic);
        let mut summaries: Vec<SessionSummary> = self
            .sessions
            .read()
            .values()
            .filter(|session| session.topic_slug() == slug)
            .map(SessionSummary::from)
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }

    async fn top_sources(&self, limit: usize) -> Result<Vec<TopSource>, StoreError> {
        let mut ranked: IndexMap<String, TopSource> = IndexMap::new();
        for session in self.sessions.read().values() {
            for citation in &session.citations {
                ranked
                    .entry(citation.url.clone())
                    .or_insert_with(|| TopSource {
                        url: citation.url.clone(),
                        title: Some(citation.title.clone()).filter(|t| !t.is_empty()),
                        citation_count: 0,
                    });
            }
            for claim in &session.claims {
                for index in &claim.citation_ids {
                    if let Some(citation) = session.citations.get(*index) {
                        if let Some(source) = ranked.get_mut(&citation.url) {
                            source.citation_count += 1;
                        }
                    }
                }
            }
        }
        let mut sources: Vec<TopSource> = ranked.into_values().collect();
        // Stable sort keeps first-seen order among ties.
        sources.sort_by(|a, b| b.citation_count.cmp(&a.citation_count));
        sources.truncate(limit);
        Ok(sources)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Transient, process-local session cache. Best-effort: evicts the oldest insert when full.
#[derive(Debug, Clone)]
pub struct SessionCache {
    capacity: usize,
    inner: Arc<Mutex<CacheInner>>,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<String, Session>,
    order: VecDeque<String>,
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new(1_024)
    }
}

impl SessionCache {
    /// Creates a cache holding at most `capacity` sessions.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Arc::new(Mutex::new(CacheInner::default())),
        }
    }

    /// Inserts or replaces a session.
    pub fn insert(&self, session: Session) {
        let mut inner = self.inner.lock();
        let id = session.session_id.clone();
        if inner.entries.insert(id.clone(), session).is_none() {
            inner.order.push_back(id);
        }
        while inner.entries.len() > self.capacity {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            inner.entries.remove(&oldest);
        }
    }

    /// Looks up a session.
    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<Session> {
        self.inner.lock().entries.get(session_id).cloned()
    }

    /// Number of cached sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// True when the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }
}
