//! Vector note store
//!
//! [`NoteStore`] holds the domain contracts (idempotent upsert, explicit
//! access reinforcement, provenance history) above a pluggable
//! [`NoteBackend`]. When the configured backend is unreachable at
//! initialization the store runs disabled: every call becomes a no-op or an
//! empty result so the other memory layers keep working.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::embedding::cosine_similarity;
use crate::error::{EngramError, Result};
use crate::memory::types::{DEFAULT_DECAY_RATE, Note, Section, SourceRecord, note_id};
use crate::store::BackendStatus;

/// Pluggable vector-indexed note storage.
///
/// Backends provide row storage and candidate retrieval; ranking and all
/// domain rules live in [`NoteStore`].
#[async_trait]
pub trait NoteBackend: Send + Sync {
    /// Insert a new note row
    async fn insert(&self, note: &Note) -> Result<()>;

    /// Replace an existing row keyed by `note.id`; false when absent
    async fn replace(&self, note: &Note) -> Result<bool>;

    /// Fetch a note by id
    async fn get(&self, id: &str) -> Result<Option<Note>>;

    /// Delete a note by id; false when absent
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Nearest-neighbor candidates for an embedding, optionally restricted
    /// to one section. Notes without embeddings are not candidates.
    async fn search(
        &self,
        embedding: &[f32],
        section: Option<Section>,
        limit: usize,
    ) -> Result<Vec<Note>>;

    /// All live notes, for maintenance scans
    async fn list(&self) -> Result<Vec<Note>>;

    /// Number of live notes
    async fn count(&self) -> Result<usize>;
}

/// Fields supplied when upserting a note. The id is derived from the
/// content hash, so identical content always lands on the same row.
#[derive(Debug, Clone)]
pub struct NoteDraft {
    /// Note content
    pub content: String,
    /// Section to file the note under
    pub section: Section,
    /// Embedding, when the caller has one
    pub embedding: Option<Vec<f32>>,
    /// Importance in [0, 1]
    pub importance: f32,
    /// Per-day decay rate
    pub decay_rate: f32,
    /// Provenance of this write
    pub source: Option<SourceRecord>,
    /// Free-form metadata merged into the stored note
    pub metadata: BTreeMap<String, String>,
}

impl NoteDraft {
    /// Create a draft with default importance and decay rate
    pub fn new(content: impl Into<String>, section: Section) -> Self {
        Self {
            content: content.into(),
            section,
            embedding: None,
            importance: 0.5,
            decay_rate: DEFAULT_DECAY_RATE,
            source: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Set the embedding
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Set the importance (clamped on write)
    pub fn with_importance(mut self, importance: f32) -> Self {
        self.importance = importance;
        self
    }

    /// Set the decay rate
    pub fn with_decay_rate(mut self, decay_rate: f32) -> Self {
        self.decay_rate = decay_rate;
        self
    }

    /// Set the provenance record
    pub fn with_source(mut self, source: SourceRecord) -> Self {
        self.source = Some(source);
        self
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The id this draft will be stored under
    pub fn id(&self) -> String {
        note_id(&self.content)
    }
}

/// A search hit with its similarity to the query.
#[derive(Debug, Clone)]
pub struct ScoredNote {
    /// The matched note
    pub note: Note,
    /// Cosine similarity to the query embedding
    pub similarity: f32,
}

/// Persistent notes with embeddings, importance, and provenance history.
pub struct NoteStore {
    backend: Option<Arc<dyn NoteBackend>>,
}

impl NoteStore {
    /// Create a store over a live backend
    pub fn new(backend: Arc<dyn NoteBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// Create a disabled store whose calls are no-ops
    pub fn disabled() -> Self {
        tracing::warn!("Vector note store running disabled; note calls will be no-ops");
        Self { backend: None }
    }

    /// Connectivity status for the health surface
    pub fn status(&self) -> BackendStatus {
        if self.backend.is_some() {
            BackendStatus::Connected
        } else {
            BackendStatus::Unavailable
        }
    }

    /// Idempotent write keyed by the content hash.
    ///
    /// Creating a note stores the draft as given. Re-upserting an existing
    /// id rewrites the tunable fields (section, embedding, importance,
    /// decay rate, metadata) but preserves creation time, access stats, and
    /// provenance history; a new source is appended to the history only
    /// when it differs from the latest entry. Identical arguments therefore
    /// leave stored state unchanged except `updated_at`.
    ///
    /// Returns the stored note, or `None` when the layer is disabled.
    pub async fn upsert(&self, draft: NoteDraft) -> Result<Option<Note>> {
        let Some(backend) = &self.backend else {
            return Ok(None);
        };

        let id = draft.id();
        let now = Utc::now();

        let stored = match backend.get(&id).await? {
            Some(mut existing) => {
                existing.section = draft.section;
                if let Some(embedding) = draft.embedding {
                    existing.embedding = Some(embedding);
                }
                existing.set_importance(draft.importance);
                existing.decay_rate = draft.decay_rate;
                existing.metadata.extend(draft.metadata);
                if let Some(source) = draft.source {
                    if existing.source_history.last() != Some(&source) {
                        existing.source_history.push(source.clone());
                    }
                    existing.source = Some(source);
                }
                existing.updated_at = now;
                backend.replace(&existing).await?;
                existing
            }
            None => {
                let mut note = Note::new(draft.content, draft.section);
                note.embedding = draft.embedding;
                note.set_importance(draft.importance);
                note.decay_rate = draft.decay_rate;
                note.metadata = draft.metadata;
                if let Some(source) = draft.source {
                    note.source_history.push(source.clone());
                    note.source = Some(source);
                }
                backend.insert(&note).await?;
                note
            }
        };

        Ok(Some(stored))
    }

    /// Fetch a note by id; `None` when absent or the layer is disabled
    pub async fn get(&self, id: &str) -> Result<Option<Note>> {
        match &self.backend {
            Some(backend) => backend.get(id).await,
            None => Ok(None),
        }
    }

    /// Remove a note by id; false when absent or the layer is disabled
    pub async fn delete(&self, id: &str) -> Result<bool> {
        match &self.backend {
            Some(backend) => backend.delete(id).await,
            None => Ok(false),
        }
    }

    /// Rank notes by cosine similarity to the query embedding, descending;
    /// ties break by `updated_at`, newer first. Read-only: access stats are
    /// only touched by [`NoteStore::increment_access`].
    pub async fn search_similar(
        &self,
        query_embedding: &[f32],
        limit: usize,
        section: Option<Section>,
    ) -> Result<Vec<ScoredNote>> {
        let Some(backend) = &self.backend else {
            return Ok(Vec::new());
        };
        if limit == 0 {
            return Ok(Vec::new());
        }

        let candidates = backend.search(query_embedding, section, limit).await?;

        let mut scored: Vec<ScoredNote> = candidates
            .into_iter()
            .map(|note| {
                let similarity = note
                    .embedding
                    .as_deref()
                    .map(|e| cosine_similarity(query_embedding, e))
                    .unwrap_or(0.0);
                ScoredNote { note, similarity }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| b.note.updated_at.cmp(&a.note.updated_at))
        });
        scored.truncate(limit);

        Ok(scored)
    }

    /// Record one actual use of a note: bump `access_count`, stamp
    /// `last_accessed`. Unknown ids signal [`EngramError::NoteNotFound`].
    pub async fn increment_access(&self, id: &str) -> Result<()> {
        let Some(backend) = &self.backend else {
            return Ok(());
        };

        let mut note = backend.get(id).await?.ok_or_else(|| {
            EngramError::NoteNotFound { id: id.to_string() }
        })?;
        note.mark_accessed();
        backend.replace(&note).await?;
        Ok(())
    }

    /// Append a provenance entry and optionally boost importance (clamped).
    /// Unknown ids signal [`EngramError::NoteNotFound`].
    pub async fn append_source_history(
        &self,
        id: &str,
        source: SourceRecord,
        boost: Option<f32>,
    ) -> Result<()> {
        let Some(backend) = &self.backend else {
            return Ok(());
        };

        let mut note = backend.get(id).await?.ok_or_else(|| {
            EngramError::NoteNotFound { id: id.to_string() }
        })?;
        note.source_history.push(source.clone());
        note.source = Some(source);
        if let Some(boost) = boost {
            note.apply_boost(boost);
        }
        note.updated_at = Utc::now();
        backend.replace(&note).await?;
        Ok(())
    }

    /// Persist a new importance value (clamped). Unknown ids signal
    /// [`EngramError::NoteNotFound`].
    pub async fn set_importance(&self, id: &str, importance: f32) -> Result<()> {
        let Some(backend) = &self.backend else {
            return Ok(());
        };

        let mut note = backend.get(id).await?.ok_or_else(|| {
            EngramError::NoteNotFound { id: id.to_string() }
        })?;
        note.set_importance(importance);
        note.updated_at = Utc::now();
        backend.replace(&note).await?;
        Ok(())
    }

    /// Notes not accessed for at least `days_threshold` days
    pub async fn get_stale_notes(&self, days_threshold: i64) -> Result<Vec<Note>> {
        let Some(backend) = &self.backend else {
            return Ok(Vec::new());
        };

        let cutoff = Utc::now() - Duration::days(days_threshold);
        let mut stale: Vec<Note> = backend
            .list()
            .await?
            .into_iter()
            .filter(|n| n.last_accessed <= cutoff)
            .collect();
        stale.sort_by(|a, b| a.last_accessed.cmp(&b.last_accessed));
        Ok(stale)
    }

    /// Notes whose raw importance lies in `[min, max]` (inclusive)
    pub async fn get_by_importance_range(&self, min: f32, max: f32) -> Result<Vec<Note>> {
        let Some(backend) = &self.backend else {
            return Ok(Vec::new());
        };

        Ok(backend
            .list()
            .await?
            .into_iter()
            .filter(|n| n.importance >= min && n.importance <= max)
            .collect())
    }

    /// All live notes, for maintenance passes
    pub async fn list(&self) -> Result<Vec<Note>> {
        match &self.backend {
            Some(backend) => backend.list().await,
            None => Ok(Vec::new()),
        }
    }

    /// Number of live notes
    pub async fn count(&self) -> Result<usize> {
        match &self.backend {
            Some(backend) => backend.count().await,
            None => Ok(0),
        }
    }

    /// Re-insert a note exactly as given (archive restore path)
    pub(crate) async fn put_back(&self, note: &Note) -> Result<bool> {
        let Some(backend) = &self.backend else {
            return Ok(false);
        };

        if backend.replace(note).await? {
            return Ok(true);
        }
        backend.insert(note).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryNoteBackend;

    fn store() -> NoteStore {
        NoteStore::new(Arc::new(MemoryNoteBackend::new()))
    }

    #[tokio::test]
    async fn test_upsert_creates_note_with_content_hash_id() {
        let store = store();
        let draft = NoteDraft::new("User likes coffee", Section::ImportantFacts)
            .with_embedding(vec![0.3; 8])
            .with_importance(0.6);
        let expected_id = draft.id();

        let note = store.upsert(draft).await.unwrap().unwrap();

        assert_eq!(note.id, expected_id);
        assert_eq!(note.importance, 0.6);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_except_updated_at() {
        let store = store();
        let draft = NoteDraft::new("User likes coffee", Section::ImportantFacts)
            .with_embedding(vec![0.3; 8])
            .with_importance(0.6)
            .with_source(SourceRecord::conversation("sess-1"));

        let first = store.upsert(draft.clone()).await.unwrap().unwrap();
        let second = store.upsert(draft).await.unwrap().unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.content, second.content);
        assert_eq!(first.section, second.section);
        assert_eq!(first.importance, second.importance);
        assert_eq!(first.access_count, second.access_count);
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(first.source_history, second.source_history);
        assert!(second.updated_at >= first.updated_at);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upsert_appends_distinct_sources_only() {
        let store = store();
        let base = NoteDraft::new("Shared fact", Section::KeyTopics);

        store
            .upsert(base.clone().with_source(SourceRecord::conversation("s1")))
            .await
            .unwrap();
        store
            .upsert(base.clone().with_source(SourceRecord::conversation("s1")))
            .await
            .unwrap();
        let note = store
            .upsert(base.with_source(SourceRecord::conversation("s2")))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(note.source_history.len(), 2);
    }

    #[tokio::test]
    async fn test_search_similar_ranks_by_similarity() {
        let store = store();
        store
            .upsert(
                NoteDraft::new("About coffee", Section::ImportantFacts)
                    .with_embedding(vec![1.0, 0.0, 0.0]),
            )
            .await
            .unwrap();
        store
            .upsert(
                NoteDraft::new("About tea", Section::ImportantFacts)
                    .with_embedding(vec![0.0, 1.0, 0.0]),
            )
            .await
            .unwrap();

        let results = store
            .search_similar(&[0.9, 0.1, 0.0], 5, None)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results[0].note.content.contains("coffee"));
        assert!(results[0].similarity > results[1].similarity);
    }

    #[tokio::test]
    async fn test_search_similar_is_read_only() {
        let store = store();
        let note = store
            .upsert(
                NoteDraft::new("Stable note", Section::KeyTopics).with_embedding(vec![0.5; 4]),
            )
            .await
            .unwrap()
            .unwrap();

        store.search_similar(&[0.5; 4], 5, None).await.unwrap();

        let after = store.get(&note.id).await.unwrap().unwrap();
        assert_eq!(after.access_count, 0);
        assert_eq!(after.last_accessed, note.last_accessed);
    }

    #[tokio::test]
    async fn test_search_similar_respects_section_filter() {
        let store = store();
        store
            .upsert(
                NoteDraft::new("Fact note", Section::ImportantFacts)
                    .with_embedding(vec![1.0, 0.0]),
            )
            .await
            .unwrap();
        store
            .upsert(
                NoteDraft::new("Thread note", Section::OngoingThreads)
                    .with_embedding(vec![1.0, 0.0]),
            )
            .await
            .unwrap();

        let results = store
            .search_similar(&[1.0, 0.0], 5, Some(Section::OngoingThreads))
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].note.section, Section::OngoingThreads);
    }

    #[tokio::test]
    async fn test_increment_access_bumps_stats() {
        let store = store();
        let note = store
            .upsert(NoteDraft::new("Accessed note", Section::ImportantFacts))
            .await
            .unwrap()
            .unwrap();

        store.increment_access(&note.id).await.unwrap();
        store.increment_access(&note.id).await.unwrap();

        let after = store.get(&note.id).await.unwrap().unwrap();
        assert_eq!(after.access_count, 2);
        assert!(after.last_accessed >= note.last_accessed);
    }

    #[tokio::test]
    async fn test_increment_access_unknown_id_is_not_found() {
        let store = store();
        let err = store.increment_access("no-such-id").await.unwrap_err();
        assert!(matches!(err, EngramError::NoteNotFound { .. }));
    }

    #[tokio::test]
    async fn test_append_source_history_with_boost_clamps() {
        let store = store();
        let note = store
            .upsert(
                NoteDraft::new("Boosted note", Section::ImportantFacts).with_importance(0.95),
            )
            .await
            .unwrap()
            .unwrap();

        store
            .append_source_history(&note.id, SourceRecord::file("/tmp/a.md"), Some(0.2))
            .await
            .unwrap();

        let after = store.get(&note.id).await.unwrap().unwrap();
        assert_eq!(after.importance, 1.0);
        assert_eq!(after.source_history.len(), 1);
    }

    #[tokio::test]
    async fn test_get_by_importance_range_is_inclusive() {
        let store = store();
        for (content, importance) in [("a note", 0.1), ("b note", 0.5), ("c note", 0.9)] {
            store
                .upsert(NoteDraft::new(content, Section::KeyTopics).with_importance(importance))
                .await
                .unwrap();
        }

        let mid = store.get_by_importance_range(0.1, 0.5).await.unwrap();
        assert_eq!(mid.len(), 2);
    }

    #[tokio::test]
    async fn test_disabled_store_is_noop_not_error() {
        let store = NoteStore::disabled();

        assert_eq!(store.status(), BackendStatus::Unavailable);
        assert!(
            store
                .upsert(NoteDraft::new("ignored", Section::KeyTopics))
                .await
                .unwrap()
                .is_none()
        );
        assert!(store.search_similar(&[1.0], 5, None).await.unwrap().is_empty());
        assert!(store.increment_access("anything").await.is_ok());
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
