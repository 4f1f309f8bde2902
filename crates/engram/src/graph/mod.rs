//! Graph store: entities, relationships, merge, provenance
//!
//! [`GraphStore`] wraps a pluggable [`GraphBackend`] and owns the layer's
//! availability semantics: when the backend is unreachable at
//! initialization the layer is marked disabled for the process lifetime and
//! every call becomes a no-op returning empty results, so the rest of the
//! memory subsystem is unaffected.

pub mod backend;
pub mod types;

pub use backend::{GraphBackend, MemoryGraphBackend};
pub use types::{
    Entity, EntityDraft, EntityKind, GraphSummary, ProvenanceEdge, ProvenanceKind, RelatedEntity,
    Relationship, RelationshipDraft,
};

use std::sync::Arc;

use crate::error::Result;
use crate::store::BackendStatus;

/// Entities and typed relationships with merge and provenance handling.
pub struct GraphStore {
    backend: Option<Arc<dyn GraphBackend>>,
}

impl GraphStore {
    /// Create a store over a live backend
    pub fn new(backend: Arc<dyn GraphBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// Create a disabled store whose calls are no-ops
    pub fn disabled() -> Self {
        tracing::warn!("Graph store running disabled; graph calls will be no-ops");
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

    /// Create or update an entity keyed by `(kind, name)`. The type label
    /// is always written. Returns `None` when the layer is disabled.
    pub async fn create_entity(
        &self,
        kind: EntityKind,
        name: &str,
        draft: EntityDraft,
    ) -> Result<Option<Entity>> {
        match &self.backend {
            Some(backend) => Ok(Some(backend.create_entity(kind, name, draft).await?)),
            None => Ok(None),
        }
    }

    /// Look up an entity by name or alias
    pub async fn get_entity(&self, name: &str) -> Result<Option<Entity>> {
        match &self.backend {
            Some(backend) => backend.get_entity(name).await,
            None => Ok(None),
        }
    }

    /// Create or reinforce a relationship.
    ///
    /// Fails with [`EngramError::EntityNotFound`](crate::error::EngramError)
    /// unless both endpoints already exist as labeled entities; the failed
    /// attempt creates no node or edge. Returns `None` when the layer is
    /// disabled.
    pub async fn create_relationship(
        &self,
        source: &str,
        target: &str,
        rel_type: &str,
        draft: RelationshipDraft,
    ) -> Result<Option<Relationship>> {
        match &self.backend {
            Some(backend) => Ok(Some(
                backend
                    .create_relationship(source, target, rel_type, draft)
                    .await?,
            )),
            None => Ok(None),
        }
    }

    /// Bump an entity's mention count and `last_seen`
    pub async fn increment_mention_count(&self, name: &str) -> Result<bool> {
        match &self.backend {
            Some(backend) => backend.increment_mention_count(name).await,
            None => Ok(false),
        }
    }

    /// Entities ranked by embedding similarity, descending
    pub async fn search_by_embedding(
        &self,
        embedding: &[f32],
        kind: Option<&EntityKind>,
        limit: usize,
    ) -> Result<Vec<(Entity, f32)>> {
        match &self.backend {
            Some(backend) => backend.search_by_embedding(embedding, kind, limit).await,
            None => Ok(Vec::new()),
        }
    }

    /// Bounded traversal from an entity; both depth- and limit-bounded so
    /// fan-out can never run away
    pub async fn related(&self, name: &str, depth: usize, limit: usize) -> Result<Vec<RelatedEntity>> {
        match &self.backend {
            Some(backend) => backend.related(name, depth, limit).await,
            None => Ok(Vec::new()),
        }
    }

    /// Merge `secondary` into `canonical` (all-or-nothing per call):
    /// edges re-pointed, aliases and counters folded, secondary deleted.
    /// Returns `None` when the layer is disabled.
    pub async fn merge_entities(&self, canonical: &str, secondary: &str) -> Result<Option<Entity>> {
        match &self.backend {
            Some(backend) => Ok(Some(backend.merge_entities(canonical, secondary).await?)),
            None => Ok(None),
        }
    }

    /// All entities
    pub async fn entities(&self) -> Result<Vec<Entity>> {
        match &self.backend {
            Some(backend) => backend.entities().await,
            None => Ok(Vec::new()),
        }
    }

    /// All domain relationships
    pub async fn relationships(&self) -> Result<Vec<Relationship>> {
        match &self.backend {
            Some(backend) => backend.relationships().await,
            None => Ok(Vec::new()),
        }
    }

    /// Domain-only summary; provenance edges counted apart
    pub async fn summary(&self) -> Result<GraphSummary> {
        match &self.backend {
            Some(backend) => backend.summary().await,
            None => Ok(GraphSummary::default()),
        }
    }

    /// Fragmentation candidates: same-kind pairs where one entity's name
    /// extends the other's (word-boundary prefix) or is listed among its
    /// aliases. Each pair is `(canonical, secondary)` with the
    /// more-mentioned entity as canonical.
    pub async fn merge_candidates(&self) -> Result<Vec<(String, String)>> {
        let entities = self.entities().await?;
        let mut pairs = Vec::new();

        for (i, a) in entities.iter().enumerate() {
            for b in entities.iter().skip(i + 1) {
                if a.kind != b.kind {
                    continue;
                }
                let fragment = word_prefix(&a.name, &b.name)
                    || word_prefix(&b.name, &a.name)
                    || a.aliases.contains(&b.name)
                    || b.aliases.contains(&a.name);
                if !fragment {
                    continue;
                }

                let a_wins = (a.mention_count, b.first_seen) > (b.mention_count, a.first_seen);
                let (canonical, secondary) = if a_wins { (a, b) } else { (b, a) };
                pairs.push((canonical.name.clone(), secondary.name.clone()));
            }
        }

        Ok(pairs)
    }
}

/// True when `long` starts with `short` followed by a word boundary
fn word_prefix(short: &str, long: &str) -> bool {
    long.len() > short.len()
        && long.starts_with(short)
        && long[short.len()..].starts_with([' ', '\'', '-'])
}
