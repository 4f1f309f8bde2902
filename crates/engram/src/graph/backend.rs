//! Pluggable graph storage
//!
//! [`GraphBackend`] is the seam a service-backed graph database plugs into.
//! The in-process [`MemoryGraphBackend`] keeps the whole graph behind one
//! RwLock, which makes every operation, including the multi-step entity
//! merge, atomic with respect to readers.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::embedding::cosine_similarity;
use crate::error::{EngramError, Result};
use crate::graph::types::{
    Entity, EntityDraft, EntityKind, GraphSummary, ProvenanceEdge, ProvenanceKind, RelatedEntity,
    Relationship, RelationshipDraft,
};

/// Pluggable graph storage operations.
///
/// Implementations must uphold two invariants: every stored entity carries
/// its type label, and `create_relationship` fails with
/// [`EngramError::EntityNotFound`] without side effects when either
/// endpoint does not already exist.
#[async_trait]
pub trait GraphBackend: Send + Sync {
    /// Create or update an entity keyed by `(kind, name)`
    async fn create_entity(
        &self,
        kind: EntityKind,
        name: &str,
        draft: EntityDraft,
    ) -> Result<Entity>;

    /// Look up an entity by name or alias
    async fn get_entity(&self, name: &str) -> Result<Option<Entity>>;

    /// Create or reinforce a relationship between two existing entities
    async fn create_relationship(
        &self,
        source: &str,
        target: &str,
        rel_type: &str,
        draft: RelationshipDraft,
    ) -> Result<Relationship>;

    /// Bump mention count and `last_seen`; false when the name is unknown
    async fn increment_mention_count(&self, name: &str) -> Result<bool>;

    /// Entities ranked by embedding similarity, descending
    async fn search_by_embedding(
        &self,
        embedding: &[f32],
        kind: Option<&EntityKind>,
        limit: usize,
    ) -> Result<Vec<(Entity, f32)>>;

    /// Bounded-depth, limit-bounded traversal from an entity
    async fn related(&self, name: &str, depth: usize, limit: usize) -> Result<Vec<RelatedEntity>>;

    /// Merge `secondary` into `canonical`, all-or-nothing
    async fn merge_entities(&self, canonical: &str, secondary: &str) -> Result<Entity>;

    /// All entities
    async fn entities(&self) -> Result<Vec<Entity>>;

    /// All domain relationships
    async fn relationships(&self) -> Result<Vec<Relationship>>;

    /// Domain-only counts; provenance edges reported separately
    async fn summary(&self) -> Result<GraphSummary>;
}

#[derive(Debug, Default)]
struct GraphState {
    /// Keyed by `(name, kind label)` so name lookups are range scans
    entities: BTreeMap<(String, String), Entity>,
    relationships: BTreeMap<(String, String, String), Relationship>,
    provenance: BTreeSet<ProvenanceEdge>,
}

impl GraphState {
    /// Resolve a name to an entity: exact name first, then alias match
    fn resolve(&self, name: &str) -> Option<&Entity> {
        let exact = self
            .entities
            .range((name.to_string(), String::new())..)
            .take_while(|((n, _), _)| n == name)
            .map(|(_, e)| e)
            .next();
        if exact.is_some() {
            return exact;
        }
        self.entities
            .values()
            .find(|e| e.aliases.contains(name))
    }

    fn resolve_mut(&mut self, name: &str) -> Option<&mut Entity> {
        let key = self
            .entities
            .iter()
            .find(|((n, _), e)| n == name || e.aliases.contains(name))
            .map(|(k, _)| k.clone())?;
        self.entities.get_mut(&key)
    }
}

fn relationship_ref(source: &str, target: &str, rel_type: &str) -> String {
    format!("{source}|{target}|{rel_type}")
}

/// In-process [`GraphBackend`] implementation.
#[derive(Debug, Default)]
pub struct MemoryGraphBackend {
    state: RwLock<GraphState>,
}

impl MemoryGraphBackend {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphBackend for MemoryGraphBackend {
    async fn create_entity(
        &self,
        kind: EntityKind,
        name: &str,
        draft: EntityDraft,
    ) -> Result<Entity> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let key = (name.to_string(), kind.label().to_string());

        let entity = match state.entities.get_mut(&key) {
            Some(existing) => {
                if let Some(description) = &draft.description {
                    if description.len() > existing.description.len() {
                        existing.description = description.clone();
                    }
                }
                if let Some(embedding) = draft.embedding {
                    existing.embedding = Some(embedding);
                }
                if let Some(canonical_name) = draft.canonical_name {
                    existing.canonical_name = canonical_name;
                }
                existing.aliases.extend(draft.aliases.iter().cloned());
                existing.properties.extend(draft.properties.clone());
                existing.mention_count += 1;
                existing.last_seen = now;
                if let Some(source_id) = &draft.source_id {
                    if !existing.source_ids.contains(source_id) {
                        existing.source_ids.push(source_id.clone());
                    }
                }
                existing.clone()
            }
            None => {
                let mut entity = Entity::new(kind, name);
                entity.description = draft.description.unwrap_or_default();
                entity.embedding = draft.embedding;
                entity.aliases = draft.aliases.into_iter().collect();
                if let Some(canonical_name) = draft.canonical_name {
                    entity.canonical_name = canonical_name;
                }
                entity.properties = draft.properties;
                if let Some(source_id) = &draft.source_id {
                    entity.source_ids.push(source_id.clone());
                }
                state.entities.insert(key, entity.clone());
                entity
            }
        };

        if let Some(source_id) = draft.source_id {
            state.provenance.insert(ProvenanceEdge {
                kind: ProvenanceKind::ExtractedFrom,
                from: entity.name.clone(),
                to: source_id,
            });
        }

        Ok(entity)
    }

    async fn get_entity(&self, name: &str) -> Result<Option<Entity>> {
        Ok(self.state.read().await.resolve(name).cloned())
    }

    async fn create_relationship(
        &self,
        source: &str,
        target: &str,
        rel_type: &str,
        draft: RelationshipDraft,
    ) -> Result<Relationship> {
        let mut state = self.state.write().await;

        // Both endpoints must already exist as labeled entities; a failed
        // precondition creates no node or edge.
        let source_name = state
            .resolve(source)
            .map(|e| e.name.clone())
            .ok_or_else(|| EngramError::EntityNotFound {
                name: source.to_string(),
            })?;
        let target_name = state
            .resolve(target)
            .map(|e| e.name.clone())
            .ok_or_else(|| EngramError::EntityNotFound {
                name: target.to_string(),
            })?;

        let now = Utc::now();
        let key = (
            source_name.clone(),
            target_name.clone(),
            rel_type.to_string(),
        );

        let relationship = match state.relationships.get_mut(&key) {
            Some(existing) => {
                if let Some(description) = &draft.description {
                    if description.len() > existing.description.len() {
                        existing.description = description.clone();
                    }
                }
                if let Some(confidence) = draft.confidence {
                    existing.confidence = existing.confidence.max(confidence.clamp(0.0, 1.0));
                }
                for quote in &draft.evidence {
                    if !existing.evidence.contains(quote) {
                        existing.evidence.push(quote.clone());
                    }
                }
                existing.mention_count += 1;
                existing.last_seen = now;
                existing.clone()
            }
            None => {
                let relationship = Relationship {
                    source: source_name.clone(),
                    target: target_name.clone(),
                    rel_type: rel_type.to_string(),
                    description: draft.description.unwrap_or_default(),
                    confidence: draft.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
                    evidence: draft.evidence.clone(),
                    mention_count: 1,
                    first_seen: now,
                    last_seen: now,
                };
                state.relationships.insert(key, relationship.clone());
                relationship
            }
        };

        if let Some(source_id) = draft.source_id {
            state.provenance.insert(ProvenanceEdge {
                kind: ProvenanceKind::Evidences,
                from: source_id,
                to: relationship_ref(&source_name, &target_name, rel_type),
            });
        }

        Ok(relationship)
    }

    async fn increment_mention_count(&self, name: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.resolve_mut(name) {
            Some(entity) => {
                entity.mention_count += 1;
                entity.last_seen = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn search_by_embedding(
        &self,
        embedding: &[f32],
        kind: Option<&EntityKind>,
        limit: usize,
    ) -> Result<Vec<(Entity, f32)>> {
        let state = self.state.read().await;

        let mut scored: Vec<(Entity, f32)> = state
            .entities
            .values()
            .filter(|e| kind.is_none_or(|k| &e.kind == k))
            .filter_map(|e| {
                e.embedding
                    .as_deref()
                    .map(|emb| (e.clone(), cosine_similarity(embedding, emb)))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then_with(|| a.0.name.cmp(&b.0.name))
        });
        scored.truncate(limit);

        Ok(scored)
    }

    async fn related(&self, name: &str, depth: usize, limit: usize) -> Result<Vec<RelatedEntity>> {
        let state = self.state.read().await;

        let Some(origin) = state.resolve(name) else {
            return Ok(Vec::new());
        };
        let origin_name = origin.name.clone();

        // Undirected adjacency over domain relationships only
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for (source, target, _) in state.relationships.keys() {
            adjacency.entry(source).or_default().push(target);
            adjacency.entry(target).or_default().push(source);
        }

        let mut visited: HashSet<&str> = HashSet::from([origin_name.as_str()]);
        let mut queue: VecDeque<(&str, usize)> = VecDeque::from([(origin_name.as_str(), 0)]);
        let mut reached = Vec::new();

        while let Some((current, distance)) = queue.pop_front() {
            if reached.len() >= limit {
                break;
            }
            if distance >= depth {
                continue;
            }
            let Some(neighbors) = adjacency.get(current) else {
                continue;
            };
            for &neighbor in neighbors {
                if reached.len() >= limit {
                    break;
                }
                if !visited.insert(neighbor) {
                    continue;
                }
                if let Some(entity) = state.resolve(neighbor) {
                    reached.push(RelatedEntity {
                        entity: entity.clone(),
                        distance: distance + 1,
                    });
                }
                queue.push_back((neighbor, distance + 1));
            }
        }

        Ok(reached)
    }

    async fn merge_entities(&self, canonical: &str, secondary: &str) -> Result<Entity> {
        let mut state = self.state.write().await;

        let canonical_entity = state
            .resolve(canonical)
            .cloned()
            .ok_or_else(|| EngramError::EntityNotFound {
                name: canonical.to_string(),
            })?;
        let secondary_entity = state
            .resolve(secondary)
            .cloned()
            .ok_or_else(|| EngramError::EntityNotFound {
                name: secondary.to_string(),
            })?;

        if canonical_entity.name == secondary_entity.name
            && canonical_entity.kind == secondary_entity.kind
        {
            return Ok(canonical_entity);
        }

        // Everything below mutates under the single write lock, so readers
        // observe either the old graph or the fully merged one.
        let canonical_name = canonical_entity.name.clone();
        let secondary_name = secondary_entity.name.clone();

        // (1) Re-point every relationship edge touching the secondary
        let old_relationships = std::mem::take(&mut state.relationships);
        for (_, mut rel) in old_relationships {
            if rel.source == secondary_name {
                rel.source = canonical_name.clone();
            }
            if rel.target == secondary_name {
                rel.target = canonical_name.clone();
            }
            let key = rel.key();
            match state.relationships.get_mut(&key) {
                Some(existing) => {
                    existing.mention_count += rel.mention_count;
                    existing.first_seen = existing.first_seen.min(rel.first_seen);
                    existing.last_seen = existing.last_seen.max(rel.last_seen);
                    existing.confidence = existing.confidence.max(rel.confidence);
                    if rel.description.len() > existing.description.len() {
                        existing.description = rel.description;
                    }
                    for quote in rel.evidence {
                        if !existing.evidence.contains(&quote) {
                            existing.evidence.push(quote);
                        }
                    }
                }
                None => {
                    state.relationships.insert(key, rel);
                }
            }
        }

        // Provenance edges follow the rename
        let old_provenance = std::mem::take(&mut state.provenance);
        for mut edge in old_provenance {
            match edge.kind {
                ProvenanceKind::ExtractedFrom => {
                    if edge.from == secondary_name {
                        edge.from = canonical_name.clone();
                    }
                }
                ProvenanceKind::Evidences => {
                    edge.to = edge
                        .to
                        .split('|')
                        .map(|part| {
                            if part == secondary_name {
                                canonical_name.as_str()
                            } else {
                                part
                            }
                        })
                        .collect::<Vec<_>>()
                        .join("|");
                }
            }
            state.provenance.insert(edge);
        }

        // (2)(3) Fold the secondary's identity and counters into the canonical
        let merged = {
            let key = (
                canonical_name.clone(),
                canonical_entity.kind.label().to_string(),
            );
            let entry = state
                .entities
                .get_mut(&key)
                .expect("canonical entity resolved above");

            entry.aliases.extend(secondary_entity.aliases.iter().cloned());
            entry.aliases.insert(secondary_name.clone());
            entry.aliases.insert(canonical_name.clone());
            let canonical_id = entry.canonical_name.clone();
            entry.aliases.remove(&canonical_id);

            entry.mention_count += secondary_entity.mention_count;
            entry.first_seen = entry.first_seen.min(secondary_entity.first_seen);
            entry.last_seen = entry.last_seen.max(secondary_entity.last_seen);
            if secondary_entity.description.len() > entry.description.len() {
                entry.description = secondary_entity.description.clone();
            }
            if entry.embedding.is_none() {
                entry.embedding = secondary_entity.embedding.clone();
            }
            for (k, v) in &secondary_entity.properties {
                entry.properties.entry(k.clone()).or_insert_with(|| v.clone());
            }
            for source_id in &secondary_entity.source_ids {
                if !entry.source_ids.contains(source_id) {
                    entry.source_ids.push(source_id.clone());
                }
            }
            entry.clone()
        };

        // (4) Delete the secondary node
        state.entities.remove(&(
            secondary_name.clone(),
            secondary_entity.kind.label().to_string(),
        ));

        tracing::info!("Merged entity '{secondary_name}' into '{canonical_name}'");
        Ok(merged)
    }

    async fn entities(&self) -> Result<Vec<Entity>> {
        Ok(self.state.read().await.entities.values().cloned().collect())
    }

    async fn relationships(&self) -> Result<Vec<Relationship>> {
        Ok(self
            .state
            .read()
            .await
            .relationships
            .values()
            .cloned()
            .collect())
    }

    async fn summary(&self) -> Result<GraphSummary> {
        let state = self.state.read().await;
        Ok(GraphSummary {
            entities: state.entities.len(),
            relationships: state.relationships.len(),
            provenance_edges: state.provenance.len(),
        })
    }
}
