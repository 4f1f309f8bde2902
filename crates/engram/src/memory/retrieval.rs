//! Context retrieval across all memory layers
//!
//! Builds the ranked, citation-indexed package handed to the next
//! conversation turn: core items first (always), then vector notes that
//! clear the retrieval gate ordered by similarity, then graph entities by
//! embedding similarity. Returning an item reinforces it in its store, so
//! retrieval itself slows future decay.

use chrono::Utc;

use crate::embedding::Embedder;
use crate::error::Result;
use crate::graph::GraphStore;
use crate::memory::scoring::ImportanceScorer;
use crate::store::core::CoreStore;
use crate::store::vector::NoteStore;

/// Which memory layer a context item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextLayer {
    /// Protected core fact
    Core,
    /// Vector note
    Note,
    /// Graph entity
    Entity,
}

/// One citation-indexed entry in a context package.
#[derive(Debug, Clone)]
pub struct ContextItem {
    /// Citation index, `1..=N` in package order
    pub index: usize,
    /// Originating layer
    pub layer: ContextLayer,
    /// Rendered content
    pub content: String,
    /// Similarity to the query, where applicable
    pub score: Option<f32>,
    /// Provenance citation, where known
    pub citation: Option<String>,
}

/// An ordered, citation-indexed context package.
#[derive(Debug, Clone, Default)]
pub struct ContextPackage {
    /// Items in citation order
    pub items: Vec<ContextItem>,
}

impl ContextPackage {
    /// Render the package as a numbered context block
    pub fn render(&self) -> String {
        self.items
            .iter()
            .map(|item| match &item.citation {
                Some(citation) => format!("[{}] {} ({})", item.index, item.content, citation),
                None => format!("[{}] {}", item.index, item.content),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Whether the package carries anything
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Configuration for context assembly
#[derive(Debug, Clone, Copy)]
pub struct RetrievalConfig {
    /// Maximum vector notes to include
    pub note_limit: usize,
    /// Maximum graph entities to include
    pub entity_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            note_limit: 10,
            entity_limit: 5,
        }
    }
}

/// Composes context from core, vector, and graph layers for one query.
pub struct ContextRetrievalAggregator<'a> {
    core: &'a CoreStore,
    notes: &'a NoteStore,
    graph: &'a GraphStore,
    scorer: &'a ImportanceScorer,
    embedder: &'a dyn Embedder,
    config: RetrievalConfig,
}

impl<'a> ContextRetrievalAggregator<'a> {
    /// Create an aggregator with default limits
    pub fn new(
        core: &'a CoreStore,
        notes: &'a NoteStore,
        graph: &'a GraphStore,
        scorer: &'a ImportanceScorer,
        embedder: &'a dyn Embedder,
    ) -> Self {
        Self::with_config(core, notes, graph, scorer, embedder, RetrievalConfig::default())
    }

    /// Create an aggregator with custom limits
    pub fn with_config(
        core: &'a CoreStore,
        notes: &'a NoteStore,
        graph: &'a GraphStore,
        scorer: &'a ImportanceScorer,
        embedder: &'a dyn Embedder,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            core,
            notes,
            graph,
            scorer,
            embedder,
            config,
        }
    }

    /// Build a context package for a query string
    pub async fn retrieve(&self, query: &str) -> Result<ContextPackage> {
        let embedding = self.embedder.embed(query)?;
        self.retrieve_by_embedding(&embedding).await
    }

    /// Build a context package for a pre-computed query embedding.
    ///
    /// Citation indices are assigned in concatenation order (core, notes,
    /// entities) and are stable for the duration of this call. Every note
    /// and entity returned is reinforced in its store.
    pub async fn retrieve_by_embedding(&self, embedding: &[f32]) -> Result<ContextPackage> {
        let now = Utc::now();
        let mut items = Vec::new();

        // Core items are always included, unconditionally
        for item in self.core.items()? {
            items.push(ContextItem {
                index: items.len() + 1,
                layer: ContextLayer::Core,
                content: item.content,
                score: None,
                citation: item.source.as_ref().map(|s| s.source_id()),
            });
        }

        // Vector notes passing the retrieval gate, by similarity descending
        let hits = self
            .notes
            .search_similar(embedding, self.config.note_limit, None)
            .await?;
        for hit in hits {
            if !self.scorer.should_retrieve(&hit.note, now) {
                continue;
            }
            self.notes.increment_access(&hit.note.id).await?;
            items.push(ContextItem {
                index: items.len() + 1,
                layer: ContextLayer::Note,
                content: hit.note.content,
                score: Some(hit.similarity),
                citation: hit.note.source.as_ref().map(|s| s.source_id()),
            });
        }

        // Graph entities by embedding similarity descending
        let entities = self
            .graph
            .search_by_embedding(embedding, None, self.config.entity_limit)
            .await?;
        for (entity, similarity) in entities {
            self.graph.increment_mention_count(&entity.name).await?;
            let content = if entity.description.is_empty() {
                format!("{} ({})", entity.name, entity.kind)
            } else {
                format!("{} ({}): {}", entity.name, entity.kind, entity.description)
            };
            items.push(ContextItem {
                index: items.len() + 1,
                layer: ContextLayer::Entity,
                content,
                score: Some(similarity),
                citation: entity.source_ids.first().cloned(),
            });
        }

        tracing::debug!("Assembled context package with {} items", items.len());
        Ok(ContextPackage { items })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EntityDraft, EntityKind, MemoryGraphBackend};
    use crate::memory::types::{CoreCategory, Section, SourceRecord};
    use crate::store::memory::MemoryNoteBackend;
    use crate::store::vector::NoteDraft;
    use crate::testing::MockEmbedder;
    use std::sync::Arc;

    struct Fixture {
        core: CoreStore,
        notes: NoteStore,
        graph: GraphStore,
        scorer: ImportanceScorer,
        embedder: MockEmbedder,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        Fixture {
            core: CoreStore::new(dir.path().join("core.md"), 0.8).unwrap(),
            notes: NoteStore::new(Arc::new(MemoryNoteBackend::new())),
            graph: GraphStore::new(Arc::new(MemoryGraphBackend::new())),
            scorer: ImportanceScorer::new(),
            embedder: MockEmbedder::new(),
            _dir: dir,
        }
    }

    impl Fixture {
        fn aggregator(&self) -> ContextRetrievalAggregator<'_> {
            ContextRetrievalAggregator::new(
                &self.core,
                &self.notes,
                &self.graph,
                &self.scorer,
                &self.embedder,
            )
        }
    }

    #[tokio::test]
    async fn test_core_items_come_first_unconditionally() {
        let f = fixture();
        f.core
            .add("User's name is Alice", CoreCategory::Identity, None)
            .unwrap();
        f.notes
            .upsert(
                NoteDraft::new("User likes coffee", Section::ImportantFacts)
                    .with_embedding(f.embedder.embed("User likes coffee").unwrap())
                    .with_importance(0.8),
            )
            .await
            .unwrap();

        let package = f
            .aggregator()
            .retrieve("completely unrelated query about rockets")
            .await
            .unwrap();

        assert_eq!(package.items[0].layer, ContextLayer::Core);
        assert_eq!(package.items[0].content, "User's name is Alice");
    }

    #[tokio::test]
    async fn test_citation_indices_are_contiguous_in_order() {
        let f = fixture();
        f.core.add("Core fact", CoreCategory::System, None).unwrap();
        for content in ["note about coffee", "note about tea"] {
            f.notes
                .upsert(
                    NoteDraft::new(content, Section::ImportantFacts)
                        .with_embedding(f.embedder.embed(content).unwrap())
                        .with_importance(0.9),
                )
                .await
                .unwrap();
        }
        f.graph
            .create_entity(
                EntityKind::Topic,
                "Coffee",
                EntityDraft {
                    embedding: Some(f.embedder.embed("Coffee").unwrap()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let package = f.aggregator().retrieve("note about coffee").await.unwrap();

        let indices: Vec<usize> = package.items.iter().map(|i| i.index).collect();
        assert_eq!(indices, (1..=package.items.len()).collect::<Vec<_>>());

        // Layer order: all core, then all notes, then all entities
        let layers: Vec<ContextLayer> = package.items.iter().map(|i| i.layer).collect();
        let first_note = layers.iter().position(|l| *l == ContextLayer::Note);
        let first_entity = layers.iter().position(|l| *l == ContextLayer::Entity);
        assert_eq!(layers[0], ContextLayer::Core);
        if let (Some(n), Some(e)) = (first_note, first_entity) {
            assert!(n < e);
        }
    }

    #[tokio::test]
    async fn test_retrieval_reinforces_returned_items() {
        let f = fixture();
        let note = f
            .notes
            .upsert(
                NoteDraft::new("coffee preference noted", Section::ImportantFacts)
                    .with_embedding(f.embedder.embed("coffee preference noted").unwrap())
                    .with_importance(0.9),
            )
            .await
            .unwrap()
            .unwrap();
        f.graph
            .create_entity(
                EntityKind::Topic,
                "Coffee",
                EntityDraft {
                    embedding: Some(f.embedder.embed("coffee preference noted").unwrap()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        f.aggregator()
            .retrieve("coffee preference noted")
            .await
            .unwrap();

        let after = f.notes.get(&note.id).await.unwrap().unwrap();
        assert_eq!(after.access_count, 1);

        let entity = f.graph.get_entity("Coffee").await.unwrap().unwrap();
        assert_eq!(entity.mention_count, 2);
    }

    #[tokio::test]
    async fn test_low_importance_notes_are_gated_out() {
        let f = fixture();
        f.notes
            .upsert(
                NoteDraft::new("barely relevant whisper", Section::KeyTopics)
                    .with_embedding(f.embedder.embed("barely relevant whisper").unwrap())
                    .with_importance(0.05),
            )
            .await
            .unwrap();

        let package = f
            .aggregator()
            .retrieve("barely relevant whisper")
            .await
            .unwrap();

        assert!(package.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_layers_still_yield_core_items() {
        let dir = tempfile::tempdir().unwrap();
        let core = CoreStore::new(dir.path().join("core.md"), 0.8).unwrap();
        core.add("Survivor fact", CoreCategory::Identity, None).unwrap();
        let notes = NoteStore::disabled();
        let graph = GraphStore::disabled();
        let scorer = ImportanceScorer::new();
        let embedder = MockEmbedder::new();

        let aggregator =
            ContextRetrievalAggregator::new(&core, &notes, &graph, &scorer, &embedder);
        let package = aggregator.retrieve("anything").await.unwrap();

        assert_eq!(package.items.len(), 1);
        assert_eq!(package.items[0].content, "Survivor fact");
    }

    #[tokio::test]
    async fn test_render_includes_citation_indices() {
        let f = fixture();
        f.core
            .add(
                "Cited fact",
                CoreCategory::Identity,
                Some(SourceRecord::conversation("sess-9")),
            )
            .unwrap();

        let package = f.aggregator().retrieve("anything").await.unwrap();
        let rendered = package.render();

        assert!(rendered.contains("[1] Cited fact"));
        assert!(rendered.contains("conversation:sess-9"));
    }
}
