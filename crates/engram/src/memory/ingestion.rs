//! Ingestion pipeline
//!
//! Orchestrates the write side of the data flow: an extraction batch is
//! scored, embedded, and upserted into the note store, and its entities
//! and relationships land in the graph with provenance attached. Per-item
//! relationship failures are counted, never fatal, so one mismatched
//! extraction name cannot abort a whole batch.

use crate::embedding::Embedder;
use crate::error::{EngramError, Result};
use crate::extraction::{ExtractionBatch, Extractor};
use crate::graph::{EntityDraft, EntityKind, GraphStore, RelationshipDraft};
use crate::memory::scoring::ImportanceScorer;
use crate::memory::types::{DEFAULT_DECAY_RATE, Section, SourceRecord};
use crate::store::vector::{NoteDraft, NoteStore};

/// Minimum note content length for ingestion (in characters)
const MIN_CONTENT_LENGTH: usize = 10;

/// Statistics for one ingested batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Notes written to the vector store
    pub notes_written: usize,
    /// Notes filtered out (empty or too short)
    pub notes_skipped: usize,
    /// Entities created or updated
    pub entities_written: usize,
    /// Relationships created or reinforced
    pub relationships_written: usize,
    /// Relationships dropped (usually a missing endpoint)
    pub relationship_errors: usize,
}

/// Writes extraction output into the note and graph layers.
pub struct IngestionPipeline<'a> {
    notes: &'a NoteStore,
    graph: &'a GraphStore,
    scorer: &'a ImportanceScorer,
    embedder: &'a dyn Embedder,
    decay_rate: f32,
}

impl<'a> IngestionPipeline<'a> {
    /// Create a pipeline with the default decay rate for new notes
    pub fn new(
        notes: &'a NoteStore,
        graph: &'a GraphStore,
        scorer: &'a ImportanceScorer,
        embedder: &'a dyn Embedder,
    ) -> Self {
        Self {
            notes,
            graph,
            scorer,
            embedder,
            decay_rate: DEFAULT_DECAY_RATE,
        }
    }

    /// Override the decay rate stamped on new notes
    pub fn with_decay_rate(mut self, decay_rate: f32) -> Self {
        self.decay_rate = decay_rate;
        self
    }

    /// Run the extraction collaborator on raw content, then ingest the
    /// resulting batch. A malformed extraction degrades to an empty batch.
    pub async fn ingest(
        &self,
        extractor: &dyn Extractor,
        input: &str,
        source: &SourceRecord,
    ) -> Result<IngestReport> {
        let batch = extractor.extract(input).await.unwrap_or_else(|e| {
            tracing::warn!("Extraction failed, continuing with empty batch: {e}");
            ExtractionBatch::empty()
        });
        self.ingest_batch(&batch, source).await
    }

    /// Write one extraction batch into the stores with provenance.
    ///
    /// Entities are created before relationships so that edges whose
    /// endpoints arrived in the same batch succeed; relationships whose
    /// endpoints are still missing are counted and skipped.
    pub async fn ingest_batch(
        &self,
        batch: &ExtractionBatch,
        source: &SourceRecord,
    ) -> Result<IngestReport> {
        let mut report = IngestReport::default();
        let source_id = source.source_id();

        for extracted in &batch.notes {
            let content = extracted.content.trim();
            if content.is_empty() || content.len() < MIN_CONTENT_LENGTH {
                report.notes_skipped += 1;
                continue;
            }

            let section = extracted
                .section
                .as_deref()
                .and_then(Section::from_heading)
                .unwrap_or(Section::ImportantFacts);
            let importance = self.scorer.score(content, section, extracted.importance);
            let embedding = self.embedder.embed(content)?;

            self.notes
                .upsert(
                    NoteDraft::new(content, section)
                        .with_embedding(embedding)
                        .with_importance(importance)
                        .with_decay_rate(self.decay_rate)
                        .with_source(source.clone()),
                )
                .await?;
            report.notes_written += 1;
        }

        for entity in &batch.entities {
            let name = entity.name.trim();
            if name.is_empty() {
                continue;
            }

            let kind = entity
                .entity_type
                .as_deref()
                .map(EntityKind::from_label)
                .unwrap_or(EntityKind::Concept);

            let embedding_text = match &entity.description {
                Some(description) => format!("{name}: {description}"),
                None => name.to_string(),
            };

            self.graph
                .create_entity(
                    kind,
                    name,
                    EntityDraft {
                        description: entity.description.clone(),
                        embedding: Some(self.embedder.embed(&embedding_text)?),
                        aliases: entity.aliases.clone(),
                        source_id: Some(source_id.clone()),
                        ..Default::default()
                    },
                )
                .await?;
            report.entities_written += 1;
        }

        for relationship in &batch.relationships {
            let result = self
                .graph
                .create_relationship(
                    &relationship.source,
                    &relationship.target,
                    &relationship.rel_type,
                    RelationshipDraft {
                        description: relationship.description.clone(),
                        confidence: relationship.confidence,
                        evidence: relationship.evidence.clone(),
                        source_id: Some(source_id.clone()),
                    },
                )
                .await;

            match result {
                Ok(_) => report.relationships_written += 1,
                Err(EngramError::EntityNotFound { name }) => {
                    tracing::warn!(
                        "Skipping relationship {} -[{}]-> {}: unknown entity '{name}'",
                        relationship.source,
                        relationship.rel_type,
                        relationship.target
                    );
                    report.relationship_errors += 1;
                }
                Err(e) => return Err(e),
            }
        }

        tracing::debug!(
            "Ingested batch: {} notes, {} entities, {} relationships ({} dropped)",
            report.notes_written,
            report.entities_written,
            report.relationships_written,
            report.relationship_errors
        );
        Ok(report)
    }
}
