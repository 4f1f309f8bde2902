//! Duplicate detection and consolidation
//!
//! Near-duplicate notes are found by pairwise embedding similarity and
//! merged so that nothing is conserved away: the consolidated note keeps
//! the higher importance, the summed access count, the earliest creation
//! time, and the union of both provenance histories. The losing note is
//! archived, never deleted outright.

use chrono::Utc;

use crate::embedding::cosine_similarity;
use crate::error::Result;
use crate::extraction::Extractor;
use crate::memory::types::{Note, Section, note_id};
use crate::store::archive::ArchiveManager;
use crate::store::vector::NoteStore;

/// How note contents are combined during consolidation.
pub enum ConsolidationMode<'a> {
    /// Keep the primary note's content unchanged
    Simple,
    /// Ask the extraction collaborator to merge the two contents; falls
    /// back to simple mode when it returns nothing usable
    Llm(&'a dyn Extractor),
}

/// Configuration for duplicate detection
#[derive(Debug, Clone, Copy)]
pub struct DedupConfig {
    /// Cosine similarity at or above which two notes are duplicates
    pub similarity_threshold: f32,
    /// Live note count above which a consolidation pass should run
    pub note_ceiling: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.85,
            note_ceiling: 100,
        }
    }
}

/// A detected duplicate pair, reported once per pair.
#[derive(Debug, Clone)]
pub struct DuplicatePair {
    /// First note (insertion order is not significant)
    pub a: Note,
    /// Second note
    pub b: Note,
    /// Cosine similarity between the two embeddings
    pub similarity: f32,
}

/// Result of one consolidation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsolidationReport {
    /// Duplicate pairs detected
    pub pairs_found: usize,
    /// Pairs actually merged
    pub consolidated: usize,
    /// Pairs that failed to merge
    pub errors: usize,
}

/// Similarity-based duplicate detection and consolidation.
pub struct Deduplicator<'a> {
    notes: &'a NoteStore,
    archive: &'a ArchiveManager,
    config: DedupConfig,
}

impl<'a> Deduplicator<'a> {
    /// Create a deduplicator with default thresholds
    pub fn new(notes: &'a NoteStore, archive: &'a ArchiveManager) -> Self {
        Self::with_config(notes, archive, DedupConfig::default())
    }

    /// Create a deduplicator with custom thresholds
    pub fn with_config(
        notes: &'a NoteStore,
        archive: &'a ArchiveManager,
        config: DedupConfig,
    ) -> Self {
        Self {
            notes,
            archive,
            config,
        }
    }

    /// Get the current configuration
    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    /// All note pairs at or above the similarity threshold, each pair
    /// reported once. Notes without embeddings cannot match.
    pub async fn find_similar(&self, section: Option<Section>) -> Result<Vec<DuplicatePair>> {
        let notes: Vec<Note> = self
            .notes
            .list()
            .await?
            .into_iter()
            .filter(|n| section.is_none_or(|s| n.section == s))
            .filter(|n| n.embedding.is_some())
            .collect();

        let mut pairs = Vec::new();
        for (i, a) in notes.iter().enumerate() {
            for b in notes.iter().skip(i + 1) {
                let similarity = cosine_similarity(
                    a.embedding.as_deref().unwrap_or(&[]),
                    b.embedding.as_deref().unwrap_or(&[]),
                );
                if similarity >= self.config.similarity_threshold {
                    pairs.push(DuplicatePair {
                        a: a.clone(),
                        b: b.clone(),
                        similarity,
                    });
                }
            }
        }

        Ok(pairs)
    }

    /// Merge two notes into one stored primary.
    ///
    /// The note with higher importance wins (ties break on access count);
    /// the merged note carries `access_count = a + b`, the earliest
    /// `created_at`, the latest `updated_at`, the union of both source
    /// histories, and never less than the higher of the two importances.
    /// Returns `(merged, secondary_id)`.
    pub async fn consolidate(
        &self,
        a: &Note,
        b: &Note,
        mode: ConsolidationMode<'_>,
    ) -> Result<(Note, String)> {
        let (primary, secondary) = if (a.importance, a.access_count) >= (b.importance, b.access_count)
        {
            (a, b)
        } else {
            (b, a)
        };

        let mut merged = primary.clone();

        if let ConsolidationMode::Llm(extractor) = mode {
            let prompt = format!(
                "Merge these two overlapping memory notes into one:\n1. {}\n2. {}",
                primary.content, secondary.content
            );
            match extractor.extract(&prompt).await {
                Ok(batch) => {
                    if let Some(note) = batch.notes.first() {
                        merged.content = note.content.clone();
                        merged.id = note_id(&merged.content);
                    }
                }
                Err(e) => {
                    tracing::warn!("LLM consolidation failed, keeping primary content: {e}");
                }
            }
        }

        merged.importance = primary.importance.max(secondary.importance);
        merged.access_count = primary.access_count + secondary.access_count;
        merged.created_at = primary.created_at.min(secondary.created_at);
        merged.updated_at = primary.updated_at.max(secondary.updated_at);
        merged.last_accessed = primary.last_accessed.max(secondary.last_accessed);
        for record in &secondary.source_history {
            if !merged.source_history.contains(record) {
                merged.source_history.push(record.clone());
            }
        }
        if merged.embedding.is_none() {
            merged.embedding = secondary.embedding.clone();
        }
        for (k, v) in &secondary.metadata {
            merged
                .metadata
                .entry(k.clone())
                .or_insert_with(|| v.clone());
        }

        if merged.id != primary.id {
            // LLM mode rewrote the content; the hash id moves with it
            self.notes.delete(&primary.id).await?;
        }
        self.notes.put_back(&merged).await?;

        Ok((merged, secondary.id.clone()))
    }

    /// Find duplicates, merge each pair, and archive the losing note.
    ///
    /// Safe to re-run: consolidated secondaries are gone from the live
    /// store, so an interrupted pass picks up only the remaining pairs.
    pub async fn run_consolidation_pass(&self) -> Result<ConsolidationReport> {
        let pairs = self.find_similar(None).await?;
        let mut report = ConsolidationReport {
            pairs_found: pairs.len(),
            ..Default::default()
        };

        let mut consumed: Vec<String> = Vec::new();
        for pair in &pairs {
            if consumed.contains(&pair.a.id) || consumed.contains(&pair.b.id) {
                continue;
            }

            match self
                .consolidate(&pair.a, &pair.b, ConsolidationMode::Simple)
                .await
            {
                Ok((merged, secondary_id)) => {
                    if let Err(e) = self
                        .archive
                        .archive(self.notes, &secondary_id, "consolidated duplicate", true)
                        .await
                    {
                        tracing::warn!("Failed to archive consolidated note {secondary_id}: {e}");
                        report.errors += 1;
                        continue;
                    }
                    consumed.push(secondary_id);
                    consumed.push(merged.id.clone());
                    report.consolidated += 1;
                }
                Err(e) => {
                    tracing::warn!("Consolidation failed: {e}");
                    report.errors += 1;
                }
            }
        }

        if report.pairs_found > 0 {
            tracing::info!(
                "Consolidation pass: {} pairs, {} merged, {} errors at {}",
                report.pairs_found,
                report.consolidated,
                report.errors,
                Utc::now()
            );
        }

        Ok(report)
    }

    /// Whether the live note count has outgrown the configured ceiling
    pub async fn should_consolidate(&self) -> Result<bool> {
        Ok(self.notes.count().await? > self.config.note_ceiling)
    }
}
