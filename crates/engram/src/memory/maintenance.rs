//! Periodic maintenance passes
//!
//! Runs independently of the conversation loop: entity merging on the
//! graph side first, then note-side consolidation, archival of decayed
//! notes, core promotion, and archive retention. Decayed importance is
//! computed on read rather than rewritten in place, so cancelling a pass
//! mid-run loses nothing and re-running is a no-op on already-processed
//! items. The core store is only ever appended to here; nothing in a pass
//! decays, archives, or removes a core item.

use crate::error::Result;
use crate::graph::GraphStore;
use crate::memory::dedup::{ConsolidationReport, DedupConfig, Deduplicator};
use crate::memory::scoring::ImportanceScorer;
use crate::store::archive::ArchiveManager;
use crate::store::core::CoreStore;
use crate::store::vector::NoteStore;

/// Configuration for one maintenance pass
#[derive(Debug, Clone, Copy)]
pub struct MaintenanceConfig {
    /// Decayed importance below which notes are archived
    pub archive_threshold: f32,
    /// Raw importance at or above which notes are offered for promotion
    pub promotion_threshold: f32,
    /// Ledger retention window in days
    pub archive_retention_days: i64,
    /// Duplicate detection settings
    pub dedup: DedupConfig,
    /// Whether to merge fragmented graph entities automatically
    pub merge_entities: bool,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            archive_threshold: 0.05,
            promotion_threshold: 0.8,
            archive_retention_days: 90,
            dedup: DedupConfig::default(),
            merge_entities: true,
        }
    }
}

/// What one maintenance pass did.
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    /// Graph entities merged into their canonicals
    pub entities_merged: usize,
    /// Consolidation statistics
    pub consolidation: ConsolidationReport,
    /// Ids of notes archived for low importance
    pub notes_archived: Vec<String>,
    /// Notes copied into the core store
    pub notes_promoted: usize,
    /// Archive ledger entries dropped by retention
    pub archive_purged: usize,
}

/// Orchestrates the maintenance flow across stores.
///
/// Per the multi-backend ordering rule, graph-side effects run before
/// note-side effects; every per-item operation commits on its own, so an
/// interrupted pass resumes cleanly.
pub struct MaintenancePass<'a> {
    notes: &'a NoteStore,
    archive: &'a ArchiveManager,
    core: &'a CoreStore,
    graph: &'a GraphStore,
    scorer: &'a ImportanceScorer,
    config: MaintenanceConfig,
}

impl<'a> MaintenancePass<'a> {
    /// Create a pass with the given configuration
    pub fn new(
        notes: &'a NoteStore,
        archive: &'a ArchiveManager,
        core: &'a CoreStore,
        graph: &'a GraphStore,
        scorer: &'a ImportanceScorer,
        config: MaintenanceConfig,
    ) -> Self {
        Self {
            notes,
            archive,
            core,
            graph,
            scorer,
            config,
        }
    }

    /// Run the full pass
    pub async fn run(&self) -> Result<MaintenanceReport> {
        let mut report = MaintenanceReport::default();

        if self.config.merge_entities {
            report.entities_merged = self.merge_fragmented_entities().await?;
        }

        let dedup = Deduplicator::with_config(self.notes, self.archive, self.config.dedup);
        report.consolidation = dedup.run_consolidation_pass().await?;

        report.notes_archived = self
            .archive
            .archive_low_importance(self.notes, self.scorer, self.config.archive_threshold)
            .await?;

        report.notes_promoted = self.promote_to_core().await?;

        report.archive_purged = self
            .archive
            .purge_old_archives(self.config.archive_retention_days)?;

        tracing::info!(
            "Maintenance pass: {} entities merged, {} notes consolidated, {} archived, {} promoted, {} purged",
            report.entities_merged,
            report.consolidation.consolidated,
            report.notes_archived.len(),
            report.notes_promoted,
            report.archive_purged
        );
        Ok(report)
    }

    /// Merge same-kind entities whose names fragment one identity
    async fn merge_fragmented_entities(&self) -> Result<usize> {
        let mut consumed: Vec<String> = Vec::new();
        let mut merged = 0;
        for (canonical, secondary) in self.graph.merge_candidates().await? {
            if consumed.contains(&canonical) || consumed.contains(&secondary) {
                continue;
            }
            match self.graph.merge_entities(&canonical, &secondary).await {
                Ok(Some(_)) => {
                    consumed.push(secondary);
                    merged += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Entity merge {secondary} -> {canonical} failed: {e}");
                }
            }
        }
        Ok(merged)
    }

    /// Copy qualifying notes into the core store (copy, not move: the
    /// vector-store note stays live). Duplicate adds are rejected by the
    /// core store itself, which keeps re-runs idempotent.
    async fn promote_to_core(&self) -> Result<usize> {
        let notes = self.notes.list().await?;
        let mut promoted = 0;

        for note in self.scorer.promotion_candidates(&notes) {
            let Some(category) = self
                .core
                .suggest_promotion(&note.content, note.importance)
            else {
                continue;
            };
            if self.core.add(&note.content, category, note.source.clone())? {
                tracing::debug!("Promoted note {} into core ({category})", note.id);
                promoted += 1;
            }
        }

        Ok(promoted)
    }
}
