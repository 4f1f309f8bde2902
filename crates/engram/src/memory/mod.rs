//! Memory subsystem composition
//!
//! [`MemorySystem`] wires the configured layers together: protected core
//! facts, namespace-keyed working notes, the vector note store, the graph,
//! and the archive ledger, plus the scorer they share. Backends that fail
//! to initialize leave their layer disabled for the process lifetime
//! instead of failing the whole system.

pub mod dedup;
pub mod ingestion;
pub mod maintenance;
pub mod retrieval;
pub mod scoring;
pub mod types;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::EngramConfig;
use crate::embedding::Embedder;
use crate::error::Result;
use crate::extraction::Extractor;
use crate::graph::{GraphBackend, GraphStore, MemoryGraphBackend};
use crate::memory::dedup::DedupConfig;
use crate::memory::ingestion::{IngestReport, IngestionPipeline};
use crate::memory::maintenance::{MaintenanceConfig, MaintenancePass, MaintenanceReport};
use crate::memory::retrieval::{ContextPackage, ContextRetrievalAggregator};
use crate::memory::scoring::{ImportanceScorer, ScorerConfig};
use crate::memory::types::SourceRecord;
use crate::store::archive::ArchiveManager;
use crate::store::core::CoreStore;
use crate::store::lance::LanceNoteBackend;
use crate::store::vector::{NoteBackend, NoteStore};
use crate::store::working::WorkingSet;
use crate::store::BackendStatus;

/// Per-backend connectivity, for operational tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Vector note store backend
    pub vector_store: BackendStatus,
    /// Graph store backend
    pub graph_store: BackendStatus,
    /// File-backed core document
    pub core_store: BackendStatus,
    /// File-backed working documents
    pub working_store: BackendStatus,
    /// Archive ledger
    pub archive: BackendStatus,
}

/// The assembled multi-layer memory subsystem.
pub struct MemorySystem {
    config: EngramConfig,
    core: CoreStore,
    working: WorkingSet,
    notes: NoteStore,
    graph: GraphStore,
    archive: ArchiveManager,
    scorer: ImportanceScorer,
}

impl MemorySystem {
    /// Open the subsystem with the configured backends.
    ///
    /// The vector layer connects to LanceDB under the data directory; a
    /// connection failure is caught once here and leaves that layer
    /// disabled rather than erroring. The graph layer uses the in-process
    /// backend unless swapped via [`MemorySystem::with_backends`].
    pub async fn open(config: EngramConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.storage.data_dir)?;

        let notes = if config.vector.enabled {
            match LanceNoteBackend::connect(
                &config.vector_uri(),
                config.vector.embedding_dimension,
            )
            .await
            {
                Ok(backend) => NoteStore::new(Arc::new(backend)),
                Err(e) => {
                    tracing::warn!("Vector backend unreachable, disabling layer: {e}");
                    NoteStore::disabled()
                }
            }
        } else {
            NoteStore::disabled()
        };

        let graph = if config.graph.enabled {
            GraphStore::new(Arc::new(MemoryGraphBackend::new()))
        } else {
            GraphStore::disabled()
        };

        Self::assemble(config, notes, graph)
    }

    /// Open the subsystem over caller-supplied backends. Pass `None` for a
    /// layer to run it disabled.
    pub fn with_backends(
        config: EngramConfig,
        note_backend: Option<Arc<dyn NoteBackend>>,
        graph_backend: Option<Arc<dyn GraphBackend>>,
    ) -> Result<Self> {
        std::fs::create_dir_all(&config.storage.data_dir)?;

        let notes = match note_backend {
            Some(backend) => NoteStore::new(backend),
            None => NoteStore::disabled(),
        };
        let graph = match graph_backend {
            Some(backend) => GraphStore::new(backend),
            None => GraphStore::disabled(),
        };

        Self::assemble(config, notes, graph)
    }

    fn assemble(config: EngramConfig, notes: NoteStore, graph: GraphStore) -> Result<Self> {
        let data_dir = &config.storage.data_dir;
        let core = CoreStore::new(data_dir.join("core.md"), config.thresholds.promotion)?;
        let working = WorkingSet::new(data_dir.join("working"));
        let archive = ArchiveManager::new(data_dir.join("archive.jsonl"))?;

        let scorer = ImportanceScorer::with_config(ScorerConfig {
            archive_threshold: config.thresholds.archive,
            promotion_threshold: config.thresholds.promotion,
            retrieval_threshold: config.thresholds.retrieval_min,
            ..ScorerConfig::default()
        });

        tracing::info!("Memory subsystem ready at {}", data_dir.display());
        Ok(Self {
            config,
            core,
            working,
            notes,
            graph,
            archive,
            scorer,
        })
    }

    /// The active configuration
    pub fn config(&self) -> &EngramConfig {
        &self.config
    }

    /// Protected core facts
    pub fn core(&self) -> &CoreStore {
        &self.core
    }

    /// Namespace-keyed working notes
    pub fn working(&self) -> &WorkingSet {
        &self.working
    }

    /// Vector note store
    pub fn notes(&self) -> &NoteStore {
        &self.notes
    }

    /// Entity/relationship graph
    pub fn graph(&self) -> &GraphStore {
        &self.graph
    }

    /// Archive ledger
    pub fn archive(&self) -> &ArchiveManager {
        &self.archive
    }

    /// Shared importance scorer
    pub fn scorer(&self) -> &ImportanceScorer {
        &self.scorer
    }

    /// Run the extraction collaborator on raw content and write the batch
    /// into the note and graph layers with provenance.
    pub async fn ingest(
        &self,
        extractor: &dyn Extractor,
        embedder: &dyn Embedder,
        input: &str,
        source: &SourceRecord,
    ) -> Result<IngestReport> {
        IngestionPipeline::new(&self.notes, &self.graph, &self.scorer, embedder)
            .with_decay_rate(self.config.thresholds.decay_rate)
            .ingest(extractor, input, source)
            .await
    }

    /// Build the citation-indexed context package for a query
    pub async fn retrieve_context(
        &self,
        embedder: &dyn Embedder,
        query: &str,
    ) -> Result<ContextPackage> {
        ContextRetrievalAggregator::new(&self.core, &self.notes, &self.graph, &self.scorer, embedder)
            .retrieve(query)
            .await
    }

    /// Run one maintenance pass across all layers
    pub async fn run_maintenance(&self) -> Result<MaintenanceReport> {
        let config = MaintenanceConfig {
            archive_threshold: self.config.thresholds.archive,
            promotion_threshold: self.config.thresholds.promotion,
            archive_retention_days: self.config.thresholds.archive_retention_days,
            dedup: DedupConfig {
                similarity_threshold: self.config.thresholds.dedup_similarity,
                note_ceiling: self.config.thresholds.working_ceiling,
            },
            merge_entities: true,
        };

        MaintenancePass::new(
            &self.notes,
            &self.archive,
            &self.core,
            &self.graph,
            &self.scorer,
            config,
        )
        .run()
        .await
    }

    /// Per-backend status. File-backed layers are local and report
    /// connected; the pluggable layers report their live/disabled state.
    pub fn health(&self) -> HealthReport {
        HealthReport {
            vector_store: self.notes.status(),
            graph_store: self.graph.status(),
            core_store: BackendStatus::Connected,
            working_store: BackendStatus::Connected,
            archive: BackendStatus::Connected,
        }
    }
}
