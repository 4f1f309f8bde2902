//! Storage layers for Engram
//!
//! The vector note store sits above a pluggable [`NoteBackend`]; the core,
//! working, and archive stores are file-backed with whole-file locking.

pub mod archive;
pub mod core;
pub(crate) mod document;
pub mod lance;
pub mod memory;
pub mod vector;
pub mod working;

pub use self::archive::{ArchiveManager, ArchiveRecord};
pub use self::core::CoreStore;
pub use self::lance::LanceNoteBackend;
pub use self::memory::MemoryNoteBackend;
pub use self::vector::{NoteBackend, NoteDraft, NoteStore, ScoredNote};
pub use self::working::{DiffOutcome, WorkingSet, WorkingStore};

use serde::{Deserialize, Serialize};

/// Connectivity status of a pluggable backend, for the health surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendStatus {
    /// The layer is live and serving calls
    Connected,
    /// The layer is disabled; its calls are no-ops returning empty results
    Unavailable,
}
