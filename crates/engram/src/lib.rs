//! Engram - Multi-layer memory subsystem for long-running conversational agents
//!
//! Turns extracted conversation and file content into durable, retrievable
//! knowledge across five layers: protected core facts, per-session working
//! notes, vector-indexed notes with importance decay, an append-only
//! archive, and an entity/relationship graph. A retrieval aggregator
//! composes a ranked, cited context package from all layers for each turn,
//! while maintenance passes handle reinforcement, decay, deduplication,
//! archival, promotion, and entity merging.

pub mod config;
pub mod embedding;
pub mod error;
pub mod extraction;
pub mod graph;
pub mod memory;
pub mod store;
pub mod testing;

pub use config::EngramConfig;
pub use error::{EngramError, Result};
pub use memory::{HealthReport, MemorySystem};
