//! Configuration for the Engram memory subsystem
//!
//! Values resolve in a fixed order: environment override (`ENGRAM_*`),
//! then externally supplied TOML, then the hardcoded default.

use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{EngramError, Result};

/// Main configuration structure for Engram
#[derive(Debug, Clone, Deserialize, Default)]
pub struct EngramConfig {
    /// File-backed store locations
    #[serde(default)]
    pub storage: StorageConfig,
    /// Numeric knobs for scoring, decay, dedup, and archival
    #[serde(default)]
    pub thresholds: ThresholdConfig,
    /// Vector note store backend
    #[serde(default)]
    pub vector: VectorBackendConfig,
    /// Graph store backend
    #[serde(default)]
    pub graph: GraphBackendConfig,
}

/// Locations of the file-backed stores
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Base directory for all storage data
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".engram"))
        .unwrap_or_else(|| PathBuf::from(".engram"))
}

/// Numeric knobs consumed across the subsystem
#[derive(Debug, Clone, Deserialize)]
pub struct ThresholdConfig {
    /// Importance at or above which a note qualifies for core promotion
    #[serde(default = "default_promotion_threshold")]
    pub promotion: f32,
    /// Decayed importance below which a note is archived
    #[serde(default = "default_archive_threshold")]
    pub archive: f32,
    /// Minimum decayed importance for inclusion in context assembly
    #[serde(default = "default_retrieval_min")]
    pub retrieval_min: f32,
    /// Base per-day decay rate for new notes
    #[serde(default = "default_decay_rate")]
    pub decay_rate: f32,
    /// Cosine similarity at or above which two notes are duplicates
    #[serde(default = "default_dedup_similarity")]
    pub dedup_similarity: f32,
    /// Live note count above which consolidation should run
    #[serde(default = "default_working_ceiling")]
    pub working_ceiling: usize,
    /// Days archived records are retained before purging
    #[serde(default = "default_archive_retention_days")]
    pub archive_retention_days: i64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            promotion: default_promotion_threshold(),
            archive: default_archive_threshold(),
            retrieval_min: default_retrieval_min(),
            decay_rate: default_decay_rate(),
            dedup_similarity: default_dedup_similarity(),
            working_ceiling: default_working_ceiling(),
            archive_retention_days: default_archive_retention_days(),
        }
    }
}

fn default_promotion_threshold() -> f32 {
    0.8
}

fn default_archive_threshold() -> f32 {
    0.05
}

fn default_retrieval_min() -> f32 {
    0.2
}

fn default_decay_rate() -> f32 {
    0.01
}

fn default_dedup_similarity() -> f32 {
    0.85
}

fn default_working_ceiling() -> usize {
    100
}

fn default_archive_retention_days() -> i64 {
    90
}

/// Vector note store backend configuration
#[derive(Debug, Clone, Deserialize)]
pub struct VectorBackendConfig {
    /// Whether the vector layer is enabled at all
    #[serde(default = "default_backend_enabled")]
    pub enabled: bool,
    /// Backend URI; defaults to `<data_dir>/notes` when unset
    #[serde(default)]
    pub uri: Option<String>,
    /// Embedding dimension the backend is created with
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,
}

impl Default for VectorBackendConfig {
    fn default() -> Self {
        Self {
            enabled: default_backend_enabled(),
            uri: None,
            embedding_dimension: default_embedding_dimension(),
        }
    }
}

/// Graph store backend configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GraphBackendConfig {
    /// Whether the graph layer is enabled at all
    #[serde(default = "default_backend_enabled")]
    pub enabled: bool,
    /// Backend URI for service-backed deployments; unset means in-process
    #[serde(default)]
    pub uri: Option<String>,
}

impl Default for GraphBackendConfig {
    fn default() -> Self {
        Self {
            enabled: default_backend_enabled(),
            uri: None,
        }
    }
}

fn default_backend_enabled() -> bool {
    true
}

fn default_embedding_dimension() -> usize {
    384
}

impl EngramConfig {
    /// Load configuration from an optional TOML file, then apply
    /// environment overrides on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                tracing::info!("Loading config from: {}", path.display());
                let content = std::fs::read_to_string(path).map_err(|e| {
                    EngramError::Config(format!(
                        "Failed to read config file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                toml::from_str(&content)
                    .map_err(|e| EngramError::Config(format!("Failed to parse config: {e}")))?
            }
            None => {
                tracing::debug!("No config file supplied, using defaults");
                EngramConfig::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `ENGRAM_*` environment variables over the current values.
    ///
    /// Unparseable values are ignored with a warning rather than failing
    /// startup.
    pub fn apply_env_overrides(&mut self) {
        if let Some(dir) = env_var("ENGRAM_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
        override_f32("ENGRAM_PROMOTION_THRESHOLD", &mut self.thresholds.promotion);
        override_f32("ENGRAM_ARCHIVE_THRESHOLD", &mut self.thresholds.archive);
        override_f32("ENGRAM_RETRIEVAL_MIN", &mut self.thresholds.retrieval_min);
        override_f32("ENGRAM_DECAY_RATE", &mut self.thresholds.decay_rate);
        override_f32(
            "ENGRAM_DEDUP_SIMILARITY",
            &mut self.thresholds.dedup_similarity,
        );
        if let Some(value) = env_var("ENGRAM_WORKING_CEILING") {
            match value.parse() {
                Ok(parsed) => self.thresholds.working_ceiling = parsed,
                Err(_) => tracing::warn!("Ignoring unparseable ENGRAM_WORKING_CEILING={value}"),
            }
        }
        if let Some(value) = env_var("ENGRAM_ARCHIVE_RETENTION_DAYS") {
            match value.parse() {
                Ok(parsed) => self.thresholds.archive_retention_days = parsed,
                Err(_) => {
                    tracing::warn!("Ignoring unparseable ENGRAM_ARCHIVE_RETENTION_DAYS={value}")
                }
            }
        }
        override_bool("ENGRAM_VECTOR_ENABLED", &mut self.vector.enabled);
        override_bool("ENGRAM_GRAPH_ENABLED", &mut self.graph.enabled);
        if let Some(uri) = env_var("ENGRAM_VECTOR_URI") {
            self.vector.uri = Some(uri);
        }
        if let Some(uri) = env_var("ENGRAM_GRAPH_URI") {
            self.graph.uri = Some(uri);
        }
    }

    /// Resolved location of the vector backend
    pub fn vector_uri(&self) -> PathBuf {
        match &self.vector.uri {
            Some(uri) => PathBuf::from(uri),
            None => self.storage.data_dir.join("notes"),
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn override_f32(name: &str, slot: &mut f32) {
    if let Some(value) = env_var(name) {
        match value.parse() {
            Ok(parsed) => *slot = parsed,
            Err(_) => tracing::warn!("Ignoring unparseable {name}={value}"),
        }
    }
}

fn override_bool(name: &str, slot: &mut bool) {
    if let Some(value) = env_var(name) {
        match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => *slot = true,
            "0" | "false" | "no" | "off" => *slot = false,
            _ => tracing::warn!("Ignoring unparseable {name}={value}"),
        }
    }
}
