//! Extraction collaborator seam and tolerant output parsing
//!
//! An external LLM agent turns raw conversation or file content into a
//! structured batch of notes, entities, and relationships. Its output is
//! frequently wrapped in conversational text or code fences, so the parser
//! here locates the first balanced JSON object in the response and parses
//! only that span. When no balanced object exists the batch is treated as
//! empty; extraction failures never abort the caller's turn.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Structured output of one extraction pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionBatch {
    /// One-paragraph summary of the analyzed content
    #[serde(default)]
    pub overview: Option<String>,
    /// Notes to store
    #[serde(default)]
    pub notes: Vec<ExtractedNote>,
    /// Entities to create or update
    #[serde(default)]
    pub entities: Vec<ExtractedEntity>,
    /// Relationships between extracted entities
    #[serde(default)]
    pub relationships: Vec<ExtractedRelationship>,
}

impl ExtractionBatch {
    /// The empty-extraction sentinel
    pub fn empty() -> Self {
        Self::default()
    }

    /// True when the batch carries nothing to ingest
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty() && self.entities.is_empty() && self.relationships.is_empty()
    }
}

/// A note as produced by the extraction agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedNote {
    /// Note content
    pub content: String,
    /// Section heading the agent filed this under, if any
    #[serde(default)]
    pub section: Option<String>,
    /// Importance hint in [0, 1], blended into scoring when present
    #[serde(default)]
    pub importance: Option<f32>,
}

/// An entity as produced by the extraction agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedEntity {
    /// Entity name
    pub name: String,
    /// Type label, e.g. "Person" or "Concept"
    #[serde(rename = "type", default)]
    pub entity_type: Option<String>,
    /// Short description
    #[serde(default)]
    pub description: Option<String>,
    /// Alternative names seen for this entity
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// A relationship as produced by the extraction agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedRelationship {
    /// Source entity name
    pub source: String,
    /// Target entity name
    pub target: String,
    /// Relationship type, e.g. "WORKS_ON"
    #[serde(rename = "type")]
    pub rel_type: String,
    /// Free-form description of the relationship
    #[serde(default)]
    pub description: Option<String>,
    /// Confidence in [0, 1]
    #[serde(default)]
    pub confidence: Option<f32>,
    /// Supporting quotes from the analyzed content
    #[serde(default)]
    pub evidence: Vec<String>,
}

/// External LLM extraction agent.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Analyze conversation or file content and produce a structured batch.
    ///
    /// Implementations should return the raw model output run through
    /// [`parse_extraction`] so malformed responses degrade to an empty
    /// batch instead of an error.
    async fn extract(&self, input: &str) -> Result<ExtractionBatch>;
}

/// Parse extraction-agent output into a batch.
///
/// Locates the first balanced JSON object in the text and parses only that
/// span. Returns the empty-batch sentinel when no balanced object exists or
/// the span fails to deserialize.
pub fn parse_extraction(text: &str) -> ExtractionBatch {
    let Some(span) = find_json_span(text) else {
        tracing::debug!("No balanced JSON object in extraction output, treating batch as empty");
        return ExtractionBatch::empty();
    };

    match serde_json::from_str(span) {
        Ok(batch) => batch,
        Err(e) => {
            tracing::warn!("Failed to parse extraction JSON span: {e}");
            ExtractionBatch::empty()
        }
    }
}

/// Find the first balanced `{ ... }` span in the text.
///
/// The scan is string-aware: braces inside JSON string literals (including
/// escaped quotes) do not affect the depth count.
pub fn find_json_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}
