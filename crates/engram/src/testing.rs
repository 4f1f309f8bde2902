//! Test utilities for engram - deterministic collaborator stand-ins
//!
//! The embedding provider and extraction agent are external collaborators;
//! these mocks let the test suites exercise the subsystem without any
//! model or network access.

use async_trait::async_trait;

use crate::embedding::Embedder;
use crate::error::Result;
use crate::extraction::{ExtractionBatch, Extractor, parse_extraction};

/// Mock embedder for fast unit tests that don't need real ML.
/// Produces deterministic 384-dimensional vectors based on input text hash.
#[derive(Debug, Clone, Default)]
pub struct MockEmbedder;

impl MockEmbedder {
    pub fn new() -> Self {
        Self
    }
}

impl Embedder for MockEmbedder {
    /// Generate a deterministic "embedding" from text using hashing.
    /// Identical texts map to identical vectors in range [-1, 1].
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let seed = hasher.finish();

        Ok((0..384)
            .map(|i| {
                // Use seed + index to generate pseudo-random but deterministic values
                let x = seed
                    .wrapping_mul(i as u64 + 1)
                    .wrapping_add(0x9e3779b97f4a7c15);
                let normalized = (x as f32) / (u64::MAX as f32);
                (normalized * 2.0) - 1.0 // Range [-1, 1]
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        384
    }
}

/// Mock extractor that replays a fixed response through the tolerant
/// parser, exactly as a real LLM-backed implementation would.
#[derive(Debug, Clone, Default)]
pub struct FixedExtractor {
    response: String,
}

impl FixedExtractor {
    /// Always respond with the given raw model output
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
        }
    }
}

#[async_trait]
impl Extractor for FixedExtractor {
    async fn extract(&self, _input: &str) -> Result<ExtractionBatch> {
        Ok(parse_extraction(&self.response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_embedding_is_deterministic() {
        let model = MockEmbedder::new();
        let emb1 = model.embed("hello world").unwrap();
        let emb2 = model.embed("hello world").unwrap();
        assert_eq!(emb1, emb2);
    }

    #[test]
    fn mock_embedding_has_correct_dimensions() {
        let model = MockEmbedder::new();
        let emb = model.embed("test").unwrap();
        assert_eq!(emb.len(), 384);
        assert_eq!(model.dimension(), 384);
    }

    #[test]
    fn mock_embedding_values_in_range() {
        let model = MockEmbedder::new();
        let emb = model.embed("test input").unwrap();
        for val in &emb {
            assert!(*val >= -1.0 && *val <= 1.0, "Value {} out of range", val);
        }
    }

    #[test]
    fn mock_embedding_different_for_different_inputs() {
        let model = MockEmbedder::new();
        let emb1 = model.embed("hello").unwrap();
        let emb2 = model.embed("world").unwrap();
        assert_ne!(emb1, emb2);
    }

    #[tokio::test]
    async fn fixed_extractor_parses_its_response() {
        let extractor = FixedExtractor::new(
            r#"Here you go: {"notes": [{"content": "A remembered fact"}]}"#,
        );
        let batch = extractor.extract("ignored").await.unwrap();
        assert_eq!(batch.notes.len(), 1);
    }
}
