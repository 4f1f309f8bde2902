//! Embedding provider seam
//!
//! Embedding generation is an external collaborator. The subsystem consumes
//! it through the [`Embedder`] trait and never assumes a particular model or
//! transport; callers hand in whatever implementation they run.

use crate::error::Result;

/// Black-box embedding provider: text in, vector out.
pub trait Embedder: Send + Sync {
    /// Generate an embedding for the given text
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Dimension of the vectors this provider produces
    fn dimension(&self) -> usize;
}

/// Cosine similarity between two vectors, clamped to [-1, 1].
///
/// Mismatched lengths and zero vectors compare as 0.0 rather than erroring,
/// so a note stored under a different model dimension simply never matches.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}
