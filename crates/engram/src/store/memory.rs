//! In-process note backend
//!
//! Exhaustive-scan vector search over a hash map. Used by the test suites
//! and as the backend of choice for single-process deployments that do not
//! want an on-disk vector database.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::embedding::cosine_similarity;
use crate::error::Result;
use crate::memory::types::{Note, Section};
use crate::store::vector::NoteBackend;

/// In-memory [`NoteBackend`] implementation.
#[derive(Debug, Default)]
pub struct MemoryNoteBackend {
    notes: RwLock<HashMap<String, Note>>,
}

impl MemoryNoteBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NoteBackend for MemoryNoteBackend {
    async fn insert(&self, note: &Note) -> Result<()> {
        self.notes
            .write()
            .await
            .insert(note.id.clone(), note.clone());
        Ok(())
    }

    async fn replace(&self, note: &Note) -> Result<bool> {
        let mut notes = self.notes.write().await;
        if !notes.contains_key(&note.id) {
            return Ok(false);
        }
        notes.insert(note.id.clone(), note.clone());
        Ok(true)
    }

    async fn get(&self, id: &str) -> Result<Option<Note>> {
        Ok(self.notes.read().await.get(id).cloned())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.notes.write().await.remove(id).is_some())
    }

    async fn search(
        &self,
        embedding: &[f32],
        section: Option<Section>,
        limit: usize,
    ) -> Result<Vec<Note>> {
        let notes = self.notes.read().await;

        let mut candidates: Vec<(f32, &Note)> = notes
            .values()
            .filter(|n| section.is_none_or(|s| n.section == s))
            .filter_map(|n| {
                n.embedding
                    .as_deref()
                    .map(|e| (cosine_similarity(embedding, e), n))
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| b.1.updated_at.cmp(&a.1.updated_at))
        });

        Ok(candidates
            .into_iter()
            .take(limit)
            .map(|(_, n)| n.clone())
            .collect())
    }

    async fn list(&self) -> Result<Vec<Note>> {
        Ok(self.notes.read().await.values().cloned().collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.notes.read().await.len())
    }
}
