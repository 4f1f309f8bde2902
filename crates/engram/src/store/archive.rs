//! Archive manager: append-only cold storage for notes
//!
//! The ledger is one self-contained JSON record per line and is never
//! rewritten in place, except by the explicit retention purge. Archiving
//! appends (and syncs) the record before the live-store delete is
//! attempted, so a crash mid-operation can leave a note in both places but
//! never in neither. Restoring copies the record back into the live store
//! and leaves the ledger history intact, adding a restore marker.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{EngramError, Result};
use crate::memory::scoring::ImportanceScorer;
use crate::memory::types::Note;
use crate::store::document::DocumentFile;
use crate::store::vector::NoteStore;

/// One line of the archive ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum ArchiveRecord {
    /// A note moved into cold storage
    Archived {
        /// The full note at archival time; restore needs nothing else
        note: Note,
        /// Why it was archived
        reason: String,
        /// When it was archived
        archived_at: DateTime<Utc>,
    },
    /// A previously archived note copied back into the live store
    Restored {
        /// Id of the restored note
        note_id: String,
        /// When it was restored
        restored_at: DateTime<Utc>,
    },
}

/// Append-only cold storage with a restore path.
pub struct ArchiveManager {
    ledger: DocumentFile,
}

impl ArchiveManager {
    /// Bind to the ledger file at the given path
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            ledger: DocumentFile::new(path.as_ref())?,
        })
    }

    /// Archive a live note.
    ///
    /// The ledger append is durable before the live-store delete runs.
    /// Unknown ids signal [`EngramError::NoteNotFound`].
    pub async fn archive(
        &self,
        notes: &NoteStore,
        id: &str,
        reason: &str,
        remove_from_store: bool,
    ) -> Result<()> {
        let note = notes
            .get(id)
            .await?
            .ok_or_else(|| EngramError::NoteNotFound { id: id.to_string() })?;

        let record = ArchiveRecord::Archived {
            note,
            reason: reason.to_string(),
            archived_at: Utc::now(),
        };
        self.append(&record)?;

        if remove_from_store {
            notes.delete(id).await?;
        }

        tracing::debug!("Archived note {id}: {reason}");
        Ok(())
    }

    /// Copy an archived note back into the live store with an importance
    /// boost (clamped). The archive record stays in place; a restore
    /// marker is appended. Returns `None` when the id was never archived.
    pub async fn restore(&self, notes: &NoteStore, id: &str, boost: f32) -> Result<Option<Note>> {
        let mut candidate: Option<Note> = None;
        for record in self.records()? {
            if let ArchiveRecord::Archived { note, .. } = record {
                if note.id == id {
                    candidate = Some(note);
                }
            }
        }

        let Some(mut note) = candidate else {
            return Ok(None);
        };

        note.apply_boost(boost);
        note.updated_at = Utc::now();

        if !notes.put_back(&note).await? {
            // Vector layer disabled; the ledger keeps the note recoverable
            return Ok(None);
        }

        self.append(&ArchiveRecord::Restored {
            note_id: id.to_string(),
            restored_at: Utc::now(),
        })?;

        tracing::debug!("Restored note {id} with boost {boost}");
        Ok(Some(note))
    }

    /// Archive every live note whose decayed importance is below the
    /// threshold. Returns the archived ids.
    pub async fn archive_low_importance(
        &self,
        notes: &NoteStore,
        scorer: &ImportanceScorer,
        threshold: f32,
    ) -> Result<Vec<String>> {
        let now = Utc::now();
        let mut archived = Vec::new();
        for note in notes.list().await? {
            if scorer.decay(&note, now) < threshold {
                self.archive(notes, &note.id, "importance below archive threshold", true)
                    .await?;
                archived.push(note.id);
            }
        }
        Ok(archived)
    }

    /// Keyword search over archived records, newest first.
    ///
    /// Matches case-insensitively against content and reason. Records
    /// whose note was later restored are excluded unless
    /// `include_restored` is set.
    pub fn search_archive(
        &self,
        query: &str,
        limit: usize,
        include_restored: bool,
    ) -> Result<Vec<ArchiveRecord>> {
        let records = self.records()?;

        let restored_ids: Vec<&str> = records
            .iter()
            .filter_map(|r| match r {
                ArchiveRecord::Restored { note_id, .. } => Some(note_id.as_str()),
                _ => None,
            })
            .collect();

        let needle = query.to_lowercase();
        let mut hits: Vec<ArchiveRecord> = records
            .iter()
            .filter(|r| {
                let ArchiveRecord::Archived { note, reason, .. } = r else {
                    return false;
                };
                if !include_restored && restored_ids.contains(&note.id.as_str()) {
                    return false;
                }
                note.content.to_lowercase().contains(&needle)
                    || reason.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect();

        hits.reverse();
        hits.truncate(limit);
        Ok(hits)
    }

    /// Drop ledger entries older than the retention window.
    ///
    /// This is the one sanctioned rewrite of the ledger; it happens as a
    /// single atomic replace. Returns the number of entries dropped.
    pub fn purge_old_archives(&self, days: i64) -> Result<usize> {
        let cutoff = Utc::now() - Duration::days(days);

        self.ledger.mutate(|current| {
            let Some(current) = current else {
                return Ok((None, 0));
            };

            let mut kept = Vec::new();
            let mut dropped = 0usize;
            for line in current.lines().filter(|l| !l.trim().is_empty()) {
                let Ok(record) = serde_json::from_str::<ArchiveRecord>(line) else {
                    tracing::warn!("Skipping malformed archive record during purge");
                    dropped += 1;
                    continue;
                };
                let stamp = match &record {
                    ArchiveRecord::Archived { archived_at, .. } => *archived_at,
                    ArchiveRecord::Restored { restored_at, .. } => *restored_at,
                };
                if stamp >= cutoff {
                    kept.push(line.to_string());
                } else {
                    dropped += 1;
                }
            }

            if dropped == 0 {
                return Ok((None, 0));
            }

            let mut contents = kept.join("\n");
            if !contents.is_empty() {
                contents.push('\n');
            }
            Ok((Some(contents), dropped))
        })
    }

    /// All parseable ledger records, oldest first. Malformed lines are
    /// skipped with a warning so one bad write cannot poison the history.
    pub fn records(&self) -> Result<Vec<ArchiveRecord>> {
        let Some(contents) = self.ledger.read()? else {
            return Ok(Vec::new());
        };

        let mut records = Vec::new();
        for line in contents.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str(line) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("Skipping malformed archive record: {e}"),
            }
        }
        Ok(records)
    }

    fn append(&self, record: &ArchiveRecord) -> Result<()> {
        let line = serde_json::to_string(record)
            .map_err(|e| EngramError::Serialization(e.to_string()))?;
        self.ledger.append_line(&line)
    }
}
