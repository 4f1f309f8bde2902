//! Memory types for the Engram system
//!
//! Defines core data structures for storing and retrieving extracted
//! knowledge: notes with embeddings and importance, protected core items,
//! and the provenance records attached to both.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Default per-day decay rate applied to a note's importance.
pub const DEFAULT_DECAY_RATE: f32 = 0.01;

/// Compute the stable identifier for note content.
///
/// Ids are the hex SHA-256 of the content, so re-extracting the same fact
/// always lands on the same row.
pub fn note_id(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// A single note stored in the vector note store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    /// Stable identifier (hex SHA-256 of content)
    pub id: String,
    /// The actual content of the note
    pub content: String,
    /// Which section this note belongs to
    pub section: Section,
    /// Vector embedding, if one has been generated
    pub embedding: Option<Vec<f32>>,
    /// Current importance score in [0, 1]
    pub importance: f32,
    /// Per-day decay rate applied to importance
    pub decay_rate: f32,
    /// How many times this note has been used in context assembly
    pub access_count: u32,
    /// When this note was created
    pub created_at: DateTime<Utc>,
    /// When this note was last written
    pub updated_at: DateTime<Utc>,
    /// When this note was last used
    pub last_accessed: DateTime<Utc>,
    /// Most recent provenance record
    pub source: Option<SourceRecord>,
    /// Ordered provenance history
    pub source_history: Vec<SourceRecord>,
    /// Free-form metadata attached at ingestion time
    pub metadata: BTreeMap<String, String>,
}

impl Note {
    /// Create a new note with default values
    pub fn new(content: impl Into<String>, section: Section) -> Self {
        let content = content.into();
        let now = Utc::now();
        Self {
            id: note_id(&content),
            content,
            section,
            embedding: None,
            importance: 0.5,
            decay_rate: DEFAULT_DECAY_RATE,
            access_count: 0,
            created_at: now,
            updated_at: now,
            last_accessed: now,
            source: None,
            source_history: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Set the embedding vector
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Set the importance score (clamped to [0, 1])
    pub fn with_importance(mut self, importance: f32) -> Self {
        self.importance = importance.clamp(0.0, 1.0);
        self
    }

    /// Attach a provenance record, recording it in the history as well
    pub fn with_source(mut self, source: SourceRecord) -> Self {
        self.source_history.push(source.clone());
        self.source = Some(source);
        self
    }

    /// Mark this note as accessed, updating access count and timestamp
    pub fn mark_accessed(&mut self) {
        self.access_count += 1;
        self.last_accessed = Utc::now();
    }

    /// Update the importance of this note, clamping to [0, 1]
    pub fn set_importance(&mut self, importance: f32) {
        self.importance = importance.clamp(0.0, 1.0);
    }

    /// Raise importance by `boost`, clamping to [0, 1]
    pub fn apply_boost(&mut self, boost: f32) {
        self.set_importance(self.importance + boost);
    }
}

/// The fixed set of sections notes are filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Section {
    /// Themes the conversation keeps returning to
    KeyTopics,
    /// Standalone facts worth keeping
    ImportantFacts,
    /// People and named entities
    PeopleEntities,
    /// Work in progress across sessions
    OngoingThreads,
    /// Knowledge extracted from files
    FileKnowledge,
}

impl Section {
    /// All sections, in document order
    pub const ALL: [Section; 5] = [
        Section::KeyTopics,
        Section::ImportantFacts,
        Section::PeopleEntities,
        Section::OngoingThreads,
        Section::FileKnowledge,
    ];

    /// Human-readable heading used in persisted documents
    pub fn heading(&self) -> &'static str {
        match self {
            Section::KeyTopics => "Key Topics",
            Section::ImportantFacts => "Important Facts",
            Section::PeopleEntities => "People & Entities",
            Section::OngoingThreads => "Ongoing Threads",
            Section::FileKnowledge => "File Knowledge",
        }
    }

    /// Parse a heading back into a section
    pub fn from_heading(heading: &str) -> Option<Section> {
        Section::ALL
            .into_iter()
            .find(|s| s.heading().eq_ignore_ascii_case(heading.trim()))
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.heading())
    }
}

/// Where a note or graph element originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceType {
    /// Extracted from a conversation session
    Conversation,
    /// Extracted from a file on disk
    File,
}

/// Provenance record attached to notes and graph elements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Conversation or file origin
    pub source_type: SourceType,
    /// Session id, for conversation sources
    pub session_id: Option<String>,
    /// File path, for file sources
    pub file_path: Option<String>,
    /// Content checksum at extraction time
    pub checksum: Option<String>,
    /// VCS commit the file was read at, when known
    pub commit: Option<String>,
    /// Whether the origin has been verified to still match the checksum
    pub verified: bool,
}

impl SourceRecord {
    /// Provenance record for a conversation session
    pub fn conversation(session_id: impl Into<String>) -> Self {
        Self {
            source_type: SourceType::Conversation,
            session_id: Some(session_id.into()),
            file_path: None,
            checksum: None,
            commit: None,
            verified: false,
        }
    }

    /// Provenance record for a file
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            source_type: SourceType::File,
            session_id: None,
            file_path: Some(path.into()),
            checksum: None,
            commit: None,
            verified: false,
        }
    }

    /// Attach a content checksum
    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    /// Opaque identifier used to link graph elements back to this source
    pub fn source_id(&self) -> String {
        match self.source_type {
            SourceType::Conversation => {
                format!("conversation:{}", self.session_id.as_deref().unwrap_or(""))
            }
            SourceType::File => format!("file:{}", self.file_path.as_deref().unwrap_or("")),
        }
    }
}

/// Categories of protected core knowledge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoreCategory {
    /// Who the user is
    Identity,
    /// What the user is working on
    Projects,
    /// Who the user knows
    Relationships,
    /// How this agent is expected to behave
    System,
}

impl CoreCategory {
    /// All categories, in document order
    pub const ALL: [CoreCategory; 4] = [
        CoreCategory::Identity,
        CoreCategory::Projects,
        CoreCategory::Relationships,
        CoreCategory::System,
    ];

    /// Heading used in the persisted core document
    pub fn heading(&self) -> &'static str {
        match self {
            CoreCategory::Identity => "Identity",
            CoreCategory::Projects => "Projects",
            CoreCategory::Relationships => "Relationships",
            CoreCategory::System => "System",
        }
    }

    /// Parse a heading back into a category
    pub fn from_heading(heading: &str) -> Option<CoreCategory> {
        CoreCategory::ALL
            .into_iter()
            .find(|c| c.heading().eq_ignore_ascii_case(heading.trim()))
    }
}

impl std::fmt::Display for CoreCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.heading())
    }
}

/// A protected key fact. Never decayed, archived, or auto-deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreItem {
    /// Which category the fact belongs to
    pub category: CoreCategory,
    /// The fact itself
    pub content: String,
    /// When it was added
    pub added_at: DateTime<Utc>,
    /// Where it came from
    pub source: Option<SourceRecord>,
}

impl CoreItem {
    /// Create a new core item stamped with the current time
    pub fn new(content: impl Into<String>, category: CoreCategory) -> Self {
        Self {
            category,
            content: content.into(),
            added_at: Utc::now(),
            source: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_id_is_stable() {
        assert_eq!(note_id("User likes coffee"), note_id("User likes coffee"));
        assert_ne!(note_id("User likes coffee"), note_id("User likes tea"));
    }

    #[test]
    fn test_note_new_defaults() {
        let note = Note::new("Test content", Section::ImportantFacts);

        assert_eq!(note.id, note_id("Test content"));
        assert_eq!(note.importance, 0.5);
        assert_eq!(note.decay_rate, DEFAULT_DECAY_RATE);
        assert_eq!(note.access_count, 0);
        assert!(note.embedding.is_none());
        assert!(note.source.is_none());
        assert!(note.source_history.is_empty());
    }

    #[test]
    fn test_note_serialization() {
        let note = Note::new("Test content", Section::KeyTopics)
            .with_embedding(vec![0.1; 8])
            .with_source(SourceRecord::conversation("sess-1"));

        let json = serde_json::to_string(&note).expect("Failed to serialize note");
        let deserialized: Note = serde_json::from_str(&json).expect("Failed to deserialize note");

        assert_eq!(note.id, deserialized.id);
        assert_eq!(note.content, deserialized.content);
        assert_eq!(note.section, deserialized.section);
        assert_eq!(note.source_history.len(), deserialized.source_history.len());
    }

    #[test]
    fn test_note_mark_accessed() {
        let mut note = Note::new("Test", Section::OngoingThreads);
        let before = note.last_accessed;

        note.mark_accessed();

        assert_eq!(note.access_count, 1);
        assert!(note.last_accessed >= before);
    }

    #[test]
    fn test_note_importance_clamping() {
        let mut note = Note::new("Test", Section::ImportantFacts);

        note.set_importance(0.7);
        assert_eq!(note.importance, 0.7);

        note.set_importance(1.5);
        assert_eq!(note.importance, 1.0);

        note.set_importance(-0.5);
        assert_eq!(note.importance, 0.0);

        note.set_importance(0.95);
        note.apply_boost(0.2);
        assert_eq!(note.importance, 1.0);
    }

    #[test]
    fn test_section_heading_round_trip() {
        for section in Section::ALL {
            assert_eq!(Section::from_heading(section.heading()), Some(section));
        }
        assert_eq!(Section::from_heading("No Such Section"), None);
    }

    #[test]
    fn test_core_category_heading_round_trip() {
        for category in CoreCategory::ALL {
            assert_eq!(CoreCategory::from_heading(category.heading()), Some(category));
        }
    }

    #[test]
    fn test_source_record_source_id() {
        let conv = SourceRecord::conversation("sess-42");
        assert_eq!(conv.source_id(), "conversation:sess-42");

        let file = SourceRecord::file("/tmp/notes.md");
        assert_eq!(file.source_id(), "file:/tmp/notes.md");
    }
}
