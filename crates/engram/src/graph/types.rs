//! Graph data model: labeled entities, typed relationships, provenance

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Type label carried by every entity. A labelless node must never exist;
/// the label is part of the entity's identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityKind {
    Person,
    Concept,
    Topic,
    Location,
    Event,
    Organization,
    /// Extraction may produce labels outside the fixed set
    Other(String),
}

impl EntityKind {
    /// The label string written to storage
    pub fn label(&self) -> &str {
        match self {
            EntityKind::Person => "Person",
            EntityKind::Concept => "Concept",
            EntityKind::Topic => "Topic",
            EntityKind::Location => "Location",
            EntityKind::Event => "Event",
            EntityKind::Organization => "Organization",
            EntityKind::Other(label) => label,
        }
    }

    /// Parse a label string; unknown labels become [`EntityKind::Other`]
    pub fn from_label(label: &str) -> EntityKind {
        match label {
            "Person" => EntityKind::Person,
            "Concept" => EntityKind::Concept,
            "Topic" => EntityKind::Topic,
            "Location" => EntityKind::Location,
            "Event" => EntityKind::Event,
            "Organization" => EntityKind::Organization,
            other => EntityKind::Other(other.to_string()),
        }
    }
}

impl From<String> for EntityKind {
    fn from(label: String) -> Self {
        EntityKind::from_label(&label)
    }
}

impl From<EntityKind> for String {
    fn from(kind: EntityKind) -> Self {
        kind.label().to_string()
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A node in the knowledge graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Type label; part of the identity key together with `name`
    pub kind: EntityKind,
    /// Primary key within the kind
    pub name: String,
    /// Preferred identifier the aliases resolve to
    pub canonical_name: String,
    /// Alternative names seen for this entity
    pub aliases: BTreeSet<String>,
    /// Short description, grown over time
    pub description: String,
    /// Embedding of name and description, when available
    pub embedding: Option<Vec<f32>>,
    /// Free-form properties from extraction
    pub properties: BTreeMap<String, String>,
    /// How many times this entity has been mentioned
    pub mention_count: u32,
    /// First time this entity was seen
    pub first_seen: DateTime<Utc>,
    /// Most recent time this entity was seen
    pub last_seen: DateTime<Utc>,
    /// Provenance source ids linked to this entity
    pub source_ids: Vec<String>,
}

impl Entity {
    /// Create a labeled entity with defaults
    pub fn new(kind: EntityKind, name: impl Into<String>) -> Self {
        let name = name.into();
        let now = Utc::now();
        Self {
            kind,
            canonical_name: name.clone(),
            name,
            aliases: BTreeSet::new(),
            description: String::new(),
            embedding: None,
            properties: BTreeMap::new(),
            mention_count: 1,
            first_seen: now,
            last_seen: now,
            source_ids: Vec::new(),
        }
    }
}

/// Fields supplied when creating or updating an entity.
#[derive(Debug, Clone, Default)]
pub struct EntityDraft {
    /// Short description
    pub description: Option<String>,
    /// Embedding vector
    pub embedding: Option<Vec<f32>>,
    /// Alternative names
    pub aliases: Vec<String>,
    /// Preferred identifier; defaults to the entity name
    pub canonical_name: Option<String>,
    /// Free-form properties
    pub properties: BTreeMap<String, String>,
    /// Provenance source id for this write
    pub source_id: Option<String>,
}

/// A typed edge between two entities, keyed by
/// `(source, target, rel_type)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    /// Source entity name
    pub source: String,
    /// Target entity name
    pub target: String,
    /// Relationship type, e.g. "WORKS_ON"
    pub rel_type: String,
    /// Free-form description
    pub description: String,
    /// Confidence in [0, 1]
    pub confidence: f32,
    /// Supporting quotes
    pub evidence: Vec<String>,
    /// How many times this relationship has been mentioned
    pub mention_count: u32,
    /// First time this relationship was seen
    pub first_seen: DateTime<Utc>,
    /// Most recent time this relationship was seen
    pub last_seen: DateTime<Utc>,
}

impl Relationship {
    /// The composite key of this relationship
    pub fn key(&self) -> (String, String, String) {
        (
            self.source.clone(),
            self.target.clone(),
            self.rel_type.clone(),
        )
    }
}

/// Fields supplied when creating or reinforcing a relationship.
#[derive(Debug, Clone, Default)]
pub struct RelationshipDraft {
    /// Free-form description
    pub description: Option<String>,
    /// Confidence in [0, 1], clamped on write
    pub confidence: Option<f32>,
    /// Supporting quotes
    pub evidence: Vec<String>,
    /// Provenance source id for this write
    pub source_id: Option<String>,
}

/// Category of a provenance edge. These are bookkeeping edges, kept apart
/// from domain relationships and excluded from domain counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProvenanceKind {
    /// entity -> source
    ExtractedFrom,
    /// source -> relationship
    Evidences,
}

/// A provenance edge linking graph elements to source records.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProvenanceEdge {
    /// Edge category
    pub kind: ProvenanceKind,
    /// Entity name or source id, depending on the category
    pub from: String,
    /// Source id or relationship key, depending on the category
    pub to: String,
}

/// An entity reached by bounded graph traversal.
#[derive(Debug, Clone)]
pub struct RelatedEntity {
    /// The reached entity
    pub entity: Entity,
    /// Hop count from the traversal origin
    pub distance: usize,
}

/// Domain-only summary counts. Provenance edges are reported separately
/// and never inflate the relationship count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSummary {
    /// Number of labeled entities
    pub entities: usize,
    /// Number of domain relationships
    pub relationships: usize,
    /// Number of provenance edges
    pub provenance_edges: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_kind_label_round_trip() {
        for kind in [
            EntityKind::Person,
            EntityKind::Concept,
            EntityKind::Topic,
            EntityKind::Location,
            EntityKind::Event,
            EntityKind::Organization,
        ] {
            assert_eq!(EntityKind::from_label(kind.label()), kind);
        }

        let custom = EntityKind::from_label("Tool");
        assert_eq!(custom, EntityKind::Other("Tool".to_string()));
        assert_eq!(custom.label(), "Tool");
    }

    #[test]
    fn test_entity_kind_serde_as_string() {
        let json = serde_json::to_string(&EntityKind::Person).unwrap();
        assert_eq!(json, "\"Person\"");

        let parsed: EntityKind = serde_json::from_str("\"Gadget\"").unwrap();
        assert_eq!(parsed, EntityKind::Other("Gadget".to_string()));
    }

    #[test]
    fn test_entity_new_is_labeled_and_canonical() {
        let entity = Entity::new(EntityKind::Person, "Mike");
        assert_eq!(entity.kind, EntityKind::Person);
        assert_eq!(entity.canonical_name, "Mike");
        assert_eq!(entity.mention_count, 1);
    }
}
