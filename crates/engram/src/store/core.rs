//! Core store: permanent, protected key facts
//!
//! A single markdown document with one heading per category. Core items
//! are never decayed, archived, or auto-deleted; the only removal path is
//! an explicit pattern-match request. Each bullet carries its added-at
//! stamp and source id in a trailing HTML comment so the document stays
//! readable while the metadata round-trips.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::memory::types::{CoreCategory, CoreItem, SourceRecord};
use crate::store::document::DocumentFile;

const IDENTITY_HINTS: [&str; 7] = [
    "my name", "user's name", "i am ", "i'm ", "prefer", "like", "birthday",
];
const PROJECT_HINTS: [&str; 6] = [
    "project", "working on", "building", "deadline", "milestone", "repository",
];
const RELATIONSHIP_HINTS: [&str; 8] = [
    "friend",
    "colleague",
    "coworker",
    "partner",
    "wife",
    "husband",
    "brother",
    "sister",
];
const SYSTEM_HINTS: [&str; 5] = ["always", "never", "respond", "format", "tool"];

/// Permanent, protected key-fact storage.
pub struct CoreStore {
    document: DocumentFile,
    promotion_threshold: f32,
}

impl CoreStore {
    /// Open (or lazily create) the core document at the given path.
    pub fn new(path: impl AsRef<Path>, promotion_threshold: f32) -> Result<Self> {
        Ok(Self {
            document: DocumentFile::new(path.as_ref())?,
            promotion_threshold,
        })
    }

    /// Add a fact to a category.
    ///
    /// Returns false without writing when the exact content already exists
    /// in that category.
    pub fn add(
        &self,
        content: &str,
        category: CoreCategory,
        source: Option<SourceRecord>,
    ) -> Result<bool> {
        let content = content.trim();
        if content.is_empty() {
            return Ok(false);
        }

        self.document.mutate(|current| {
            let mut items = parse_document(current.unwrap_or(""));

            let duplicate = items
                .get(&category)
                .is_some_and(|entries| entries.iter().any(|i| i.content == content));
            if duplicate {
                return Ok((None, false));
            }

            let mut item = CoreItem::new(content, category);
            item.source = source;
            items.entry(category).or_default().push(item);

            Ok((Some(render_document(&items)), true))
        })
    }

    /// Remove the first item whose content contains `pattern`.
    ///
    /// Searches only `category` when given, all categories otherwise.
    /// Returns the removed item, or `None` when nothing matched.
    pub fn remove(&self, pattern: &str, category: Option<CoreCategory>) -> Result<Option<CoreItem>> {
        self.document.mutate(|current| {
            let mut items = parse_document(current.unwrap_or(""));

            let categories: Vec<CoreCategory> = match category {
                Some(c) => vec![c],
                None => CoreCategory::ALL.to_vec(),
            };

            for cat in categories {
                if let Some(entries) = items.get_mut(&cat) {
                    if let Some(pos) = entries.iter().position(|i| i.content.contains(pattern)) {
                        let removed = entries.remove(pos);
                        return Ok((Some(render_document(&items)), Some(removed)));
                    }
                }
            }

            Ok((None, None))
        })
    }

    /// Whether this exact content is protected in any category
    pub fn is_protected(&self, content: &str) -> Result<bool> {
        let items = self.load()?;
        Ok(items
            .values()
            .any(|entries| entries.iter().any(|i| i.content == content.trim())))
    }

    /// All items, in document order
    pub fn items(&self) -> Result<Vec<CoreItem>> {
        let items = self.load()?;
        Ok(CoreCategory::ALL
            .into_iter()
            .flat_map(|c| items.get(&c).cloned().unwrap_or_default())
            .collect())
    }

    /// Items in one category
    pub fn items_in(&self, category: CoreCategory) -> Result<Vec<CoreItem>> {
        Ok(self.load()?.remove(&category).unwrap_or_default())
    }

    /// Pure classification: suggest a category for promotion-worthy content.
    ///
    /// Returns a category only when `importance` clears the promotion
    /// threshold and the content matches one of the category heuristics.
    /// Never mutates storage.
    pub fn suggest_promotion(&self, content: &str, importance: f32) -> Option<CoreCategory> {
        if importance < self.promotion_threshold {
            return None;
        }

        let lower = content.to_lowercase();
        if IDENTITY_HINTS.iter().any(|h| lower.contains(h)) {
            Some(CoreCategory::Identity)
        } else if PROJECT_HINTS.iter().any(|h| lower.contains(h)) {
            Some(CoreCategory::Projects)
        } else if RELATIONSHIP_HINTS.iter().any(|h| lower.contains(h)) {
            Some(CoreCategory::Relationships)
        } else if SYSTEM_HINTS.iter().any(|h| lower.contains(h)) {
            Some(CoreCategory::System)
        } else {
            None
        }
    }

    fn load(&self) -> Result<BTreeMap<CoreCategory, Vec<CoreItem>>> {
        Ok(parse_document(self.document.read()?.as_deref().unwrap_or("")))
    }
}

fn parse_document(text: &str) -> BTreeMap<CoreCategory, Vec<CoreItem>> {
    let mut items: BTreeMap<CoreCategory, Vec<CoreItem>> = BTreeMap::new();
    let mut current: Option<CoreCategory> = None;

    for line in text.lines() {
        if let Some(heading) = line.strip_prefix("## ") {
            current = CoreCategory::from_heading(heading);
        } else if let (Some(category), Some(bullet)) = (current, line.strip_prefix("- ")) {
            let (content, added_at, source) = parse_bullet(bullet);
            items.entry(category).or_default().push(CoreItem {
                category,
                content,
                added_at,
                source,
            });
        }
    }

    items
}

fn render_document(items: &BTreeMap<CoreCategory, Vec<CoreItem>>) -> String {
    let mut out = String::from("# Core Memory\n");
    out.push_str(&format!("Last updated: {}\n", Utc::now().to_rfc3339()));

    for category in CoreCategory::ALL {
        out.push_str(&format!("\n## {}\n", category.heading()));
        for item in items.get(&category).map(Vec::as_slice).unwrap_or(&[]) {
            out.push_str(&format!("- {}{}\n", item.content, render_annotation(item)));
        }
    }

    out
}

fn render_annotation(item: &CoreItem) -> String {
    match &item.source {
        Some(source) => format!(
            " <!-- {} | {} -->",
            item.added_at.to_rfc3339(),
            source.source_id()
        ),
        None => format!(" <!-- {} -->", item.added_at.to_rfc3339()),
    }
}

fn parse_bullet(bullet: &str) -> (String, DateTime<Utc>, Option<SourceRecord>) {
    let Some(start) = bullet.rfind("<!--") else {
        return (bullet.trim().to_string(), Utc::now(), None);
    };
    let Some(end) = bullet[start..].find("-->") else {
        return (bullet.trim().to_string(), Utc::now(), None);
    };

    let content = bullet[..start].trim().to_string();
    let annotation = bullet[start + 4..start + end].trim();

    let (stamp, source_id) = match annotation.split_once('|') {
        Some((stamp, source_id)) => (stamp.trim(), Some(source_id.trim())),
        None => (annotation, None),
    };

    let added_at = DateTime::parse_from_rfc3339(stamp)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    let source = source_id.and_then(parse_source_id);

    (content, added_at, source)
}

fn parse_source_id(source_id: &str) -> Option<SourceRecord> {
    match source_id.split_once(':') {
        Some(("conversation", session)) => Some(SourceRecord::conversation(session)),
        Some(("file", path)) => Some(SourceRecord::file(path)),
        _ => None,
    }
}
