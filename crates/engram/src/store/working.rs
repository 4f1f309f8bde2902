//! Working store: per-session scratch notes
//!
//! Each namespace owns one sectioned markdown document, isolated from every
//! other namespace. A [`WorkingSet`] hands out stores keyed by opaque
//! namespace ids, with one always-available `main` namespace; ephemeral
//! per-agent namespaces are created on demand and cleaned up without
//! touching anything else.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::Result;
use crate::memory::types::Section;
use crate::store::document::DocumentFile;

/// The namespace that is always present.
pub const MAIN_NAMESPACE: &str = "main";

/// Result of applying a working-notes diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffOutcome {
    /// Items actually added (duplicates skipped)
    pub added: usize,
    /// Items actually removed (missing entries skipped)
    pub removed: usize,
}

/// Sectioned scratch notes for one namespace.
pub struct WorkingStore {
    namespace: String,
    document: DocumentFile,
}

impl WorkingStore {
    fn open(root: &Path, namespace: &str) -> Result<Self> {
        let file = root.join(format!("{}.md", sanitize(namespace)));
        Ok(Self {
            namespace: namespace.to_string(),
            document: DocumentFile::new(file)?,
        })
    }

    /// The namespace this store is isolated to
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Add one item to a section.
    ///
    /// Near-duplicates (case/whitespace/punctuation-insensitive match
    /// within the section) are rejected; returns false when skipped.
    pub fn add_item(&self, section: Section, item: &str) -> Result<bool> {
        let item = item.trim();
        if item.is_empty() {
            return Ok(false);
        }

        self.document.mutate(|current| {
            let mut sections = parse_document(current.unwrap_or(""));

            if contains_near_duplicate(&sections[index_of(section)], item) {
                return Ok((None, false));
            }

            sections[index_of(section)].push(item.to_string());
            Ok((Some(render_document(&self.namespace, &sections)), true))
        })
    }

    /// Apply additions and removals as one atomic batch.
    ///
    /// Readers never observe a partially applied diff: the whole batch is
    /// computed under the document's exclusive lock and lands in a single
    /// atomic replace.
    pub fn apply_diff(
        &self,
        additions: &[(Section, String)],
        removals: &[(Section, String)],
    ) -> Result<DiffOutcome> {
        self.document.mutate(|current| {
            let mut sections = parse_document(current.unwrap_or(""));
            let mut outcome = DiffOutcome::default();

            for (section, item) in removals {
                let entries = &mut sections[index_of(*section)];
                let needle = normalize(item);
                if let Some(pos) = entries.iter().position(|e| normalize(e) == needle) {
                    entries.remove(pos);
                    outcome.removed += 1;
                }
            }

            for (section, item) in additions {
                let item = item.trim();
                if item.is_empty() {
                    continue;
                }
                let entries = &mut sections[index_of(*section)];
                if !contains_near_duplicate(entries, item) {
                    entries.push(item.to_string());
                    outcome.added += 1;
                }
            }

            Ok((Some(render_document(&self.namespace, &sections)), outcome))
        })
    }

    /// Items currently in a section
    pub fn items(&self, section: Section) -> Result<Vec<String>> {
        let sections = parse_document(self.document.read()?.as_deref().unwrap_or(""));
        Ok(sections[index_of(section)].clone())
    }

    /// All items with their sections, in document order
    pub fn all_items(&self) -> Result<Vec<(Section, String)>> {
        let sections = parse_document(self.document.read()?.as_deref().unwrap_or(""));
        Ok(Section::ALL
            .into_iter()
            .flat_map(|s| {
                sections[index_of(s)]
                    .iter()
                    .map(move |item| (s, item.clone()))
                    .collect::<Vec<_>>()
            })
            .collect())
    }

    /// Total number of items across sections
    pub fn len(&self) -> Result<usize> {
        let sections = parse_document(self.document.read()?.as_deref().unwrap_or(""));
        Ok(sections.iter().map(Vec::len).sum())
    }

    /// Whether the store holds no items
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Delete this namespace's storage. Never touches the core store or
    /// any other namespace.
    pub fn cleanup(&self) -> Result<bool> {
        tracing::debug!("Cleaning up working namespace {}", self.namespace);
        self.document.delete()
    }
}

/// Factory for namespace-keyed working stores.
pub struct WorkingSet {
    root: PathBuf,
    stores: DashMap<String, Arc<WorkingStore>>,
}

impl WorkingSet {
    /// Create a factory rooted at the given directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            stores: DashMap::new(),
        }
    }

    /// The always-accessible shared namespace
    pub fn main(&self) -> Result<Arc<WorkingStore>> {
        self.namespace(MAIN_NAMESPACE)
    }

    /// The store for an opaque namespace id, created on first use
    pub fn namespace(&self, id: &str) -> Result<Arc<WorkingStore>> {
        if let Some(store) = self.stores.get(id) {
            return Ok(store.clone());
        }
        let store = Arc::new(WorkingStore::open(&self.root, id)?);
        self.stores.insert(id.to_string(), store.clone());
        Ok(store)
    }

    /// Create an ephemeral namespace, seeding it with initial context.
    ///
    /// Pass `None` as the id to mint a fresh opaque one.
    pub fn create_ephemeral(
        &self,
        id: Option<&str>,
        initial_context: Option<&str>,
    ) -> Result<Arc<WorkingStore>> {
        let id = match id {
            Some(id) => id.to_string(),
            None => format!("ephemeral-{}", Uuid::new_v4()),
        };
        let store = self.namespace(&id)?;
        if let Some(context) = initial_context {
            store.add_item(Section::KeyTopics, context)?;
        }
        Ok(store)
    }

    /// Delete one namespace's storage and forget it.
    ///
    /// The `main` namespace is never removed.
    pub fn cleanup(&self, id: &str) -> Result<bool> {
        if id == MAIN_NAMESPACE {
            return Ok(false);
        }
        let removed = match self.stores.remove(id) {
            Some((_, store)) => store.cleanup()?,
            None => WorkingStore::open(&self.root, id)?.cleanup()?,
        };
        Ok(removed)
    }
}

/// Namespace ids are opaque; keep the backing file name safe
fn sanitize(namespace: &str) -> String {
    namespace
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn index_of(section: Section) -> usize {
    Section::ALL
        .iter()
        .position(|s| *s == section)
        .expect("section is in the fixed set")
}

/// Case-, whitespace-, and punctuation-insensitive form for duplicate checks
fn normalize(item: &str) -> String {
    item.chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn contains_near_duplicate(entries: &[String], item: &str) -> bool {
    let needle = normalize(item);
    entries.iter().any(|e| normalize(e) == needle)
}

fn parse_document(text: &str) -> [Vec<String>; 5] {
    let mut sections: [Vec<String>; 5] = Default::default();
    let mut current: Option<usize> = None;

    for line in text.lines() {
        if let Some(heading) = line.strip_prefix("## ") {
            current = Section::from_heading(heading).map(index_of);
        } else if let (Some(index), Some(bullet)) = (current, line.strip_prefix("- ")) {
            sections[index].push(bullet.trim().to_string());
        }
    }

    sections
}

fn render_document(namespace: &str, sections: &[Vec<String>; 5]) -> String {
    let mut out = format!("# Working Notes ({namespace})\n");
    out.push_str(&format!("Last updated: {}\n", Utc::now().to_rfc3339()));

    for section in Section::ALL {
        out.push_str(&format!("\n## {}\n", section.heading()));
        for item in &sections[index_of(section)] {
            out.push_str(&format!("- {item}\n"));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_item_rejects_near_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let set = WorkingSet::new(dir.path());
        let store = set.main().unwrap();

        assert!(store.add_item(Section::KeyTopics, "Rust memory model").unwrap());
        assert!(!store.add_item(Section::KeyTopics, "rust memory model").unwrap());
        assert!(!store.add_item(Section::KeyTopics, "  Rust  memory model! ").unwrap());
        // Same text in a different section is a different note
        assert!(store.add_item(Section::ImportantFacts, "Rust memory model").unwrap());
    }

    #[test]
    fn test_apply_diff_is_one_batch() {
        let dir = tempfile::tempdir().unwrap();
        let set = WorkingSet::new(dir.path());
        let store = set.main().unwrap();

        store.add_item(Section::OngoingThreads, "Fix the parser").unwrap();
        store.add_item(Section::OngoingThreads, "Ship release").unwrap();

        let outcome = store
            .apply_diff(
                &[
                    (Section::OngoingThreads, "Write changelog".to_string()),
                    (Section::KeyTopics, "Releases".to_string()),
                ],
                &[(Section::OngoingThreads, "Fix the parser".to_string())],
            )
            .unwrap();

        assert_eq!(outcome, DiffOutcome { added: 2, removed: 1 });
        assert_eq!(
            store.items(Section::OngoingThreads).unwrap(),
            vec!["Ship release".to_string(), "Write changelog".to_string()]
        );
        assert_eq!(store.items(Section::KeyTopics).unwrap(), vec!["Releases".to_string()]);
    }

    #[test]
    fn test_apply_diff_skips_duplicates_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let set = WorkingSet::new(dir.path());
        let store = set.main().unwrap();

        store.add_item(Section::KeyTopics, "Existing topic").unwrap();

        let outcome = store
            .apply_diff(
                &[(Section::KeyTopics, "existing topic".to_string())],
                &[(Section::KeyTopics, "never was here".to_string())],
            )
            .unwrap();

        assert_eq!(outcome, DiffOutcome { added: 0, removed: 0 });
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let set = WorkingSet::new(dir.path());

        let main = set.main().unwrap();
        let agent = set.create_ephemeral(Some("agent-1"), Some("Delegated task")).unwrap();

        main.add_item(Section::ImportantFacts, "Main fact").unwrap();
        agent.add_item(Section::ImportantFacts, "Agent fact").unwrap();

        assert_eq!(main.items(Section::ImportantFacts).unwrap(), vec!["Main fact"]);
        assert_eq!(agent.items(Section::ImportantFacts).unwrap(), vec!["Agent fact"]);
        assert_eq!(agent.items(Section::KeyTopics).unwrap(), vec!["Delegated task"]);
    }

    #[test]
    fn test_cleanup_removes_only_that_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let set = WorkingSet::new(dir.path());

        let main = set.main().unwrap();
        main.add_item(Section::KeyTopics, "Keep me").unwrap();
        let agent = set.create_ephemeral(Some("agent-2"), None).unwrap();
        agent.add_item(Section::KeyTopics, "Scratch").unwrap();

        assert!(set.cleanup("agent-2").unwrap());

        assert_eq!(main.items(Section::KeyTopics).unwrap(), vec!["Keep me"]);
        // A re-created namespace starts empty
        let again = set.namespace("agent-2").unwrap();
        assert!(again.is_empty().unwrap());
    }

    #[test]
    fn test_cleanup_never_removes_main() {
        let dir = tempfile::tempdir().unwrap();
        let set = WorkingSet::new(dir.path());

        let main = set.main().unwrap();
        main.add_item(Section::KeyTopics, "Still here").unwrap();

        assert!(!set.cleanup(MAIN_NAMESPACE).unwrap());
        assert_eq!(main.items(Section::KeyTopics).unwrap(), vec!["Still here"]);
    }

    #[test]
    fn test_ephemeral_without_id_mints_one() {
        let dir = tempfile::tempdir().unwrap();
        let set = WorkingSet::new(dir.path());

        let a = set.create_ephemeral(None, None).unwrap();
        let b = set.create_ephemeral(None, None).unwrap();

        assert_ne!(a.namespace(), b.namespace());
    }
}
