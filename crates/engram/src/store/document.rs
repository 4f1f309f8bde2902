//! Locked single-document files
//!
//! The file-backed stores (core, working, archive) each persist one
//! document and must be safe across OS processes. Every document pairs
//! with exactly one `.lock` file: shared lock for reads, exclusive lock
//! for writes. Replacement writes go to a temp file in the same directory
//! and land via atomic rename, so no reader ever observes a partial
//! document, even across a crash. Appends sync before returning so a
//! ledger entry is durable before its caller takes any follow-up action.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tempfile::NamedTempFile;

use crate::error::{EngramError, Result};

/// A single on-disk document with whole-file locking.
#[derive(Debug, Clone)]
pub(crate) struct DocumentFile {
    path: PathBuf,
    lock_path: PathBuf,
}

impl DocumentFile {
    /// Bind to a document path, creating its parent directory.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let lock_path = path.with_extension(match path.extension() {
            Some(ext) => format!("{}.lock", ext.to_string_lossy()),
            None => "lock".to_string(),
        });
        Ok(Self { path, lock_path })
    }

    /// The document path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_file(&self) -> Result<File> {
        Ok(OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)?)
    }

    /// Read the whole document under a shared lock. `None` when the
    /// document does not exist yet.
    pub fn read(&self) -> Result<Option<String>> {
        let lock = self.lock_file()?;
        lock.lock_shared()?;

        let result = match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(EngramError::Io(e)),
        };

        lock.unlock()?;
        result
    }

    /// Read-modify-write under one exclusive lock.
    ///
    /// The closure receives the current contents and returns the new
    /// contents (or `None` to leave the document untouched) plus a result
    /// passed back to the caller. New contents are written to a temp file
    /// in the same directory and moved into place atomically.
    pub fn mutate<T>(
        &self,
        f: impl FnOnce(Option<&str>) -> Result<(Option<String>, T)>,
    ) -> Result<T> {
        let lock = self.lock_file()?;
        lock.lock_exclusive()?;

        let result = (|| {
            let current = match fs::read_to_string(&self.path) {
                Ok(contents) => Some(contents),
                Err(e) if e.kind() == ErrorKind::NotFound => None,
                Err(e) => return Err(EngramError::Io(e)),
            };

            let (replacement, value) = f(current.as_deref())?;
            if let Some(contents) = replacement {
                self.replace_contents(&contents)?;
            }
            Ok(value)
        })();

        lock.unlock()?;
        result
    }

    /// Append one line under an exclusive lock, fsyncing before returning.
    pub fn append_line(&self, line: &str) -> Result<()> {
        let lock = self.lock_file()?;
        lock.lock_exclusive()?;

        let result = (|| {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            file.write_all(line.as_bytes())?;
            file.write_all(b"\n")?;
            file.sync_all()?;
            Ok(())
        })();

        lock.unlock()?;
        result
    }

    /// Delete the document and its lock file. False when it never existed.
    pub fn delete(&self) -> Result<bool> {
        let existed = match fs::remove_file(&self.path) {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(EngramError::Io(e)),
        };
        match fs::remove_file(&self.lock_path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(EngramError::Io(e)),
        }
        Ok(existed)
    }

    fn replace_contents(&self, contents: &str) -> Result<()> {
        let parent = self
            .path
            .parent()
            .ok_or_else(|| EngramError::Document("Document has no parent directory".to_string()))?;

        let mut temp = NamedTempFile::new_in(parent)?;
        temp.write_all(contents.as_bytes())?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path)
            .map_err(|e| EngramError::Document(format!("Failed to persist document: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_missing_document_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let doc = DocumentFile::new(dir.path().join("missing.md")).unwrap();
        assert!(doc.read().unwrap().is_none());
    }

    #[test]
    fn test_mutate_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let doc = DocumentFile::new(dir.path().join("doc.md")).unwrap();

        doc.mutate(|current| {
            assert!(current.is_none());
            Ok((Some("hello".to_string()), ()))
        })
        .unwrap();

        assert_eq!(doc.read().unwrap().as_deref(), Some("hello"));

        doc.mutate(|current| {
            assert_eq!(current, Some("hello"));
            Ok((Some(format!("{} world", current.unwrap())), ()))
        })
        .unwrap();

        assert_eq!(doc.read().unwrap().as_deref(), Some("hello world"));
    }

    #[test]
    fn test_mutate_none_leaves_document_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let doc = DocumentFile::new(dir.path().join("doc.md")).unwrap();

        doc.mutate(|_| Ok((Some("keep".to_string()), ()))).unwrap();
        let touched: bool = doc.mutate(|_| Ok((None, false))).unwrap();

        assert!(!touched);
        assert_eq!(doc.read().unwrap().as_deref(), Some("keep"));
    }

    #[test]
    fn test_append_line_accumulates() {
        let dir = tempfile::tempdir().unwrap();
        let doc = DocumentFile::new(dir.path().join("ledger.jsonl")).unwrap();

        doc.append_line("one").unwrap();
        doc.append_line("two").unwrap();

        assert_eq!(doc.read().unwrap().as_deref(), Some("one\ntwo\n"));
    }

    #[test]
    fn test_delete_removes_document_and_lock() {
        let dir = tempfile::tempdir().unwrap();
        let doc = DocumentFile::new(dir.path().join("doc.md")).unwrap();

        doc.append_line("data").unwrap();
        assert!(doc.delete().unwrap());
        assert!(!doc.delete().unwrap());
        assert!(doc.read().unwrap().is_none());
    }
}
