//! Durable scrape progress.
//!
//! The [`ProgressStore`] is opened once per run and owned by the scraper.
//! Every mutation is written through to disk before it returns; dropping the
//! store performs a final flush, so progress survives both clean exits and
//! unwinding.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{ListCursor, PageId};
use crate::util::write_json_atomic;

/// Which pages are done, which are permanently broken, and where the listing
/// should resume.
///
/// A page id is never in both `completed` and `failed`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub cursor: Option<ListCursor>,
    pub completed: BTreeSet<PageId>,
    pub failed: BTreeSet<PageId>,
}

impl ProgressRecord {
    pub fn is_completed(&self, id: PageId) -> bool {
        self.completed.contains(&id)
    }

    pub fn is_failed(&self, id: PageId) -> bool {
        self.failed.contains(&id)
    }

    /// True when the page reached a terminal outcome in an earlier run.
    pub fn is_settled(&self, id: PageId) -> bool {
        self.is_completed(id) || self.is_failed(id)
    }

    /// Returns false if nothing changed.
    pub fn mark_completed(&mut self, id: PageId) -> bool {
        let removed = self.failed.remove(&id);
        self.completed.insert(id) || removed
    }

    /// Ignored for pages already completed. Returns false if nothing changed.
    pub fn mark_failed(&mut self, id: PageId) -> bool {
        if self.completed.contains(&id) {
            return false;
        }
        self.failed.insert(id)
    }
}

/// File-backed owner of a [`ProgressRecord`].
#[derive(Debug)]
pub struct ProgressStore {
    path: PathBuf,
    record: ProgressRecord,
    dirty: bool,
}

impl ProgressStore {
    /// Load progress from `path`, or start empty if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let path = path.into();
        let record = Self::load(&path)?;
        tracing::debug!(
            path = %path.display(),
            completed = record.completed.len(),
            failed = record.failed.len(),
            "Progress loaded"
        );
        Ok(Self {
            path,
            record,
            dirty: false,
        })
    }

    /// Read a persisted record without taking ownership of the file.
    pub fn load(path: &Path) -> Result<ProgressRecord, AppError> {
        match std::fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                AppError::StorageError(format!(
                    "Corrupt progress file {}: {e}",
                    path.display()
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ProgressRecord::default()),
            Err(e) => Err(AppError::StorageError(format!(
                "Failed to read progress file {}: {e}",
                path.display()
            ))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self) -> &ProgressRecord {
        &self.record
    }

    pub fn mark_completed(&mut self, id: PageId) -> Result<(), AppError> {
        if self.record.mark_completed(id) {
            self.dirty = true;
            self.save()?;
        }
        Ok(())
    }

    pub fn mark_failed(&mut self, id: PageId) -> Result<(), AppError> {
        if self.record.mark_failed(id) {
            self.dirty = true;
            self.save()?;
        }
        Ok(())
    }

    pub fn set_cursor(&mut self, cursor: Option<ListCursor>) -> Result<(), AppError> {
        if self.record.cursor != cursor {
            self.record.cursor = cursor;
            self.dirty = true;
            self.save()?;
        }
        Ok(())
    }

    /// Move every failed page back to pending. Returns how many were reset.
    ///
    /// The listing cursor is cleared as well, so the next run re-walks the
    /// listing and actually reaches those pages again.
    pub fn reset_failed(&mut self) -> Result<usize, AppError> {
        let count = self.record.failed.len();
        if count > 0 {
            self.record.failed.clear();
            self.record.cursor = None;
            self.dirty = true;
            self.save()?;
        }
        Ok(count)
    }

    /// Persist the current record if anything changed since the last save.
    pub fn save(&mut self) -> Result<(), AppError> {
        if !self.dirty {
            return Ok(());
        }
        write_json_atomic(&self.path, &self.record)?;
        self.dirty = false;
        Ok(())
    }
}

impl Drop for ProgressStore {
    fn drop(&mut self) {
        if let Err(e) = self.save() {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to flush progress");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_missing_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = ProgressStore::open(tmp.path().join("progress.json")).unwrap();
        assert_eq!(store.record(), &ProgressRecord::default());
    }

    #[test]
    fn marks_survive_reopen_without_explicit_save() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("progress.json");

        let mut store = ProgressStore::open(&path).unwrap();
        store.mark_completed(PageId(1)).unwrap();
        store.mark_failed(PageId(2)).unwrap();
        store
            .set_cursor(Some(ListCursor {
                category: 1,
                token: Some("abc".into()),
            }))
            .unwrap();

        // Simulate a crash: the store is never dropped.
        std::mem::forget(store);

        let record = ProgressStore::load(&path).unwrap();
        assert!(record.is_completed(PageId(1)));
        assert!(record.is_failed(PageId(2)));
        assert_eq!(record.cursor.unwrap().token.as_deref(), Some("abc"));
    }

    #[test]
    fn completed_and_failed_are_disjoint() {
        let mut record = ProgressRecord::default();
        assert!(record.mark_failed(PageId(5)));
        assert!(record.mark_completed(PageId(5)));
        assert!(!record.is_failed(PageId(5)));
        assert!(record.is_completed(PageId(5)));

        // A completed page cannot be demoted.
        assert!(!record.mark_failed(PageId(5)));
        assert!(!record.is_failed(PageId(5)));
    }

    #[test]
    fn marks_are_idempotent() {
        let mut record = ProgressRecord::default();
        assert!(record.mark_completed(PageId(9)));
        assert!(!record.mark_completed(PageId(9)));
        assert_eq!(record.completed.len(), 1);
    }

    #[test]
    fn reset_failed_clears_failed_and_cursor() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("progress.json");

        {
            let mut store = ProgressStore::open(&path).unwrap();
            store.mark_completed(PageId(1)).unwrap();
            store.mark_failed(PageId(2)).unwrap();
            store.mark_failed(PageId(3)).unwrap();
            store.set_cursor(Some(ListCursor::start())).unwrap();
            assert_eq!(store.reset_failed().unwrap(), 2);
        }

        let record = ProgressStore::load(&path).unwrap();
        assert!(record.failed.is_empty());
        assert!(record.cursor.is_none());
        assert!(record.is_completed(PageId(1)));
    }

    #[test]
    fn corrupt_file_is_a_storage_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("progress.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = ProgressStore::open(&path).unwrap_err();
        assert!(matches!(err, AppError::StorageError(_)));
    }
}
