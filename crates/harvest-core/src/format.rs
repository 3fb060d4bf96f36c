use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::entity::EntityRecord;
use crate::error::AppError;
use crate::extractor::Extractor;
use crate::models::{PageId, RawPage};
use crate::raw_store::RawPageStore;
use crate::schema::EntityKind;
use crate::util::write_json_atomic;

/// Deduplicated records grouped by kind, each list ordered by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormattedRecords {
    pub records: BTreeMap<EntityKind, Vec<EntityRecord>>,
}

/// What a format pass saw.
#[derive(Debug, Clone, Default)]
pub struct FormatReport {
    pub pages: usize,
    /// Raw files that could not be read.
    pub unreadable: usize,
    /// Pages no kind matched (or without any usable name).
    pub unrecognized: Vec<(PageId, String)>,
    /// Records dropped because a fresher page had the same kind and name.
    pub duplicates: usize,
}

impl FormattedRecords {
    pub fn get(&self, kind: EntityKind) -> &[EntityRecord] {
        self.records.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }

    /// All records, kind by kind.
    pub fn iter(&self) -> impl Iterator<Item = &EntityRecord> {
        self.records.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn counts(&self) -> BTreeMap<EntityKind, usize> {
        EntityKind::ALL
            .iter()
            .map(|kind| (*kind, self.get(*kind).len()))
            .collect()
    }

    pub fn file_for(dir: &Path, kind: EntityKind) -> PathBuf {
        dir.join(format!("{}.json", kind.as_str()))
    }

    /// Write one `<kind>.json` array per kind, replacing earlier exports.
    pub fn write_dir(&self, dir: &Path) -> Result<Vec<PathBuf>, AppError> {
        let mut written = Vec::with_capacity(EntityKind::ALL.len());
        for kind in EntityKind::ALL {
            let path = Self::file_for(dir, kind);
            write_json_atomic(&path, self.get(kind))?;
            written.push(path);
        }
        tracing::info!(dir = %dir.display(), records = self.len(), "Records exported");
        Ok(written)
    }

    /// Read an export back. Missing kind files are treated as empty.
    pub fn read_dir(dir: &Path) -> Result<Self, AppError> {
        let mut records = BTreeMap::new();
        for kind in EntityKind::ALL {
            let path = Self::file_for(dir, kind);
            let raw = match std::fs::read_to_string(&path) {
                Ok(raw) => raw,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            let list: Vec<EntityRecord> = serde_json::from_str(&raw).map_err(|e| {
                AppError::StorageError(format!("Invalid export {}: {e}", path.display()))
            })?;
            if let Some(stray) = list.iter().find(|r| r.kind != kind) {
                return Err(AppError::StorageError(format!(
                    "{} contains a {} record ({})",
                    path.display(),
                    stray.kind,
                    stray.name
                )));
            }
            if !list.is_empty() {
                records.insert(kind, list);
            }
        }
        Ok(Self { records })
    }
}

/// Applies the [`Extractor`] across raw pages and deduplicates the result.
#[derive(Debug, Default, Clone, Copy)]
pub struct Formatter;

impl Formatter {
    pub fn format_all<'a, I>(pages: I) -> FormattedRecords
    where
        I: IntoIterator<Item = &'a RawPage>,
    {
        Self::format_pages(pages).0
    }

    /// Extract every page. For records sharing a kind and name, the one
    /// from the most recently fetched page wins (ties: larger page id).
    pub fn format_pages<'a, I>(pages: I) -> (FormattedRecords, FormatReport)
    where
        I: IntoIterator<Item = &'a RawPage>,
    {
        let mut report = FormatReport::default();
        let mut latest: BTreeMap<(EntityKind, String), EntityRecord> = BTreeMap::new();

        for page in pages {
            report.pages += 1;
            let Some(record) = Extractor::extract(page) else {
                tracing::debug!(page_id = %page.page_id, title = %page.title, "No entity recognised");
                report.unrecognized.push((page.page_id, page.title.clone()));
                continue;
            };

            let key = (record.kind, record.name.clone());
            match latest.get(&key) {
                Some(existing) if !is_fresher(&record, existing) => {
                    report.duplicates += 1;
                }
                Some(_) => {
                    report.duplicates += 1;
                    latest.insert(key, record);
                }
                None => {
                    latest.insert(key, record);
                }
            }
        }

        let mut records: BTreeMap<EntityKind, Vec<EntityRecord>> = BTreeMap::new();
        // BTreeMap order is (kind, name), so each list comes out name-ordered.
        for ((kind, _), record) in latest {
            records.entry(kind).or_default().push(record);
        }

        (FormattedRecords { records }, report)
    }

    /// Format every page in a raw store; unreadable files are counted and
    /// skipped.
    pub fn format_dir(store: &RawPageStore) -> Result<(FormattedRecords, FormatReport), AppError> {
        let scan = store.scan()?;
        let (records, mut report) = Self::format_pages(&scan.pages);
        report.unreadable = scan.unreadable.len();
        tracing::info!(
            pages = report.pages,
            records = records.len(),
            unrecognized = report.unrecognized.len(),
            duplicates = report.duplicates,
            unreadable = report.unreadable,
            "Formatted raw pages"
        );
        Ok((records, report))
    }
}

fn is_fresher(candidate: &EntityRecord, current: &EntityRecord) -> bool {
    (candidate.source.fetched_at, candidate.source.page_id)
        > (current.source.fetched_at, current.source.page_id)
}
