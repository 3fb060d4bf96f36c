use std::path::{Path, PathBuf};

use crate::error::AppError;
use crate::models::{PageId, RawPage};
use crate::util::write_json_atomic;

/// Directory of downloaded pages, one `<page_id>.json` file per page.
#[derive(Debug, Clone)]
pub struct RawPageStore {
    dir: PathBuf,
}

/// Result of reading the whole directory: pages that parsed, plus the files
/// that could not be read.
#[derive(Debug, Default)]
pub struct RawScan {
    pub pages: Vec<RawPage>,
    pub unreadable: Vec<(PathBuf, String)>,
}

impl RawPageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: PageId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Write (or replace) one page atomically.
    pub fn write(&self, page: &RawPage) -> Result<PathBuf, AppError> {
        let path = self.path_for(page.page_id);
        write_json_atomic(&path, page)?;
        Ok(path)
    }

    pub fn read(&self, id: PageId) -> Result<Option<RawPage>, AppError> {
        let path = self.path_for(id);
        if !path.exists() {
            return Ok(None);
        }
        Self::read_file(&path).map(Some)
    }

    fn read_file(path: &Path) -> Result<RawPage, AppError> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| {
            AppError::StorageError(format!("Invalid raw page {}: {e}", path.display()))
        })
    }

    /// Ids of every stored page, ascending.
    pub fn list(&self) -> Result<Vec<PageId>, AppError> {
        let mut ids = Vec::new();
        for path in self.page_files()? {
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u64>().ok())
            {
                ids.push(PageId(id));
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Read every stored page. A missing directory is an empty scan; a file
    /// that fails to parse is reported, not fatal.
    pub fn scan(&self) -> Result<RawScan, AppError> {
        let mut scan = RawScan::default();
        for path in self.page_files()? {
            match Self::read_file(&path) {
                Ok(page) => scan.pages.push(page),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable raw page");
                    scan.unreadable.push((path, e.to_string()));
                }
            }
        }
        scan.pages.sort_by_key(|p| p.page_id);
        Ok(scan)
    }

    fn page_files(&self) -> Result<Vec<PathBuf>, AppError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                files.push(path);
            }
        }
        Ok(files)
    }
}
