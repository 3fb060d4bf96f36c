use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Stable identifier of one wiki page (the MediaWiki `pageid`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageId(pub u64);

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A page to download, as produced by the page listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageTask {
    pub page_id: PageId,
    pub title: String,
}

impl PageTask {
    pub fn new(page_id: u64, title: impl Into<String>) -> Self {
        Self {
            page_id: PageId(page_id),
            title: title.into(),
        }
    }
}

/// Position in the page listing.
///
/// `category` indexes the source's list of categories; `token` is the
/// continuation token within that category (`None` = from its start).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListCursor {
    pub category: usize,
    pub token: Option<String>,
}

impl ListCursor {
    pub fn start() -> Self {
        Self::default()
    }
}

impl fmt::Display for ListCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.token {
            Some(token) => write!(f, "{}:{}", self.category, token),
            None => write!(f, "{}:start", self.category),
        }
    }
}

/// One batch of the page listing plus the cursor for the following batch.
#[derive(Debug, Clone, Default)]
pub struct PageListing {
    pub pages: Vec<PageTask>,
    /// `None` once the listing is exhausted.
    pub next: Option<ListCursor>,
}

/// Raw wikitext for one page, exactly as downloaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPage {
    pub page_id: PageId,
    pub title: String,
    pub text: String,
    pub fetched_at: DateTime<Utc>,
    /// SHA-256 of `text`
    pub content_hash: String,
}

impl RawPage {
    /// Build a raw page stamped with the current time.
    pub fn new(task: &PageTask, text: String) -> Self {
        Self::fetched_at(task, text, Utc::now())
    }

    pub fn fetched_at(task: &PageTask, text: String, fetched_at: DateTime<Utc>) -> Self {
        let content_hash = compute_hash(&text);
        Self {
            page_id: task.page_id,
            title: task.title.clone(),
            text,
            fetched_at,
            content_hash,
        }
    }
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
