//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use crate::entity::EntityRecord;
use crate::error::AppError;
use crate::models::{ListCursor, PageId, PageListing, PageTask, RawPage};
use crate::query::Filter;
use crate::schema::EntityKind;
use crate::scrape::{ScrapeEvent, ScrapeReporter};
use crate::traits::{PageSource, RecordStore, UpsertOutcome};

// ---------------------------------------------------------------------------
// MockPageSource
// ---------------------------------------------------------------------------

/// In-memory wiki.
///
/// Pages are listed in insertion order, `batch_size` at a time, with the
/// offset of the next batch as the continuation token. Fetches pop scripted
/// results first, then fall back to the page text, then to `PageNotFound`.
#[derive(Clone)]
pub struct MockPageSource {
    batch_size: usize,
    listing: Arc<Mutex<Vec<PageTask>>>,
    texts: Arc<Mutex<HashMap<PageId, String>>>,
    scripted: Arc<Mutex<HashMap<PageId, VecDeque<Result<String, AppError>>>>>,
    listing_errors: Arc<Mutex<VecDeque<AppError>>>,
    cancel_after: Arc<Mutex<Option<(usize, CancellationToken)>>>,
    fetch_counts: Arc<Mutex<HashMap<PageId, u32>>>,
    list_calls: Arc<Mutex<Vec<ListCursor>>>,
}

impl Default for MockPageSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPageSource {
    pub fn new() -> Self {
        Self {
            batch_size: 50,
            listing: Arc::new(Mutex::new(Vec::new())),
            texts: Arc::new(Mutex::new(HashMap::new())),
            scripted: Arc::new(Mutex::new(HashMap::new())),
            listing_errors: Arc::new(Mutex::new(VecDeque::new())),
            cancel_after: Arc::new(Mutex::new(None)),
            fetch_counts: Arc::new(Mutex::new(HashMap::new())),
            list_calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// List a page and serve `text` for it.
    pub fn with_page(self, id: u64, title: &str, text: &str) -> Self {
        self.listing.lock().unwrap().push(PageTask::new(id, title));
        self.texts
            .lock()
            .unwrap()
            .insert(PageId(id), text.to_string());
        self
    }

    /// Results returned (in order) for page `id` before its text is served.
    pub fn with_fetch_results(self, id: u64, results: Vec<Result<String, AppError>>) -> Self {
        self.scripted
            .lock()
            .unwrap()
            .entry(PageId(id))
            .or_default()
            .extend(results);
        self
    }

    /// Errors returned by the next listing calls.
    pub fn with_listing_errors(self, errors: Vec<AppError>) -> Self {
        self.listing_errors.lock().unwrap().extend(errors);
        self
    }

    /// Cancel `token` as soon as `fetches` page fetches have been served.
    pub fn cancel_after(self, fetches: usize, token: CancellationToken) -> Self {
        *self.cancel_after.lock().unwrap() = Some((fetches, token));
        self
    }

    pub fn fetch_count(&self, id: PageId) -> u32 {
        self.fetch_counts
            .lock()
            .unwrap()
            .get(&id)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_fetches(&self) -> u32 {
        self.fetch_counts.lock().unwrap().values().sum()
    }

    pub fn list_calls(&self) -> Vec<ListCursor> {
        self.list_calls.lock().unwrap().clone()
    }
}

impl PageSource for MockPageSource {
    async fn list_pages(&self, cursor: &ListCursor) -> Result<PageListing, AppError> {
        self.list_calls.lock().unwrap().push(cursor.clone());
        if let Some(err) = self.listing_errors.lock().unwrap().pop_front() {
            return Err(err);
        }

        let offset = match &cursor.token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| AppError::MalformedResponse(format!("bad token {token}")))?,
            None => 0,
        };
        let listing = self.listing.lock().unwrap();
        let end = (offset + self.batch_size).min(listing.len());
        let pages = listing.get(offset..end).unwrap_or_default().to_vec();
        let next = (end < listing.len()).then(|| ListCursor {
            category: 0,
            token: Some(end.to_string()),
        });
        Ok(PageListing { pages, next })
    }

    async fn fetch_page(&self, task: &PageTask) -> Result<String, AppError> {
        let total = {
            let mut counts = self.fetch_counts.lock().unwrap();
            *counts.entry(task.page_id).or_insert(0) += 1;
            counts.values().sum::<u32>() as usize
        };
        if let Some((after, token)) = self.cancel_after.lock().unwrap().as_ref() {
            if total >= *after {
                token.cancel();
            }
        }

        let scripted = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(&task.page_id)
            .and_then(VecDeque::pop_front);
        if let Some(result) = scripted {
            return result;
        }
        self.texts
            .lock()
            .unwrap()
            .get(&task.page_id)
            .cloned()
            .ok_or_else(|| AppError::PageNotFound(task.title.clone()))
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-memory record store with the same upsert/query semantics as the
/// SQLite one.
#[derive(Clone, Default)]
pub struct MemoryStore {
    rows: Arc<Mutex<BTreeMap<(EntityKind, String), EntityRecord>>>,
    upsert_error: Arc<Mutex<Option<AppError>>>,
    pub upserts: Arc<Mutex<Vec<(EntityKind, String)>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose next upsert fails with `error`.
    pub fn with_upsert_error(error: AppError) -> Self {
        let store = Self::default();
        *store.upsert_error.lock().unwrap() = Some(error);
        store
    }
}

impl RecordStore for MemoryStore {
    async fn upsert(&self, record: &EntityRecord) -> Result<UpsertOutcome, AppError> {
        if let Some(e) = self.upsert_error.lock().unwrap().take() {
            return Err(e);
        }
        self.upserts
            .lock()
            .unwrap()
            .push((record.kind, record.name.clone()));

        let mut rows = self.rows.lock().unwrap();
        let key = (record.kind, record.name.clone());
        let outcome = match rows.get(&key) {
            None => UpsertOutcome::Inserted,
            Some(existing) if existing.data_hash() == record.data_hash() => {
                UpsertOutcome::Unchanged
            }
            Some(_) => UpsertOutcome::Updated,
        };
        rows.insert(key, record.clone());
        Ok(outcome)
    }

    async fn get(&self, kind: EntityKind, name: &str) -> Result<Option<EntityRecord>, AppError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.get(&(kind, name.to_string())).cloned())
    }

    async fn query(&self, kind: EntityKind, filter: &Filter) -> Result<Vec<EntityRecord>, AppError> {
        filter.check_kind(kind)?;
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .values()
            .filter(|r| r.kind == kind && filter.matches(r))
            .cloned()
            .collect())
    }

    async fn names(&self, kind: EntityKind) -> Result<Vec<String>, AppError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, name)| name.clone())
            .collect())
    }

    async fn count(&self, kind: EntityKind) -> Result<i64, AppError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.keys().filter(|(k, _)| *k == kind).count() as i64)
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Scrape reporter that records event labels.
#[derive(Default)]
pub struct MockReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, label: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.as_str() == label)
            .count()
    }
}

impl ScrapeReporter for MockReporter {
    fn report(&self, event: ScrapeEvent<'_>) {
        let label = match &event {
            ScrapeEvent::Started { .. } => "Started",
            ScrapeEvent::BatchListed { .. } => "BatchListed",
            ScrapeEvent::PageSkipped { .. } => "PageSkipped",
            ScrapeEvent::PageFetched { .. } => "PageFetched",
            ScrapeEvent::PageFailed { .. } => "PageFailed",
            ScrapeEvent::PageAbandoned { .. } => "PageAbandoned",
            ScrapeEvent::CheckpointSaved { .. } => "CheckpointSaved",
            ScrapeEvent::Cancelled { .. } => "Cancelled",
            ScrapeEvent::Finished { .. } => "Finished",
        };
        self.events.lock().unwrap().push(label.to_string());
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// A wiki page for a female fighter thrall with a fast level rate.
pub const THRALL_WIKITEXT: &str = "{{Thrall
| name = Dalinsia Sen
| id = 10012
| class = Fighter
| Health = 1,250
| Strength = 20
| Agility = 12
| Vitality = 18
| Grit = 9
| BonusVit = 2
| levelCurve = Fast
| NPCArmor = 200
| NPCDRArmor = 15
| NPCKillXP = 540
| NPCTemperament = Defensive
| gender = Female
| thrallable = yes
| race = [[Nordheimer]]
| fac = [[The Relic Hunters|Relic Hunters]]
}}
'''Dalinsia Sen''' is a [[Thrall]] found in the [[Exiled Lands]].

==Notes==
* Can be captured at the [[Sinkhole]].

[[Category:Thralls]]
";

/// Fixed timestamp used by [`make_raw_page`].
pub fn test_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

pub fn make_raw_page(id: u64, title: &str, text: &str) -> RawPage {
    make_raw_page_at(id, title, text, test_time())
}

pub fn make_raw_page_at(id: u64, title: &str, text: &str, fetched_at: DateTime<Utc>) -> RawPage {
    RawPage::fetched_at(&PageTask::new(id, title), text.to_string(), fetched_at)
}

/// A record with no attributes besides its identity.
pub fn make_record(kind: EntityKind, name: &str) -> EntityRecord {
    let page = make_raw_page(1, name, "");
    EntityRecord::new(kind, name, (&page).into())
}
