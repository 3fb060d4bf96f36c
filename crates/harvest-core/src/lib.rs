pub mod entity;
pub mod enumerator;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod format;
pub mod loader;
pub mod models;
pub mod progress;
pub mod query;
pub mod raw_store;
pub mod retry;
pub mod schema;
pub mod scrape;
pub mod throttle;
pub mod traits;
pub mod util;

#[cfg(test)]
pub mod testutil;

pub use entity::{AttributeValue, EntityRecord, Gender, LevelRate, RecordSource, ThrallClass};
pub use error::AppError;
pub use extractor::Extractor;
pub use fetcher::{FetchError, RetryingFetcher};
pub use format::{FormatReport, FormattedRecords, Formatter};
pub use loader::{LoadReport, Loader, RejectReason, ValidationOutcome};
pub use models::{ListCursor, PageId, PageListing, PageTask, RawPage, compute_hash};
pub use progress::{ProgressRecord, ProgressStore};
pub use query::Filter;
pub use raw_store::RawPageStore;
pub use retry::RetryPolicy;
pub use schema::{EntityKind, Field};
pub use scrape::{ScrapeConfig, ScrapeReport, Scraper, TracingScrapeReporter};
pub use throttle::{ThrottleConfig, ThrottledSource};
pub use traits::{PageSource, RecordStore, UpsertOutcome};
