use std::future::Future;

use crate::entity::EntityRecord;
use crate::error::AppError;
use crate::models::{ListCursor, PageListing, PageTask};
use crate::query::Filter;
use crate::schema::EntityKind;

/// Read-only access to the wiki: a cursor-paginated page listing and
/// per-page raw content.
///
/// Errors must be classified through [`AppError::is_retryable`]: network
/// trouble, rate limiting and 5xx responses are transient; missing pages and
/// undecodable responses are permanent.
pub trait PageSource: Send + Sync + Clone {
    /// List one batch of pages starting at `cursor`.
    fn list_pages(
        &self,
        cursor: &ListCursor,
    ) -> impl Future<Output = Result<PageListing, AppError>> + Send;

    /// Fetch the raw wikitext of one page.
    fn fetch_page(&self, task: &PageTask) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// What an upsert did to the stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// A row with identical data already existed.
    Unchanged,
}

/// Persists validated records, one table per entity kind keyed by name.
pub trait RecordStore: Send + Sync + Clone {
    /// Insert or replace the row keyed by `(record.kind, record.name)`.
    fn upsert(
        &self,
        record: &EntityRecord,
    ) -> impl Future<Output = Result<UpsertOutcome, AppError>> + Send;

    fn get(
        &self,
        kind: EntityKind,
        name: &str,
    ) -> impl Future<Output = Result<Option<EntityRecord>, AppError>> + Send;

    /// All records of `kind` matching `filter`, ordered by name.
    fn query(
        &self,
        kind: EntityKind,
        filter: &Filter,
    ) -> impl Future<Output = Result<Vec<EntityRecord>, AppError>> + Send;

    /// Every stored name of `kind`, ordered.
    fn names(&self, kind: EntityKind) -> impl Future<Output = Result<Vec<String>, AppError>> + Send;

    fn count(&self, kind: EntityKind) -> impl Future<Output = Result<i64, AppError>> + Send;
}
