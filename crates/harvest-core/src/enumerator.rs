use std::collections::{HashSet, VecDeque};

use crate::error::AppError;
use crate::models::{ListCursor, PageId, PageListing, PageTask};
use crate::retry::{RetryPolicy, RetryState};
use crate::traits::PageSource;

/// Lazily walks a [`PageSource`] listing, one batch at a time.
///
/// Each page id is yielded at most once per enumerator, even when the
/// listing returns it under several categories. A listing failure that
/// survives the retry policy ends the walk with [`AppError::Enumeration`].
pub struct PageEnumerator<S> {
    source: S,
    policy: RetryPolicy,
    /// Cursor of the next batch to list; `None` once the listing is done.
    next: Option<ListCursor>,
    /// Cursor the most recently listed batch came from.
    batch: Option<ListCursor>,
    buffer: VecDeque<PageTask>,
    seen: HashSet<PageId>,
}

impl<S: PageSource> PageEnumerator<S> {
    /// Start at `start`, or at the beginning of the listing when `None`.
    pub fn new(source: S, start: Option<ListCursor>, policy: RetryPolicy) -> Self {
        Self {
            source,
            policy,
            next: Some(start.unwrap_or_default()),
            batch: None,
            buffer: VecDeque::new(),
            seen: HashSet::new(),
        }
    }

    /// Cursor the current batch was listed from. Restarting an enumerator
    /// from it re-yields the whole batch.
    pub fn batch_cursor(&self) -> Option<&ListCursor> {
        self.batch.as_ref()
    }

    /// Cursor of the batch after the current one (`None` when exhausted).
    pub fn next_cursor(&self) -> Option<&ListCursor> {
        self.next.as_ref()
    }

    pub fn is_exhausted(&self) -> bool {
        self.next.is_none() && self.buffer.is_empty()
    }

    /// Next page, listing another batch only when the buffer is empty.
    pub async fn next_page(&mut self) -> Result<Option<PageTask>, AppError> {
        loop {
            if let Some(task) = self.buffer.pop_front() {
                return Ok(Some(task));
            }
            match self.list_next().await? {
                Some(pages) => self.buffer.extend(pages),
                None => return Ok(None),
            }
        }
    }

    /// Drain the buffer or list the next batch, returning it whole.
    ///
    /// A batch may be empty when every page in it was already yielded.
    pub async fn next_batch(&mut self) -> Result<Option<Vec<PageTask>>, AppError> {
        if !self.buffer.is_empty() {
            return Ok(Some(self.buffer.drain(..).collect()));
        }
        self.list_next().await
    }

    /// List one batch. State only changes once the listing succeeded, so
    /// dropping this future part-way is harmless.
    async fn list_next(&mut self) -> Result<Option<Vec<PageTask>>, AppError> {
        let Some(cursor) = self.next.clone() else {
            return Ok(None);
        };

        let listing = self.list_with_retry(&cursor).await?;
        let total = listing.pages.len();
        let pages: Vec<PageTask> = listing
            .pages
            .into_iter()
            .filter(|task| self.seen.insert(task.page_id))
            .collect();

        tracing::debug!(
            cursor = %cursor,
            listed = total,
            new = pages.len(),
            "Listed batch"
        );

        self.batch = Some(cursor);
        self.next = listing.next;
        Ok(Some(pages))
    }

    async fn list_with_retry(
        &self,
        cursor: &ListCursor,
    ) -> Result<PageListing, AppError> {
        let mut state = RetryState::start();
        loop {
            let attempt = state.attempt().unwrap_or(1);
            let error = match self.source.list_pages(cursor).await {
                Ok(listing) => return Ok(listing),
                Err(e) => e,
            };

            let delay = if error.is_retryable() {
                let (next, delay) = state.on_transient_failure(&self.policy);
                state = next;
                delay
            } else {
                None
            };

            let Some(delay) = delay else {
                return Err(AppError::Enumeration(format!(
                    "listing at {cursor} failed after {attempt} attempt(s): {error}"
                )));
            };

            tracing::warn!(
                cursor = %cursor,
                attempt,
                delay_ms = %delay.as_millis(),
                error = %error,
                "Listing failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
