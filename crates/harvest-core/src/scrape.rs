//! Scrape orchestration: listing, concurrent fetching and progress
//! recording.
//!
//! A run moves through `Enumerating → (Fetching → Recording)* → Done`, or
//! stops early as `Cancelled`. Fetch tasks run on a bounded [`JoinSet`] and
//! hand their results back to the orchestrator, which is the only writer of
//! the [`ProgressStore`] and the raw page directory.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::enumerator::PageEnumerator;
use crate::error::AppError;
use crate::fetcher::{FetchError, RetryingFetcher};
use crate::models::{ListCursor, PageId, PageTask, RawPage};
use crate::progress::ProgressStore;
use crate::raw_store::RawPageStore;
use crate::retry::RetryPolicy;
use crate::traits::PageSource;

/// Scrape tuning.
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    /// Maximum number of pages fetched at once.
    pub concurrency: usize,
    /// Retry policy for page fetches and listing calls.
    pub retry: RetryPolicy,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            retry: RetryPolicy::default(),
        }
    }
}

impl ScrapeConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The listing was walked to its end.
    Done,
    /// Stopped early; the next run resumes from the saved cursor.
    Cancelled,
}

/// Summary of one scrape run.
#[derive(Debug, Clone)]
pub struct ScrapeReport {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Distinct pages seen in the listing.
    pub listed: usize,
    pub fetched: usize,
    /// Pages skipped because an earlier run already settled them.
    pub skipped: usize,
    pub failed: usize,
    /// Pages left pending (cancelled mid-backoff or lost to a panicked task).
    pub abandoned: usize,
    pub failures: Vec<(PageId, String)>,
}

impl ScrapeReport {
    pub fn duration(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }
}

/// Events emitted by the scraper for monitoring/logging.
#[derive(Debug, Clone)]
pub enum ScrapeEvent<'a> {
    Started {
        run_id: Uuid,
        resume_from: Option<&'a ListCursor>,
        completed: usize,
        failed: usize,
    },
    BatchListed {
        cursor: Option<&'a ListCursor>,
        pages: usize,
    },
    PageSkipped {
        task: &'a PageTask,
    },
    PageFetched {
        page: &'a RawPage,
    },
    PageFailed {
        task: &'a PageTask,
        error: &'a str,
        attempts: u32,
    },
    PageAbandoned {
        page_id: Option<PageId>,
        error: &'a str,
    },
    CheckpointSaved {
        cursor: Option<&'a ListCursor>,
    },
    Cancelled {
        in_flight: usize,
    },
    Finished {
        report: &'a ScrapeReport,
    },
}

/// Trait for receiving scrape events (decoupled logging).
pub trait ScrapeReporter: Send + Sync {
    fn report(&self, event: ScrapeEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingScrapeReporter;

impl ScrapeReporter for TracingScrapeReporter {
    fn report(&self, event: ScrapeEvent<'_>) {
        match event {
            ScrapeEvent::Started {
                run_id,
                resume_from,
                completed,
                failed,
            } => match resume_from {
                Some(cursor) => tracing::info!(
                    %run_id, %cursor, %completed, %failed,
                    "Resuming scrape"
                ),
                None => tracing::info!(%run_id, %completed, %failed, "Starting scrape"),
            },
            ScrapeEvent::BatchListed { cursor, pages } => {
                tracing::debug!(cursor = ?cursor.map(ToString::to_string), %pages, "Batch listed");
            }
            ScrapeEvent::PageSkipped { task } => {
                tracing::trace!(page_id = %task.page_id, "Already settled, skipping");
            }
            ScrapeEvent::PageFetched { page } => {
                tracing::info!(page_id = %page.page_id, title = %page.title, "Page fetched");
            }
            ScrapeEvent::PageFailed {
                task,
                error,
                attempts,
            } => {
                tracing::warn!(
                    page_id = %task.page_id,
                    title = %task.title,
                    %attempts,
                    %error,
                    "Page failed"
                );
            }
            ScrapeEvent::PageAbandoned { page_id, error } => {
                tracing::warn!(page_id = ?page_id.map(|id| id.0), %error, "Page left pending");
            }
            ScrapeEvent::CheckpointSaved { cursor } => {
                tracing::debug!(cursor = ?cursor.map(ToString::to_string), "Checkpoint saved");
            }
            ScrapeEvent::Cancelled { in_flight } => {
                tracing::info!(%in_flight, "Cancellation requested, draining in-flight pages");
            }
            ScrapeEvent::Finished { report } => {
                tracing::info!(
                    run_id = %report.run_id,
                    status = ?report.status,
                    fetched = report.fetched,
                    skipped = report.skipped,
                    failed = report.failed,
                    duration_ms = %report.duration().as_millis(),
                    "Scrape finished"
                );
            }
        }
    }
}

type FetchOutcome = (PageTask, Result<RawPage, FetchError>);

/// Drives a [`PageEnumerator`] and a [`RetryingFetcher`] against one
/// [`PageSource`], writing raw pages and recording progress.
pub struct Scraper<S> {
    source: S,
    raw_store: RawPageStore,
    config: ScrapeConfig,
}

impl<S> Scraper<S>
where
    S: PageSource + 'static,
{
    pub fn new(source: S, raw_store: RawPageStore, config: ScrapeConfig) -> Self {
        Self {
            source,
            raw_store,
            config,
        }
    }

    pub fn raw_store(&self) -> &RawPageStore {
        &self.raw_store
    }

    /// Scrape every listed page not already settled in `progress`.
    ///
    /// Permanent page failures are recorded and the run continues; listing
    /// failures and raw store write failures abort it. After `cancel_token`
    /// fires no new page is dispatched, but fetches already in flight are
    /// awaited and recorded.
    pub async fn run<WR: ScrapeReporter>(
        &self,
        progress: &mut ProgressStore,
        cancel_token: &CancellationToken,
        reporter: &WR,
    ) -> Result<ScrapeReport, AppError> {
        let started_at = Utc::now();
        let mut report = ScrapeReport {
            run_id: Uuid::new_v4(),
            status: RunStatus::Done,
            started_at,
            finished_at: started_at,
            listed: 0,
            fetched: 0,
            skipped: 0,
            failed: 0,
            abandoned: 0,
            failures: Vec::new(),
        };

        let resume_from = progress.record().cursor.clone();
        reporter.report(ScrapeEvent::Started {
            run_id: report.run_id,
            resume_from: resume_from.as_ref(),
            completed: progress.record().completed.len(),
            failed: progress.record().failed.len(),
        });

        let fetcher = RetryingFetcher::new(self.source.clone(), self.config.retry.clone());
        let mut enumerator =
            PageEnumerator::new(self.source.clone(), resume_from, self.config.retry.clone());
        let mut in_flight: JoinSet<FetchOutcome> = JoinSet::new();
        // Once a page of some batch is left pending, the cursor must not move
        // past that batch again in this run.
        let mut hold_cursor = false;

        'listing: loop {
            let batch = tokio::select! {
                biased;
                () = cancel_token.cancelled() => {
                    report.status = RunStatus::Cancelled;
                    break 'listing;
                }
                batch = enumerator.next_batch() => batch?,
            };
            let Some(batch) = batch else {
                break;
            };

            report.listed += batch.len();
            reporter.report(ScrapeEvent::BatchListed {
                cursor: enumerator.batch_cursor(),
                pages: batch.len(),
            });

            for task in batch {
                if progress.record().is_settled(task.page_id) {
                    report.skipped += 1;
                    reporter.report(ScrapeEvent::PageSkipped { task: &task });
                    continue;
                }

                while in_flight.len() >= self.config.concurrency {
                    self.record_next(
                        &mut in_flight,
                        progress,
                        reporter,
                        &mut report,
                        &mut hold_cursor,
                    )
                    .await?;
                }

                if cancel_token.is_cancelled() {
                    report.status = RunStatus::Cancelled;
                    break;
                }

                let fetcher = fetcher.clone();
                let cancel = cancel_token.clone();
                in_flight.spawn(async move {
                    let result = fetcher.fetch_until_cancelled(&task, &cancel).await;
                    (task, result)
                });
            }

            // Batch barrier: every page of this batch settles before the
            // cursor moves past it.
            if report.status == RunStatus::Cancelled {
                reporter.report(ScrapeEvent::Cancelled {
                    in_flight: in_flight.len(),
                });
            }
            while !in_flight.is_empty() {
                self.record_next(
                    &mut in_flight,
                    progress,
                    reporter,
                    &mut report,
                    &mut hold_cursor,
                )
                .await?;
            }
            if report.status == RunStatus::Cancelled {
                break;
            }

            if !hold_cursor {
                let next = enumerator.next_cursor().cloned();
                progress.set_cursor(next.clone())?;
                reporter.report(ScrapeEvent::CheckpointSaved {
                    cursor: next.as_ref(),
                });
            }
        }

        progress.save()?;
        report.finished_at = Utc::now();
        reporter.report(ScrapeEvent::Finished { report: &report });
        Ok(report)
    }

    /// Await one fetch task and record its outcome.
    async fn record_next<WR: ScrapeReporter>(
        &self,
        in_flight: &mut JoinSet<FetchOutcome>,
        progress: &mut ProgressStore,
        reporter: &WR,
        report: &mut ScrapeReport,
        hold_cursor: &mut bool,
    ) -> Result<(), AppError> {
        let Some(joined) = in_flight.join_next().await else {
            return Ok(());
        };

        match joined {
            Ok((_task, Ok(page))) => {
                self.raw_store.write(&page)?;
                progress.mark_completed(page.page_id)?;
                report.fetched += 1;
                reporter.report(ScrapeEvent::PageFetched { page: &page });
            }
            Ok((task, Err(FetchError::Permanent { source, attempts }))) => {
                progress.mark_failed(task.page_id)?;
                let error = source.to_string();
                report.failed += 1;
                reporter.report(ScrapeEvent::PageFailed {
                    task: &task,
                    error: &error,
                    attempts,
                });
                report.failures.push((task.page_id, error));
            }
            Ok((task, Err(err @ FetchError::Transient(_)))) => {
                *hold_cursor = true;
                report.abandoned += 1;
                let error = err.to_string();
                reporter.report(ScrapeEvent::PageAbandoned {
                    page_id: Some(task.page_id),
                    error: &error,
                });
            }
            Err(join_err) => {
                *hold_cursor = true;
                report.abandoned += 1;
                let error = join_err.to_string();
                reporter.report(ScrapeEvent::PageAbandoned {
                    page_id: None,
                    error: &error,
                });
            }
        }
        Ok(())
    }
}
