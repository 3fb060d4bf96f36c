use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::models::{PageTask, RawPage};
use crate::retry::{RetryPolicy, RetryState};
use crate::traits::PageSource;

/// Why a page could not be fetched.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Gave up on a retryable failure without exhausting the policy
    /// (the run was cancelled during backoff). The page stays pending.
    #[error("Fetch interrupted: {0}")]
    Transient(#[source] AppError),

    /// The page will not be fetched in this run: either the failure is not
    /// retryable or every attempt failed.
    #[error("Fetch failed after {attempts} attempt(s): {source}")]
    Permanent { source: AppError, attempts: u32 },
}

impl FetchError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, FetchError::Permanent { .. })
    }

    pub fn error(&self) -> &AppError {
        match self {
            FetchError::Transient(e) => e,
            FetchError::Permanent { source, .. } => source,
        }
    }
}

/// Fetches single pages through a [`PageSource`], retrying transient
/// failures according to a [`RetryPolicy`].
///
/// Has no notion of progress: recording the outcome is the caller's job.
#[derive(Clone)]
pub struct RetryingFetcher<S> {
    source: S,
    policy: RetryPolicy,
}

impl<S: PageSource> RetryingFetcher<S> {
    pub fn new(source: S, policy: RetryPolicy) -> Self {
        Self { source, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn fetch(&self, task: &PageTask) -> Result<RawPage, FetchError> {
        self.fetch_inner(task, None).await
    }

    /// Like [`fetch`](Self::fetch), but abandons the page (as
    /// [`FetchError::Transient`]) if `cancel` fires while backing off.
    pub async fn fetch_until_cancelled(
        &self,
        task: &PageTask,
        cancel: &CancellationToken,
    ) -> Result<RawPage, FetchError> {
        self.fetch_inner(task, Some(cancel)).await
    }

    async fn fetch_inner(
        &self,
        task: &PageTask,
        cancel: Option<&CancellationToken>,
    ) -> Result<RawPage, FetchError> {
        let mut state = RetryState::start();
        loop {
            let attempt = state.attempt().unwrap_or(1);
            let error = match self.source.fetch_page(task).await {
                Ok(text) => {
                    if attempt > 1 {
                        tracing::debug!(page_id = %task.page_id, attempt, "Fetch succeeded after retry");
                    }
                    return Ok(RawPage::new(task, text));
                }
                Err(e) => e,
            };

            if !error.is_retryable() {
                return Err(FetchError::Permanent {
                    source: error,
                    attempts: attempt,
                });
            }

            let (next, delay) = state.on_transient_failure(&self.policy);
            let Some(delay) = delay else {
                return Err(FetchError::Permanent {
                    source: error,
                    attempts: attempt,
                });
            };

            tracing::warn!(
                page_id = %task.page_id,
                title = %task.title,
                attempt,
                max_attempts = self.policy.max_attempts,
                delay_ms = %delay.as_millis(),
                error = %error,
                "Transient fetch failure, retrying"
            );

            match cancel {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => return Err(FetchError::Transient(error)),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                None => tokio::time::sleep(delay).await,
            }
            state = next;
        }
    }
}
