//! Exponential backoff for wiki requests.
//!
//! [`RetryPolicy::delay_for_attempt`] is a pure function of the attempt
//! number; [`RetryState`] is the explicit state machine the fetcher and the
//! enumerator step through:
//!
//! ```text
//! Attempting(1) --[transient failure]--> Attempting(2) ... Attempting(max)
//!       |                                                       |
//!   [success]                                          [transient failure]
//!       v                                                       v
//!   Succeeded                                               Exhausted
//! ```

use std::time::Duration;

/// Retry configuration with exponential backoff.
///
/// Delay before attempt `n + 1` is `base_delay * 2^(n - 1)`, capped at
/// `max_delay`, plus up to `jitter` of random noise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            jitter: Duration::ZERO,
        }
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// No waiting between attempts. Used by tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    /// Backoff after failed attempt `attempt` (1-indexed), without jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(1u32 << exponent);
        std::cmp::min(delay, self.max_delay)
    }

    /// Backoff after failed attempt `attempt` with jitter applied.
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let delay = self.delay_for_attempt(attempt);
        if self.jitter.is_zero() {
            return delay;
        }
        delay + Duration::from_millis(crate::util::rand_jitter_ms(self.jitter.as_millis() as u64))
    }
}

/// Where a retried operation currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// About to make attempt `n` (1-indexed).
    Attempting(u32),
    Succeeded,
    Exhausted,
}

impl RetryState {
    pub fn start() -> Self {
        RetryState::Attempting(1)
    }

    pub fn on_success(self) -> Self {
        RetryState::Succeeded
    }

    /// Step after a transient failure, returning the delay to wait before the
    /// next attempt (`None` once exhausted).
    pub fn on_transient_failure(self, policy: &RetryPolicy) -> (Self, Option<Duration>) {
        match self {
            RetryState::Attempting(n) if n < policy.max_attempts => (
                RetryState::Attempting(n + 1),
                Some(policy.jittered_delay(n)),
            ),
            RetryState::Attempting(_) => (RetryState::Exhausted, None),
            terminal => (terminal, None),
        }
    }

    pub fn attempt(&self) -> Option<u32> {
        match self {
            RetryState::Attempting(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RetryState::Attempting(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy::new(10, Duration::from_millis(100), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(800));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(60), Duration::from_secs(1));
    }

    #[test]
    fn test_jitter_is_bounded() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100), Duration::from_secs(1))
            .with_jitter(Duration::from_millis(50));
        for _ in 0..100 {
            let d = policy.jittered_delay(1);
            assert!(d >= Duration::from_millis(100));
            assert!(d < Duration::from_millis(150));
        }
    }

    #[test]
    fn test_state_machine_exhausts_after_max_attempts() {
        let policy = RetryPolicy::immediate(3);
        let state = RetryState::start();
        assert_eq!(state.attempt(), Some(1));

        let (state, delay) = state.on_transient_failure(&policy);
        assert_eq!(state, RetryState::Attempting(2));
        assert_eq!(delay, Some(Duration::ZERO));

        let (state, _) = state.on_transient_failure(&policy);
        assert_eq!(state, RetryState::Attempting(3));

        let (state, delay) = state.on_transient_failure(&policy);
        assert_eq!(state, RetryState::Exhausted);
        assert!(delay.is_none());
        assert!(state.is_terminal());
    }

    #[test]
    fn test_success_is_terminal() {
        let policy = RetryPolicy::immediate(3);
        let state = RetryState::start().on_success();
        assert_eq!(state, RetryState::Succeeded);
        assert_eq!(state.on_transient_failure(&policy).0, RetryState::Succeeded);
    }

    #[test]
    fn test_single_attempt_policy_never_retries() {
        let policy = RetryPolicy::immediate(0);
        assert_eq!(policy.max_attempts, 1);
        let (state, _) = RetryState::start().on_transient_failure(&policy);
        assert_eq!(state, RetryState::Exhausted);
    }
}
