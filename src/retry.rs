//! Bounded retry with a fixed sleep between attempts.
//!
//! A call is given a [`RetryPolicy`] (how long to sleep, how many attempts in
//! total) and a starting trial count. Each attempt reports an [`Attempt`];
//! transport failures are retried until the budget is spent and then
//! returned unchanged, so the caller sees the same error a single failed call
//! would have produced.

use anyhow::Result;
use log::{debug, error, warn};
use reqwest::StatusCode;
use std::future::Future;
use std::time::Duration;

/// Default number of attempts for a single logical request.
pub const DEFAULT_MAX_TRY: u32 = 5;

/// Default pause between two attempts.
pub const DEFAULT_SLEEP_TIME: Duration = Duration::from_secs(30);

/// Errors raised by the retry loop itself, as opposed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError {
    /// The budget allows no attempt at all (`max_try == 0` or `trials >= max_try`).
    InvalidRetryBudget { max_try: u32, trials: u32 },
    /// Every attempt got a response, but none with an acceptable status.
    /// Only produced when [`RetryPolicy::retry_on_status`] is set.
    MaxTryReached { max_try: u32, status: StatusCode },
}

impl std::fmt::Display for RetryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryError::InvalidRetryBudget { max_try, trials } => {
                write!(
                    f,
                    "Invalid retry budget: {} trials already made out of a maximum of {}",
                    trials, max_try
                )
            }
            RetryError::MaxTryReached { max_try, status } => {
                write!(
                    f,
                    "Max try of {} has been reached, last status: {}",
                    max_try, status
                )
            }
        }
    }
}

impl std::error::Error for RetryError {}

/// How a request is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Pause between two attempts.
    pub sleep_time: Duration,
    /// Total number of attempts allowed, counting the first one.
    pub max_try: u32,
    /// Also retry when a response arrives with a non-2xx status.
    pub retry_on_status: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            sleep_time: DEFAULT_SLEEP_TIME,
            max_try: DEFAULT_MAX_TRY,
            retry_on_status: false,
        }
    }
}

impl RetryPolicy {
    pub fn new(sleep_time: Duration, max_try: u32) -> Self {
        Self {
            sleep_time,
            max_try,
            retry_on_status: false,
        }
    }

    pub fn with_retry_on_status(mut self, retry_on_status: bool) -> Self {
        self.retry_on_status = retry_on_status;
        self
    }

    /// Opens a budget for a call resuming after `trials` attempts.
    pub fn budget(&self, trials: u32) -> Result<RetryBudget, RetryError> {
        RetryBudget::new(self.max_try, trials)
    }
}

/// Attempts made so far against the maximum allowed.
///
/// Invariant: `trials <= max_try`, and a freshly opened budget always has
/// room for at least one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    max_try: u32,
    trials: u32,
}

impl RetryBudget {
    pub fn new(max_try: u32, trials: u32) -> Result<Self, RetryError> {
        if max_try == 0 || trials >= max_try {
            return Err(RetryError::InvalidRetryBudget { max_try, trials });
        }
        Ok(Self { max_try, trials })
    }

    pub fn max_try(&self) -> u32 {
        self.max_try
    }

    pub fn trials(&self) -> u32 {
        self.trials
    }

    /// Counts one more attempt and returns its 1-based number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.trials = (self.trials + 1).min(self.max_try);
        self.trials
    }

    pub fn is_exhausted(&self) -> bool {
        self.trials >= self.max_try
    }
}

/// What a single attempt produced.
#[derive(Debug)]
pub enum Attempt<T> {
    Success(T),
    /// Transport failure. Retried; returned as-is once the budget is spent.
    Failed(anyhow::Error),
    /// A response arrived but its status was rejected by the policy.
    Rejected(StatusCode),
    /// Never retried (malformed request, bad URL).
    Fatal(anyhow::Error),
}

/// A successful value together with the trial count it took to get it.
#[derive(Debug)]
pub struct Retried<T> {
    pub value: T,
    pub trials: u32,
}

impl<T> Retried<T> {
    pub fn into_inner(self) -> T {
        self.value
    }
}

enum Step<T> {
    Done(Result<Retried<T>>),
    Sleep,
}

/// Decides what happens after an attempt. Shared by the async and blocking loops.
fn settle<T>(
    operation_name: &str,
    policy: &RetryPolicy,
    budget: &RetryBudget,
    attempt: Attempt<T>,
) -> Step<T> {
    let trials = budget.trials();
    let max_try = budget.max_try();

    match attempt {
        Attempt::Success(value) => {
            debug!("{}: succeeded on trial {}/{}", operation_name, trials, max_try);
            Step::Done(Ok(Retried { value, trials }))
        }
        Attempt::Fatal(e) => {
            debug!("{}: non-retryable error: {}", operation_name, e);
            Step::Done(Err(e))
        }
        Attempt::Failed(e) => {
            error!(
                "{} error: {}; {}/{} trials; sleep time: {:?}",
                operation_name, e, trials, max_try, policy.sleep_time
            );
            if budget.is_exhausted() {
                Step::Done(Err(e))
            } else {
                Step::Sleep
            }
        }
        Attempt::Rejected(status) => {
            warn!(
                "{} bad status code: {}; {}/{} trials; sleep time: {:?}",
                operation_name, status, trials, max_try, policy.sleep_time
            );
            if budget.is_exhausted() {
                Step::Done(Err(RetryError::MaxTryReached { max_try, status }.into()))
            } else {
                Step::Sleep
            }
        }
    }
}

/// Runs `operation` until it succeeds or the budget opened at `trials` is spent.
pub async fn with_retry<F, Fut, T>(
    operation_name: &str,
    policy: &RetryPolicy,
    trials: u32,
    operation: F,
) -> Result<Retried<T>>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Attempt<T>>,
{
    let mut budget = policy.budget(trials)?;

    loop {
        budget.begin_attempt();
        match settle(operation_name, policy, &budget, operation().await) {
            Step::Done(result) => return result,
            Step::Sleep => tokio::time::sleep(policy.sleep_time).await,
        }
    }
}

/// Blocking counterpart of [`with_retry`]; sleeps the calling thread.
pub fn with_retry_blocking<F, T>(
    operation_name: &str,
    policy: &RetryPolicy,
    trials: u32,
    operation: F,
) -> Result<Retried<T>>
where
    F: Fn() -> Attempt<T>,
{
    let mut budget = policy.budget(trials)?;

    loop {
        budget.begin_attempt();
        match settle(operation_name, policy, &budget, operation()) {
            Step::Done(result) => return result,
            Step::Sleep => std::thread::sleep(policy.sleep_time),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    fn quick(max_try: u32) -> RetryPolicy {
        RetryPolicy::new(Duration::ZERO, max_try)
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.sleep_time, Duration::from_secs(30));
        assert_eq!(policy.max_try, 5);
        assert!(!policy.retry_on_status);
    }

    #[test]
    fn test_budget_rejects_zero_max_try() {
        assert_eq!(
            RetryBudget::new(0, 0),
            Err(RetryError::InvalidRetryBudget {
                max_try: 0,
                trials: 0
            })
        );
    }

    #[test]
    fn test_budget_rejects_spent_trials() {
        assert!(RetryBudget::new(3, 3).is_err());
        assert!(RetryBudget::new(3, 7).is_err());
        assert!(RetryBudget::new(3, 2).is_ok());
    }

    #[test]
    fn test_budget_counts_attempts() {
        let mut budget = RetryBudget::new(3, 0).unwrap();
        assert_eq!(budget.begin_attempt(), 1);
        assert!(!budget.is_exhausted());
        assert_eq!(budget.begin_attempt(), 2);
        assert_eq!(budget.begin_attempt(), 3);
        assert!(budget.is_exhausted());
        // Never runs past the maximum.
        assert_eq!(budget.begin_attempt(), 3);
    }

    #[test]
    fn test_retry_error_display() {
        let err = RetryError::InvalidRetryBudget {
            max_try: 5,
            trials: 5,
        };
        assert!(err.to_string().contains("Invalid retry budget"));

        let err = RetryError::MaxTryReached {
            max_try: 2,
            status: StatusCode::BAD_GATEWAY,
        };
        assert!(err.to_string().contains("Max try of 2"));
        assert!(err.to_string().contains("502"));
    }

    #[tokio::test]
    async fn test_with_retry_success() {
        let result = with_retry("test", &quick(5), 0, || async { Attempt::Success(42) })
            .await
            .unwrap();
        assert_eq!(result.value, 42);
        assert_eq!(result.trials, 1);
    }

    #[tokio::test]
    async fn test_with_retry_exhausts_budget() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = Arc::clone(&attempts);

        let result = with_retry("test", &quick(4), 0, || {
            let attempts = Arc::clone(&attempts_clone);
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Attempt::<i32>::Failed(anyhow::anyhow!("connection refused"))
            }
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "connection refused");
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_with_retry_succeeds_on_kth_attempt() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = Arc::clone(&attempts);

        let result = with_retry("test", &quick(5), 0, || {
            let attempts = Arc::clone(&attempts_clone);
            async move {
                let count = attempts.fetch_add(1, Ordering::SeqCst);
                if count < 2 {
                    Attempt::Failed(anyhow::anyhow!("connection reset"))
                } else {
                    Attempt::Success("ok")
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result.value, "ok");
        assert_eq!(result.trials, 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_resumes_from_trials() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = Arc::clone(&attempts);

        let result = with_retry("test", &quick(5), 4, || {
            let attempts = Arc::clone(&attempts_clone);
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Attempt::<()>::Failed(anyhow::anyhow!("timeout"))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_retry_invalid_budget_makes_no_attempt() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = Arc::clone(&attempts);

        let result = with_retry("test", &quick(3), 3, || {
            let attempts = Arc::clone(&attempts_clone);
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Attempt::Success(())
            }
        })
        .await;

        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RetryError>(),
            Some(RetryError::InvalidRetryBudget {
                max_try: 3,
                trials: 3
            })
        ));
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_with_retry_fatal_is_not_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = Arc::clone(&attempts);

        let result = with_retry("test", &quick(5), 0, || {
            let attempts = Arc::clone(&attempts_clone);
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Attempt::<()>::Fatal(anyhow::anyhow!("relative URL without a base"))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_retry_rejected_status_reports_max_try() {
        let result = with_retry("test", &quick(2), 0, || async {
            Attempt::<()>::Rejected(StatusCode::SERVICE_UNAVAILABLE)
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(
            err.downcast_ref::<RetryError>(),
            Some(&RetryError::MaxTryReached {
                max_try: 2,
                status: StatusCode::SERVICE_UNAVAILABLE
            })
        );
    }

    #[tokio::test]
    async fn test_with_retry_sleeps_between_attempts() {
        let policy = RetryPolicy::new(Duration::from_millis(40), 3);
        let start = Instant::now();

        let result = with_retry("test", &policy, 0, || async {
            Attempt::<()>::Failed(anyhow::anyhow!("dns error"))
        })
        .await;

        assert!(result.is_err());
        // Two sleeps for three attempts.
        assert!(start.elapsed() >= Duration::from_millis(80));
    }

    #[test_log::test]
    fn test_with_retry_blocking_counts_attempts() {
        let attempts = AtomicUsize::new(0);

        let result = with_retry_blocking("test", &quick(3), 0, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            Attempt::<()>::Failed(anyhow::anyhow!("connection refused"))
        });

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_with_retry_blocking_sleeps_between_attempts() {
        let policy = RetryPolicy::new(Duration::from_millis(30), 3);
        let start = Instant::now();

        let result = with_retry_blocking("test", &policy, 0, || {
            Attempt::<()>::Failed(anyhow::anyhow!("timeout"))
        });

        assert!(result.is_err());
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn test_with_retry_blocking_success_after_rejection() {
        let attempts = AtomicUsize::new(0);
        let policy = quick(3).with_retry_on_status(true);

        let result = with_retry_blocking("test", &policy, 0, || {
            if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                Attempt::Rejected(StatusCode::INTERNAL_SERVER_ERROR)
            } else {
                Attempt::Success(7)
            }
        })
        .unwrap();

        assert_eq!(result.into_inner(), 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
