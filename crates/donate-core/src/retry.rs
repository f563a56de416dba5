//! retry + timeout wrapper for user-mediated wallet calls
//!
//! every wallet call may sit behind an extension popup for as long as the
//! user likes, and extensions fail intermittently. each attempt is raced
//! against a deadline; transient failures are retried a bounded number of
//! times, while anything the user or the input caused is surfaced at once.
//!
//! the timeout only stops waiting. the underlying wallet call is not
//! aborted and may still complete on the extension side.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{FailureKind, WalletError, WalletFailure};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(2_000);

/// callback invoked with the number of the attempt about to start
pub type RetryHook = Arc<dyn Fn(u32) + Send + Sync>;

/// retry configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// deadline per attempt
    pub timeout: Duration,
    /// total attempts including the first
    pub max_attempts: u32,
    /// pause between attempts
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// runs wallet operations under a [`RetryPolicy`]
#[derive(Clone, Default)]
pub struct RetryRunner {
    policy: RetryPolicy,
    on_retry: Option<RetryHook>,
}

impl std::fmt::Debug for RetryRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryRunner")
            .field("policy", &self.policy)
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

impl RetryRunner {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            on_retry: None,
        }
    }

    /// register a callback fired before attempts 2..=n
    pub fn with_on_retry(mut self, hook: impl Fn(u32) + Send + Sync + 'static) -> Self {
        self.on_retry = Some(Arc::new(hook));
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// run `op` until it succeeds, fails terminally, or attempts run out
    ///
    /// `operation` names the call in logs and in the exhaustion error.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, WalletError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, WalletFailure>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last = String::new();

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                tokio::time::sleep(self.policy.retry_delay).await;
                if let Some(hook) = &self.on_retry {
                    hook(attempt);
                }
            }

            debug!("{}: attempt {}/{}", operation, attempt, max_attempts);

            let failure = match tokio::time::timeout(self.policy.timeout, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(failure)) => failure,
                Err(_) => WalletFailure::new(format!(
                    "{} timed out after {}ms",
                    operation,
                    self.policy.timeout.as_millis()
                )),
            };

            match failure.kind() {
                FailureKind::UserCancelled => {
                    debug!("{}: cancelled by user", operation);
                    return Err(WalletError::UserCancelled(failure.message));
                }
                FailureKind::InvalidParameters => {
                    warn!("{}: rejected as invalid: {}", operation, failure.message);
                    return Err(WalletError::InvalidParameters(failure.message));
                }
                FailureKind::Timeout | FailureKind::Transient => {
                    warn!(
                        "{}: attempt {}/{} failed: {}",
                        operation, attempt, max_attempts, failure.message
                    );
                    last = failure.message;
                }
            }
        }

        Err(WalletError::Exhausted {
            operation: operation.to_string(),
            attempts: max_attempts,
            last,
        })
    }
}
