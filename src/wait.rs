//! # Readiness Waits
//!
//! Bounded fixed-interval polling against externally-reconciled state.
//!
//! The objects this harness creates (address claims, test environments,
//! namespace dependencies) are resolved asynchronously by controllers the
//! harness does not own. [`wait_for`] is the single wait primitive used for
//! all of them: it re-fetches the object on a fixed interval until a
//! caller-supplied predicate holds or the overall budget is exhausted.
//!
//! Fetch errors are treated as "not yet ready" rather than fatal - the
//! object may simply not have been created yet, or the API may be
//! momentarily unavailable. Only the timeout aborts a wait.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::constants::{DEFAULT_POLL_INTERVAL, DEFAULT_READINESS_TIMEOUT};
use crate::error::{Error, Result};

/// Poll interval and overall budget for a readiness wait.
///
/// The defaults are shared by every wait in the harness so that readiness
/// failures behave consistently across resources; both values can be tuned
/// per suite.
#[derive(Clone, Copy, Debug)]
pub struct WaitConfig {
    /// Delay between consecutive polls.
    pub interval: Duration,
    /// Overall budget before the wait fails.
    pub timeout: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_READINESS_TIMEOUT,
        }
    }
}

/// Poll `fetch` every `config.interval` until `predicate` holds, returning
/// the state that satisfied it.
///
/// `what` identifies the watched object in logs and in the
/// [`Error::ReadinessTimeout`] raised when the budget runs out. The watched
/// object is only ever read, never mutated.
pub async fn wait_for<T, F, Fut, P>(
    config: WaitConfig,
    what: &str,
    mut fetch: F,
    predicate: P,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
    P: Fn(&T) -> bool,
{
    let deadline = Instant::now() + config.timeout;
    loop {
        match fetch().await {
            Ok(state) if predicate(&state) => return Ok(state),
            Ok(_) => debug!(what, "not ready yet"),
            // The object may not exist yet, or the API may be briefly
            // unavailable; both resolve themselves or hit the deadline.
            Err(error) => debug!(what, %error, "fetch failed, treating as not ready"),
        }

        if Instant::now() + config.interval > deadline {
            return Err(Error::readiness_timeout(what, config.timeout));
        }
        tokio::time::sleep(config.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn quick() -> WaitConfig {
        WaitConfig {
            interval: Duration::from_millis(5),
            timeout: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn returns_immediately_when_already_ready() {
        let result = wait_for(quick(), "object", || async { Ok(7) }, |n| *n == 7).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn succeeds_once_the_predicate_turns_true() {
        let polls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&polls);

        let started = Instant::now();
        let result = wait_for(
            WaitConfig {
                interval: Duration::from_millis(5),
                timeout: Duration::from_secs(5),
            },
            "object",
            || {
                let counter = Arc::clone(&counter);
                async move { Ok(counter.fetch_add(1, Ordering::SeqCst) + 1) }
            },
            |n| *n >= 3,
        )
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(polls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn fetch_errors_count_as_not_ready() {
        let polls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&polls);

        let result = wait_for(
            quick(),
            "object",
            || {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(anyhow::anyhow!("not found"))
                    } else {
                        Ok("ready")
                    }
                }
            },
            |state| *state == "ready",
        )
        .await;

        assert_eq!(result.unwrap(), "ready");
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn times_out_after_the_full_budget() {
        let polls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&polls);

        let result = wait_for(
            quick(),
            "AddressClaim e2e-ipam/quick-start",
            || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(false)
                }
            },
            |ready| *ready,
        )
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err, Error::ReadinessTimeout { .. }));
        assert!(err.to_string().contains("AddressClaim e2e-ipam/quick-start"));
        // With a 50ms budget and 5ms interval the waiter gets several polls
        // in before giving up; the timeout never fires on the first poll.
        assert!(polls.load(Ordering::SeqCst) >= 5);
    }

    #[tokio::test]
    async fn persistent_fetch_errors_still_time_out() {
        let result: Result<()> = wait_for(
            quick(),
            "object",
            || async { Err(anyhow::anyhow!("api unavailable")) },
            |_| true,
        )
        .await;

        assert!(matches!(result, Err(Error::ReadinessTimeout { .. })));
    }
}
