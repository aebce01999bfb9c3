//! Bounded polling retry wrapper for fallible asynchronous operations.
//!
//! Hardware links come up slowly and fail transiently. `run_with_retries`
//! wraps an operation in a bounded-attempt, minimum-interval throttle: a
//! fixed poll tick checks whether an attempt may be launched, success
//! settles immediately, and once the attempt budget is exhausted the last
//! observed failure is surfaced as-is. This is deliberately not an
//! exponential backoff; the wrapped operations (opening a hardware link,
//! issuing a command) are already slow relative to the tick.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

/// Reference tick driving the retry poll loop.
pub const POLL_TICK: Duration = Duration::from_millis(50);

/// Run `operation` until it succeeds or `max_retries` attempts have failed.
///
/// On each poll tick at most one attempt is in flight. A new attempt is
/// launched only when no prior failure is recorded or at least
/// `min_interval` has elapsed since the last failure. Success completes
/// with the operation's value; the terminal failure is the last one
/// observed.
///
/// There is no external cancellation: the future runs to success or budget
/// exhaustion. Callers that need a hard deadline impose it above this
/// layer.
pub async fn run_with_retries<T, E, F, Fut>(
    mut operation: F,
    max_retries: u32,
    min_interval: Duration,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut ticker = tokio::time::interval(POLL_TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut attempts = 0u32;
    let mut last_failure: Option<Instant> = None;

    loop {
        ticker.tick().await;

        // Wait out the minimum interval after a failure.
        if let Some(failed_at) = last_failure {
            if failed_at.elapsed() < min_interval {
                continue;
            }
        }

        attempts += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                debug!(attempt = attempts, max_retries, "retry attempt failed");
                if attempts >= max_retries {
                    return Err(err);
                }
                last_failure = Some(Instant::now());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Mutex;

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_two_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = run_with_retries(
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err("link down")
                    } else {
                        Ok(n)
                    }
                }
            },
            3,
            Duration::from_millis(100),
        )
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_terminates_with_last_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), String> = run_with_retries(
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Err(format!("attempt {} failed", n)) }
            },
            3,
            Duration::from_millis(100),
        )
        .await;

        assert_eq!(result, Err("attempt 3 failed".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_min_interval_between_attempts() {
        let stamps = Arc::new(Mutex::new(Vec::new()));
        let recorder = stamps.clone();

        let _: Result<(), &str> = run_with_retries(
            move || {
                let recorder = recorder.clone();
                async move {
                    recorder.lock().await.push(Instant::now());
                    Err("still down")
                }
            },
            3,
            Duration::from_millis(100),
        )
        .await;

        let stamps = stamps.lock().await;
        assert_eq!(stamps.len(), 3);
        for pair in stamps.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(100));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_success_is_one_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<u32, &str> = run_with_retries(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Ok(42) }
            },
            5,
            Duration::from_millis(100),
        )
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
