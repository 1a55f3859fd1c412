//! Timed retry primitive shared by the editor wait and the OAuth poll.
//!
//! An operation is attempted up to `max_attempts` times with `interval`
//! between attempts. The first attempt runs immediately, so the whole loop
//! finishes within `max_attempts * interval`.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
        }
    }

    /// Policy that keeps trying until `timeout` has elapsed, checking every `interval`.
    pub fn within(timeout: Duration, interval: Duration) -> Self {
        let interval_ms = interval.as_millis().max(1);
        let attempts = timeout.as_millis() / interval_ms + 1;
        Self::new(u32::try_from(attempts).unwrap_or(u32::MAX), interval)
    }

    /// Upper bound on wall-clock time spent sleeping when no slow-down is requested.
    pub fn bound(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

/// Outcome of a single attempt.
#[derive(Debug)]
pub enum Attempt<T, E> {
    Ready(T),
    Pending,
    /// Still pending; widen the interval by the given amount for all later attempts.
    SlowDown(Duration),
    Failed(E),
}

#[derive(Debug, PartialEq, Eq)]
pub enum RetryError<E> {
    Exhausted { attempts: u32 },
    Cancelled,
    Failed(E),
}

pub async fn poll_until<T, E, F, Fut>(
    policy: RetryPolicy,
    cancel: &CancellationToken,
    mut attempt: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Attempt<T, E>>,
{
    let mut interval = policy.interval;

    for n in 1..=policy.max_attempts {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        match attempt(n).await {
            Attempt::Ready(value) => return Ok(value),
            Attempt::Failed(err) => return Err(RetryError::Failed(err)),
            Attempt::Pending => {}
            Attempt::SlowDown(extra) => {
                interval += extra;
                log::debug!("Retry interval widened to {:?}", interval);
            }
        }

        if n == policy.max_attempts {
            break;
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            _ = sleep(interval) => {}
        }
    }

    Err(RetryError::Exhausted {
        attempts: policy.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    #[test]
    fn within_covers_the_whole_timeout() {
        let policy = RetryPolicy::within(Duration::from_secs(10), Duration::from_millis(100));
        assert_eq!(policy.max_attempts, 101);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_first_ready() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let token = CancellationToken::new();

        let result: Result<u32, RetryError<()>> = poll_until(
            RetryPolicy::new(10, Duration::from_secs(5)),
            &token,
            move |n| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 3 {
                        Attempt::Ready(n)
                    } else {
                        Attempt::Pending
                    }
                }
            },
        )
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_within_bound() {
        let policy = RetryPolicy::new(60, Duration::from_secs(5));
        let token = CancellationToken::new();
        let started = Instant::now();

        let result: Result<(), RetryError<()>> =
            poll_until(policy, &token, |_| async { Attempt::Pending }).await;

        assert_eq!(result, Err(RetryError::Exhausted { attempts: 60 }));
        assert!(started.elapsed() <= policy.bound());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_down_widens_interval() {
        let token = CancellationToken::new();
        let started = Instant::now();

        let result: Result<(), RetryError<()>> = poll_until(
            RetryPolicy::new(2, Duration::from_secs(5)),
            &token,
            |_| async { Attempt::SlowDown(Duration::from_secs(5)) },
        )
        .await;

        assert_eq!(result, Err(RetryError::Exhausted { attempts: 2 }));
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn failure_is_terminal() {
        let token = CancellationToken::new();
        let result: Result<(), RetryError<&str>> = poll_until(
            RetryPolicy::new(5, Duration::from_secs(1)),
            &token,
            |_| async { Attempt::Failed("denied") },
        )
        .await;
        assert_eq!(result, Err(RetryError::Failed("denied")));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_sleep() {
        let token = CancellationToken::new();
        let child = token.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(3)).await;
            child.cancel();
        });

        let result: Result<(), RetryError<()>> = poll_until(
            RetryPolicy::new(100, Duration::from_secs(1)),
            &token,
            |_| async { Attempt::Pending },
        )
        .await;
        assert_eq!(result, Err(RetryError::Cancelled));
    }
}
