use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryPolicy {
    RepeatConstant { sleep: Duration, max_attempts: u64 },
}

impl RetryPolicy {
    pub fn repeat_constant(sleep: Duration, max_attempts: u64) -> Self {
        RetryPolicy::RepeatConstant {
            sleep,
            max_attempts,
        }
    }

    /// Enough constant-delay attempts to keep polling for roughly `window`.
    pub fn poll_for(window: Duration, interval: Duration) -> Self {
        let attempts = window
            .as_millis()
            .checked_div(interval.as_millis())
            .and_then(|attempts| u64::try_from(attempts).ok())
            .unwrap_or(u64::MAX);

        Self::repeat_constant(interval, attempts.saturating_add(1))
    }
}

/// Drives `get_future` until it succeeds or the policy runs out of attempts, in which case the
/// last error is returned.
pub async fn with_retry<F, Fut, R, Err>(get_future: F, policy: RetryPolicy) -> Result<R, Err>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<R, Err>>,
{
    let RetryPolicy::RepeatConstant {
        sleep: delay,
        max_attempts,
    } = policy;
    let mut attempt: u64 = 1;

    loop {
        match get_future().await {
            Ok(result) => return Ok(result),
            Err(err) if attempt >= max_attempts => return Err(err),
            Err(_) => {
                attempt = attempt.saturating_add(1);
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    use super::{with_retry, RetryPolicy};

    #[tokio::test(start_paused = true)]
    async fn should_return_first_success() {
        let calls = AtomicU64::new(0);

        let result = with_retry(
            || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("not yet")
                } else {
                    Ok(5)
                }
            },
            RetryPolicy::repeat_constant(Duration::from_secs(1), 10),
        )
        .await;

        assert_eq!(result, Ok(5));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn should_give_up_after_max_attempts() {
        let calls = AtomicU64::new(0);

        let result: Result<(), _> = with_retry(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("still failing")
            },
            RetryPolicy::repeat_constant(Duration::from_secs(1), 3),
        )
        .await;

        assert_eq!(result, Err("still failing"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn poll_for_should_cover_the_window() {
        assert_eq!(
            RetryPolicy::poll_for(Duration::from_secs(60), Duration::from_secs(2)),
            RetryPolicy::repeat_constant(Duration::from_secs(2), 31)
        );
        assert_eq!(
            RetryPolicy::poll_for(Duration::from_secs(1), Duration::ZERO),
            RetryPolicy::repeat_constant(Duration::ZERO, u64::MAX)
        );
    }
}
