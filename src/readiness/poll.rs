//! Attempt-bounded polling

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How often and how long to poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl PollPolicy {
    /// Bootstrap server wait: 30 attempts, 30 seconds apart
    pub const BOOTSTRAP: PollPolicy = PollPolicy::new(30, Duration::from_secs(30));

    /// API server wait before applying manifests: 20 attempts, 15 seconds apart
    pub const API_ONLY: PollPolicy = PollPolicy::new(20, Duration::from_secs(15));

    pub const fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Upper bound on time spent sleeping between attempts
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts.saturating_sub(1)
    }
}

/// Run `check` until it returns true, the attempts run out or `cancel` fires
///
/// `check` receives the 1-based attempt number. There is no sleep after the
/// final attempt.
pub async fn poll_until<F, Fut>(policy: PollPolicy, cancel: &CancellationToken, mut check: F) -> bool
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = bool>,
{
    for attempt in 1..=policy.max_attempts {
        if cancel.is_cancelled() {
            return false;
        }

        let ok = tokio::select! {
            _ = cancel.cancelled() => return false,
            ok = check(attempt) => ok,
        };
        if ok {
            return true;
        }

        if attempt < policy.max_attempts {
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = tokio::time::sleep(policy.interval) => {}
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_stops_on_first_success() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let policy = PollPolicy::new(5, Duration::from_secs(10));

        let ok = poll_until(policy, &cancel, |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { attempt == 3 }
        })
        .await;

        assert!(ok);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_sleep_after_last_attempt() {
        let cancel = CancellationToken::new();
        let policy = PollPolicy::new(3, Duration::from_secs(10));
        let start = tokio::time::Instant::now();

        let ok = poll_until(policy, &cancel, |_| async { false }).await;

        assert!(!ok);
        assert_eq!(start.elapsed(), Duration::from_secs(20));
        assert_eq!(policy.budget(), Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_polling() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let policy = PollPolicy::new(10, Duration::from_secs(10));

        let ok = poll_until(policy, &cancel, |_| {
            if calls.fetch_add(1, Ordering::SeqCst) == 1 {
                cancel.cancel();
            }
            async { false }
        })
        .await;

        assert!(!ok);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_constants() {
        assert_eq!(PollPolicy::BOOTSTRAP.max_attempts, 30);
        assert_eq!(PollPolicy::API_ONLY.interval, Duration::from_secs(15));
    }
}
