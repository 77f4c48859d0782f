//! Rolling-window admission control for outbound model calls.
//!
//! At most `max_per_window` calls are admitted in any trailing `window`. Timestamps are
//! `tokio::time::Instant`, so tests drive the window with a paused clock.

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::info;

pub const DEFAULT_MAX_PER_WINDOW: usize = 15;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitStats {
    pub max_per_window: usize,
    pub requests_in_window: usize,
    pub remaining_requests: usize,
    pub can_admit: bool,
    pub wait_seconds: u64,
}

/// Timestamps of admitted calls still inside the window, oldest first.
#[derive(Debug, Default)]
struct Window {
    admitted: VecDeque<Instant>,
}

impl Window {
    fn purge(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.admitted.front() {
            if now.saturating_duration_since(oldest) < window {
                break;
            }
            self.admitted.pop_front();
        }
    }

    fn can_admit(&mut self, now: Instant, window: Duration, max: usize) -> bool {
        self.purge(now, window);
        self.admitted.len() < max
    }

    fn wait_seconds(&mut self, now: Instant, window: Duration, max: usize) -> u64 {
        if self.can_admit(now, window, max) {
            return 0;
        }
        let Some(&oldest) = self.admitted.front() else {
            return 0;
        };
        let remaining = (oldest + window).saturating_duration_since(now);
        // ceil to whole seconds; after purge `remaining` is strictly positive
        remaining.as_millis().div_ceil(1000) as u64
    }
}

pub struct RateLimiter {
    max_per_window: usize,
    window: Duration,
    state: Mutex<Window>,
}

impl RateLimiter {
    pub fn new(max_per_window: usize) -> Self {
        Self::with_window(max_per_window, DEFAULT_WINDOW)
    }

    pub fn with_window(max_per_window: usize, window: Duration) -> Self {
        Self {
            max_per_window,
            window,
            state: Mutex::new(Window::default()),
        }
    }

    pub fn max_per_window(&self) -> usize {
        self.max_per_window
    }

    /// Whether a call could be admitted right now. Purges expired timestamps.
    pub async fn can_admit(&self) -> bool {
        let mut state = self.state.lock().await;
        state.can_admit(Instant::now(), self.window, self.max_per_window)
    }

    /// Whole seconds until the oldest admission leaves the window; 0 when a slot is free.
    pub async fn wait_seconds(&self) -> u64 {
        let mut state = self.state.lock().await;
        state.wait_seconds(Instant::now(), self.window, self.max_per_window)
    }

    /// Records an admission at the current instant.
    pub async fn record_admission(&self) {
        self.state.lock().await.admitted.push_back(Instant::now());
    }

    /// Waits for a free slot, records the admission, then runs `f`.
    ///
    /// A slot is only claimed under the same lock guard that saw it free, so two callers can
    /// never take the same slot. The guard is released while sleeping; a waiter re-checks after
    /// waking. `f` itself runs without the lock.
    pub async fn run_admitted<F, Fut, T>(&self, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                let wait = state.wait_seconds(now, self.window, self.max_per_window);
                if wait == 0 {
                    state.admitted.push_back(now);
                }
                wait
            };
            if wait == 0 {
                break;
            }
            info!(
                "Rate limit reached ({} per window). Waiting {wait} seconds...",
                self.max_per_window
            );
            tokio::time::sleep(Duration::from_secs(wait)).await;
        }

        f().await
    }

    pub async fn stats(&self) -> RateLimitStats {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let wait_seconds = state.wait_seconds(now, self.window, self.max_per_window);
        let requests_in_window = state.admitted.len();
        RateLimitStats {
            max_per_window: self.max_per_window,
            requests_in_window,
            remaining_requests: self.max_per_window.saturating_sub(requests_in_window),
            can_admit: requests_in_window < self.max_per_window,
            wait_seconds,
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PER_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_empty_limiter_admits_with_no_wait() {
        let limiter = RateLimiter::new(2);
        assert!(limiter.can_admit().await);
        assert_eq!(limiter.wait_seconds().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quota_blocks_until_oldest_expires() {
        let limiter = RateLimiter::new(2);
        limiter.record_admission().await;
        tokio::time::advance(Duration::from_secs(10)).await;
        limiter.record_admission().await;

        assert!(!limiter.can_admit().await);
        assert_eq!(limiter.wait_seconds().await, 50);

        tokio::time::advance(Duration::from_millis(49_500)).await;
        assert!(!limiter.can_admit().await);
        // 500ms left rounds up to a full second
        assert_eq!(limiter.wait_seconds().await, 1);

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(limiter.can_admit().await);
        assert_eq!(limiter.wait_seconds().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_admission_matches_in_window_count_for_spaced_calls() {
        let quota = 3;
        let spacing = Duration::from_secs(25);
        let limiter = RateLimiter::new(quota);
        let mut admitted: Vec<Instant> = Vec::new();

        for _ in 0..8 {
            let now = Instant::now();
            let in_window = admitted
                .iter()
                .filter(|t| now.saturating_duration_since(**t) < DEFAULT_WINDOW)
                .count();
            let can = limiter.can_admit().await;
            assert_eq!(can, in_window < quota, "in_window={in_window}");
            if can {
                limiter.record_admission().await;
                admitted.push(now);
            } else {
                assert!(limiter.wait_seconds().await > 0);
            }
            tokio::time::advance(spacing).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_admitted_waits_for_a_slot() {
        let limiter = RateLimiter::new(2);
        let start = Instant::now();

        for i in 0..3 {
            let value = limiter.run_admitted(|| async move { i * 10 }).await;
            assert_eq!(value, i * 10);
        }

        // third call had to wait for the first admission to leave the window
        assert!(start.elapsed() >= Duration::from_secs(60));
        assert!(start.elapsed() < Duration::from_secs(62));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_never_exceed_quota() {
        let quota = 3;
        let limiter = Arc::new(RateLimiter::new(quota));
        let stamps = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let limiter = Arc::clone(&limiter);
            let stamps = Arc::clone(&stamps);
            handles.push(tokio::spawn(async move {
                limiter
                    .run_admitted(|| async {
                        stamps.lock().await.push(Instant::now());
                    })
                    .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut stamps = stamps.lock().await.clone();
        stamps.sort();
        assert_eq!(stamps.len(), 10);
        for (i, first) in stamps.iter().enumerate() {
            let in_window = stamps[i..]
                .iter()
                .filter(|t| t.saturating_duration_since(*first) < DEFAULT_WINDOW)
                .count();
            assert!(in_window <= quota, "window starting at #{i} held {in_window} calls");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_report_usage() {
        let limiter = RateLimiter::new(2);
        limiter.record_admission().await;

        let stats = limiter.stats().await;
        assert_eq!(stats.requests_in_window, 1);
        assert_eq!(stats.remaining_requests, 1);
        assert!(stats.can_admit);
        assert_eq!(stats.wait_seconds, 0);

        limiter.record_admission().await;
        let stats = limiter.stats().await;
        assert!(!stats.can_admit);
        assert_eq!(stats.wait_seconds, 60);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_do_not_wait_behind_a_queued_caller() {
        let limiter = Arc::new(RateLimiter::new(1));
        limiter.record_admission().await;

        let waiter = {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move { limiter.run_admitted(|| async {}).await })
        };
        // let the spawned caller reach its sleep
        tokio::task::yield_now().await;

        let before = Instant::now();
        let stats = limiter.stats().await;
        assert_eq!(before.elapsed(), Duration::ZERO);
        assert!(!stats.can_admit);
        assert_eq!(stats.requests_in_window, 1);
        assert_eq!(stats.wait_seconds, 60);
        assert!(!limiter.can_admit().await);
        assert_eq!(before.elapsed(), Duration::ZERO);

        waiter.await.unwrap();
        let stats = limiter.stats().await;
        assert_eq!(stats.requests_in_window, 1);
        assert!(before.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_window() {
        let limiter = RateLimiter::with_window(1, Duration::from_secs(5));
        limiter.record_admission().await;
        assert_eq!(limiter.wait_seconds().await, 5);
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(limiter.can_admit().await);
    }
}
