//! Fixed-window outbound request limiter.
//!
//! Each client owns one [`RateLimiter`]. Counters are never shared between
//! clients, users or pipeline runs.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

use margin_core::defaults::RATE_LIMIT_WINDOW_SECS;

#[derive(Debug)]
struct Window {
    count: u32,
    started: Instant,
}

/// Caps requests per window for a single client instance.
///
/// The state lock is held across the wait, so concurrent callers are admitted
/// one at a time in arrival order.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    state: Mutex<Window>,
}

impl RateLimiter {
    /// Limiter admitting `max_requests` per 60 second window.
    pub fn per_minute(max_requests: u32) -> Self {
        Self::new(max_requests, Duration::from_secs(RATE_LIMIT_WINDOW_SECS))
    }

    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            state: Mutex::new(Window {
                count: 0,
                started: Instant::now(),
            }),
        }
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Wait until a request may be issued, then count it.
    pub async fn acquire(&self) {
        let mut state = self.state.lock().await;
        let elapsed = state.started.elapsed();

        if elapsed >= self.window {
            state.count = 0;
            state.started = Instant::now();
        } else if state.count >= self.max_requests {
            let wait = self.window - elapsed;
            debug!(
                component = "rate_limiter",
                wait_ms = wait.as_millis() as u64,
                max_requests = self.max_requests,
                "Rate limit reached, waiting for window reset"
            );
            sleep(wait).await;
            state.count = 0;
            state.started = Instant::now();
        }

        state.count += 1;
    }
}
