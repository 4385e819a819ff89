//! Per-client sliding-window rate limiter.
//!
//! Tracks request timestamps for each client over a trailing window and
//! admits or rejects each attempt. Prune, check, and append happen under a
//! single lock so two concurrent requests from the same client can never
//! both claim the last remaining slot.
//!
//! State is process-local and lost on restart.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::warn;

/// Sliding-window request limiter keyed by client identifier.
pub struct SlidingWindowLimiter {
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
    window: Duration,
    max_requests: usize,
}

impl SlidingWindowLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            window,
            max_requests,
        }
    }

    /// Attempts to admit a request from `client_id` at the current time.
    ///
    /// Returns `true` and records the request if the client is under its
    /// limit; returns `false` without recording otherwise.
    pub fn admit(&self, client_id: &str) -> bool {
        self.admit_at(client_id, Instant::now())
    }

    /// Admission check against an explicit clock reading.
    ///
    /// `now` must be monotonically non-decreasing across calls for a given
    /// client; [`admit`](Self::admit) guarantees this by using `Instant::now`.
    pub fn admit_at(&self, client_id: &str, now: Instant) -> bool {
        let mut windows = self.windows.lock().unwrap();
        let timestamps = windows.entry(client_id.to_string()).or_default();

        // Evict entries that have aged out of the trailing window.
        while let Some(&oldest) = timestamps.front() {
            if now.duration_since(oldest) >= self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        if timestamps.len() >= self.max_requests {
            warn!(client = client_id, "rate limit exceeded");
            return false;
        }

        timestamps.push_back(now);
        true
    }
}
