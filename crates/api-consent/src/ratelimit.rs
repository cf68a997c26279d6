//! Fixed-window request counting per client address.
//!
//! Memory is bounded two ways: expired windows are swept every
//! [`SWEEP_INTERVAL`] requests, and at most `max_tracked` addresses are held.
//! When the table is full a new address forces a sweep; if no window has
//! expired by then, that address is refused until one does.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Requests between sweeps of expired windows.
const SWEEP_INTERVAL: u64 = 100;

/// Default cap on distinct addresses held at once.
pub const MAX_TRACKED_KEYS: usize = 10_000;

pub struct RateLimiter {
    limit: u32,
    window: Duration,
    max_tracked: usize,
    windows: Mutex<HashMap<String, (Instant, u32)>>,
    requests: AtomicU64,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self::with_max_tracked(limit, window, MAX_TRACKED_KEYS)
    }

    pub fn with_max_tracked(limit: u32, window: Duration, max_tracked: usize) -> Self {
        Self {
            limit,
            window,
            max_tracked: max_tracked.max(1),
            windows: Mutex::new(HashMap::new()),
            requests: AtomicU64::new(0),
        }
    }

    /// Counts one request from `key`; false once the window's limit is spent
    /// or the table is full of live windows from other addresses.
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    pub fn check_at(&self, key: &str, now: Instant) -> bool {
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let count = self.requests.fetch_add(1, Ordering::Relaxed);
        if count > 0 && count % SWEEP_INTERVAL == 0 {
            self.sweep(&mut windows, now);
        }

        if !windows.contains_key(key) && windows.len() >= self.max_tracked {
            self.sweep(&mut windows, now);
            if windows.len() >= self.max_tracked {
                tracing::warn!(
                    tracked = windows.len(),
                    "rate limiter full; refusing request from new address"
                );
                return false;
            }
        }

        let entry = windows.entry(key.to_string()).or_insert((now, 0));
        if now.duration_since(entry.0) >= self.window {
            *entry = (now, 0);
        }
        if entry.1 >= self.limit {
            return false;
        }
        entry.1 += 1;
        true
    }

    /// Number of addresses currently held.
    pub fn tracked(&self) -> usize {
        self.windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    fn sweep(&self, windows: &mut HashMap<String, (Instant, u32)>, now: Instant) {
        let window = self.window;
        let before = windows.len();
        windows.retain(|_, (start, _)| now.duration_since(*start) < window);
        tracing::debug!(removed = before - windows.len(), "swept expired rate windows");
    }
}
