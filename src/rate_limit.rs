//! Fixed-window request limiting keyed by user or guild.

use dashmap::DashMap;
use std::{sync::Mutex, time::Duration};
use tokio::time::Instant;

/// Allows at most `max_requests` admitted requests per key in each window.
///
/// Windows are fixed, not sliding: a key's window starts with its first request and the count
/// resets once the window length has passed.  Bursts of up to twice the limit are possible
/// across a window boundary.
///
/// Keys whose window has run out are swept at most once per window length, so idle users and
/// guilds do not accumulate.
pub struct FixedWindowLimiter {
    max_requests: u32,
    window: Duration,
    states: DashMap<String, RateLimitState>,
    last_sweep: Mutex<Instant>,
}

struct RateLimitState {
    window_start: Instant,
    count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Denied { retry_after: Duration },
}

impl FixedWindowLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            states: DashMap::new(),
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    /// Records a request for `key` if the current window has room for it.
    pub fn check(&self, key: &str) -> Admission {
        let now = Instant::now();
        self.sweep_expired(now);

        // The entry guard locks this key's shard for the whole read-modify-write.
        let mut state = self
            .states
            .entry(key.to_owned())
            .or_insert(RateLimitState {
                window_start: now,
                count: 0,
            });

        let elapsed = now.duration_since(state.window_start);
        if elapsed >= self.window {
            state.window_start = now;
            state.count = 0;
        }

        if state.count < self.max_requests {
            state.count += 1;
            return Admission::Admitted;
        }

        let elapsed = now.duration_since(state.window_start);
        Admission::Denied {
            retry_after: self.window.saturating_sub(elapsed),
        }
    }

    /// What `check` would answer for `key`, without recording anything.
    pub fn peek(&self, key: &str) -> Admission {
        let now = Instant::now();
        let Some(state) = self.states.get(key) else {
            return Admission::Admitted;
        };

        let elapsed = now.duration_since(state.window_start);
        if elapsed >= self.window || state.count < self.max_requests {
            return Admission::Admitted;
        }
        Admission::Denied {
            retry_after: self.window.saturating_sub(elapsed),
        }
    }

    /// Takes back one request admitted by `check` for `key`.
    pub fn refund(&self, key: &str) {
        if let Some(mut state) = self.states.get_mut(key) {
            state.count = state.count.saturating_sub(1);
        }
    }

    fn sweep_expired(&self, now: Instant) {
        // A sweep already running elsewhere covers this one.
        let Ok(mut last_sweep) = self.last_sweep.try_lock() else {
            return;
        };
        if now.duration_since(*last_sweep) < self.window {
            return;
        }
        *last_sweep = now;

        let window = self.window;
        self.states
            .retain(|_, state| now.duration_since(state.window_start) < window);
    }
}
