// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token-bucket limiter for downstream calls.
//!
//! One bucket per downstream backend, shared by every request hitting it.
//! The mutex is held only for the admission decision, never across I/O.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::error;

#[derive(Debug)]
struct BucketState {
    window_start: Instant,
    window_count: u32,
    burst_count: u32,
}

impl BucketState {
    fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            window_count: 0,
            burst_count: 0,
        }
    }

    fn reset_window(&mut self, now: Instant) {
        self.window_start = now;
        self.window_count = 0;
        self.burst_count = 0;
    }
}

/// Per-backend token bucket: `rps` tokens per one-second window plus a
/// `burst` allowance on top.
#[derive(Debug)]
pub struct RateLimiter {
    rps: u32,
    burst: u32,
    inner: Mutex<BucketState>,
}

const WINDOW: Duration = Duration::from_secs(1);

impl RateLimiter {
    pub fn new(rps: u32, burst: u32) -> Self {
        Self {
            rps: rps.max(1),
            burst,
            inner: Mutex::new(BucketState::new(Instant::now())),
        }
    }

    /// Take a token if one is available.
    pub fn allow(&self) -> bool {
        self.allow_at(Instant::now())
    }

    fn allow_at(&self, now: Instant) -> bool {
        match self.inner.lock() {
            Ok(mut state) => {
                if now.duration_since(state.window_start) >= WINDOW {
                    state.reset_window(now);
                }
                if state.window_count < self.rps {
                    state.window_count += 1;
                    true
                } else if state.burst_count < self.burst {
                    state.burst_count += 1;
                    true
                } else {
                    false
                }
            }
            Err(_) => {
                error!("rate limiter lock poisoned, denying request");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_plus_burst_then_deny() {
        let limiter = RateLimiter::new(2, 1);
        let now = Instant::now();
        assert!(limiter.allow_at(now));
        assert!(limiter.allow_at(now));
        // Burst allowance.
        assert!(limiter.allow_at(now));
        assert!(!limiter.allow_at(now));
    }

    #[test]
    fn window_resets_after_a_second() {
        let limiter = RateLimiter::new(1, 0);
        let now = Instant::now();
        assert!(limiter.allow_at(now));
        assert!(!limiter.allow_at(now));
        assert!(limiter.allow_at(now + Duration::from_secs(1)));
    }

    #[test]
    fn zero_rps_is_clamped_to_one() {
        let limiter = RateLimiter::new(0, 0);
        assert!(limiter.allow());
    }
}
