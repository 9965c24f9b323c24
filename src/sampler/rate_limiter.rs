// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::sync::Mutex;
use std::time::Instant;

const WINDOW_NS: u64 = 1_000_000_000;

/// Token bucket limiting how many traces rules may keep per second.
///
/// The ceiling is the number of keeps allowed per second:
/// * ceiling > 0: at most that many keeps per second
/// * ceiling == 0: deny everything
/// * ceiling < 0: allow everything
pub(crate) struct RateLimiter {
    ceiling: i32,
    state: Mutex<LimiterState>,
}

struct LimiterState {
    /// Fractional tokens so short bursts do not round refills away.
    tokens: f64,
    last_refill: Instant,

    // Allowed/seen counts over a one second observation window, used only
    // to report the effective rate.
    window_start: Option<Instant>,
    window_allowed: u64,
    window_seen: u64,
    previous_window_rate: Option<f64>,
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("RateLimiter")
            .field("ceiling", &self.ceiling)
            .field("tokens", &state.tokens)
            .finish()
    }
}

impl RateLimiter {
    pub(crate) fn new(ceiling: i32) -> Self {
        RateLimiter {
            ceiling,
            state: Mutex::new(LimiterState {
                tokens: ceiling.max(0) as f64,
                last_refill: Instant::now(),
                window_start: None,
                window_allowed: 0,
                window_seen: 0,
                previous_window_rate: None,
            }),
        }
    }

    /// Consumes a token if one is available. Every call is counted toward
    /// the effective rate, allowed or not.
    pub(crate) fn is_allowed(&self) -> bool {
        self.is_allowed_at(Instant::now())
    }

    fn is_allowed_at(&self, now: Instant) -> bool {
        let mut state = self.state.lock().unwrap();
        let allowed = if self.ceiling < 0 {
            true
        } else if self.ceiling == 0 {
            false
        } else {
            state.refill(self.ceiling, now);
            if state.tokens >= 1.0 {
                state.tokens -= 1.0;
                true
            } else {
                false
            }
        };
        state.observe(allowed, now);
        allowed
    }

    /// The share of requests allowed recently, averaged over the current
    /// and previous observation windows.
    pub(crate) fn effective_rate(&self) -> f64 {
        let state = self.state.lock().unwrap();
        match state.previous_window_rate {
            Some(prev) => (state.current_window_rate() + prev) / 2.0,
            None => state.current_window_rate(),
        }
    }
}

impl LimiterState {
    fn refill(&mut self, ceiling: i32, now: Instant) {
        let elapsed = now.duration_since(self.last_refill);
        let replenished = elapsed.as_nanos() as f64 / WINDOW_NS as f64 * ceiling as f64;
        self.tokens = (self.tokens + replenished).min(ceiling as f64);
        self.last_refill = now;
    }

    fn observe(&mut self, allowed: bool, now: Instant) {
        match self.window_start {
            None => self.window_start = Some(now),
            Some(start) if now.duration_since(start).as_nanos() as u64 >= WINDOW_NS => {
                self.previous_window_rate = Some(self.current_window_rate());
                self.window_allowed = 0;
                self.window_seen = 0;
                self.window_start = Some(now);
            }
            Some(_) => {}
        }
        if allowed {
            self.window_allowed += 1;
        }
        self.window_seen += 1;
    }

    fn current_window_rate(&self) -> f64 {
        // An idle window counts as keeping everything.
        if self.window_seen == 0 {
            return 1.0;
        }
        self.window_allowed as f64 / self.window_seen as f64
    }
}

#[cfg(test)]
mod tests {
    use super::RateLimiter;
    use std::time::{Duration, Instant};

    #[test]
    fn test_allow_all_when_negative() {
        let limiter = RateLimiter::new(-1);
        for _ in 0..100 {
            assert!(limiter.is_allowed());
        }
        assert_eq!(limiter.effective_rate(), 1.0);
    }

    #[test]
    fn test_deny_all_when_zero() {
        let limiter = RateLimiter::new(0);
        for _ in 0..10 {
            assert!(!limiter.is_allowed());
        }
        assert_eq!(limiter.effective_rate(), 0.0);
    }

    #[test]
    fn test_ceiling_enforced_within_window() {
        let limiter = RateLimiter::new(5);
        let now = Instant::now();
        for _ in 0..5 {
            assert!(limiter.is_allowed_at(now));
        }
        assert!(!limiter.is_allowed_at(now));
    }

    #[test]
    fn test_tokens_replenish_with_time() {
        let limiter = RateLimiter::new(5);
        let start = Instant::now();
        for _ in 0..5 {
            assert!(limiter.is_allowed_at(start));
        }
        assert!(!limiter.is_allowed_at(start));

        // 0.2s at 5 tokens/s buys exactly one more token.
        let later = start + Duration::from_millis(200);
        assert!(limiter.is_allowed_at(later));
        assert!(!limiter.is_allowed_at(later));
    }

    #[test]
    fn test_effective_rate_tracks_rejections() {
        let limiter = RateLimiter::new(50);
        let now = Instant::now();
        let allowed = (0..100).filter(|_| limiter.is_allowed_at(now)).count();
        assert_eq!(allowed, 50);
        let rate = limiter.effective_rate();
        assert!((0.45..=0.55).contains(&rate), "got {rate}");
    }

    #[test]
    fn test_effective_rate_averages_previous_window() {
        let limiter = RateLimiter::new(1);
        let start = Instant::now();
        // First window: 1 allowed out of 2.
        assert!(limiter.is_allowed_at(start));
        assert!(!limiter.is_allowed_at(start));
        // Second window: 1 allowed out of 1.
        let next = start + Duration::from_secs(2);
        assert!(limiter.is_allowed_at(next));
        assert_eq!(limiter.effective_rate(), (1.0 + 0.5) / 2.0);
    }
}
