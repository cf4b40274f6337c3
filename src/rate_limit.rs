//! Rolling-window request limiter.
//!
//! Each [`Fetcher`](crate::api::Fetcher) owns one limiter. Before a request the
//! limiter counts timestamps inside the trailing window; when the count has
//! reached the ceiling the caller sleeps until the oldest one leaves the
//! window. Nothing is queued and only a single caller is modelled.
use crate::config::RateLimitConfig;
use crate::error::{Error, Result};
use log::debug;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Time source for the limiter. Swapped out in tests.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Wall clock with a blocking `thread::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug)]
pub struct RateLimiter<C: Clock = SystemClock> {
    max_requests: usize,
    window: Duration,
    stamps: VecDeque<Instant>,
    clock: C,
    total_wait: Duration,
}

impl RateLimiter<SystemClock> {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self::with_clock(max_requests, window, SystemClock)
    }
}

impl<C: Clock> RateLimiter<C> {
    pub fn with_clock(max_requests: usize, window: Duration, clock: C) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            stamps: VecDeque::with_capacity(max_requests.max(1)),
            clock,
            total_wait: Duration::ZERO,
        }
    }

    pub fn from_config(config: &RateLimitConfig, clock: C) -> Self {
        Self::with_clock(config.max_requests, config.window(), clock)
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Total time spent sleeping in [`acquire`](Self::acquire).
    pub fn total_wait(&self) -> Duration {
        self.total_wait
    }

    /// Requests recorded inside the trailing window.
    pub fn in_window(&mut self) -> usize {
        let now = self.clock.now();
        self.evict(now);
        self.stamps.len()
    }

    /// Block until a request slot is free, then record the request.
    ///
    /// Returns the time spent waiting. Never fails.
    pub fn acquire(&mut self) -> Duration {
        let mut waited = Duration::ZERO;
        loop {
            let now = self.clock.now();
            self.evict(now);
            if self.stamps.len() < self.max_requests {
                self.stamps.push_back(now);
                self.total_wait += waited;
                return waited;
            }
            let wait = self.until_free(now);
            debug!(
                "rate limit reached ({} per {:?}), sleeping {:?}",
                self.max_requests, self.window, wait
            );
            self.clock.sleep(wait);
            waited += wait;
        }
    }

    /// Record a request if a slot is free right now, otherwise fail with `RateLimitExceeded`.
    pub fn try_acquire(&mut self) -> Result<()> {
        let now = self.clock.now();
        self.evict(now);
        if self.stamps.len() >= self.max_requests {
            return Err(Error::RateLimitExceeded {
                max_requests: self.max_requests,
                window: self.window,
                retry_after: self.until_free(now),
            });
        }
        self.stamps.push_back(now);
        Ok(())
    }

    fn evict(&mut self, now: Instant) {
        while let Some(&oldest) = self.stamps.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                self.stamps.pop_front();
            } else {
                break;
            }
        }
    }

    fn until_free(&self, now: Instant) -> Duration {
        self.stamps
            .front()
            .map(|&oldest| (oldest + self.window).saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }
}
