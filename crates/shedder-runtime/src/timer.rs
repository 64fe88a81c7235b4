//! Fixed-period deadlines for the monitor threads
//!
//! A thread owning several tickers sleeps until the earliest one is due,
//! fires whichever are due, and repeats. Missed periods are skipped rather
//! than replayed in a burst.

use std::time::{Duration, Instant};

/// Shortest accepted period
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy)]
pub struct Ticker {
    period: Duration,
    next: Instant,
}

impl Ticker {
    /// First deadline is one period after `now`
    pub fn new(period: Duration, now: Instant) -> Self {
        let period = period.max(MIN_PERIOD);
        Self {
            period,
            next: now + period,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn deadline(&self) -> Instant {
        self.next
    }

    /// If due at `now`, advance to the next deadline and return true.
    pub fn fire(&mut self, now: Instant) -> bool {
        if now < self.next {
            return false;
        }
        self.next += self.period;
        if self.next <= now {
            // Fell behind by more than a period
            self.next = now + self.period;
        }
        true
    }

    /// Time until the next deadline, zero if already due
    pub fn remaining(&self, now: Instant) -> Duration {
        self.next.saturating_duration_since(now)
    }
}

/// Time until the earliest of `tickers` is due
pub fn next_wait(tickers: &[&Ticker], now: Instant) -> Duration {
    tickers
        .iter()
        .map(|t| t.remaining(now))
        .min()
        .unwrap_or(MIN_PERIOD)
}
