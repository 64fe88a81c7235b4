//! Shedding statistics counters
//!
//! Three counters bumped from request-handling threads with a single
//! `fetch_add` each, and drained by a background thread with a single
//! `swap(0)` each. An increment racing a drain lands in exactly one
//! snapshot: the swap either sees it or leaves it for the next one.

use std::sync::atomic::{AtomicI64, Ordering};

use crate::constants::{DROP_LABEL, TOTAL_LABEL};
use crate::traits::MetricsSink;
use crate::shed_debug;

/// Counts of requests seen by enabled gates since the last drain
#[derive(Debug, Default)]
pub struct SheddingStat {
    total: AtomicI64,
    pass: AtomicI64,
    drop: AtomicI64,
}

/// Drained copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShedSnapshot {
    pub total: i64,
    pub pass: i64,
    pub drop: i64,
}

impl ShedSnapshot {
    /// `total == pass + drop`. Can be off by the handful of requests
    /// whose increments straddled the drain instant.
    pub fn is_balanced(&self) -> bool {
        self.total == self.pass + self.drop
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0 && self.pass == 0 && self.drop == 0
    }
}

impl core::ops::AddAssign for ShedSnapshot {
    fn add_assign(&mut self, rhs: Self) {
        self.total += rhs.total;
        self.pass += rhs.pass;
        self.drop += rhs.drop;
    }
}

impl SheddingStat {
    pub const fn new() -> Self {
        Self {
            total: AtomicI64::new(0),
            pass: AtomicI64::new(0),
            drop: AtomicI64::new(0),
        }
    }

    #[inline]
    pub fn increment_total(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_pass(&self) {
        self.pass.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_drop(&self) {
        self.drop.fetch_add(1, Ordering::Relaxed);
    }

    /// Current counts without resetting
    pub fn peek(&self) -> ShedSnapshot {
        ShedSnapshot {
            total: self.total.load(Ordering::Relaxed),
            pass: self.pass.load(Ordering::Relaxed),
            drop: self.drop.load(Ordering::Relaxed),
        }
    }

    /// Atomically read-and-zero every counter.
    pub fn reset(&self) -> ShedSnapshot {
        ShedSnapshot {
            total: self.total.swap(0, Ordering::AcqRel),
            pass: self.pass.swap(0, Ordering::AcqRel),
            drop: self.drop.swap(0, Ordering::AcqRel),
        }
    }

    /// Drain the counters and forward `total` and `drop` to `sink`.
    ///
    /// Returns the drained snapshot. With no sink the counters are still
    /// drained so they do not grow without bound.
    pub fn flush(&self, sink: Option<&dyn MetricsSink>) -> ShedSnapshot {
        let snap = self.reset();
        if !snap.is_balanced() {
            shed_debug!(
                "shedding window skew: total={} pass={} drop={}",
                snap.total, snap.pass, snap.drop
            );
        }
        if let Some(sink) = sink {
            sink.add_counter(TOTAL_LABEL, snap.total.max(0) as f64);
            sink.add_counter(DROP_LABEL, snap.drop.max(0) as f64);
        }
        snap
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::{Arc, Mutex};
    use std::thread;

    #[derive(Default)]
    struct RecordingSink {
        counters: Mutex<Vec<(String, f64)>>,
    }

    impl MetricsSink for RecordingSink {
        fn add_counter(&self, label: &str, value: f64) {
            self.counters.lock().unwrap().push((label.to_string(), value));
        }
        fn set_gauge(&self, _label: &str, _value: f64) {}
    }

    #[test]
    fn test_empty_drain() {
        let stat = SheddingStat::new();
        let snap = stat.reset();
        assert_eq!(snap, ShedSnapshot { total: 0, pass: 0, drop: 0 });
        assert!(snap.is_empty());
        assert_eq!(stat.reset(), ShedSnapshot::default());
    }

    #[test]
    fn test_reset_zeroes() {
        let stat = SheddingStat::new();
        for _ in 0..3 {
            stat.increment_total();
            stat.increment_pass();
        }
        stat.increment_total();
        stat.increment_drop();

        let snap = stat.reset();
        assert_eq!(snap, ShedSnapshot { total: 4, pass: 3, drop: 1 });
        assert!(snap.is_balanced());
        assert!(stat.peek().is_empty());
    }

    #[test]
    fn test_flush_publishes_total_and_dropped() {
        let stat = SheddingStat::new();
        let sink = RecordingSink::default();
        stat.increment_total();
        stat.increment_drop();
        stat.increment_total();
        stat.increment_pass();

        let snap = stat.flush(Some(&sink));
        assert_eq!(snap, ShedSnapshot { total: 2, pass: 1, drop: 1 });

        let counters = sink.counters.lock().unwrap().clone();
        assert_eq!(
            counters,
            vec![("total".to_string(), 2.0), ("dropped".to_string(), 1.0)]
        );
    }

    #[test]
    fn test_flush_without_sink_still_drains() {
        let stat = SheddingStat::new();
        stat.increment_total();
        stat.increment_pass();
        let snap = stat.flush(None);
        assert_eq!(snap.total, 1);
        assert!(stat.peek().is_empty());
    }

    #[test]
    fn test_concurrent_increments_and_drains_lose_nothing() {
        const THREADS: usize = 8;
        const PER_THREAD: i64 = 20_000;

        let stat = Arc::new(SheddingStat::new());
        let done = Arc::new(AtomicBool::new(false));

        let drainer = {
            let stat = Arc::clone(&stat);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut sum = ShedSnapshot::default();
                while !done.load(Ordering::Acquire) {
                    sum += stat.reset();
                    thread::yield_now();
                }
                sum
            })
        };

        let workers: Vec<_> = (0..THREADS)
            .map(|i| {
                let stat = Arc::clone(&stat);
                thread::spawn(move || {
                    for n in 0..PER_THREAD {
                        stat.increment_total();
                        if (n + i as i64) % 3 == 0 {
                            stat.increment_drop();
                        } else {
                            stat.increment_pass();
                        }
                    }
                })
            })
            .collect();

        for w in workers {
            w.join().unwrap();
        }
        done.store(true, Ordering::Release);
        let mut sum = drainer.join().unwrap();
        sum += stat.reset();

        let issued = THREADS as i64 * PER_THREAD;
        assert_eq!(sum.total, issued);
        assert_eq!(sum.pass + sum.drop, issued);
        assert!(sum.is_balanced());
    }
}
