//! Smoothed CPU usage shared between the smoother thread and the gate
//!
//! `CurrentUsage` has exactly one writer (the smoother tick) and any
//! number of readers. The value is an `f64` stored as raw bits in an
//! `AtomicU64`, so reads on the request path are a single atomic load.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::constants::BETA;

/// Latest exponentially smoothed CPU usage, in percent of entitlement.
///
/// Starts at 0, which never sheds.
#[derive(Debug)]
pub struct CurrentUsage {
    bits: AtomicU64,
}

impl Default for CurrentUsage {
    fn default() -> Self {
        Self::new()
    }
}

impl CurrentUsage {
    pub const fn new() -> Self {
        // 0.0_f64 is all-zero bits
        Self {
            bits: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn load(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    #[inline]
    pub fn store(&self, usage: f64) {
        self.bits.store(usage.to_bits(), Ordering::Release);
    }

    /// Value as published to metrics: never negative, NaN reads as 0.
    pub fn published(&self) -> f64 {
        let usage = self.load();
        if usage.is_nan() || usage < 0.0 {
            0.0
        } else {
            usage
        }
    }

    /// True when usage is strictly above `threshold`. Equal passes.
    #[inline]
    pub fn exceeds(&self, threshold: i64) -> bool {
        self.load() > threshold as f64
    }
}

/// Exponential moving average: `next = prev * beta + raw * (1 - beta)`.
///
/// The effective window is about `1 / (1 - beta)` samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ewma {
    beta: f64,
}

impl Default for Ewma {
    fn default() -> Self {
        Self::new(BETA)
    }
}

impl Ewma {
    /// `beta` is clamped into `[0, 1]`.
    pub fn new(beta: f64) -> Self {
        Self {
            beta: beta.clamp(0.0, 1.0),
        }
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    #[inline]
    pub fn fold(&self, prev: f64, raw: f64) -> f64 {
        prev * self.beta + raw * (1.0 - self.beta)
    }

    /// Fold `raw` into `usage` and return the new value.
    ///
    /// Load then store: callers must be the only writer of `usage`.
    pub fn update(&self, usage: &CurrentUsage, raw: u64) -> f64 {
        let next = self.fold(usage.load(), raw as f64);
        usage.store(next);
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_usage_is_zero() {
        let usage = CurrentUsage::new();
        assert_eq!(usage.load(), 0.0);
        assert!(!usage.exceeds(0));
    }

    #[test]
    fn test_smoothing_is_deterministic() {
        let ewma = Ewma::new(0.95);
        let usage = CurrentUsage::new();
        let raws = [100u64, 100, 0, 40, 250, 7];

        let mut expected = 0.0_f64;
        for raw in raws {
            expected = expected * 0.95 + raw as f64 * (1.0 - 0.95);
            assert_eq!(ewma.update(&usage, raw), expected);
        }
        assert_eq!(usage.load(), expected);
    }

    #[test]
    fn test_first_fold_from_zero() {
        let ewma = Ewma::default();
        let usage = CurrentUsage::new();
        let next = ewma.update(&usage, 100);
        assert!((next - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_converges_to_constant_input() {
        let ewma = Ewma::default();
        let usage = CurrentUsage::new();
        for _ in 0..500 {
            ewma.update(&usage, 60);
        }
        assert!((usage.load() - 60.0).abs() < 0.01);
    }

    #[test]
    fn test_exceeds_is_strict() {
        let usage = CurrentUsage::new();
        usage.store(50.0);
        assert!(!usage.exceeds(50));
        assert!(usage.exceeds(49));
        usage.store(50.01);
        assert!(usage.exceeds(50));
    }

    #[test]
    fn test_published_clamps() {
        let usage = CurrentUsage::new();
        usage.store(-3.0);
        assert_eq!(usage.published(), 0.0);
        usage.store(f64::NAN);
        assert_eq!(usage.published(), 0.0);
        assert!(!usage.exceeds(0));
        usage.store(130.5);
        assert_eq!(usage.published(), 130.5);
    }

    #[test]
    fn test_beta_is_clamped() {
        assert_eq!(Ewma::new(1.5).beta(), 1.0);
        assert_eq!(Ewma::new(-0.2).beta(), 0.0);
    }
}
