//! Seams between the platform-agnostic core and its collaborators
//!
//! The runtime crate supplies the CPU sampler; the host application
//! supplies (optionally) a metrics sink.

use crate::error::ShedResult;

/// Destination for periodic counter and gauge observations.
///
/// Implementations must be cheap and non-blocking enough to be called
/// from the background publish threads once per cadence.
pub trait MetricsSink: Send + Sync {
    /// Add a non-negative amount to the counter keyed by `label`
    fn add_counter(&self, label: &str, value: f64);

    /// Set the gauge keyed by `label`
    fn set_gauge(&self, label: &str, value: f64);
}

/// Source of raw CPU usage percentages.
///
/// Stateful: each call measures the interval since the previous call.
/// Only the smoother thread calls it, so `&mut self` is enough.
pub trait CpuSampler: Send {
    /// Percentage of the entitled CPU consumed since the previous call.
    ///
    /// `Ok(0)` for the first call, for intervals with no progress, and on
    /// platforms without CPU accounting. `Err` when a counter could not
    /// be read; the caller logs it and treats the interval as 0.
    fn sample(&mut self) -> ShedResult<u64>;
}

/// Sampler that always reports zero usage
///
/// Used where CPU accounting is unavailable so shedding never triggers.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSampler;

impl CpuSampler for NullSampler {
    fn sample(&mut self) -> ShedResult<u64> {
        Ok(0)
    }
}

impl<S: CpuSampler + ?Sized> CpuSampler for Box<S> {
    fn sample(&mut self) -> ShedResult<u64> {
        (**self).sample()
    }
}
