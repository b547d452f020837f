//! Cinder Metrics - Common utilities for pipeline instrumentation
//!
//! Provides zero-cost abstractions for metrics collection that completely
//! vanish in production builds via feature flags.
//!
//! # Feature Flags
//!
//! - `metrics` - Enable metrics collection (default: disabled)
//!
//! # Usage
//!
//! ```ignore
//! use cinder_metrics::{Counter, DrainTimer};
//!
//! let mut drain = DrainTimer::new(120); // Track the last 120 drains
//! drain.begin();
//! // ... finalize completions ...
//! drain.end();
//! println!("drain: {:.2}ms", drain.average_ms());
//! ```
//!
//! In production builds (without `metrics` feature), all instrumentation
//! is compiled out to zero overhead.

#[cfg(feature = "metrics")]
mod counter;
#[cfg(feature = "metrics")]
mod drain_timer;
#[cfg(feature = "metrics")]
mod ring_buffer;

#[cfg(feature = "metrics")]
pub use counter::Counter;
#[cfg(feature = "metrics")]
pub use drain_timer::DrainTimer;
#[cfg(feature = "metrics")]
pub use ring_buffer::RingBuffer;

/// Whether this build collects metrics.
pub const ENABLED: bool = cfg!(feature = "metrics");

// ============================================================================
// No-op stubs when metrics disabled
// ============================================================================

#[cfg(not(feature = "metrics"))]
pub struct DrainTimer;

#[cfg(not(feature = "metrics"))]
impl DrainTimer {
    pub fn new(_capacity: usize) -> Self { Self }
    pub fn begin(&mut self) {}
    pub fn end(&mut self) -> std::time::Duration { std::time::Duration::ZERO }
    pub fn passes(&self) -> u64 { 0 }
    pub fn average_ms(&self) -> f64 { 0.0 }
    pub fn last_ms(&self) -> f64 { 0.0 }
    pub fn range_ms(&self) -> (f64, f64) { (0.0, 0.0) }
}

#[cfg(not(feature = "metrics"))]
pub struct RingBuffer<T>(std::marker::PhantomData<T>);

#[cfg(not(feature = "metrics"))]
impl<T> RingBuffer<T> {
    pub fn new(_capacity: usize) -> Self { Self(std::marker::PhantomData) }
    pub fn push(&mut self, _value: T) {}
    pub fn len(&self) -> usize { 0 }
    pub fn is_empty(&self) -> bool { true }
}

#[cfg(not(feature = "metrics"))]
pub struct Counter;

#[cfg(not(feature = "metrics"))]
impl Counter {
    pub fn new() -> Self { Self }
    pub fn increment(&mut self, _name: &'static str, _value: u64) {}
    pub fn get(&self, _name: &str) -> u64 { 0 }
    pub fn snapshot(&self) -> Vec<(&'static str, u64)> { Vec::new() }
}

#[cfg(not(feature = "metrics"))]
impl Default for Counter {
    fn default() -> Self { Self }
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_compiles_with_current_features() {
        // Both the real types and the stubs expose this surface
        let mut timer = super::DrainTimer::new(60);
        timer.begin();
        let _ = timer.end();
        let _ = timer.average_ms();
        let mut counter = super::Counter::new();
        counter.increment("loads", 1);
        let _ = counter.get("loads");
        let _ = counter.snapshot();
        let _buffer = super::RingBuffer::<f64>::new(10);
    }

    #[cfg(not(feature = "metrics"))]
    #[test]
    fn stubs_report_nothing() {
        let mut counter = super::Counter::new();
        counter.increment("loads", 3);
        assert_eq!(counter.get("loads"), 0);
        assert!(!super::ENABLED);
    }
}
