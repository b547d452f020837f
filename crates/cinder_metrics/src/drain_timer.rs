//! Timing for owning-thread drain passes

use super::ring_buffer::RingBuffer;
use std::time::{Duration, Instant};

/// Rolling record of how long each drain pass took.
///
/// A pass is whatever runs between `begin` and `end`; for the asset manager
/// that is one flush of owning-thread work plus the completions it finalized.
pub struct DrainTimer {
    started: Option<Instant>,
    recent: RingBuffer<Duration>,
    passes: u64,
}

impl DrainTimer {
    /// Keep the last `capacity` passes for averages.
    pub fn new(capacity: usize) -> Self {
        Self {
            started: None,
            recent: RingBuffer::new(capacity),
            passes: 0,
        }
    }

    pub fn begin(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Close the current pass and return its length. Zero without a `begin`.
    pub fn end(&mut self) -> Duration {
        let Some(started) = self.started.take() else {
            return Duration::ZERO;
        };
        let elapsed = started.elapsed();
        self.recent.push(elapsed);
        self.passes += 1;
        elapsed
    }

    /// Passes recorded since creation.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    pub fn average_ms(&self) -> f64 {
        self.recent.average().as_secs_f64() * 1000.0
    }

    pub fn last_ms(&self) -> f64 {
        self.recent
            .latest()
            .map_or(0.0, |d| d.as_secs_f64() * 1000.0)
    }

    /// Shortest and longest of the retained passes.
    pub fn range_ms(&self) -> (f64, f64) {
        let (min, max) = self.recent.min_max();
        (min.as_secs_f64() * 1000.0, max.as_secs_f64() * 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_passes() {
        let mut timer = DrainTimer::new(4);
        timer.begin();
        std::thread::sleep(Duration::from_millis(2));
        let pass = timer.end();
        assert!(pass >= Duration::from_millis(2));
        assert_eq!(timer.passes(), 1);
        assert!(timer.average_ms() >= 1.0);
        assert_eq!(timer.last_ms(), timer.average_ms());
        let (min, max) = timer.range_ms();
        assert!(min <= max);
    }

    #[test]
    fn end_without_begin_records_nothing() {
        let mut timer = DrainTimer::new(4);
        assert_eq!(timer.end(), Duration::ZERO);
        assert_eq!(timer.passes(), 0);
        assert_eq!(timer.last_ms(), 0.0);
    }
}
