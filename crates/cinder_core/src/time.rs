//! Fixed-rate tick clock
//!
//! The host drains asset completions once per tick; this clock paces those ticks.

use std::time::{Duration, Instant};

/// Default tick rate (60 Hz = 16.666ms per tick)
pub const TICK_RATE_HZ: u32 = 60;
pub const TICK_DURATION: Duration = Duration::from_micros(16_666); // ~16.666ms

/// Convert a tick rate into a tick duration. A rate of zero falls back to the default.
pub fn tick_duration(rate_hz: u32) -> Duration {
    if rate_hz == 0 {
        return TICK_DURATION;
    }
    Duration::from_micros(1_000_000 / rate_hz as u64)
}

/// Tick counter with wall-clock pacing
pub struct TickClock {
    tick_count: u64,
    tick_duration: Duration,
    accumulated_time: Duration,
    next_deadline: Option<Instant>,
}

impl TickClock {
    pub fn new() -> Self {
        Self::with_rate(TICK_RATE_HZ)
    }

    pub fn with_rate(rate_hz: u32) -> Self {
        Self {
            tick_count: 0,
            tick_duration: tick_duration(rate_hz),
            accumulated_time: Duration::ZERO,
            next_deadline: None,
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn tick_duration(&self) -> Duration {
        self.tick_duration
    }

    pub fn advance_tick(&mut self) {
        self.tick_count += 1;
        self.accumulated_time += self.tick_duration;
    }

    pub fn total_time(&self) -> Duration {
        self.accumulated_time
    }

    /// Sleep until the next tick boundary, then advance.
    ///
    /// A tick that overran its slot starts the next one immediately instead of
    /// trying to catch up.
    pub fn wait_for_next_tick(&mut self) {
        let now = Instant::now();
        let deadline = self.next_deadline.unwrap_or(now);
        if deadline > now {
            std::thread::sleep(deadline - now);
            self.next_deadline = Some(deadline + self.tick_duration);
        } else {
            if self.next_deadline.is_some() {
                tracing::trace!(
                    tick = self.tick_count,
                    late_by_us = (now - deadline).as_micros() as u64,
                    "tick overran"
                );
            }
            self.next_deadline = Some(now + self.tick_duration);
        }
        self.advance_tick();
    }
}

impl Default for TickClock {
    fn default() -> Self {
        Self::new()
    }
}
