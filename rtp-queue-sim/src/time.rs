//! Virtual clock for deterministic simulation
//!
//! The queue takes `now` as an argument, so the simulator can run minutes of
//! traffic in milliseconds of wall time. Time is an `Instant` anchored at the
//! start of the run plus a simulated offset.

use std::time::{Duration, Instant};

/// Simulated clock
#[derive(Debug, Clone, Copy)]
pub struct SimClock {
    origin: Instant,
    elapsed: Duration,
}

impl SimClock {
    /// Create a clock starting at the current instant
    pub fn new() -> Self {
        SimClock {
            origin: Instant::now(),
            elapsed: Duration::ZERO,
        }
    }

    /// Current simulated instant
    #[inline]
    pub fn now(&self) -> Instant {
        self.origin + self.elapsed
    }

    /// Simulated time since the start of the run
    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Move the clock forward
    pub fn advance(&mut self, step: Duration) {
        self.elapsed += step;
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Timer for periodic operations
///
/// Used for the NACK tick and statistics reports.
#[derive(Debug, Clone)]
pub struct Timer {
    interval: Duration,
    last_fire: Instant,
}

impl Timer {
    /// Create a new timer with the given interval
    pub fn new(interval: Duration, now: Instant) -> Self {
        Timer {
            interval,
            last_fire: now,
        }
    }

    /// Check if the timer has expired
    pub fn expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_fire) >= self.interval
    }

    /// Reset the timer
    pub fn reset(&mut self, now: Instant) {
        self.last_fire = now;
    }

    /// Get time until next expiration
    pub fn time_until_expiration(&self, now: Instant) -> Duration {
        self.interval
            .saturating_sub(now.saturating_duration_since(self.last_fire))
    }

    /// Fire the timer if expired, returning true if it fired
    pub fn try_fire(&mut self, now: Instant) -> bool {
        if self.expired(now) {
            self.reset(now);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advances() {
        let mut clock = SimClock::new();
        let start = clock.now();

        clock.advance(Duration::from_millis(25));
        assert_eq!(clock.now() - start, Duration::from_millis(25));
        assert_eq!(clock.elapsed(), Duration::from_millis(25));
    }

    #[test]
    fn test_timer_fires_on_interval() {
        let mut clock = SimClock::new();
        let mut timer = Timer::new(Duration::from_millis(20), clock.now());

        clock.advance(Duration::from_millis(19));
        assert!(!timer.try_fire(clock.now()));
        assert_eq!(
            timer.time_until_expiration(clock.now()),
            Duration::from_millis(1)
        );

        clock.advance(Duration::from_millis(1));
        assert!(timer.try_fire(clock.now()));
        assert!(!timer.expired(clock.now()));
    }
}
