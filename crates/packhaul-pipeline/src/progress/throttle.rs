//! Progress throttling.
//!
//! Rate-limits high-frequency progress samples so a consumer is not
//! flooded with events. Phase transitions and completions bypass the
//! throttle at the call site.

use std::time::{Duration, Instant};

/// Rate-limiter for progress updates.
///
/// Ensures samples are not emitted more frequently than the configured
/// interval.
#[derive(Debug)]
pub struct ProgressThrottle {
    last_emit: Option<Instant>,
    min_interval: Duration,
}

impl ProgressThrottle {
    /// Create a new throttle with the specified minimum interval.
    #[must_use]
    pub const fn new(min_interval: Duration) -> Self {
        Self {
            last_emit: None,
            min_interval,
        }
    }

    /// Create a throttle with a default interval of 100ms.
    #[must_use]
    pub const fn default_interval() -> Self {
        Self::new(Duration::from_millis(100))
    }

    /// Check if enough time has passed to emit another sample.
    pub fn should_emit(&mut self) -> bool {
        let now = Instant::now();
        match self.last_emit {
            Some(last) if now.duration_since(last) < self.min_interval => false,
            _ => {
                self.last_emit = Some(now);
                true
            }
        }
    }

    /// Force the next check to return true.
    pub fn reset(&mut self) {
        self.last_emit = None;
    }
}

impl Default for ProgressThrottle {
    fn default() -> Self {
        Self::default_interval()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_emit_always_passes() {
        let mut throttle = ProgressThrottle::new(Duration::from_millis(100));
        assert!(throttle.should_emit());
    }

    #[test]
    fn respects_interval() {
        let mut throttle = ProgressThrottle::new(Duration::from_millis(50));
        assert!(throttle.should_emit());
        assert!(!throttle.should_emit());

        std::thread::sleep(Duration::from_millis(60));
        assert!(throttle.should_emit());
    }

    #[test]
    fn reset_forces_next_emit() {
        let mut throttle = ProgressThrottle::new(Duration::from_millis(100));
        throttle.should_emit();
        assert!(!throttle.should_emit());

        throttle.reset();
        assert!(throttle.should_emit());
    }

    #[test]
    fn zero_interval_always_emits() {
        let mut throttle = ProgressThrottle::new(Duration::ZERO);
        assert!(throttle.should_emit());
        assert!(throttle.should_emit());
    }
}
