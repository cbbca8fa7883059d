//! Progress throttling for long-running operations

use std::time::{Duration, Instant};

/// Decides when a progress notification is worth publishing
///
/// Emits when the integer percentage advanced since the last emission (0% is
/// never emitted) and either `min_interval` has elapsed or the operation
/// reached 100%.
#[derive(Debug)]
pub struct ProgressThrottle {
    total: u64,
    min_interval: Duration,
    last_emit: Option<Instant>,
    last_percent: u8,
}

impl ProgressThrottle {
    pub fn new(total: u64, min_interval: Duration) -> Self {
        Self {
            total,
            min_interval,
            last_emit: None,
            last_percent: 0,
        }
    }

    /// Percentage complete after `processed` items
    pub fn percent(&self, processed: u64) -> u8 {
        if self.total == 0 {
            return 100;
        }
        (processed.min(self.total) * 100 / self.total) as u8
    }

    /// Record that `processed` items are done; returns the percentage to publish, if any
    pub fn tick(&mut self, processed: u64) -> Option<u8> {
        let percent = self.percent(processed);
        if percent <= self.last_percent {
            return None;
        }

        let now = Instant::now();
        let due = self
            .last_emit
            .map_or(true, |last| now.duration_since(last) >= self.min_interval);
        if !due && percent < 100 {
            return None;
        }

        self.last_emit = Some(now);
        self.last_percent = percent;
        Some(percent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_interval_emits_each_new_percent() {
        let mut throttle = ProgressThrottle::new(4, Duration::ZERO);
        assert_eq!(throttle.tick(1), Some(25));
        assert_eq!(throttle.tick(1), None);
        assert_eq!(throttle.tick(2), Some(50));
        assert_eq!(throttle.tick(4), Some(100));
        assert_eq!(throttle.tick(4), None);
    }

    #[test]
    fn test_long_interval_still_emits_completion() {
        let mut throttle = ProgressThrottle::new(1000, Duration::from_secs(3600));
        assert_eq!(throttle.tick(10), Some(1));
        assert_eq!(throttle.tick(500), None);
        assert_eq!(throttle.tick(999), None);
        assert_eq!(throttle.tick(1000), Some(100));
    }

    #[test]
    fn test_small_steps_do_not_repeat_percent() {
        let mut throttle = ProgressThrottle::new(1000, Duration::ZERO);
        let emitted: Vec<u8> = (1..=1000).filter_map(|i| throttle.tick(i)).collect();
        assert_eq!(emitted.len(), 100);
        assert_eq!(emitted.last(), Some(&100));
    }

    #[test]
    fn test_empty_total_is_complete() {
        let throttle = ProgressThrottle::new(0, Duration::ZERO);
        assert_eq!(throttle.percent(0), 100);
    }
}
