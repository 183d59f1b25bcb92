//! Per-window processing cost tracking

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Running cost statistics of window processing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingMetrics {
    /// Windows processed since the last reset
    pub windows_processed: u64,
    /// Cost of the most recent window in microseconds
    pub last_window_us: u64,
    /// Slowest window in microseconds
    pub max_window_us: u64,
    /// Windows that took longer than the time until the next window
    pub budget_overruns: u64,
}

impl ProcessingMetrics {
    /// Start timing a window
    pub fn start_timing() -> ProcessingTimer {
        ProcessingTimer {
            start_time: Instant::now(),
        }
    }

    /// Record a finished window; returns true when it overran `budget`
    pub fn record(&mut self, elapsed: Duration, budget: Duration) -> bool {
        let micros = elapsed.as_micros() as u64;
        self.windows_processed += 1;
        self.last_window_us = micros;
        self.max_window_us = self.max_window_us.max(micros);
        let overran = elapsed > budget;
        if overran {
            self.budget_overruns += 1;
        }
        overran
    }
}

/// Helper for timing one processing operation
pub struct ProcessingTimer {
    start_time: Instant,
}

impl ProcessingTimer {
    /// Finish timing and return the elapsed time
    pub fn finish(self) -> Duration {
        self.start_time.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_measures_elapsed_time() {
        let timer = ProcessingMetrics::start_timing();
        std::thread::sleep(Duration::from_millis(1));
        assert!(timer.finish() >= Duration::from_millis(1));
    }

    #[test]
    fn test_record_counts_overruns() {
        let mut metrics = ProcessingMetrics::default();
        let budget = Duration::from_millis(100);
        assert!(!metrics.record(Duration::from_micros(300), budget));
        assert!(metrics.record(Duration::from_millis(150), budget));
        assert!(!metrics.record(Duration::from_micros(200), budget));

        assert_eq!(metrics.windows_processed, 3);
        assert_eq!(metrics.budget_overruns, 1);
        assert_eq!(metrics.last_window_us, 200);
        assert_eq!(metrics.max_window_us, 150_000);
    }
}
