//! Close/open gesture detection against the adaptive threshold
//!
//! A gesture is one excursion of the window RMS above the threshold. It counts
//! only if it ends within `[min, max]` of its start; too-short excursions,
//! too-long excursions and excursions that never end within `max` are counted
//! as false positives. A new gesture may not start until the cooldown after the
//! previous completed gesture has elapsed.

use grip_core::GripConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Duration and cooldown limits of a gesture
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureTiming {
    pub min_duration: Duration,
    pub max_duration: Duration,
    pub cooldown: Duration,
}

impl GestureTiming {
    pub fn from_config(config: &GripConfig) -> Self {
        Self {
            min_duration: config.min_gesture(),
            max_duration: config.max_gesture(),
            cooldown: config.gesture_cooldown(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GesturePhase {
    Idle,
    Active,
}

/// A completed, accepted gesture
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GestureEvent {
    /// 1-based count of accepted gestures since the last reset
    pub sequence: u64,
    /// Clock time the RMS crossed above the threshold
    pub started_at: Duration,
    /// Clock time the RMS fell back below the threshold
    pub ended_at: Duration,
    pub duration: Duration,
    /// Highest window RMS seen while active
    pub peak_rms: f64,
}

/// State change produced by one window
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureTransition {
    Started { at: Duration, rms: f64, threshold: f64 },
    Completed(GestureEvent),
    /// Ended outside the accepted duration range
    Rejected { duration: Duration },
    /// Still above threshold after the maximum duration
    TimedOut { duration: Duration },
}

/// Idle/Active detector with duration and cooldown rules
#[derive(Debug, Clone)]
pub struct GestureStateMachine {
    timing: GestureTiming,
    phase: GesturePhase,
    start_time: Duration,
    peak_rms: f64,
    last_completed: Option<Duration>,
    total_gestures: u64,
    false_positives: u64,
}

impl GestureStateMachine {
    pub fn new(timing: GestureTiming) -> Self {
        Self {
            timing,
            phase: GesturePhase::Idle,
            start_time: Duration::ZERO,
            peak_rms: 0.0,
            last_completed: None,
            total_gestures: 0,
            false_positives: 0,
        }
    }

    /// Feed one window RMS and the threshold in force at time `now`
    pub fn update(&mut self, rms: f64, threshold: f64, now: Duration) -> Option<GestureTransition> {
        match self.phase {
            GesturePhase::Idle => {
                if rms > threshold && self.cooldown_elapsed(now) {
                    self.phase = GesturePhase::Active;
                    self.start_time = now;
                    self.peak_rms = rms;
                    Some(GestureTransition::Started { at: now, rms, threshold })
                } else {
                    None
                }
            }
            GesturePhase::Active => {
                let elapsed = now.saturating_sub(self.start_time);
                if rms < threshold {
                    self.phase = GesturePhase::Idle;
                    if elapsed >= self.timing.min_duration && elapsed <= self.timing.max_duration {
                        self.total_gestures += 1;
                        self.last_completed = Some(now);
                        Some(GestureTransition::Completed(GestureEvent {
                            sequence: self.total_gestures,
                            started_at: self.start_time,
                            ended_at: now,
                            duration: elapsed,
                            peak_rms: self.peak_rms,
                        }))
                    } else {
                        self.false_positives += 1;
                        Some(GestureTransition::Rejected { duration: elapsed })
                    }
                } else if elapsed > self.timing.max_duration {
                    self.phase = GesturePhase::Idle;
                    self.false_positives += 1;
                    Some(GestureTransition::TimedOut { duration: elapsed })
                } else {
                    self.peak_rms = self.peak_rms.max(rms);
                    None
                }
            }
        }
    }

    fn cooldown_elapsed(&self, now: Duration) -> bool {
        match self.last_completed {
            Some(last) => now.saturating_sub(last) > self.timing.cooldown,
            None => true,
        }
    }

    pub fn phase(&self) -> GesturePhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase == GesturePhase::Active
    }

    pub fn total_gestures(&self) -> u64 {
        self.total_gestures
    }

    pub fn false_positives(&self) -> u64 {
        self.false_positives
    }

    /// Zero the counters; phase and cooldown are kept
    pub fn reset_counters(&mut self) {
        self.total_gestures = 0;
        self.false_positives = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn machine() -> GestureStateMachine {
        GestureStateMachine::new(GestureTiming {
            min_duration: ms(100),
            max_duration: ms(2000),
            cooldown: ms(500),
        })
    }

    #[test]
    fn test_valid_gesture_completes() {
        let mut sm = machine();
        assert_eq!(sm.update(5.0, 10.0, ms(0)), None);
        assert!(matches!(sm.update(50.0, 10.0, ms(100)), Some(GestureTransition::Started { .. })));
        assert!(sm.is_active());
        assert_eq!(sm.update(80.0, 10.0, ms(200)), None);

        match sm.update(2.0, 10.0, ms(500)) {
            Some(GestureTransition::Completed(event)) => {
                assert_eq!(event.sequence, 1);
                assert_eq!(event.started_at, ms(100));
                assert_eq!(event.duration, ms(400));
                assert_eq!(event.peak_rms, 80.0);
            }
            other => panic!("expected completion, got {:?}", other),
        }
        assert_eq!(sm.total_gestures(), 1);
        assert_eq!(sm.false_positives(), 0);
        assert_eq!(sm.phase(), GesturePhase::Idle);
    }

    #[test]
    fn test_duration_bounds_are_inclusive() {
        let mut sm = machine();
        sm.update(50.0, 10.0, ms(0));
        assert!(matches!(sm.update(1.0, 10.0, ms(100)), Some(GestureTransition::Completed(_))));

        let mut sm = machine();
        sm.update(50.0, 10.0, ms(0));
        assert!(matches!(sm.update(1.0, 10.0, ms(2000)), Some(GestureTransition::Completed(_))));
    }

    #[test]
    fn test_too_short_is_false_positive() {
        let mut sm = machine();
        sm.update(50.0, 10.0, ms(0));
        assert_eq!(
            sm.update(1.0, 10.0, ms(50)),
            Some(GestureTransition::Rejected { duration: ms(50) })
        );
        assert_eq!(sm.total_gestures(), 0);
        assert_eq!(sm.false_positives(), 1);
    }

    #[test]
    fn test_sustained_contraction_times_out() {
        let mut sm = machine();
        sm.update(50.0, 10.0, ms(0));
        assert_eq!(sm.update(50.0, 10.0, ms(2000)), None);
        assert_eq!(
            sm.update(50.0, 10.0, ms(2100)),
            Some(GestureTransition::TimedOut { duration: ms(2100) })
        );
        assert_eq!(sm.false_positives(), 1);
        assert!(!sm.is_active());

        // No completion yet, so the next excursion may start at once
        assert!(matches!(sm.update(50.0, 10.0, ms(2200)), Some(GestureTransition::Started { .. })));
    }

    #[test]
    fn test_cooldown_gates_start_only() {
        let mut sm = machine();
        sm.update(50.0, 10.0, ms(0));
        sm.update(1.0, 10.0, ms(200));

        assert_eq!(sm.update(50.0, 10.0, ms(600)), None);
        assert_eq!(sm.update(50.0, 10.0, ms(700)), None);
        assert!(matches!(sm.update(50.0, 10.0, ms(701)), Some(GestureTransition::Started { .. })));
    }

    #[test]
    fn test_idle_below_threshold_never_transitions() {
        let mut sm = machine();
        for t in 0..50 {
            assert_eq!(sm.update(10.0, 10.0, ms(t * 100)), None);
        }
        assert_eq!(sm.false_positives(), 0);
    }

    #[test]
    fn test_reset_counters() {
        let mut sm = machine();
        sm.update(50.0, 10.0, ms(0));
        sm.update(1.0, 10.0, ms(10));
        sm.reset_counters();
        assert_eq!(sm.false_positives(), 0);
        assert_eq!(sm.total_gestures(), 0);
    }
}
