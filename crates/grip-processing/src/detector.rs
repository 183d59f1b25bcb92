//! Sample-driven gesture detector
//!
//! [`EmgGestureDetector`] owns the sample ring buffer and drives the chain
//! conditioner → features → baseline → gesture state machine once per hop.
//! Everything runs synchronously on the caller's thread; accepted gestures are
//! reported to a [`GestureSink`].

use crate::baseline::BaselineTracker;
use crate::conditioner::SignalConditioner;
use crate::features::{FeatureExtractor, WindowFeatures};
use crate::gesture::{GestureEvent, GestureStateMachine, GestureTiming, GestureTransition};
use crate::isolation::call_isolated;
use crate::timing::ProcessingMetrics;
use grip_core::{Clock, GripConfig, GripResult};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Receiver of accepted gestures
///
/// Called on the detection thread. Errors and panics are caught and logged.
pub trait GestureSink: Send {
    fn on_gesture(&mut self, event: &GestureEvent) -> anyhow::Result<()>;
}

impl<F> GestureSink for F
where
    F: FnMut(&GestureEvent) -> anyhow::Result<()> + Send,
{
    fn on_gesture(&mut self, event: &GestureEvent) -> anyhow::Result<()> {
        self(event)
    }
}

/// Detector statistics snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorStats {
    pub total_gestures: u64,
    pub false_positives: u64,
    pub baseline_rms: f64,
    pub adaptive_threshold: f64,
    pub gesture_active: bool,
    /// Non-finite samples dropped at intake
    pub rejected_samples: u64,
    /// Windows whose energy overflowed; they never reach the baseline
    pub rejected_windows: u64,
    /// Gesture callbacks that failed or panicked
    pub callback_failures: u64,
    pub processing: ProcessingMetrics,
    /// Features of the most recent window
    pub last_features: Option<WindowFeatures>,
}

/// Windowed EMG gesture detector
pub struct EmgGestureDetector {
    clock: Arc<dyn Clock>,
    window_size: usize,
    hop: usize,
    noise_level: u8,
    freeze_baseline: bool,
    window_budget: Duration,
    buffer: VecDeque<f64>,
    pending: usize,
    conditioner: SignalConditioner,
    baseline: BaselineTracker,
    gestures: GestureStateMachine,
    sink: Option<Box<dyn GestureSink>>,
    metrics: ProcessingMetrics,
    rejected_samples: u64,
    rejected_windows: u64,
    callback_failures: u64,
    last_features: Option<WindowFeatures>,
    last_skipped: Vec<&'static str>,
}

impl EmgGestureDetector {
    /// Create a detector; the configuration is validated here
    pub fn new(config: &GripConfig, clock: Arc<dyn Clock>) -> GripResult<Self> {
        config.validate()?;
        let window_size = config.window_size;

        Ok(Self {
            clock,
            window_size,
            hop: config.hop_size(),
            noise_level: config.noise_reduction_level,
            freeze_baseline: config.freeze_baseline_during_gesture,
            window_budget: config.window_budget(),
            buffer: VecDeque::with_capacity(window_size * 2),
            pending: 0,
            conditioner: SignalConditioner::new(config.sampling_rate),
            baseline: BaselineTracker::new(config.threshold_multiplier)?,
            gestures: GestureStateMachine::new(GestureTiming::from_config(config)),
            sink: None,
            metrics: ProcessingMetrics::default(),
            rejected_samples: 0,
            rejected_windows: 0,
            callback_failures: 0,
            last_features: None,
            last_skipped: Vec::new(),
        })
    }

    /// Attach the receiver of accepted gestures
    pub fn with_sink(mut self, sink: impl GestureSink + 'static) -> Self {
        self.set_sink(Box::new(sink));
        self
    }

    pub fn set_sink(&mut self, sink: Box<dyn GestureSink>) {
        self.sink = Some(sink);
    }

    /// Push one raw sample; returns the gesture transition if a window was
    /// processed and changed state
    pub fn add_sample(&mut self, value: f64) -> Option<GestureTransition> {
        if !value.is_finite() {
            self.rejected_samples += 1;
            debug!(value, "dropping non-finite sample");
            return None;
        }

        if self.buffer.len() == self.window_size * 2 {
            self.buffer.pop_front();
        }
        self.buffer.push_back(value);
        self.pending += 1;

        if self.buffer.len() >= self.window_size && self.pending >= self.hop {
            self.pending = 0;
            self.process_window()
        } else {
            None
        }
    }

    fn process_window(&mut self) -> Option<GestureTransition> {
        let timer = ProcessingMetrics::start_timing();

        let start = self.buffer.len() - self.window_size;
        let window: Vec<f64> = self.buffer.range(start..).copied().collect();
        let conditioned = self.conditioner.condition(&window, self.noise_level);
        self.report_skipped(conditioned.skipped);

        let features = FeatureExtractor::extract(&conditioned.samples);
        if !features.rms.is_finite() {
            self.rejected_windows += 1;
            warn!(rms = features.rms, "window energy is not finite, skipping baseline and gesture update");
            self.metrics.record(timer.finish(), self.window_budget);
            return None;
        }
        let now = self.clock.now();

        let threshold = if self.freeze_baseline && self.gestures.is_active() {
            self.baseline.threshold()
        } else {
            self.baseline.update(features.rms).1
        };
        let transition = self.gestures.update(features.rms, threshold, now);
        self.last_features = Some(features);

        match &transition {
            Some(GestureTransition::Started { rms, threshold, .. }) => {
                debug!(rms, threshold, "gesture started");
            }
            Some(GestureTransition::Completed(event)) => {
                info!(
                    sequence = event.sequence,
                    duration_ms = event.duration.as_millis() as u64,
                    peak_rms = event.peak_rms,
                    "gesture completed"
                );
                self.notify_sink(event);
            }
            Some(GestureTransition::Rejected { duration }) => {
                debug!(duration_ms = duration.as_millis() as u64, "gesture rejected: duration out of range");
            }
            Some(GestureTransition::TimedOut { duration }) => {
                warn!(duration_ms = duration.as_millis() as u64, "gesture timed out above threshold");
            }
            None => {}
        }

        let elapsed = timer.finish();
        if self.metrics.record(elapsed, self.window_budget) {
            warn!(
                elapsed_us = elapsed.as_micros() as u64,
                budget_us = self.window_budget.as_micros() as u64,
                "window processing overran its budget"
            );
        }

        transition
    }

    fn notify_sink(&mut self, event: &GestureEvent) {
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        if let Err(e) = call_isolated("gesture callback", || sink.on_gesture(event)) {
            self.callback_failures += 1;
            warn!(error = %e, "gesture callback error ignored");
        }
    }

    /// Log stage bypasses when the set of skipped stages changes
    fn report_skipped(&mut self, skipped: Vec<&'static str>) {
        if skipped == self.last_skipped {
            return;
        }
        if skipped.is_empty() {
            info!("all conditioning stages running again");
        } else {
            warn!(stages = ?skipped, "conditioning stages bypassed, passing window through");
        }
        self.last_skipped = skipped;
    }

    /// Snapshot of detector statistics
    pub fn stats(&self) -> DetectorStats {
        DetectorStats {
            total_gestures: self.gestures.total_gestures(),
            false_positives: self.gestures.false_positives(),
            baseline_rms: self.baseline.baseline(),
            adaptive_threshold: self.baseline.threshold(),
            gesture_active: self.gestures.is_active(),
            rejected_samples: self.rejected_samples,
            rejected_windows: self.rejected_windows,
            callback_failures: self.callback_failures,
            processing: self.metrics.clone(),
            last_features: self.last_features,
        }
    }

    /// Clear counters and forget the baseline
    pub fn reset_statistics(&mut self) {
        self.gestures.reset_counters();
        self.baseline.reset();
        self.metrics = ProcessingMetrics::default();
        self.rejected_samples = 0;
        self.rejected_windows = 0;
        self.callback_failures = 0;
        info!("detector statistics reset");
    }

    /// Change the threshold multiplier; the threshold is recomputed at once
    pub fn set_threshold_multiplier(&mut self, multiplier: f64) -> GripResult<()> {
        self.baseline.set_multiplier(multiplier)?;
        info!(multiplier, threshold = self.baseline.threshold(), "threshold multiplier updated");
        Ok(())
    }

    /// Drop buffered samples so the next window starts fresh
    pub fn clear_buffer(&mut self) {
        self.buffer.clear();
        self.pending = 0;
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn buffer_capacity(&self) -> usize {
        self.window_size * 2
    }

    pub fn hop_size(&self) -> usize {
        self.hop
    }
}

impl std::fmt::Debug for EmgGestureDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmgGestureDetector")
            .field("window_size", &self.window_size)
            .field("hop", &self.hop)
            .field("noise_level", &self.noise_level)
            .field("buffered", &self.buffer.len())
            .field("gesture_active", &self.gestures.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use grip_core::ManualClock;
    use std::f64::consts::PI;
    use std::sync::Mutex;

    /// Two tones at 90 and 150 Hz, each of amplitude `rms`, so the window RMS
    /// equals `rms`; the phase continues across segments.
    fn burst(len: usize, rms: f64, start: usize) -> Vec<f64> {
        (start..start + len)
            .map(|i| {
                let t = i as f64 / 1000.0;
                rms * (2.0 * PI * 90.0 * t).sin() + rms * (2.0 * PI * 150.0 * t + 0.7).sin()
            })
            .collect()
    }

    fn scenario(segments: &[(usize, f64)]) -> Vec<f64> {
        let mut samples = Vec::new();
        for &(len, rms) in segments {
            let start = samples.len();
            samples.extend(burst(len, rms, start));
        }
        samples
    }

    fn config(level: u8) -> GripConfig {
        GripConfig {
            threshold_multiplier: 2.0,
            min_gesture_duration: 0.1,
            max_gesture_duration: 2.0,
            noise_reduction_level: level,
            ..GripConfig::standard()
        }
    }

    /// Feed samples one millisecond apart and collect transitions
    fn feed(
        detector: &mut EmgGestureDetector,
        clock: &ManualClock,
        samples: &[f64],
    ) -> Vec<GestureTransition> {
        samples
            .iter()
            .filter_map(|&s| {
                clock.advance(Duration::from_millis(1));
                detector.add_sample(s)
            })
            .collect()
    }

    #[test]
    fn test_ring_buffer_never_exceeds_capacity() {
        let clock = Arc::new(ManualClock::new());
        let mut detector = EmgGestureDetector::new(&config(1), clock.clone()).unwrap();
        for i in 0..1500 {
            clock.advance(Duration::from_millis(1));
            detector.add_sample((i as f64 * 0.37).sin());
            assert!(detector.buffered_len() <= detector.buffer_capacity());
        }
        assert_eq!(detector.buffered_len(), 400);
    }

    #[test]
    fn test_windows_processed_once_per_hop() {
        let clock = Arc::new(ManualClock::new());
        let mut detector = EmgGestureDetector::new(&config(1), clock.clone()).unwrap();
        feed(&mut detector, &clock, &scenario(&[(199, 20.0)]));
        assert_eq!(detector.stats().processing.windows_processed, 0);

        feed(&mut detector, &clock, &[0.0]);
        assert_eq!(detector.stats().processing.windows_processed, 1);

        feed(&mut detector, &clock, &scenario(&[(300, 20.0)]));
        assert_eq!(detector.stats().processing.windows_processed, 4);
    }

    #[test]
    fn test_single_contraction_is_one_gesture_at_every_level() {
        for level in 1..=5 {
            let clock = Arc::new(ManualClock::new());
            let mut detector = EmgGestureDetector::new(&config(level), clock.clone()).unwrap();
            let samples = scenario(&[(300, 20.0), (250, 500.0), (300, 20.0)]);
            let transitions = feed(&mut detector, &clock, &samples);

            let completed: Vec<_> = transitions
                .iter()
                .filter_map(|t| match t {
                    GestureTransition::Completed(e) => Some(*e),
                    _ => None,
                })
                .collect();
            assert_eq!(completed.len(), 1, "level {}: {:?}", level, transitions);
            assert_eq!(completed[0].duration, Duration::from_millis(400));

            let stats = detector.stats();
            assert_eq!(stats.total_gestures, 1);
            assert_eq!(stats.false_positives, 0);
            assert!(!stats.gesture_active);
            assert!(stats.baseline_rms > 0.0);
            assert!((stats.adaptive_threshold - stats.baseline_rms * 2.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_sink_receives_gesture_and_errors_are_contained() {
        let clock = Arc::new(ManualClock::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();
        let mut detector = EmgGestureDetector::new(&config(2), clock.clone())
            .unwrap()
            .with_sink(move |event: &GestureEvent| -> anyhow::Result<()> {
                recorder.lock().unwrap().push(event.sequence);
                Err(anyhow!("downstream rejected gesture {}", event.sequence))
            });

        let samples = scenario(&[(300, 20.0), (250, 500.0), (300, 20.0)]);
        feed(&mut detector, &clock, &samples);

        assert_eq!(*seen.lock().unwrap(), vec![1]);
        let stats = detector.stats();
        assert_eq!(stats.callback_failures, 1);
        assert_eq!(stats.total_gestures, 1);
    }

    #[test]
    fn test_panicking_sink_does_not_stop_detection() {
        let clock = Arc::new(ManualClock::new());
        let mut detector = EmgGestureDetector::new(&config(1), clock.clone())
            .unwrap()
            .with_sink(|_: &GestureEvent| -> anyhow::Result<()> { panic!("sink bug") });

        let samples = scenario(&[(300, 20.0), (250, 500.0), (300, 20.0)]);
        feed(&mut detector, &clock, &samples);
        feed(&mut detector, &clock, &burst(500, 20.0, samples.len()));

        let stats = detector.stats();
        assert_eq!(stats.callback_failures, 1);
        assert_eq!(stats.total_gestures, 1);
        assert_eq!(stats.processing.windows_processed, 12);
    }

    #[test]
    fn test_non_finite_samples_are_dropped() {
        let clock = Arc::new(ManualClock::new());
        let mut detector = EmgGestureDetector::new(&config(1), clock.clone()).unwrap();
        detector.add_sample(f64::NAN);
        detector.add_sample(f64::INFINITY);
        detector.add_sample(1.0);
        assert_eq!(detector.buffered_len(), 1);
        assert_eq!(detector.stats().rejected_samples, 2);
    }

    #[test]
    fn test_overflowing_window_leaves_baseline_intact() {
        let clock = Arc::new(ManualClock::new());
        let mut detector = EmgGestureDetector::new(&config(1), clock.clone()).unwrap();
        let mut samples = scenario(&[(400, 20.0), (400, 20.0), (250, 500.0), (300, 20.0)]);
        // Finite, but its square is not
        samples[450] = 1e300;

        let transitions = feed(&mut detector, &clock, &samples);
        let stats = detector.stats();
        assert_eq!(stats.rejected_samples, 0);
        assert_eq!(stats.rejected_windows, 2);
        assert!(stats.baseline_rms.is_finite());
        assert!(stats.adaptive_threshold.is_finite());

        // Detection still works once the spike leaves the window
        assert_eq!(stats.total_gestures, 1, "{:?}", transitions);
        assert!(transitions.iter().any(|t| matches!(t, GestureTransition::Completed(_))));
    }

    #[test]
    fn test_multiplier_update_and_reset() {
        let clock = Arc::new(ManualClock::new());
        let mut detector = EmgGestureDetector::new(&config(1), clock.clone()).unwrap();
        feed(&mut detector, &clock, &scenario(&[(400, 20.0)]));

        let baseline = detector.stats().baseline_rms;
        detector.set_threshold_multiplier(5.0).unwrap();
        assert!((detector.stats().adaptive_threshold - baseline * 5.0).abs() < 1e-9);
        assert!(detector.set_threshold_multiplier(50.0).is_err());

        detector.reset_statistics();
        let stats = detector.stats();
        assert_eq!(stats.baseline_rms, 0.0);
        assert_eq!(stats.adaptive_threshold, 0.0);
        assert_eq!(stats.processing.windows_processed, 0);
    }

    #[test]
    fn test_short_window_bypasses_filters() {
        let clock = Arc::new(ManualClock::new());
        let config = GripConfig {
            window_size: 10,
            window_overlap: 0.0,
            ..config(1)
        };
        let mut detector = EmgGestureDetector::new(&config, clock.clone()).unwrap();
        feed(&mut detector, &clock, &[3.0; 10]);

        // Every filter is bypassed, so the raw RMS seeds the baseline
        let stats = detector.stats();
        assert_eq!(stats.processing.windows_processed, 1);
        assert!((stats.baseline_rms - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_frozen_baseline_holds_during_gesture() {
        let clock = Arc::new(ManualClock::new());
        let config = GripConfig {
            freeze_baseline_during_gesture: true,
            ..config(1)
        };
        let mut detector = EmgGestureDetector::new(&config, clock.clone()).unwrap();
        let transitions = feed(&mut detector, &clock, &scenario(&[(300, 20.0), (200, 500.0)]));
        assert!(transitions.iter().any(|t| matches!(t, GestureTransition::Started { .. })));
        let at_start = detector.stats().baseline_rms;

        feed(&mut detector, &clock, &burst(300, 500.0, 500));
        let stats = detector.stats();
        assert!(stats.gesture_active);
        assert_eq!(stats.baseline_rms, at_start);
    }
}
