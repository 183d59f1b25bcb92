//! Window conditioning chain
//!
//! The mandatory chain removes motion drift, mains hum and out-of-band noise:
//! high-pass 20 Hz, band-stop 49-51 Hz, band-stop 59-61 Hz, low-pass 250 Hz,
//! all fourth order and zero phase. Higher noise reduction levels append the
//! smoothing stages from [`crate::smoothing`]. A stage that fails, or produces
//! non-finite output, is skipped and its input passed on unchanged.

use crate::filters::{FilterKind, IirFilter};
use crate::smoothing::{MedianFilter, MovingAverage, OutlierRejection, SavitzkyGolay};
use grip_core::config::{MAX_NOISE_LEVEL, MIN_NOISE_LEVEL};
use grip_core::GripResult;
use std::sync::Arc;
use tracing::{debug, warn};

/// Order of every mandatory Butterworth filter
pub const FILTER_ORDER: usize = 4;
/// Median kernel used from level 3
pub const MEDIAN_KERNEL: usize = 3;
/// Savitzky-Golay frame length used at level 5
pub const SAVGOL_WINDOW: usize = 11;
/// Savitzky-Golay polynomial order used at level 5
pub const SAVGOL_ORDER: usize = 3;

/// One whole-window processing step
pub trait ConditioningStage: Send + Sync {
    /// Stage identifier for logs and reports
    fn name(&self) -> &'static str;

    /// Process a window, returning a window of the same length
    fn apply(&self, window: &[f64]) -> GripResult<Vec<f64>>;
}

impl ConditioningStage for IirFilter {
    fn name(&self) -> &'static str {
        IirFilter::name(self)
    }

    fn apply(&self, window: &[f64]) -> GripResult<Vec<f64>> {
        self.filtfilt(window)
    }
}

/// Output of [`SignalConditioner::condition`]
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionedWindow {
    /// Filtered samples, same length as the input window
    pub samples: Vec<f64>,
    /// Stages that were passed through on this window
    pub skipped: Vec<&'static str>,
}

/// Configurable filter chain applied to each analysis window
pub struct SignalConditioner {
    sampling_rate: f64,
    /// Complete stage list per noise reduction level (index 0 = level 1)
    chains: Vec<Vec<Arc<dyn ConditioningStage>>>,
    /// Mandatory filters that could not be designed for this sampling rate
    design_failures: Vec<&'static str>,
}

impl SignalConditioner {
    /// Design the chain for a sampling rate
    ///
    /// Never fails: a filter that cannot be designed (for example a 250 Hz
    /// low-pass at 400 Hz sampling) is left out of the chain with a warning.
    pub fn new(sampling_rate: f64) -> Self {
        let designs = [
            ("highpass_20hz", FilterKind::Highpass { cutoff: 20.0 }),
            ("bandstop_50hz", FilterKind::Bandstop { low: 49.0, high: 51.0 }),
            ("bandstop_60hz", FilterKind::Bandstop { low: 59.0, high: 61.0 }),
            ("lowpass_250hz", FilterKind::Lowpass { cutoff: 250.0 }),
        ];

        let mut mandatory: Vec<Arc<dyn ConditioningStage>> = Vec::new();
        let mut design_failures = Vec::new();
        for (name, kind) in designs {
            match IirFilter::design(name, kind, FILTER_ORDER, sampling_rate) {
                Ok(filter) => mandatory.push(Arc::new(filter)),
                Err(e) => {
                    warn!(stage = name, error = %e, "filter disabled for this sampling rate");
                    design_failures.push(name);
                }
            }
        }

        let median: Option<Arc<dyn ConditioningStage>> = MedianFilter::new(MEDIAN_KERNEL)
            .ok()
            .map(|m| Arc::new(m) as Arc<dyn ConditioningStage>);
        let savgol: Option<Arc<dyn ConditioningStage>> =
            match SavitzkyGolay::new(SAVGOL_WINDOW, SAVGOL_ORDER) {
                Ok(sg) => Some(Arc::new(sg)),
                Err(e) => {
                    warn!(error = %e, "polynomial smoothing disabled");
                    design_failures.push("savitzky_golay");
                    None
                }
            };

        let chains = (MIN_NOISE_LEVEL..=MAX_NOISE_LEVEL)
            .map(|level| {
                let mut chain = mandatory.clone();
                if level >= 2 {
                    chain.push(Arc::new(OutlierRejection::for_level(level)));
                }
                if level >= 3 {
                    chain.extend(median.clone());
                }
                if level >= 4 {
                    chain.push(Arc::new(MovingAverage::for_level(level)));
                }
                if level >= 5 {
                    chain.extend(savgol.clone());
                }
                chain
            })
            .collect();

        Self {
            sampling_rate,
            chains,
            design_failures,
        }
    }

    /// Filters left out at construction
    pub fn design_failures(&self) -> &[&'static str] {
        &self.design_failures
    }

    /// Stage names run at a level, in order
    pub fn stage_names(&self, level: u8) -> Vec<&'static str> {
        self.chain(level).iter().map(|s| s.name()).collect()
    }

    /// Condition a window at a noise reduction level (clamped to 1-5)
    pub fn condition(&self, window: &[f64], level: u8) -> ConditionedWindow {
        let mut samples = window.to_vec();
        let mut skipped = Vec::new();

        for stage in self.chain(level) {
            match stage.apply(&samples) {
                Ok(output) if output.len() != samples.len() => {
                    debug!(stage = stage.name(), "stage changed window length, passing through");
                    skipped.push(stage.name());
                }
                Ok(output) if output.iter().any(|v| !v.is_finite()) => {
                    debug!(stage = stage.name(), "stage produced non-finite output, passing through");
                    skipped.push(stage.name());
                }
                Ok(output) => samples = output,
                Err(e) => {
                    debug!(stage = stage.name(), error = %e, "stage failed, passing through");
                    skipped.push(stage.name());
                }
            }
        }

        ConditionedWindow { samples, skipped }
    }

    fn chain(&self, level: u8) -> &[Arc<dyn ConditioningStage>] {
        let index = level.clamp(MIN_NOISE_LEVEL, MAX_NOISE_LEVEL) - MIN_NOISE_LEVEL;
        &self.chains[usize::from(index)]
    }
}

impl std::fmt::Debug for SignalConditioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalConditioner")
            .field("sampling_rate", &self.sampling_rate)
            .field("levels", &self.chains.len())
            .field("design_failures", &self.design_failures)
            .finish()
    }
}
