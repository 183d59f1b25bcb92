//! Adaptive baseline and detection threshold

use grip_core::config::validate_multiplier;
use grip_core::GripResult;

/// EMA learning rate of the resting baseline
pub const BASELINE_LEARNING_RATE: f64 = 0.01;

/// Slowly adapting estimate of resting RMS
#[derive(Debug, Clone)]
pub struct BaselineTracker {
    alpha: f64,
    multiplier: f64,
    baseline: f64,
    threshold: f64,
    seeded: bool,
}

impl BaselineTracker {
    pub fn new(multiplier: f64) -> GripResult<Self> {
        validate_multiplier(multiplier)?;
        Ok(Self {
            alpha: BASELINE_LEARNING_RATE,
            multiplier,
            baseline: 0.0,
            threshold: 0.0,
            seeded: false,
        })
    }

    /// Fold a window RMS into the baseline; the first value seeds it
    pub fn update(&mut self, rms: f64) -> (f64, f64) {
        if self.seeded {
            self.baseline = self.alpha * rms + (1.0 - self.alpha) * self.baseline;
        } else {
            self.baseline = rms;
            self.seeded = true;
        }
        self.threshold = self.baseline * self.multiplier;
        (self.baseline, self.threshold)
    }

    /// Change the multiplier and recompute the threshold immediately
    pub fn set_multiplier(&mut self, multiplier: f64) -> GripResult<()> {
        validate_multiplier(multiplier)?;
        self.multiplier = multiplier;
        self.threshold = self.baseline * multiplier;
        Ok(())
    }

    /// Forget the baseline; the next update seeds it again
    pub fn reset(&mut self) {
        self.baseline = 0.0;
        self.threshold = 0.0;
        self.seeded = false;
    }

    pub fn baseline(&self) -> f64 {
        self.baseline
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn is_seeded(&self) -> bool {
        self.seeded
    }
}
