//! Time-domain window features

use serde::{Deserialize, Serialize};

/// Amplitude statistics of one conditioned window
///
/// Only `rms` drives detection; the rest are exported for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowFeatures {
    /// Root mean square
    pub rms: f64,
    /// Mean absolute value
    pub mav: f64,
    /// Population variance
    pub var: f64,
    pub min: f64,
    pub max: f64,
    /// `max - min`
    pub range: f64,
}

/// Stateless feature extractor
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    /// Compute all features of a window; an empty window yields zeros
    pub fn extract(window: &[f64]) -> WindowFeatures {
        if window.is_empty() {
            return WindowFeatures::default();
        }
        let n = window.len() as f64;

        let mut sum = 0.0;
        let mut sum_abs = 0.0;
        let mut sum_sq = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &x in window {
            sum += x;
            sum_abs += x.abs();
            sum_sq += x * x;
            min = min.min(x);
            max = max.max(x);
        }

        let mean = sum / n;
        let var = window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;

        WindowFeatures {
            rms: (sum_sq / n).sqrt(),
            mav: sum_abs / n,
            var,
            min,
            max,
            range: max - min,
        }
    }

    /// Root mean square of a window
    pub fn rms(window: &[f64]) -> f64 {
        if window.is_empty() {
            return 0.0;
        }
        (window.iter().map(|x| x * x).sum::<f64>() / window.len() as f64).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_window_has_zero_rms() {
        let features = FeatureExtractor::extract(&[0.0; 200]);
        assert_eq!(features.rms, 0.0);
        assert_eq!(features.range, 0.0);
        assert_eq!(FeatureExtractor::rms(&[0.0; 16]), 0.0);
    }

    #[test]
    fn test_basic_features() {
        let features = FeatureExtractor::extract(&[1.0, -1.0, 3.0, -3.0]);
        assert!((features.rms - 5.0f64.sqrt()).abs() < 1e-12);
        assert_eq!(features.mav, 2.0);
        assert_eq!(features.var, 5.0);
        assert_eq!(features.min, -3.0);
        assert_eq!(features.max, 3.0);
        assert_eq!(features.range, 6.0);
    }

    #[test]
    fn test_rms_is_non_negative() {
        let window: Vec<f64> = (0..100).map(|i| -(i as f64)).collect();
        let features = FeatureExtractor::extract(&window);
        assert!(features.rms >= 0.0);
        assert_eq!(features.rms, FeatureExtractor::rms(&window));
    }

    #[test]
    fn test_empty_window() {
        assert_eq!(FeatureExtractor::extract(&[]), WindowFeatures::default());
    }
}
