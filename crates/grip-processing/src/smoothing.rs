//! Optional clean-up stages applied after the mandatory IIR filters
//!
//! All stages work on a whole window and return a window of the same length.
//! Edge handling follows the conventional array-processing definitions: zero
//! padding for the median and moving-average kernels, polynomial fits over the
//! first and last frames for Savitzky-Golay.

use crate::conditioner::ConditioningStage;
use grip_core::{GripError, GripResult};

/// Replace samples further than `k` standard deviations from the window mean
///
/// Outliers are linearly interpolated from the nearest in-range neighbours;
/// outliers at either end take the value of the nearest in-range sample.
#[derive(Debug, Clone, Copy)]
pub struct OutlierRejection {
    k: f64,
}

impl OutlierRejection {
    pub fn new(k: f64) -> Self {
        Self { k }
    }

    /// Rejection width for a noise reduction level: tighter as the level rises
    pub fn for_level(level: u8) -> Self {
        Self::new(4.0 - f64::from(level) * 0.5)
    }

    pub fn k(&self) -> f64 {
        self.k
    }
}

impl ConditioningStage for OutlierRejection {
    fn name(&self) -> &'static str {
        "outlier_rejection"
    }

    fn apply(&self, window: &[f64]) -> GripResult<Vec<f64>> {
        if window.is_empty() {
            return Ok(Vec::new());
        }
        let n = window.len() as f64;
        let mean = window.iter().sum::<f64>() / n;
        let std_dev = (window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
        let limit = self.k * std_dev;

        let keep: Vec<bool> = window.iter().map(|v| (v - mean).abs() <= limit).collect();
        if keep.iter().all(|&k| k) {
            return Ok(window.to_vec());
        }
        let anchors: Vec<usize> = (0..window.len()).filter(|&i| keep[i]).collect();
        if anchors.is_empty() {
            return Err(GripError::FilterStageFailed {
                stage: self.name(),
                reason: "no samples within the rejection band".to_string(),
            });
        }

        let mut output = window.to_vec();
        // Index of the first anchor to the right of the current sample
        let mut next = 0;
        for i in 0..window.len() {
            while next < anchors.len() && anchors[next] <= i {
                next += 1;
            }
            if keep[i] {
                continue;
            }
            output[i] = match (next.checked_sub(1).map(|j| anchors[j]), anchors.get(next)) {
                (Some(left), Some(&right)) => {
                    let t = (i - left) as f64 / (right - left) as f64;
                    window[left] + (window[right] - window[left]) * t
                }
                (Some(left), None) => window[left],
                (None, Some(&right)) => window[right],
                (None, None) => window[i],
            };
        }
        Ok(output)
    }
}

/// Median filter with an odd kernel and zero-padded edges
#[derive(Debug, Clone, Copy)]
pub struct MedianFilter {
    kernel: usize,
}

impl MedianFilter {
    pub fn new(kernel: usize) -> GripResult<Self> {
        if kernel == 0 || kernel % 2 == 0 {
            return Err(GripError::config(format!("median kernel must be odd, got {}", kernel)));
        }
        Ok(Self { kernel })
    }
}

impl ConditioningStage for MedianFilter {
    fn name(&self) -> &'static str {
        "median"
    }

    fn apply(&self, window: &[f64]) -> GripResult<Vec<f64>> {
        let half = self.kernel / 2;
        let mut scratch = vec![0.0; self.kernel];
        let output = (0..window.len())
            .map(|i| {
                for (j, slot) in scratch.iter_mut().enumerate() {
                    *slot = (i + j)
                        .checked_sub(half)
                        .and_then(|idx| window.get(idx))
                        .copied()
                        .unwrap_or(0.0);
                }
                scratch.sort_by(|a, b| a.total_cmp(b));
                scratch[half]
            })
            .collect();
        Ok(output)
    }
}

/// Centred moving average with zero-padded edges
#[derive(Debug, Clone, Copy)]
pub struct MovingAverage {
    width: usize,
}

impl MovingAverage {
    pub fn new(width: usize) -> Self {
        Self { width: width.max(1) }
    }

    /// Smoother width for a noise reduction level
    pub fn for_level(level: u8) -> Self {
        Self::new(usize::from(level.saturating_sub(1)).min(3))
    }

    pub fn width(&self) -> usize {
        self.width
    }
}

impl ConditioningStage for MovingAverage {
    fn name(&self) -> &'static str {
        "moving_average"
    }

    fn apply(&self, window: &[f64]) -> GripResult<Vec<f64>> {
        if window.len() < self.width {
            return Ok(window.to_vec());
        }
        // Same alignment as a 'same'-mode convolution with a box kernel
        let offset = (self.width - 1) / 2;
        let scale = 1.0 / self.width as f64;
        let output = (0..window.len())
            .map(|i| {
                let start = (i + offset + 1).saturating_sub(self.width);
                let end = (i + offset + 1).min(window.len());
                window[start..end].iter().sum::<f64>() * scale
            })
            .collect();
        Ok(output)
    }
}

/// Savitzky-Golay smoother: local least-squares polynomial fit
#[derive(Debug, Clone)]
pub struct SavitzkyGolay {
    window: usize,
    /// Weights for each output position within a frame; the centre row is
    /// used for the interior, the others for the first and last `window/2`
    /// samples.
    weights: Vec<Vec<f64>>,
}

impl SavitzkyGolay {
    pub fn new(window: usize, order: usize) -> GripResult<Self> {
        if window % 2 == 0 || window <= order {
            return Err(GripError::config(format!(
                "Savitzky-Golay window {} must be odd and longer than order {}",
                window, order
            )));
        }
        let weights = (0..window)
            .map(|position| fit_weights(window, order, position))
            .collect::<GripResult<Vec<_>>>()?;
        Ok(Self { window, weights })
    }

    /// Weights producing the smoothed centre sample of a frame
    pub fn centre_weights(&self) -> &[f64] {
        &self.weights[self.window / 2]
    }
}

impl ConditioningStage for SavitzkyGolay {
    fn name(&self) -> &'static str {
        "savitzky_golay"
    }

    fn apply(&self, window: &[f64]) -> GripResult<Vec<f64>> {
        let n = window.len();
        if n < self.window {
            return Ok(window.to_vec());
        }
        let half = self.window / 2;
        let dot = |weights: &[f64], frame: &[f64]| -> f64 {
            weights.iter().zip(frame).map(|(w, x)| w * x).sum()
        };

        let mut output = vec![0.0; n];
        let head = &window[..self.window];
        let tail = &window[n - self.window..];
        for i in 0..half {
            output[i] = dot(&self.weights[i], head);
            output[n - half + i] = dot(&self.weights[half + 1 + i], tail);
        }
        let centre = self.centre_weights();
        for i in half..n - half {
            output[i] = dot(centre, &window[i - half..=i + half]);
        }
        Ok(output)
    }
}

/// Least-squares weights that evaluate the fitted polynomial of a frame at
/// `position` (0-based within the frame)
fn fit_weights(window: usize, order: usize, position: usize) -> GripResult<Vec<f64>> {
    let half = (window / 2) as f64;
    let terms = order + 1;
    let xs: Vec<f64> = (0..window).map(|j| j as f64 - half).collect();
    let powers = |x: f64| -> Vec<f64> { (0..terms).map(|k| x.powi(k as i32)).collect() };

    // Normal equations (JᵀJ) u = φ(t)
    let mut normal = vec![vec![0.0; terms]; terms];
    for &x in &xs {
        let row = powers(x);
        for r in 0..terms {
            for c in 0..terms {
                normal[r][c] += row[r] * row[c];
            }
        }
    }
    let target = powers(position as f64 - half);
    let u = solve_linear(normal, target)?;

    Ok(xs
        .iter()
        .map(|&x| powers(x).iter().zip(&u).map(|(p, c)| p * c).sum())
        .collect())
}

/// Gaussian elimination with partial pivoting
fn solve_linear(mut matrix: Vec<Vec<f64>>, mut rhs: Vec<f64>) -> GripResult<Vec<f64>> {
    let n = rhs.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&a, &b| matrix[a][col].abs().total_cmp(&matrix[b][col].abs()))
            .unwrap_or(col);
        if matrix[pivot][col].abs() < 1e-12 {
            return Err(GripError::FilterDesignError {
                message: "singular least-squares system".to_string(),
            });
        }
        matrix.swap(col, pivot);
        rhs.swap(col, pivot);
        for row in col + 1..n {
            let factor = matrix[row][col] / matrix[col][col];
            for k in col..n {
                matrix[row][k] -= factor * matrix[col][k];
            }
            rhs[row] -= factor * rhs[col];
        }
    }
    let mut solution = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| matrix[row][k] * solution[k]).sum();
        solution[row] = (rhs[row] - tail) / matrix[row][row];
    }
    Ok(solution)
}
