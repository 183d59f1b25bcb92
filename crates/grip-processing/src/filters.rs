//! Butterworth IIR filters applied forward and backward for zero phase
//!
//! Filters are designed once from the analog Butterworth prototype with a
//! pre-warped bilinear transform and stored as cascaded second-order sections.
//! Each window is filtered twice (forward, then time-reversed) with odd-reflection
//! padding at both ends and steady-state initial conditions, so the output has no
//! group delay and no start-up transient.

use grip_core::{GripError, GripResult};
use num_complex::Complex64;
use std::f64::consts::PI;

/// Imaginary parts below this are treated as real poles
const REAL_POLE_TOLERANCE: f64 = 1e-12;

/// Response shape of a Butterworth design
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterKind {
    /// Pass below `cutoff` (Hz)
    Lowpass { cutoff: f64 },
    /// Pass above `cutoff` (Hz)
    Highpass { cutoff: f64 },
    /// Reject between `low` and `high` (Hz)
    Bandstop { low: f64, high: f64 },
}

/// One second-order section in transposed direct form II
///
/// `y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2] - a1*y[n-1] - a2*y[n-2]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadSection {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl BiquadSection {
    fn new(b: [f64; 3], a: [f64; 3]) -> Self {
        Self {
            b0: b[0],
            b1: b[1],
            b2: b[2],
            a1: a[1],
            a2: a[2],
        }
    }

    /// Gain for a constant input
    fn dc_gain(&self) -> f64 {
        (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2)
    }

    /// Delay-line state reached after an infinitely long unit step
    fn step_state(&self) -> (f64, f64) {
        let gain = self.dc_gain();
        let s2 = self.b2 - self.a2 * gain;
        let s1 = self.b1 + self.b2 - (self.a1 + self.a2) * gain;
        (s1, s2)
    }

    /// Complex response at `z`
    fn response(&self, z: Complex64) -> Complex64 {
        let z1 = z.inv();
        let z2 = z1 * z1;
        (self.b0 + z1 * self.b1 + z2 * self.b2) / (1.0 + z1 * self.a1 + z2 * self.a2)
    }

    /// Filter `data` in place starting from the given delay-line state
    fn run(&self, data: &mut [f64], (mut s1, mut s2): (f64, f64)) {
        for sample in data.iter_mut() {
            let input = *sample;
            let output = self.b0 * input + s1;
            s1 = self.b1 * input - self.a1 * output + s2;
            s2 = self.b2 * input - self.a2 * output;
            *sample = output;
        }
    }
}

/// Designed Butterworth filter as a cascade of biquads
#[derive(Debug, Clone)]
pub struct IirFilter {
    name: &'static str,
    kind: FilterKind,
    sections: Vec<BiquadSection>,
    /// Steady-state initial conditions per section, for a unit input level
    initial_state: Vec<(f64, f64)>,
}

impl IirFilter {
    /// Design a Butterworth filter of the given prototype order
    ///
    /// Band-stop designs double the order, as usual for band transforms.
    pub fn design(
        name: &'static str,
        kind: FilterKind,
        order: usize,
        sampling_rate: f64,
    ) -> GripResult<Self> {
        if order == 0 {
            return Err(GripError::FilterDesignError {
                message: format!("{}: filter order must be at least 1", name),
            });
        }
        if !sampling_rate.is_finite() || sampling_rate <= 0.0 {
            return Err(GripError::FilterDesignError {
                message: format!("{}: invalid sampling rate {}", name, sampling_rate),
            });
        }

        let nyquist = sampling_rate / 2.0;
        let check_band = |freq: f64| -> GripResult<f64> {
            if freq > 0.0 && freq < nyquist {
                Ok(2.0 * sampling_rate * (PI * freq / sampling_rate).tan())
            } else {
                Err(GripError::FilterDesignError {
                    message: format!(
                        "{}: corner frequency {} Hz must lie strictly between 0 and {} Hz",
                        name, freq, nyquist
                    ),
                })
            }
        };

        let prototype = butterworth_prototype(order);
        let (analog_poles, numerator_zero) = match kind {
            FilterKind::Lowpass { cutoff } => {
                let wc = check_band(cutoff)?;
                let poles: Vec<Complex64> = prototype.iter().map(|&p| p * wc).collect();
                (poles, Complex64::new(-1.0, 0.0))
            }
            FilterKind::Highpass { cutoff } => {
                let wc = check_band(cutoff)?;
                let poles: Vec<Complex64> = prototype.iter().map(|&p| wc / p).collect();
                (poles, Complex64::new(1.0, 0.0))
            }
            FilterKind::Bandstop { low, high } => {
                if low >= high {
                    return Err(GripError::FilterDesignError {
                        message: format!("{}: band edges {} >= {} Hz", name, low, high),
                    });
                }
                let w1 = check_band(low)?;
                let w2 = check_band(high)?;
                let w0 = (w1 * w2).sqrt();
                let bandwidth = w2 - w1;
                let mut poles = Vec::with_capacity(order * 2);
                for &p in &prototype {
                    let a = (bandwidth / 2.0) / p;
                    let r = (a * a - w0 * w0).sqrt();
                    poles.push(a + r);
                    poles.push(a - r);
                }
                // Notch zeros sit on the unit circle at the centre frequency
                let theta = 2.0 * (w0 / (2.0 * sampling_rate)).atan();
                (poles, Complex64::from_polar(1.0, theta))
            }
        };

        let fs2 = 2.0 * sampling_rate;
        let digital: Vec<Complex64> = analog_poles
            .iter()
            .map(|&s| (fs2 + s) / (fs2 - s))
            .collect();

        let mut denominators: Vec<[f64; 3]> = digital
            .iter()
            .filter(|p| p.im > REAL_POLE_TOLERANCE)
            .map(|p| [1.0, -2.0 * p.re, p.norm_sqr()])
            .collect();
        let real_poles: Vec<f64> = digital
            .iter()
            .filter(|p| p.im.abs() <= REAL_POLE_TOLERANCE)
            .map(|p| p.re)
            .collect();
        for pair in real_poles.chunks(2) {
            match pair {
                [p, q] => denominators.push([1.0, -(p + q), p * q]),
                [p] => denominators.push([1.0, -p, 0.0]),
                _ => {}
            }
        }

        // Unit gain is enforced in the passband: DC for low-pass and band-stop,
        // Nyquist for high-pass.
        let reference = match kind {
            FilterKind::Highpass { .. } => Complex64::new(-1.0, 0.0),
            _ => Complex64::new(1.0, 0.0),
        };

        let mut sections = Vec::with_capacity(denominators.len());
        for den in denominators {
            let first_order = den[2] == 0.0;
            let num = if first_order {
                [1.0, -numerator_zero.re, 0.0]
            } else {
                [1.0, -2.0 * numerator_zero.re, numerator_zero.norm_sqr()]
            };
            let raw = BiquadSection::new(num, den);
            let gain = raw.response(reference).norm();
            if !gain.is_finite() || gain == 0.0 {
                return Err(GripError::FilterDesignError {
                    message: format!("{}: degenerate section gain {}", name, gain),
                });
            }
            sections.push(BiquadSection::new(
                [num[0] / gain, num[1] / gain, num[2] / gain],
                den,
            ));
        }

        let mut initial_state = Vec::with_capacity(sections.len());
        let mut scale = 1.0;
        for section in &sections {
            let (s1, s2) = section.step_state();
            initial_state.push((s1 * scale, s2 * scale));
            scale *= section.dc_gain();
        }

        Ok(Self {
            name,
            kind,
            sections,
            initial_state,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> FilterKind {
        self.kind
    }

    pub fn sections(&self) -> &[BiquadSection] {
        &self.sections
    }

    /// Samples of odd-reflection padding added at each end
    pub fn pad_len(&self) -> usize {
        3 * (2 * self.sections.len() + 1)
    }

    /// Magnitude response at `freq` Hz
    pub fn magnitude_at(&self, freq: f64, sampling_rate: f64) -> f64 {
        let z = Complex64::from_polar(1.0, 2.0 * PI * freq / sampling_rate);
        self.sections
            .iter()
            .fold(Complex64::new(1.0, 0.0), |acc, s| acc * s.response(z))
            .norm()
    }

    /// Forward-backward filter a window; output has the input's length
    pub fn filtfilt(&self, input: &[f64]) -> GripResult<Vec<f64>> {
        let pad = self.pad_len();
        let n = input.len();
        if n <= pad {
            return Err(GripError::FilterStageFailed {
                stage: self.name,
                reason: format!("window of {} samples needs more than {} for edge padding", n, pad),
            });
        }

        let first = input[0];
        let last = input[n - 1];
        let mut extended = Vec::with_capacity(n + 2 * pad);
        extended.extend((1..=pad).rev().map(|i| 2.0 * first - input[i]));
        extended.extend_from_slice(input);
        extended.extend((0..pad).map(|i| 2.0 * last - input[n - 2 - i]));

        self.run_cascade(&mut extended);
        extended.reverse();
        self.run_cascade(&mut extended);
        extended.reverse();

        Ok(extended[pad..pad + n].to_vec())
    }

    fn run_cascade(&self, data: &mut [f64]) {
        let level = data.first().copied().unwrap_or(0.0);
        for (section, &(s1, s2)) in self.sections.iter().zip(&self.initial_state) {
            section.run(data, (s1 * level, s2 * level));
        }
    }
}

/// Poles of the normalized analog Butterworth low-pass prototype
fn butterworth_prototype(order: usize) -> Vec<Complex64> {
    let n = order as i64;
    (0..n)
        .map(|k| {
            let m = (2 * k - n + 1) as f64;
            -Complex64::from_polar(1.0, PI * m / (2.0 * n as f64))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FS: f64 = 1000.0;

    fn sine(freq: f64, amplitude: f64, len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| amplitude * (2.0 * PI * freq * i as f64 / FS).sin())
            .collect()
    }

    fn rms(x: &[f64]) -> f64 {
        (x.iter().map(|v| v * v).sum::<f64>() / x.len() as f64).sqrt()
    }

    #[test]
    fn test_butterworth_corner_responses() {
        let hp = IirFilter::design("hp", FilterKind::Highpass { cutoff: 20.0 }, 4, FS).unwrap();
        let lp = IirFilter::design("lp", FilterKind::Lowpass { cutoff: 250.0 }, 4, FS).unwrap();
        assert_eq!(hp.sections().len(), 2);
        assert_eq!(lp.sections().len(), 2);

        let half_power = std::f64::consts::FRAC_1_SQRT_2;
        assert!((hp.magnitude_at(20.0, FS) - half_power).abs() < 1e-6);
        assert!((lp.magnitude_at(250.0, FS) - half_power).abs() < 1e-6);
        assert!(hp.magnitude_at(5.0, FS) < 0.01);
        assert!(lp.magnitude_at(400.0, FS) < 0.02);
        assert!((hp.magnitude_at(100.0, FS) - 1.0).abs() < 1e-3);
        assert!((lp.magnitude_at(100.0, FS) - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_bandstop_nulls_mains() {
        let bs50 = IirFilter::design("bs50", FilterKind::Bandstop { low: 49.0, high: 51.0 }, 4, FS)
            .unwrap();
        assert_eq!(bs50.sections().len(), 4);
        assert_eq!(bs50.pad_len(), 27);
        assert!(bs50.magnitude_at(50.0, FS) < 1e-6);
        assert!((bs50.magnitude_at(100.0, FS) - 1.0).abs() < 1e-3);
        assert!((bs50.magnitude_at(0.0, FS) - 1.0).abs() < 1e-9);

        let bs60 = IirFilter::design("bs60", FilterKind::Bandstop { low: 59.0, high: 61.0 }, 4, FS)
            .unwrap();
        assert!(bs60.magnitude_at(60.0, FS) < 1e-6);
    }

    #[test]
    fn test_odd_order_design() {
        let lp = IirFilter::design("lp3", FilterKind::Lowpass { cutoff: 100.0 }, 3, FS).unwrap();
        assert_eq!(lp.sections().len(), 2);
        assert!((lp.magnitude_at(0.0, FS) - 1.0).abs() < 1e-9);
        assert!((lp.magnitude_at(100.0, FS) - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-6);
    }

    #[test]
    fn test_design_rejects_corner_above_nyquist() {
        let result = IirFilter::design("lp", FilterKind::Lowpass { cutoff: 250.0 }, 4, 400.0);
        assert!(matches!(result, Err(GripError::FilterDesignError { .. })));

        let result = IirFilter::design("bs", FilterKind::Bandstop { low: 51.0, high: 49.0 }, 4, FS);
        assert!(result.is_err());
    }

    #[test]
    fn test_filtfilt_keeps_length_and_passband() {
        let hp = IirFilter::design("hp", FilterKind::Highpass { cutoff: 20.0 }, 4, FS).unwrap();
        let input = sine(100.0, 10.0, 200);
        let output = hp.filtfilt(&input).unwrap();
        assert_eq!(output.len(), input.len());

        // Zero phase: the passband tone is reproduced sample for sample in the middle
        for i in 50..150 {
            assert!((output[i] - input[i]).abs() < 0.5, "sample {} drifted", i);
        }
    }

    #[test]
    fn test_filtfilt_removes_mains_hum() {
        let bs = IirFilter::design("bs50", FilterKind::Bandstop { low: 49.0, high: 51.0 }, 4, FS)
            .unwrap();
        let hum = sine(50.0, 100.0, 2000);
        let output = bs.filtfilt(&hum).unwrap();
        assert!(rms(&output[500..1500]) < 5.0);
    }

    #[test]
    fn test_highpass_settles_constant_offset() {
        let hp = IirFilter::design("hp", FilterKind::Highpass { cutoff: 20.0 }, 4, FS).unwrap();
        let output = hp.filtfilt(&vec![3.0; 200]).unwrap();
        assert!(output.iter().all(|v| v.abs() < 1e-9));
    }

    #[test]
    fn test_filtfilt_short_window_fails() {
        let lp = IirFilter::design("lp", FilterKind::Lowpass { cutoff: 250.0 }, 4, FS).unwrap();
        assert_eq!(lp.pad_len(), 15);
        let result = lp.filtfilt(&[1.0; 15]);
        assert!(matches!(result, Err(GripError::FilterStageFailed { stage: "lp", .. })));
        assert!(lp.filtfilt(&[1.0; 16]).is_ok());
    }
}
