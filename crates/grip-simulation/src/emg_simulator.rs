//! Single-channel surface EMG simulator
//!
//! Produces an EMG-like signal whose amplitude follows a [`SignalPattern`]:
//! an 80 Hz firing carrier with two harmonics, random fibre recruitment,
//! Gaussian noise, slow baseline wander, occasional motion artifacts and
//! optional mains interference.

use crate::signal_patterns::SignalPattern;
use grip_core::{GripError, GripResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Carrier frequency of the simulated motor-unit firing
const FIRING_FREQUENCY: f64 = 80.0;
/// Peak signal at full activation, in mV
const FULL_SCALE_MV: f64 = 2.0;
/// Amplifier rails
const CLAMP_MV: f64 = 5.0;
const POWERLINE_AMPLITUDE: f64 = 0.05;

/// Noise configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    /// Gaussian noise standard deviation (0.0 = no noise)
    pub gaussian_std: f64,
    pub baseline_wander: f64,
    /// Per-sample probability of a motion artifact
    pub motion_artifact_prob: f64,
    pub motion_artifact_amp: f64,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            gaussian_std: 0.05,
            baseline_wander: 0.02,
            motion_artifact_prob: 0.01,
            motion_artifact_amp: 0.3,
        }
    }
}

impl NoiseConfig {
    /// No noise at all; the output is the pure carrier
    pub fn silent() -> Self {
        Self {
            gaussian_std: 0.0,
            baseline_wander: 0.0,
            motion_artifact_prob: 0.0,
            motion_artifact_amp: 0.0,
        }
    }
}

/// Simulator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub sampling_rate: f64,
    pub pattern: SignalPattern,
    pub noise: NoiseConfig,
    /// Mains interference (50 or 60 Hz)
    pub powerline_freq: Option<f64>,
    /// Random seed for reproducibility; entropy-seeded when absent
    pub seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            sampling_rate: 1000.0,
            pattern: SignalPattern::default(),
            noise: NoiseConfig::default(),
            powerline_freq: Some(50.0),
            seed: None,
        }
    }
}

impl SimulatorConfig {
    pub fn validate(&self) -> GripResult<()> {
        if !(self.sampling_rate.is_finite() && self.sampling_rate > 0.0) {
            return Err(simulation_error(format!("invalid sampling rate {}", self.sampling_rate)));
        }
        if !(0.0..=1.0).contains(&self.noise.motion_artifact_prob) {
            return Err(simulation_error(format!(
                "motion artifact probability {} outside [0, 1]",
                self.noise.motion_artifact_prob
            )));
        }
        if let Some(freq) = self.powerline_freq {
            if !(freq > 0.0 && freq < self.sampling_rate / 2.0) {
                return Err(simulation_error(format!("powerline frequency {} not below Nyquist", freq)));
            }
        }
        Ok(())
    }
}

/// A block of consecutive samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleChunk {
    /// Chunk number since the simulator started or was reset
    pub sequence: u64,
    /// Simulation time of the first sample, in seconds
    pub start_time: f64,
    pub sampling_rate: f64,
    pub samples: Vec<f64>,
    /// Mean activation over the chunk
    pub activation: f64,
}

impl SampleChunk {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sampling_rate
    }
}

/// EMG signal simulator
#[derive(Debug)]
pub struct EmgSimulator {
    config: SimulatorConfig,
    rng: StdRng,
    normal_dist: Normal<f64>,
    /// Index of the next sample; time is derived from it so chunks join seamlessly
    next_index: u64,
    chunks_generated: u64,
}

impl EmgSimulator {
    pub fn new(config: SimulatorConfig) -> GripResult<Self> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let normal_dist = gaussian(&config.noise)?;

        Ok(Self {
            config,
            rng,
            normal_dist,
            next_index: 0,
            chunks_generated: 0,
        })
    }

    /// Generate `duration` seconds of samples, continuing from the previous call
    pub fn generate(&mut self, duration: f64) -> GripResult<Vec<f64>> {
        if !(duration.is_finite() && duration >= 0.0) {
            return Err(simulation_error(format!("invalid duration {}", duration)));
        }
        let count = (duration * self.config.sampling_rate).round() as u64;
        let samples = (0..count)
            .map(|offset| {
                let time = (self.next_index + offset) as f64 / self.config.sampling_rate;
                self.sample_at(time)
            })
            .collect();
        self.next_index += count;
        Ok(samples)
    }

    /// Generate the next chunk for streaming
    pub fn generate_chunk(&mut self, duration: f64) -> GripResult<SampleChunk> {
        let start_time = self.current_time();
        let samples = self.generate(duration)?;
        let activation = self.average_activation(start_time, samples.len());
        let chunk = SampleChunk {
            sequence: self.chunks_generated,
            start_time,
            sampling_rate: self.config.sampling_rate,
            samples,
            activation,
        };
        self.chunks_generated += 1;
        Ok(chunk)
    }

    fn sample_at(&mut self, time: f64) -> f64 {
        let mut value = self.emg_component(time) + self.noise(time);
        if let Some(freq) = self.config.powerline_freq {
            value += POWERLINE_AMPLITUDE * (2.0 * PI * freq * time).sin();
        }
        value.clamp(-CLAMP_MV, CLAMP_MV)
    }

    fn emg_component(&mut self, time: f64) -> f64 {
        let activation = self.config.pattern.activation_at_time(time);
        let amplitude = activation * FULL_SCALE_MV;
        let phase = 2.0 * PI * FIRING_FREQUENCY * time;

        let mut signal = amplitude * phase.sin();
        signal += amplitude * 0.3 * (2.0 * phase).sin();
        signal += amplitude * 0.1 * (3.0 * phase).sin();

        // Random fibre recruitment
        signal + activation * self.rng.gen_range(-0.2..0.2)
    }

    fn noise(&mut self, time: f64) -> f64 {
        let noise = &self.config.noise;
        let mut value = self.normal_dist.sample(&mut self.rng);
        value += noise.baseline_wander * (2.0 * PI * 0.1 * time).sin();

        if noise.motion_artifact_prob > 0.0 && self.rng.gen::<f64>() < noise.motion_artifact_prob {
            value += noise.motion_artifact_amp * self.rng.gen_range(-1.0..1.0);
        }
        value
    }

    fn average_activation(&self, start_time: f64, count: usize) -> f64 {
        if count == 0 {
            return self.config.pattern.activation_at_time(start_time);
        }
        let sum: f64 = (0..count)
            .map(|i| {
                self.config
                    .pattern
                    .activation_at_time(start_time + i as f64 / self.config.sampling_rate)
            })
            .sum();
        sum / count as f64
    }

    /// Simulation time of the next sample, in seconds
    pub fn current_time(&self) -> f64 {
        self.next_index as f64 / self.config.sampling_rate
    }

    /// Restart simulation time and chunk numbering
    pub fn reset_time(&mut self) {
        self.next_index = 0;
        self.chunks_generated = 0;
    }

    pub fn set_pattern(&mut self, pattern: SignalPattern) {
        self.config.pattern = pattern;
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Replace the configuration; simulation time carries on
    pub fn update_config(&mut self, config: SimulatorConfig) -> GripResult<()> {
        config.validate()?;
        self.normal_dist = gaussian(&config.noise)?;
        self.config = config;
        Ok(())
    }
}

fn gaussian(noise: &NoiseConfig) -> GripResult<Normal<f64>> {
    Normal::new(0.0, noise.gaussian_std)
        .map_err(|e| simulation_error(format!("invalid gaussian noise std {}: {}", noise.gaussian_std, e)))
}

fn simulation_error(message: String) -> GripError {
    GripError::SimulationError { message }
}
