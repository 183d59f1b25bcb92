//! Muscle activation patterns driving the simulator

use grip_core::GripError;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::str::FromStr;

/// Activation level over time, in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalPattern {
    /// Constant activation level
    Constant { level: f64 },
    /// Linear change from `start_level` to `end_level` over `duration` seconds
    Ramp {
        start_level: f64,
        end_level: f64,
        duration: f64,
    },
    /// Fist close/open cycles: `on_duration` contracted, `off_duration` at rest
    Burst {
        on_duration: f64,
        off_duration: f64,
        amplitude: f64,
        rest_level: f64,
    },
    /// Exponentially decaying contraction
    Fatigue { initial_amplitude: f64, decay_rate: f64 },
    /// Steady activation with physiological tremor
    Realistic {
        base_activation: f64,
        tremor_frequency: f64,
        tremor_amplitude: f64,
    },
}

impl SignalPattern {
    /// Activation level at `time` seconds from the start of the simulation
    pub fn activation_at_time(&self, time: f64) -> f64 {
        let level = match *self {
            SignalPattern::Constant { level } => level,

            SignalPattern::Ramp { start_level, end_level, duration } => {
                if duration <= 0.0 || time >= duration {
                    end_level
                } else {
                    start_level + (end_level - start_level) * (time / duration)
                }
            }

            SignalPattern::Burst { on_duration, off_duration, amplitude, rest_level } => {
                let cycle = on_duration + off_duration;
                if cycle <= 0.0 {
                    rest_level
                } else if time.rem_euclid(cycle) < on_duration {
                    amplitude
                } else {
                    rest_level
                }
            }

            SignalPattern::Fatigue { initial_amplitude, decay_rate } => {
                initial_amplitude * (-decay_rate * time).exp()
            }

            SignalPattern::Realistic { base_activation, tremor_frequency, tremor_amplitude } => {
                base_activation + tremor_amplitude * (2.0 * PI * tremor_frequency * time).sin()
            }
        };
        level.clamp(0.0, 1.0)
    }

    pub fn description(&self) -> &'static str {
        match self {
            SignalPattern::Constant { .. } => "Constant activation",
            SignalPattern::Ramp { .. } => "Gradual ramp",
            SignalPattern::Burst { .. } => "Grip cycles",
            SignalPattern::Fatigue { .. } => "Muscle fatigue",
            SignalPattern::Realistic { .. } => "Realistic with tremor",
        }
    }

    /// Named presets, selectable by name on the command line
    pub fn presets() -> Vec<(&'static str, SignalPattern)> {
        vec![
            ("rest", SignalPattern::Constant { level: 0.05 }),
            ("hold", SignalPattern::Constant { level: 0.7 }),
            (
                "grip-cycles",
                SignalPattern::Burst {
                    on_duration: 0.4,
                    off_duration: 1.6,
                    amplitude: 0.8,
                    rest_level: 0.05,
                },
            ),
            (
                "quick-grips",
                SignalPattern::Burst {
                    on_duration: 0.15,
                    off_duration: 0.35,
                    amplitude: 0.8,
                    rest_level: 0.05,
                },
            ),
            (
                "warmup",
                SignalPattern::Ramp {
                    start_level: 0.05,
                    end_level: 0.7,
                    duration: 10.0,
                },
            ),
            (
                "fatigue",
                SignalPattern::Fatigue {
                    initial_amplitude: 0.9,
                    decay_rate: 0.1,
                },
            ),
            (
                "natural",
                SignalPattern::Realistic {
                    base_activation: 0.4,
                    tremor_frequency: 8.0,
                    tremor_amplitude: 0.05,
                },
            ),
        ]
    }
}

impl Default for SignalPattern {
    fn default() -> Self {
        SignalPattern::Burst {
            on_duration: 0.4,
            off_duration: 1.6,
            amplitude: 0.8,
            rest_level: 0.05,
        }
    }
}

impl FromStr for SignalPattern {
    type Err = GripError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let wanted = name.trim().to_ascii_lowercase();
        Self::presets()
            .into_iter()
            .find(|(preset, _)| *preset == wanted)
            .map(|(_, pattern)| pattern)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::presets().iter().map(|(preset, _)| *preset).collect();
                GripError::SimulationError {
                    message: format!("unknown pattern '{}', expected one of: {}", name, known.join(", ")),
                }
            })
    }
}
