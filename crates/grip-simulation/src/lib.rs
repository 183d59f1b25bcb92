//! Grip-Simulation: synthetic EMG for hardware-free runs
//!
//! Generates single-channel EMG-like signals following muscle activation
//! patterns, either in blocks or as a paced real-time stream.

pub mod emg_simulator;
pub mod real_time_stream;
pub mod signal_patterns;

pub use emg_simulator::{EmgSimulator, NoiseConfig, SampleChunk, SimulatorConfig};
pub use real_time_stream::{start_emg_stream, RealTimeEmgStream, StreamCommand, StreamConfig, StreamStats};
pub use signal_patterns::SignalPattern;
