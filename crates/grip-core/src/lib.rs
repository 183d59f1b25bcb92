//! Grip-Core: shared types for the EMG grab/release pipeline
//!
//! Configuration, errors, time sources and the actuator command vocabulary used
//! by the processing and control crates.

pub mod arm_types;
pub mod clock;
pub mod config;
pub mod error;

pub use arm_types::*;
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{ConfigProfile, DispatcherSettings, GripConfig};
pub use error::{GripError, GripResult};
