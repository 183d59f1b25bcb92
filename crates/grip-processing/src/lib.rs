//! Grip-Processing: EMG conditioning and gesture detection
//!
//! Window-based pipeline turning raw single-channel EMG samples into accepted
//! close/open gestures: zero-phase filtering, smoothing, RMS features, an
//! adaptive baseline threshold and a timed gesture state machine.

pub mod baseline;
pub mod conditioner;
pub mod detector;
pub mod features;
pub mod filters;
pub mod gesture;
pub mod isolation;
pub mod smoothing;
pub mod timing;

pub use baseline::{BaselineTracker, BASELINE_LEARNING_RATE};
pub use conditioner::{ConditionedWindow, ConditioningStage, SignalConditioner};
pub use detector::{DetectorStats, EmgGestureDetector, GestureSink};
pub use features::{FeatureExtractor, WindowFeatures};
pub use filters::{BiquadSection, FilterKind, IirFilter};
pub use gesture::{GestureEvent, GesturePhase, GestureStateMachine, GestureTiming, GestureTransition};
pub use isolation::call_isolated;
pub use timing::ProcessingMetrics;
