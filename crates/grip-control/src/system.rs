//! Complete EMG to arm pipeline
//!
//! [`GripSystem`] wires the gesture detector to the grab/release alternator and
//! the command dispatcher. Samples are pushed from any thread; detection runs
//! on that thread and commands execute on the dispatcher thread.

use crate::alternator::{ControllerStatus, GrabReleaseAlternator};
use crate::dispatcher::{CommandDispatcher, DispatcherStatus, EmergencyStopReport};
use crate::transport::{transport_from_settings, ActuatorTransport};
use anyhow::{bail, Context};
use grip_core::{Clock, Command, GripConfig, GripResult, MonotonicClock};
use grip_processing::{DetectorStats, EmgGestureDetector, GestureEvent, GestureSink, GestureTransition};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Gesture sink that turns accepted gestures into queued arm commands
pub struct CommandRouter {
    alternator: Arc<Mutex<GrabReleaseAlternator>>,
    dispatcher: Arc<CommandDispatcher>,
}

impl CommandRouter {
    pub fn new(alternator: Arc<Mutex<GrabReleaseAlternator>>, dispatcher: Arc<CommandDispatcher>) -> Self {
        Self { alternator, dispatcher }
    }
}

impl GestureSink for CommandRouter {
    fn on_gesture(&mut self, event: &GestureEvent) -> anyhow::Result<()> {
        let Some(kind) = self.alternator.lock().on_gesture_completed() else {
            return Ok(());
        };
        if !self.dispatcher.is_connected() {
            bail!("arm not connected, dropping {} for gesture #{}", kind, event.sequence);
        }
        self.dispatcher
            .enqueue(Command::new(kind))
            .with_context(|| format!("queueing {} for gesture #{}", kind, event.sequence))
    }
}

/// Aggregated status of the whole pipeline
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub detecting: bool,
    /// Samples pushed while detection was stopped
    pub ignored_samples: u64,
    pub detector: DetectorStats,
    pub controller: ControllerStatus,
    pub dispatcher: DispatcherStatus,
}

pub struct GripSystem {
    config: GripConfig,
    detector: Mutex<EmgGestureDetector>,
    alternator: Arc<Mutex<GrabReleaseAlternator>>,
    dispatcher: Arc<CommandDispatcher>,
    detecting: AtomicBool,
    ignored_samples: AtomicU64,
}

impl GripSystem {
    pub fn new(config: GripConfig, transport: Box<dyn ActuatorTransport>, clock: Arc<dyn Clock>) -> GripResult<Self> {
        config.validate()?;
        let dispatcher = Arc::new(CommandDispatcher::new(transport, &config.dispatcher)?);
        let alternator = Arc::new(Mutex::new(GrabReleaseAlternator::new(
            config.command_cooldown(),
            clock.clone(),
        )));
        let detector = EmgGestureDetector::new(&config, clock)?
            .with_sink(CommandRouter::new(alternator.clone(), dispatcher.clone()));

        info!(
            name = %config.name,
            profile = ?config.profile,
            window = config.window_size,
            hop = config.hop_size(),
            noise_level = config.noise_reduction_level,
            "grip system created"
        );

        Ok(Self {
            config,
            detector: Mutex::new(detector),
            alternator,
            dispatcher,
            detecting: AtomicBool::new(false),
            ignored_samples: AtomicU64::new(0),
        })
    }

    /// System on the wall clock with the transport selected by the configuration
    pub fn from_config(config: GripConfig) -> GripResult<Self> {
        let transport = transport_from_settings(&config.dispatcher)?;
        Self::new(config, transport, Arc::new(MonotonicClock::new()))
    }

    pub fn config(&self) -> &GripConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<CommandDispatcher> {
        &self.dispatcher
    }

    pub fn connect(&self) -> GripResult<()> {
        self.dispatcher.connect()
    }

    /// Start accepting samples; the window buffer starts empty
    pub fn start_detection(&self) {
        self.detector.lock().clear_buffer();
        if !self.detecting.swap(true, Ordering::SeqCst) {
            info!("gesture detection started");
        }
    }

    pub fn stop_detection(&self) {
        if self.detecting.swap(false, Ordering::SeqCst) {
            info!("gesture detection stopped");
        }
    }

    pub fn is_detecting(&self) -> bool {
        self.detecting.load(Ordering::SeqCst)
    }

    /// Push one raw sample; ignored while detection is stopped
    pub fn add_sample(&self, value: f64) -> Option<GestureTransition> {
        if !self.is_detecting() {
            self.ignored_samples.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        self.detector.lock().add_sample(value)
    }

    /// Stop detection, then clear the command queue and stop the arm
    pub fn emergency_stop(&self) -> EmergencyStopReport {
        self.stop_detection();
        let report = self.dispatcher.emergency_stop();
        if let Err(e) = &report.delivery {
            warn!(error = %e, "arm may not have received the emergency stop");
        }
        report
    }

    /// Stop detection and disconnect from the arm
    pub fn shutdown(&self) {
        self.stop_detection();
        self.dispatcher.disconnect();
        info!("grip system shut down");
    }

    pub fn set_threshold_multiplier(&self, multiplier: f64) -> GripResult<()> {
        self.detector.lock().set_threshold_multiplier(multiplier)
    }

    pub fn reset_statistics(&self) {
        self.detector.lock().reset_statistics();
        self.ignored_samples.store(0, Ordering::Relaxed);
    }

    pub fn reset_controller(&self) {
        self.alternator.lock().reset();
    }

    pub fn status(&self) -> SystemStatus {
        SystemStatus {
            detecting: self.is_detecting(),
            ignored_samples: self.ignored_samples.load(Ordering::Relaxed),
            detector: self.detector.lock().stats(),
            controller: self.alternator.lock().status(),
            dispatcher: self.dispatcher.status(),
        }
    }
}

impl std::fmt::Debug for GripSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GripSystem")
            .field("name", &self.config.name)
            .field("detecting", &self.is_detecting())
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use grip_core::{CommandKind, ManualClock};
    use std::time::Duration;

    fn system() -> (GripSystem, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let system = GripSystem::new(GripConfig::standard(), Box::new(MockTransport::new()), clock.clone()).unwrap();
        (system, clock)
    }

    fn event(sequence: u64) -> GestureEvent {
        GestureEvent {
            sequence,
            started_at: Duration::ZERO,
            ended_at: Duration::from_millis(300),
            duration: Duration::from_millis(300),
            peak_rms: 500.0,
        }
    }

    #[test]
    fn test_samples_ignored_until_started() {
        let (system, _clock) = system();
        for _ in 0..10 {
            assert!(system.add_sample(1.0).is_none());
        }
        assert_eq!(system.status().ignored_samples, 10);

        system.start_detection();
        system.add_sample(1.0);
        let status = system.status();
        assert!(status.detecting);
        assert_eq!(status.ignored_samples, 10);

        system.stop_detection();
        system.add_sample(1.0);
        assert_eq!(system.status().ignored_samples, 11);
    }

    #[test]
    fn test_router_requires_connection() {
        let (system, clock) = system();
        let mut router = CommandRouter::new(system.alternator.clone(), system.dispatcher.clone());

        let err = router.on_gesture(&event(1)).unwrap_err();
        assert!(err.to_string().contains("not connected"));
        assert_eq!(system.dispatcher.queue_len(), 0);

        system.connect().unwrap();
        clock.advance(Duration::from_secs(2));
        router.on_gesture(&event(2)).unwrap();
        assert_eq!(system.status().controller.cycle_count, 2);
        assert_eq!(system.status().controller.next_action, CommandKind::Grab);
    }

    #[test]
    fn test_emergency_stop_halts_detection() {
        let (system, _clock) = system();
        system.connect().unwrap();
        system.start_detection();

        let report = system.emergency_stop();
        assert!(report.delivery.is_ok());
        assert!(!system.is_detecting());
        assert_eq!(system.status().dispatcher.emergency_stops, 1);

        system.shutdown();
        assert!(!system.status().dispatcher.connected);
    }

    #[test]
    fn test_runtime_tuning() {
        let (system, _clock) = system();
        system.set_threshold_multiplier(4.0).unwrap();
        assert!(system.set_threshold_multiplier(12.0).is_err());

        system.reset_controller();
        assert_eq!(system.status().controller.cycle_count, 0);

        let json = serde_json::to_string(&system.status()).unwrap();
        assert!(json.contains("\"detecting\":false"));
    }
}
