//! Pipeline configuration and named presets
//!
//! A [`GripConfig`] is built once, validated once, and handed to every stage at
//! construction. The two parameter sets historically used by the grab/release
//! controller live on as [`ConfigProfile`] presets rather than separate code paths.

use crate::error::{GripError, GripResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Smallest accepted threshold multiplier
pub const MIN_THRESHOLD_MULTIPLIER: f64 = 1.0;
/// Largest accepted threshold multiplier
pub const MAX_THRESHOLD_MULTIPLIER: f64 = 10.0;
/// Lowest noise reduction level (mandatory filters only)
pub const MIN_NOISE_LEVEL: u8 = 1;
/// Highest noise reduction level (all smoothing stages)
pub const MAX_NOISE_LEVEL: u8 = 5;

/// Named parameter presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigProfile {
    /// Detector defaults: stricter threshold, moderate smoothing
    Standard,
    /// Application defaults: low threshold, short minimum gesture
    Sensitive,
    /// Anything loaded or edited by hand
    Custom,
}

/// Settings for the command dispatcher and its actuator link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherSettings {
    /// Route every transport send to a logging no-op
    pub mock_mode: bool,
    /// `host:port` of the serial bridge when not in mock mode
    pub endpoint: Option<String>,
    /// How long to wait for a STATUS response line (seconds)
    pub status_timeout: f64,
    /// Settle time after opening the link before the handshake (seconds)
    pub handshake_delay: f64,
    /// Bound on waiting for the consumer thread to exit (seconds)
    pub join_timeout: f64,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            mock_mode: true,
            endpoint: None,
            status_timeout: 0.5,
            handshake_delay: 2.0,
            join_timeout: 1.0,
        }
    }
}

impl DispatcherSettings {
    pub fn status_timeout(&self) -> Duration {
        seconds(self.status_timeout)
    }

    pub fn handshake_delay(&self) -> Duration {
        seconds(self.handshake_delay)
    }

    pub fn join_timeout(&self) -> Duration {
        seconds(self.join_timeout)
    }

    /// Validate dispatcher settings
    pub fn validate(&self) -> GripResult<()> {
        if !self.mock_mode && self.endpoint.as_deref().map_or(true, |e| e.trim().is_empty()) {
            return Err(GripError::config("an endpoint is required when mock mode is off"));
        }
        check_duration("status_timeout", self.status_timeout)?;
        check_duration("handshake_delay", self.handshake_delay)?;
        check_duration("join_timeout", self.join_timeout)?;
        if self.join_timeout == 0.0 {
            return Err(GripError::config("join_timeout must be greater than 0"));
        }
        Ok(())
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GripConfig {
    /// Configuration name
    pub name: String,
    /// Preset this configuration was derived from
    pub profile: ConfigProfile,
    /// Sample rate of the incoming EMG stream (Hz)
    pub sampling_rate: f64,
    /// Samples per analysis window
    pub window_size: usize,
    /// Fraction of a window shared with the previous processed window
    pub window_overlap: f64,
    /// Threshold = baseline × multiplier
    pub threshold_multiplier: f64,
    /// Shortest accepted gesture (seconds)
    pub min_gesture_duration: f64,
    /// Longest accepted gesture (seconds)
    pub max_gesture_duration: f64,
    /// Minimum time after a completed gesture before a new one may start (seconds)
    pub gesture_cooldown: f64,
    /// Minimum time between two emitted grab/release commands (seconds)
    pub command_cooldown: f64,
    /// 1 = mandatory filters only, 5 = every smoothing stage
    pub noise_reduction_level: u8,
    /// Hold the baseline while a gesture is active
    pub freeze_baseline_during_gesture: bool,
    /// Dispatcher and link settings
    pub dispatcher: DispatcherSettings,
}

impl Default for GripConfig {
    fn default() -> Self {
        Self::standard()
    }
}

impl GripConfig {
    /// Detector defaults
    pub fn standard() -> Self {
        Self {
            name: "Standard grip".to_string(),
            profile: ConfigProfile::Standard,
            sampling_rate: 1000.0,
            window_size: 200,
            window_overlap: 0.5,
            threshold_multiplier: 1.5,
            min_gesture_duration: 0.1,
            max_gesture_duration: 2.0,
            gesture_cooldown: 0.5,
            command_cooldown: 1.0,
            noise_reduction_level: 3,
            freeze_baseline_during_gesture: false,
            dispatcher: DispatcherSettings::default(),
        }
    }

    /// Application defaults, tuned for weak or fatigued users
    pub fn sensitive() -> Self {
        Self {
            name: "Sensitive grip".to_string(),
            profile: ConfigProfile::Sensitive,
            threshold_multiplier: 1.0,
            min_gesture_duration: 0.05,
            noise_reduction_level: 2,
            ..Self::standard()
        }
    }

    /// Preset for a profile; `Custom` starts from the standard values
    pub fn for_profile(profile: ConfigProfile) -> Self {
        match profile {
            ConfigProfile::Standard => Self::standard(),
            ConfigProfile::Sensitive => Self::sensitive(),
            ConfigProfile::Custom => Self {
                name: "Custom grip".to_string(),
                profile: ConfigProfile::Custom,
                ..Self::standard()
            },
        }
    }

    /// Validate every range and cross-field constraint
    pub fn validate(&self) -> GripResult<()> {
        if !self.sampling_rate.is_finite() || self.sampling_rate <= 0.0 {
            return Err(GripError::config(format!(
                "sampling_rate must be positive, got {}",
                self.sampling_rate
            )));
        }
        if self.window_size < 2 {
            return Err(GripError::config("window_size must be at least 2 samples"));
        }
        if !(0.0..1.0).contains(&self.window_overlap) {
            return Err(GripError::config(format!(
                "window_overlap must be within [0, 1), got {}",
                self.window_overlap
            )));
        }
        validate_multiplier(self.threshold_multiplier)?;
        check_duration("min_gesture_duration", self.min_gesture_duration)?;
        check_duration("max_gesture_duration", self.max_gesture_duration)?;
        check_duration("gesture_cooldown", self.gesture_cooldown)?;
        check_duration("command_cooldown", self.command_cooldown)?;
        if self.min_gesture_duration > self.max_gesture_duration {
            return Err(GripError::config(format!(
                "min_gesture_duration ({}) exceeds max_gesture_duration ({})",
                self.min_gesture_duration, self.max_gesture_duration
            )));
        }
        if !(MIN_NOISE_LEVEL..=MAX_NOISE_LEVEL).contains(&self.noise_reduction_level) {
            return Err(GripError::config(format!(
                "noise_reduction_level must be within {}-{}, got {}",
                MIN_NOISE_LEVEL, MAX_NOISE_LEVEL, self.noise_reduction_level
            )));
        }
        self.dispatcher.validate()
    }

    /// Samples between two processed windows
    pub fn hop_size(&self) -> usize {
        let hop = (self.window_size as f64 * (1.0 - self.window_overlap)).round() as usize;
        hop.max(1)
    }

    /// Time available to process one window before the next is due
    pub fn window_budget(&self) -> Duration {
        seconds(self.hop_size() as f64 / self.sampling_rate)
    }

    pub fn min_gesture(&self) -> Duration {
        seconds(self.min_gesture_duration)
    }

    pub fn max_gesture(&self) -> Duration {
        seconds(self.max_gesture_duration)
    }

    pub fn gesture_cooldown(&self) -> Duration {
        seconds(self.gesture_cooldown)
    }

    pub fn command_cooldown(&self) -> Duration {
        seconds(self.command_cooldown)
    }

    /// Export configuration to JSON
    pub fn to_json(&self) -> GripResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Import and validate configuration from JSON
    pub fn from_json(json: &str) -> GripResult<Self> {
        let config: GripConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> GripResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            GripError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }
}

/// Range check shared by construction and runtime multiplier changes
pub fn validate_multiplier(multiplier: f64) -> GripResult<()> {
    if !(MIN_THRESHOLD_MULTIPLIER..=MAX_THRESHOLD_MULTIPLIER).contains(&multiplier) {
        return Err(GripError::config(format!(
            "threshold_multiplier must be within {}-{}, got {}",
            MIN_THRESHOLD_MULTIPLIER, MAX_THRESHOLD_MULTIPLIER, multiplier
        )));
    }
    Ok(())
}

fn check_duration(name: &str, value: f64) -> GripResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(GripError::config(format!(
            "{} must be a non-negative number of seconds, got {}",
            name, value
        )));
    }
    if Duration::try_from_secs_f64(value).is_err() {
        return Err(GripError::config(format!("{} of {} seconds is out of range", name, value)));
    }
    Ok(())
}

fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_validate() {
        for profile in [ConfigProfile::Standard, ConfigProfile::Sensitive, ConfigProfile::Custom] {
            let config = GripConfig::for_profile(profile);
            assert!(config.validate().is_ok(), "{:?} preset should be valid", profile);
            assert_eq!(config.profile, profile);
        }

        let sensitive = GripConfig::sensitive();
        assert_eq!(sensitive.threshold_multiplier, 1.0);
        assert_eq!(sensitive.min_gesture_duration, 0.05);
        assert_eq!(sensitive.noise_reduction_level, 2);
        assert_eq!(sensitive.sampling_rate, 1000.0);
    }

    #[test]
    fn test_validation_rejects_out_of_range() {
        let mut config = GripConfig::standard();
        config.threshold_multiplier = 0.5;
        assert!(config.validate().is_err());

        let mut config = GripConfig::standard();
        config.threshold_multiplier = 10.5;
        assert!(config.validate().is_err());

        let mut config = GripConfig::standard();
        config.noise_reduction_level = 6;
        assert!(config.validate().is_err());

        let mut config = GripConfig::standard();
        config.min_gesture_duration = 3.0;
        assert!(config.validate().is_err());

        let mut config = GripConfig::standard();
        config.gesture_cooldown = -0.1;
        assert!(config.validate().is_err());

        let mut config = GripConfig::standard();
        config.sampling_rate = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = GripConfig::standard();
        config.window_overlap = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unrepresentable_durations_rejected() {
        let mut config = GripConfig::standard();
        config.max_gesture_duration = 1e30;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_gesture_duration"));

        let mut config = GripConfig::standard();
        config.dispatcher.join_timeout = 1e25;
        assert!(config.validate().is_err());

        // Large but representable is still accepted
        let mut config = GripConfig::standard();
        config.max_gesture_duration = 86_400.0;
        assert!(config.validate().is_ok());
        assert_eq!(config.max_gesture(), Duration::from_secs(86_400));
    }

    #[test]
    fn test_real_link_requires_endpoint() {
        let mut config = GripConfig::standard();
        config.dispatcher.mock_mode = false;
        assert!(config.validate().is_err());

        config.dispatcher.endpoint = Some("127.0.0.1:5555".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_hop_size() {
        let mut config = GripConfig::standard();
        assert_eq!(config.hop_size(), 100);
        assert_eq!(config.window_budget(), Duration::from_millis(100));

        config.window_overlap = 0.0;
        assert_eq!(config.hop_size(), 200);

        config.window_overlap = 0.999;
        assert_eq!(config.hop_size(), 1);
    }

    #[test]
    fn test_json_round_trip_and_partial_input() {
        let config = GripConfig::sensitive();
        let json = config.to_json().unwrap();
        assert_eq!(GripConfig::from_json(&json).unwrap(), config);

        let partial = r#"{ "threshold_multiplier": 2.0, "dispatcher": { "join_timeout": 0.25 } }"#;
        let loaded = GripConfig::from_json(partial).unwrap();
        assert_eq!(loaded.threshold_multiplier, 2.0);
        assert_eq!(loaded.window_size, 200);
        assert_eq!(loaded.dispatcher.join_timeout(), Duration::from_millis(250));
        assert!(loaded.dispatcher.mock_mode);

        assert!(GripConfig::from_json(r#"{ "noise_reduction_level": 9 }"#).is_err());
    }
}
