//! Grab/release alternation of accepted gestures

use grip_core::{Clock, CommandKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Last action issued by the alternator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerState {
    Idle,
    Grab,
    Release,
}

/// Controller statistics snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerStatus {
    pub state: ControllerState,
    pub cycle_count: u64,
    /// Command the next accepted gesture will produce
    pub next_action: CommandKind,
    /// Gestures dropped inside the command cooldown
    pub dropped_gestures: u64,
}

/// Turns each accepted gesture into Grab, Release, Grab, ...
#[derive(Debug)]
pub struct GrabReleaseAlternator {
    clock: Arc<dyn Clock>,
    cooldown: Duration,
    state: ControllerState,
    cycle_count: u64,
    last_command_time: Option<Duration>,
    dropped_gestures: u64,
}

impl GrabReleaseAlternator {
    pub fn new(cooldown: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            cooldown,
            state: ControllerState::Idle,
            cycle_count: 0,
            last_command_time: None,
            dropped_gestures: 0,
        }
    }

    /// Handle one accepted gesture; returns the command to dispatch, if any
    pub fn on_gesture_completed(&mut self) -> Option<CommandKind> {
        let now = self.clock.now();
        if let Some(last) = self.last_command_time {
            let since = now.saturating_sub(last);
            if since < self.cooldown {
                self.dropped_gestures += 1;
                debug!(
                    remaining_ms = (self.cooldown - since).as_millis() as u64,
                    "gesture inside command cooldown, ignored"
                );
                return None;
            }
        }

        self.cycle_count += 1;
        self.last_command_time = Some(now);
        let (state, command) = if self.cycle_count % 2 == 1 {
            (ControllerState::Grab, CommandKind::Grab)
        } else {
            (ControllerState::Release, CommandKind::Release)
        };
        self.state = state;
        info!(cycle = self.cycle_count, command = %command, "gesture mapped to command");
        Some(command)
    }

    /// Back to Idle with no cycles
    pub fn reset(&mut self) {
        self.state = ControllerState::Idle;
        self.cycle_count = 0;
        self.last_command_time = None;
        self.dropped_gestures = 0;
        info!("grab/release controller reset");
    }

    pub fn next_action(&self) -> CommandKind {
        if (self.cycle_count + 1) % 2 == 1 {
            CommandKind::Grab
        } else {
            CommandKind::Release
        }
    }

    pub fn status(&self) -> ControllerStatus {
        ControllerStatus {
            state: self.state,
            cycle_count: self.cycle_count,
            next_action: self.next_action(),
            dropped_gestures: self.dropped_gestures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grip_core::ManualClock;

    fn alternator() -> (GrabReleaseAlternator, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let alternator = GrabReleaseAlternator::new(Duration::from_secs(1), clock.clone());
        (alternator, clock)
    }

    #[test]
    fn test_strict_alternation() {
        let (mut alt, clock) = alternator();
        assert_eq!(alt.next_action(), CommandKind::Grab);

        let mut issued = Vec::new();
        for _ in 0..4 {
            clock.advance(Duration::from_millis(1500));
            issued.extend(alt.on_gesture_completed());
        }
        assert_eq!(
            issued,
            vec![CommandKind::Grab, CommandKind::Release, CommandKind::Grab, CommandKind::Release]
        );
        assert_eq!(alt.status().cycle_count, 4);
        assert_eq!(alt.status().state, ControllerState::Release);
        assert_eq!(alt.next_action(), CommandKind::Grab);
    }

    #[test]
    fn test_cooldown_drops_without_mutation() {
        let (mut alt, clock) = alternator();
        assert_eq!(alt.on_gesture_completed(), Some(CommandKind::Grab));

        clock.advance(Duration::from_millis(300));
        assert_eq!(alt.on_gesture_completed(), None);
        let status = alt.status();
        assert_eq!(status.cycle_count, 1);
        assert_eq!(status.state, ControllerState::Grab);
        assert_eq!(status.next_action, CommandKind::Release);
        assert_eq!(status.dropped_gestures, 1);

        // Cooldown is measured from the last issued command, not the dropped gesture
        clock.advance(Duration::from_millis(700));
        assert_eq!(alt.on_gesture_completed(), Some(CommandKind::Release));
    }

    #[test]
    fn test_reset() {
        let (mut alt, clock) = alternator();
        alt.on_gesture_completed();
        alt.reset();
        assert_eq!(alt.status().state, ControllerState::Idle);
        assert_eq!(alt.status().cycle_count, 0);

        // Reset also clears the cooldown
        clock.advance(Duration::from_millis(10));
        assert_eq!(alt.on_gesture_completed(), Some(CommandKind::Grab));
    }
}
