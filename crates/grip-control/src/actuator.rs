//! Joint-position model of the arm
//!
//! Positions change only when the dispatcher reports a command as executed;
//! validation happens earlier, before a command is queued.

use grip_core::{ActuatorPosition, CommandKind, GripResult, GripperState, Joint};

/// Last known pose of the arm
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActuatorState {
    position: ActuatorPosition,
}

impl ActuatorState {
    /// Arm in the home pose
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a move addressed by joint name
    pub fn validate_move(joint: &str, angle: i32) -> GripResult<CommandKind> {
        let joint: Joint = joint.parse()?;
        let angle = joint.validate_angle(angle)?;
        Ok(CommandKind::Move { joint, angle })
    }

    /// Apply an executed command to the model
    pub fn apply(&mut self, command: &CommandKind) {
        match *command {
            CommandKind::Grab => self.position.gripper = GripperState::Closed,
            CommandKind::Release => self.position.gripper = GripperState::Open,
            CommandKind::Move { joint, angle } => self.position.set_angle(joint, angle),
            CommandKind::Home => self.position = ActuatorPosition::home(),
            CommandKind::Status | CommandKind::EmergencyStop => {}
        }
    }

    pub fn position(&self) -> ActuatorPosition {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grip_core::GripError;

    #[test]
    fn test_commands_mutate_position() {
        let mut state = ActuatorState::new();
        state.apply(&CommandKind::Grab);
        assert_eq!(state.position().gripper, GripperState::Closed);

        state.apply(&CommandKind::Move { joint: Joint::Elbow, angle: 30 });
        assert_eq!(state.position().elbow, 30);
        assert_eq!(state.position().base, 90);

        state.apply(&CommandKind::Status);
        state.apply(&CommandKind::EmergencyStop);
        assert_eq!(state.position().elbow, 30);

        state.apply(&CommandKind::Release);
        assert_eq!(state.position().gripper, GripperState::Open);

        state.apply(&CommandKind::Grab);
        state.apply(&CommandKind::Home);
        assert_eq!(state.position(), ActuatorPosition::home());
    }

    #[test]
    fn test_validate_move() {
        assert_eq!(
            ActuatorState::validate_move("Wrist", 180).unwrap(),
            CommandKind::Move { joint: Joint::Wrist, angle: 180 }
        );
        assert!(matches!(
            ActuatorState::validate_move("gripper", 10),
            Err(GripError::InvalidJoint { .. })
        ));
        assert!(matches!(
            ActuatorState::validate_move("base", 190),
            Err(GripError::InvalidAngle { angle: 190, .. })
        ));
    }
}
