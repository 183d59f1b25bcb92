//! Actuator domain types: joints, poses and commands
//!
//! Commands render to the newline-free ASCII form understood by the arm
//! firmware (`GRAB`, `MOVE_BASE_45`, ...). Framing is added by the transport.

use crate::error::{GripError, GripResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;
use uuid::Uuid;

/// Lowest accepted joint angle in degrees
pub const MIN_JOINT_ANGLE: i32 = 0;
/// Highest accepted joint angle in degrees
pub const MAX_JOINT_ANGLE: i32 = 180;
/// Angle of every joint in the home pose
pub const HOME_ANGLE: u16 = 90;

/// Rotational joints of the arm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Joint {
    Base,
    Shoulder,
    Elbow,
    Wrist,
}

impl Joint {
    /// All joints in wire order
    pub const ALL: [Joint; 4] = [Joint::Base, Joint::Shoulder, Joint::Elbow, Joint::Wrist];

    /// Upper-case name used on the wire
    pub fn wire_name(&self) -> &'static str {
        match self {
            Joint::Base => "BASE",
            Joint::Shoulder => "SHOULDER",
            Joint::Elbow => "ELBOW",
            Joint::Wrist => "WRIST",
        }
    }

    /// Check an angle against the mechanical range of the joint
    pub fn validate_angle(self, angle: i32) -> GripResult<u16> {
        if (MIN_JOINT_ANGLE..=MAX_JOINT_ANGLE).contains(&angle) {
            Ok(angle as u16)
        } else {
            Err(GripError::InvalidAngle { joint: self, angle })
        }
    }
}

impl fmt::Display for Joint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Joint::Base => "base",
            Joint::Shoulder => "shoulder",
            Joint::Elbow => "elbow",
            Joint::Wrist => "wrist",
        };
        f.write_str(name)
    }
}

impl FromStr for Joint {
    type Err = GripError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "base" => Ok(Joint::Base),
            "shoulder" => Ok(Joint::Shoulder),
            "elbow" => Ok(Joint::Elbow),
            "wrist" => Ok(Joint::Wrist),
            _ => Err(GripError::InvalidJoint { name: s.to_string() }),
        }
    }
}

/// Binary gripper state, serialized as 0 (open) / 1 (closed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum GripperState {
    Open,
    Closed,
}

impl From<GripperState> for u8 {
    fn from(state: GripperState) -> u8 {
        match state {
            GripperState::Open => 0,
            GripperState::Closed => 1,
        }
    }
}

impl TryFrom<u8> for GripperState {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(GripperState::Open),
            1 => Ok(GripperState::Closed),
            other => Err(format!("gripper state must be 0 or 1, got {}", other)),
        }
    }
}

/// Current pose of the arm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuatorPosition {
    pub base: u16,
    pub shoulder: u16,
    pub elbow: u16,
    pub wrist: u16,
    pub gripper: GripperState,
}

impl ActuatorPosition {
    /// Neutral pose: every joint at 90°, gripper open
    pub fn home() -> Self {
        Self {
            base: HOME_ANGLE,
            shoulder: HOME_ANGLE,
            elbow: HOME_ANGLE,
            wrist: HOME_ANGLE,
            gripper: GripperState::Open,
        }
    }

    /// Angle of a joint
    pub fn angle(&self, joint: Joint) -> u16 {
        match joint {
            Joint::Base => self.base,
            Joint::Shoulder => self.shoulder,
            Joint::Elbow => self.elbow,
            Joint::Wrist => self.wrist,
        }
    }

    pub fn set_angle(&mut self, joint: Joint, angle: u16) {
        match joint {
            Joint::Base => self.base = angle,
            Joint::Shoulder => self.shoulder = angle,
            Joint::Elbow => self.elbow = angle,
            Joint::Wrist => self.wrist = angle,
        }
    }
}

impl Default for ActuatorPosition {
    fn default() -> Self {
        Self::home()
    }
}

/// What a command asks the arm to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandKind {
    Grab,
    Release,
    Move { joint: Joint, angle: u16 },
    Home,
    Status,
    EmergencyStop,
}

impl CommandKind {
    /// ASCII text sent to the arm, without the line terminator
    pub fn wire_text(&self) -> String {
        match self {
            CommandKind::Grab => "GRAB".to_string(),
            CommandKind::Release => "RELEASE".to_string(),
            CommandKind::Move { joint, angle } => format!("MOVE_{}_{}", joint.wire_name(), angle),
            CommandKind::Home => "HOME".to_string(),
            CommandKind::Status => "STATUS".to_string(),
            CommandKind::EmergencyStop => "EMERGENCY_STOP".to_string(),
        }
    }

    /// Re-check variant payloads; only moves carry a range-limited value
    pub fn validate(&self) -> GripResult<()> {
        if let CommandKind::Move { joint, angle } = self {
            joint.validate_angle(i32::from(*angle))?;
        }
        Ok(())
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.wire_text())
    }
}

/// A command stamped with its identity and issue time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub id: Uuid,
    pub kind: CommandKind,
    pub issued_at: SystemTime,
}

impl Command {
    pub fn new(kind: CommandKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            issued_at: SystemTime::now(),
        }
    }

    pub fn grab() -> Self {
        Self::new(CommandKind::Grab)
    }

    pub fn release() -> Self {
        Self::new(CommandKind::Release)
    }

    pub fn home() -> Self {
        Self::new(CommandKind::Home)
    }

    pub fn status() -> Self {
        Self::new(CommandKind::Status)
    }

    pub fn emergency_stop() -> Self {
        Self::new(CommandKind::EmergencyStop)
    }

    /// Build a validated joint move
    pub fn move_joint(joint: Joint, angle: i32) -> GripResult<Self> {
        let angle = joint.validate_angle(angle)?;
        Ok(Self::new(CommandKind::Move { joint, angle }))
    }

    /// Build a validated joint move from a joint name such as `"elbow"`
    pub fn move_named(joint: &str, angle: i32) -> GripResult<Self> {
        Self::move_joint(joint.parse()?, angle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_text() {
        assert_eq!(CommandKind::Grab.wire_text(), "GRAB");
        assert_eq!(CommandKind::Release.wire_text(), "RELEASE");
        assert_eq!(CommandKind::Home.wire_text(), "HOME");
        assert_eq!(CommandKind::Status.wire_text(), "STATUS");
        assert_eq!(CommandKind::EmergencyStop.wire_text(), "EMERGENCY_STOP");
        assert_eq!(
            CommandKind::Move { joint: Joint::Base, angle: 45 }.wire_text(),
            "MOVE_BASE_45"
        );
    }

    #[test]
    fn test_joint_parsing() {
        assert_eq!("elbow".parse::<Joint>().unwrap(), Joint::Elbow);
        assert_eq!(" WRIST ".parse::<Joint>().unwrap(), Joint::Wrist);
        assert!(matches!(
            "gripper".parse::<Joint>(),
            Err(GripError::InvalidJoint { .. })
        ));
    }

    #[test]
    fn test_move_validation() {
        assert!(Command::move_joint(Joint::Shoulder, 0).is_ok());
        assert!(Command::move_joint(Joint::Shoulder, 180).is_ok());
        assert_eq!(
            Command::move_joint(Joint::Shoulder, 181).unwrap_err(),
            GripError::InvalidAngle { joint: Joint::Shoulder, angle: 181 }
        );
        assert!(Command::move_joint(Joint::Base, -1).is_err());
        assert!(Command::move_named("knee", 90).is_err());

        let cmd = Command::move_named("base", 45).unwrap();
        assert_eq!(cmd.kind, CommandKind::Move { joint: Joint::Base, angle: 45 });

        assert!(CommandKind::Move { joint: Joint::Wrist, angle: 200 }.validate().is_err());
    }

    #[test]
    fn test_home_position() {
        let home = ActuatorPosition::home();
        for joint in Joint::ALL {
            assert_eq!(home.angle(joint), 90);
        }
        assert_eq!(home.gripper, GripperState::Open);
    }

    #[test]
    fn test_gripper_serializes_as_bit() {
        let mut position = ActuatorPosition::home();
        position.gripper = GripperState::Closed;
        let json = serde_json::to_value(position).unwrap();
        assert_eq!(json["gripper"], 1);
        assert_eq!(json["base"], 90);

        let back: ActuatorPosition = serde_json::from_value(json).unwrap();
        assert_eq!(back, position);
    }
}
