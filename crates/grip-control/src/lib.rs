//! Grip-Control: gesture-to-command control of the robotic arm
//!
//! Maps accepted gestures onto alternating grab/release commands and executes
//! them on the arm through a queued, single-consumer dispatcher with an
//! emergency-stop bypass.

pub mod actuator;
pub mod alternator;
pub mod dispatcher;
pub mod system;
pub mod transport;

pub use actuator::ActuatorState;
pub use alternator::{ControllerState, ControllerStatus, GrabReleaseAlternator};
pub use dispatcher::{CommandDispatcher, CommandObserver, CommandOutcome, DispatcherStatus, EmergencyStopReport};
pub use system::{CommandRouter, GripSystem, SystemStatus};
pub use transport::{
    transport_from_settings, ActuatorTransport, Connector, LineTransport, LinkStream, MockTransport, SentLog,
    TcpConnector,
};
