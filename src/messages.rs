// Message types exchanged with the runtime over zenoh (JSON payloads)

use serde::{Deserialize, Serialize};

// Driver pad -> runtime
// Raw stick axes in [-1, 1], with the controller's sign conventions (stick up is -y)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DriverInput {
    pub left_x: f64,
    pub left_y: f64,
    pub right_x: f64,
}

impl DriverInput {
    pub const NEUTRAL: DriverInput = DriverInput {
        left_x: 0.0,
        left_y: 0.0,
        right_x: 0.0,
    };
}

// Path follower -> runtime, robot-relative
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BaseCommand {
    pub x_vel: f64,
    pub y_vel: f64,
    pub theta_vel: f64,
}

/// Field operating mode, set by whoever plays the role of the field system
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingMode {
    #[default]
    Disabled,
    Autonomous,
    Teleop,
    Test,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeCommand {
    pub mode: OperatingMode,
}

/// Which reef branch to line up on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignSide {
    Left,
    Right,
    Center,
}

// One-shot operator actions (button presses)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "side", rename_all = "snake_case")]
pub enum Action {
    ApplyTuning,
    ResetGyro,
    ResetEncoders,
    Align(AlignSide),
    CancelAlign,
}

// Live-tunable store entry, e.g. {"key": "/Tuning/Swerve/Drive P", "value": 0.3}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningValue {
    pub key: String,
    pub value: f64,
}

// IMU -> runtime
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImuSample {
    /// Counter-clockwise positive yaw, radians
    pub yaw: f64,
}

// Vision pipeline -> runtime, one per camera per frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagObservation {
    pub camera: String,
    pub has_tag: bool,
    /// Lateral offset to the tag
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub yaw: f64,
    #[serde(default)]
    pub distance: f64,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_wire_format() {
        let align: Action = serde_json::from_str(r#"{"action":"align","side":"left"}"#).unwrap();
        assert_eq!(align, Action::Align(AlignSide::Left));

        let tune: Action = serde_json::from_str(r#"{"action":"apply_tuning"}"#).unwrap();
        assert_eq!(tune, Action::ApplyTuning);
    }

    #[test]
    fn test_tag_observation_defaults_when_no_tag() {
        let obs: TagObservation =
            serde_json::from_str(r#"{"camera":"LeftCamera","has_tag":false}"#).unwrap();
        assert!(!obs.has_tag);
        assert_eq!(obs.y, 0.0);
    }

    #[test]
    fn test_mode_command() {
        let cmd: ModeCommand = serde_json::from_str(r#"{"mode":"teleop"}"#).unwrap();
        assert_eq!(cmd.mode, OperatingMode::Teleop);
    }
}
