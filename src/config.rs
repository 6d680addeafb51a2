// Timeouts, topics, robot parameters
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::commands::AlignTarget;
use crate::geometry::Translation2d;
use crate::messages::AlignSide;
use crate::motor::feetech::STEPS_PER_REVOLUTION;
use crate::swerve::{DriveGains, GainRole, GainSet, NUM_MODULES};

// Runtime loop frequency (20 ms cycle)
pub const LOOP_HZ: u64 = 50;

// Driver/follower input older than this is treated as neutral
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_CMD_PAD: &str = "swerve/cmd/pad"; // driver sticks
pub const TOPIC_CMD_BASE: &str = "swerve/cmd/base"; // path follower velocities
pub const TOPIC_CMD_MODE: &str = "swerve/cmd/mode"; // operating mode
pub const TOPIC_CMD_ACTION: &str = "swerve/cmd/action"; // one-shot actions
pub const TOPIC_TUNING: &str = "swerve/tuning"; // live-tunable values
pub const TOPIC_IMU: &str = "swerve/state/imu"; // heading samples
pub const TOPIC_VISION: &str = "vision/tags"; // tag observations
pub const TOPIC_TELEMETRY: &str = "swerve/rt/telemetry";
pub const TOPIC_ALERTS: &str = "swerve/state/alerts";
pub const TOPIC_HEALTH: &str = "swerve/state/health";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read the parameter file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot parse the parameter file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid parameter: {0}")]
    Invalid(String),
}

/// Identity and placement of one swerve module
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModuleConfig {
    pub name: String,
    pub drive_id: u8,
    pub steer_id: u8,
    pub encoder_id: u8,
    /// Absolute encoder reading when the wheel points forward, in rotations
    #[serde(default)]
    pub encoder_offset_rotations: f64,
    /// Offset from chassis centre, meters (x forward, y left)
    pub x_m: f64,
    pub y_m: f64,
}

impl ModuleConfig {
    pub fn location(&self) -> Translation2d {
        Translation2d::new(self.x_m, self.y_m)
    }
}

/// Gear train and limits shared by every module
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct MechanismConfig {
    /// Drive motor rotations per wheel rotation
    pub drive_gear_ratio: f64,
    /// Wheel circumference
    pub meters_per_rev: f64,
    /// Steer motor rotations per module rotation
    pub steer_gear_ratio: f64,
    pub drive_inverted: bool,
    pub steer_inverted: bool,
    pub max_module_speed_mps: f64,
    pub max_angular_speed_rads: f64,
}

impl Default for MechanismConfig {
    fn default() -> Self {
        Self {
            drive_gear_ratio: 6.75,
            meters_per_rev: 0.1016 * std::f64::consts::PI,
            steer_gear_ratio: 1.0,
            drive_inverted: false,
            steer_inverted: false,
            max_module_speed_mps: 4.5,
            max_angular_speed_rads: 2.0 * std::f64::consts::PI,
        }
    }
}

/// Stick shaping for the pad drive
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Applied to the scaled strafe speed, m/s
    pub x_deadzone: f64,
    /// Applied to the scaled forward speed, m/s
    pub y_deadzone: f64,
    /// Applied to the raw rotation stick
    pub rotation_deadzone: f64,
    pub rotation_scale: f64,
    pub field_oriented: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            x_deadzone: 0.15,
            y_deadzone: 0.15,
            rotation_deadzone: 0.2,
            rotation_scale: 0.8,
            field_oriented: true,
        }
    }
}

/// Vision alignment controller and the reef offsets per side
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AlignConfig {
    pub cameras: Vec<String>,
    pub y_gains: GainSet,
    pub y_tolerance: f64,
    /// Finish this long after the tag was last seen
    pub lost_tag_timeout_s: f64,
    pub left_camera: String,
    pub left_offset: f64,
    pub right_camera: String,
    pub right_offset: f64,
    pub center_camera: String,
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            cameras: vec!["LeftCamera".to_string(), "RightCamera".to_string()],
            y_gains: GainSet::new(0.05, 0.0, 0.002, 0.0),
            y_tolerance: 1.5,
            lost_tag_timeout_s: 1.0,
            // The left branch is seen best from the right-hand camera
            left_camera: "RightCamera".to_string(),
            left_offset: -6.5,
            right_camera: "LeftCamera".to_string(),
            right_offset: 6.5,
            center_camera: "LeftCamera".to_string(),
        }
    }
}

impl AlignConfig {
    pub fn target(&self, side: AlignSide) -> AlignTarget {
        match side {
            AlignSide::Left => AlignTarget::Left {
                camera: self.left_camera.clone(),
                offset: self.left_offset,
            },
            AlignSide::Right => AlignTarget::Right {
                camera: self.right_camera.clone(),
                offset: self.right_offset,
            },
            AlignSide::Center => AlignTarget::Center {
                camera: self.center_camera.clone(),
            },
        }
    }
}

/// How drive gains and limits map onto the Feetech servos
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServoConfig {
    /// Register counts per unit of drive gain
    pub drive_gain_scale: f64,
    /// Register counts per unit of steer gain
    pub steer_gain_scale: f64,
    /// Fastest goal velocity a drive servo can follow, steps/s
    pub max_velocity_steps: u16,
    /// Bus calls skipped on a silent servo before it is tried again
    pub retry_after: u32,
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self {
            drive_gain_scale: 100.0,
            steer_gain_scale: 5.0,
            max_velocity_steps: 3400,
            retry_after: 150,
        }
    }
}

impl ServoConfig {
    pub fn gain_scale(&self, role: GainRole) -> f64 {
        match role {
            GainRole::Drive => self.drive_gain_scale,
            GainRole::Steer => self.steer_gain_scale,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    /// Key prefix in the live-tunable store
    pub prefix: String,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            prefix: "/Tuning/Swerve".to_string(),
        }
    }
}

/// Every runtime parameter of the robot
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    pub serial_port: String,
    pub modules: [ModuleConfig; NUM_MODULES],
    pub mechanism: MechanismConfig,
    pub gains: DriveGains,
    pub driver: DriverConfig,
    pub align: AlignConfig,
    pub servo: ServoConfig,
    pub tuning: TuningConfig,
}

/// Half the distance between module centres on the reference chassis
pub const HALF_TRACK_M: f64 = 0.3556;

impl Default for RobotConfig {
    fn default() -> Self {
        let module = |name: &str, base: u8, x_m: f64, y_m: f64| ModuleConfig {
            name: name.to_string(),
            drive_id: base,
            steer_id: base + 1,
            encoder_id: base + 1,
            encoder_offset_rotations: 0.0,
            x_m,
            y_m,
        };

        Self {
            serial_port: "/dev/ttyACM0".to_string(),
            modules: [
                module("FrontLeft", 1, HALF_TRACK_M, HALF_TRACK_M),
                module("FrontRight", 3, HALF_TRACK_M, -HALF_TRACK_M),
                module("BackLeft", 5, -HALF_TRACK_M, HALF_TRACK_M),
                module("BackRight", 7, -HALF_TRACK_M, -HALF_TRACK_M),
            ],
            mechanism: MechanismConfig::default(),
            gains: DriveGains::default(),
            driver: DriverConfig::default(),
            align: AlignConfig::default(),
            servo: ServoConfig::default(),
            tuning: TuningConfig::default(),
        }
    }
}

impl RobotConfig {
    /// Load and validate a TOML parameter file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: RobotConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that can only be programming or wiring mistakes
    pub fn validate(&self) -> Result<(), ConfigError> {
        let m = &self.mechanism;
        for (name, value) in [
            ("mechanism.drive_gear_ratio", m.drive_gear_ratio),
            ("mechanism.meters_per_rev", m.meters_per_rev),
            ("mechanism.steer_gear_ratio", m.steer_gear_ratio),
            ("mechanism.max_module_speed_mps", m.max_module_speed_mps),
            ("mechanism.max_angular_speed_rads", m.max_angular_speed_rads),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }

        // Drive and steer servos share one bus; the steer servo may double as encoder
        let mut bus_ids = HashSet::new();
        for module in &self.modules {
            for id in [module.drive_id, module.steer_id] {
                if !bus_ids.insert(id) {
                    return Err(ConfigError::Invalid(format!(
                        "device id {} used twice (module {})",
                        id, module.name
                    )));
                }
            }
        }

        for (i, a) in self.modules.iter().enumerate() {
            for b in &self.modules[i + 1..] {
                if (a.location() - b.location()).norm() < 1e-3 {
                    return Err(ConfigError::Invalid(format!(
                        "modules {} and {} share a location",
                        a.name, b.name
                    )));
                }
            }
        }

        let g = &self.gains;
        for (name, set) in [
            ("gains.teleop.drive", g.teleop.drive),
            ("gains.teleop.steer", g.teleop.steer),
            ("gains.auto.drive", g.auto.drive),
            ("gains.auto.steer", g.auto.steer),
            ("align.y_gains", self.align.y_gains),
        ] {
            if !set.is_finite() {
                return Err(ConfigError::Invalid(format!("{} has a non-finite gain", name)));
            }
        }

        for side in [AlignSide::Left, AlignSide::Right, AlignSide::Center] {
            let camera = self.align.target(side).camera().to_string();
            if !self.align.cameras.contains(&camera) {
                return Err(ConfigError::Invalid(format!(
                    "align {:?} uses unknown camera {}",
                    side, camera
                )));
            }
        }

        Ok(())
    }

    /// Drive speed at the servo velocity limit, m/s
    pub fn servo_speed_limit_mps(&self) -> f64 {
        let m = &self.mechanism;
        let rotor_rps = f64::from(self.servo.max_velocity_steps) / f64::from(STEPS_PER_REVOLUTION);
        rotor_rps / m.drive_gear_ratio * m.meters_per_rev
    }

    /// Extra checks for running on Feetech servos rather than simulated devices
    pub fn validate_servos(&self) -> Result<(), ConfigError> {
        let m = &self.mechanism;
        // The steer servo's single-turn position is the module's absolute angle
        if (m.steer_gear_ratio - 1.0).abs() > 1e-9 {
            return Err(ConfigError::Invalid(format!(
                "mechanism.steer_gear_ratio must be 1 on servo hardware, got {}",
                m.steer_gear_ratio
            )));
        }

        let limit = self.servo_speed_limit_mps();
        if m.max_module_speed_mps > limit {
            return Err(ConfigError::Invalid(format!(
                "mechanism.max_module_speed_mps {} exceeds the servo limit of {:.3} m/s",
                m.max_module_speed_mps, limit
            )));
        }

        for role in GainRole::ALL {
            let scale = self.servo.gain_scale(role);
            if !(scale.is_finite() && scale > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "servo {} gain scale must be positive, got {}",
                    role.label(),
                    scale
                )));
            }
        }
        if self.servo.max_velocity_steps == 0 || self.servo.max_velocity_steps > i16::MAX as u16 {
            return Err(ConfigError::Invalid(format!(
                "servo.max_velocity_steps must be in 1..={}, got {}",
                i16::MAX,
                self.servo.max_velocity_steps
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        RobotConfig::default().validate().unwrap();
    }

    #[test]
    fn test_reference_file_matches_defaults() {
        let config = RobotConfig::from_toml(include_str!("../params/swerve.toml")).unwrap();
        let defaults = RobotConfig::default();
        assert_eq!(config.modules, defaults.modules);
        assert_eq!(config.gains, defaults.gains);
        assert_eq!(config.align, defaults.align);
        assert_eq!(config.servo, defaults.servo);
        assert!((config.mechanism.meters_per_rev - defaults.mechanism.meters_per_rev).abs() < 1e-9);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = RobotConfig::from_toml(
            r#"
            serial_port = "/dev/ttyUSB1"

            [mechanism]
            drive_gear_ratio = 1.0
            max_module_speed_mps = 0.5

            [gains.teleop.drive]
            p = 0.4
            i = 0.0
            d = 0.0

            [gains.teleop.steer]
            p = 20.0
            i = 0.0
            d = 0.1
            "#,
        )
        .unwrap();

        assert_eq!(config.serial_port, "/dev/ttyUSB1");
        assert_eq!(config.mechanism.drive_gear_ratio, 1.0);
        assert_eq!(config.mechanism.steer_gear_ratio, 1.0);
        assert_eq!(config.gains.teleop.drive.p, 0.4);
        assert_eq!(config.gains.teleop.drive.v, 0.0);
        assert_eq!(config.gains.auto, DriveGains::default().auto);
        assert_eq!(config.modules[1].name, "FrontRight");
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut config = RobotConfig::default();
        config.modules[2].drive_id = config.modules[0].steer_id;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_unknown_camera_rejected() {
        let mut config = RobotConfig::default();
        config.align.center_camera = "RearCamera".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("RearCamera"));
    }

    #[test]
    fn test_servo_checks_reject_unreachable_speed() {
        let config = RobotConfig::default();
        assert!(config.servo_speed_limit_mps() < config.mechanism.max_module_speed_mps);
        let err = config.validate_servos().unwrap_err();
        assert!(err.to_string().contains("max_module_speed_mps"));
    }

    #[test]
    fn test_servo_base_file_passes_servo_checks() {
        let config = RobotConfig::from_toml(include_str!("../params/servo_base.toml")).unwrap();
        config.validate_servos().unwrap();
        assert!(config.mechanism.max_module_speed_mps <= config.servo_speed_limit_mps());
    }

    #[test]
    fn test_servo_checks_reject_steer_reduction() {
        let mut config = RobotConfig::from_toml(include_str!("../params/servo_base.toml")).unwrap();
        config.mechanism.steer_gear_ratio = 2.0;
        assert!(config.validate_servos().is_err());
    }

    #[test]
    fn test_zero_gear_ratio_rejected() {
        let mut config = RobotConfig::default();
        config.mechanism.drive_gear_ratio = 0.0;
        assert!(config.validate().is_err());
    }
}
