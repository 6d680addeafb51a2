// Teleop driving from the pad sticks

use super::{Command, CommandContext};
use crate::config::DriverConfig;
use crate::messages::DriverInput;

/// Stick shaping, in chassis units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PadSpeeds {
    pub forward: f64,
    pub strafe: f64,
    pub rotation: f64,
}

pub struct PadDrive {
    config: DriverConfig,
}

impl PadDrive {
    pub fn new(config: DriverConfig) -> Self {
        Self { config }
    }

    /// Stick up and stick left are negative on the pad
    pub fn shape(&self, input: DriverInput, max_speed: f64, max_angular: f64) -> PadSpeeds {
        let mut strafe = -input.left_x * max_speed;
        if strafe.abs() < self.config.x_deadzone {
            strafe = 0.0;
        }

        let mut forward = -input.left_y * max_speed;
        if forward.abs() < self.config.y_deadzone {
            forward = 0.0;
        }

        let rotation = if input.right_x.abs() >= self.config.rotation_deadzone {
            -input.right_x * max_angular
        } else {
            0.0
        };

        PadSpeeds {
            forward,
            strafe,
            rotation: rotation * self.config.rotation_scale,
        }
    }
}

impl Command for PadDrive {
    fn name(&self) -> &'static str {
        "PadDrive"
    }

    fn execute(&mut self, ctx: &mut CommandContext) {
        let input = ctx.pad.unwrap_or(DriverInput::NEUTRAL);
        let max_speed = ctx.swerve.max_module_speed();
        let max_angular = ctx.swerve.max_angular_speed();
        let speeds = self.shape(input, max_speed, max_angular);

        ctx.telemetry.number("PadDrive/X Joystick", speeds.strafe);
        ctx.telemetry.number("PadDrive/Y Joystick", speeds.forward);
        ctx.telemetry.number("PadDrive/Rotation", speeds.rotation);

        ctx.swerve.set_drive_speeds(
            speeds.forward,
            speeds.strafe,
            speeds.rotation,
            self.config.field_oriented,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::TagCache;
    use crate::commands::tests::sim_swerve;
    use crate::telemetry::TelemetryFrame;

    fn pad() -> PadDrive {
        PadDrive::new(DriverConfig::default())
    }

    #[test]
    fn test_stick_signs_and_scaling() {
        let speeds = pad().shape(
            DriverInput {
                left_x: -0.5,
                left_y: -1.0,
                right_x: 0.5,
            },
            4.0,
            2.0,
        );
        assert_eq!(speeds.forward, 4.0);
        assert_eq!(speeds.strafe, 2.0);
        assert!((speeds.rotation + 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_deadzones() {
        // 0.03 * 4.0 = 0.12 m/s, under the 0.15 m/s translation deadzone
        let speeds = pad().shape(
            DriverInput {
                left_x: 0.03,
                left_y: 0.03,
                right_x: 0.19,
            },
            4.0,
            2.0,
        );
        assert_eq!(speeds.forward, 0.0);
        assert_eq!(speeds.strafe, 0.0);
        assert_eq!(speeds.rotation, 0.0);

        let speeds = pad().shape(
            DriverInput {
                left_x: 0.0,
                left_y: 0.0,
                right_x: 0.2,
            },
            4.0,
            2.0,
        );
        assert!(speeds.rotation < 0.0);
    }

    #[test]
    fn test_stale_input_drives_nothing() {
        let (mut swerve, plant) = sim_swerve();
        let tags = TagCache::new(1.0);
        let mut frame = TelemetryFrame::new(0);
        let mut command = pad();

        let mut ctx = CommandContext {
            swerve: &mut swerve,
            pad: Some(DriverInput {
                left_x: 0.0,
                left_y: -1.0,
                right_x: 0.0,
            }),
            base: None,
            vision: &tags,
            telemetry: &mut frame,
            time: 0.0,
        };
        command.execute(&mut ctx);
        assert!(plant.drive(0).velocity() > 0.0);

        ctx.pad = None;
        command.execute(&mut ctx);
        assert_eq!(plant.drive(0).velocity(), 0.0);
        assert_eq!(frame.get_number("PadDrive/Y Joystick"), Some(0.0));
    }
}
