// Lateral alignment on a reef AprilTag

use tracing::info;

use super::{Command, CommandContext};
use crate::config::AlignConfig;
use crate::pid::PidController;

/// Where to line up, with the camera that sees it best
#[derive(Debug, Clone, PartialEq)]
pub enum AlignTarget {
    Left { camera: String, offset: f64 },
    Right { camera: String, offset: f64 },
    Center { camera: String },
}

impl AlignTarget {
    pub fn camera(&self) -> &str {
        match self {
            AlignTarget::Left { camera, .. }
            | AlignTarget::Right { camera, .. }
            | AlignTarget::Center { camera } => camera,
        }
    }

    /// Lateral tag offset that counts as aligned
    pub fn offset(&self) -> f64 {
        match self {
            AlignTarget::Left { offset, .. } | AlignTarget::Right { offset, .. } => *offset,
            AlignTarget::Center { .. } => 0.0,
        }
    }
}

/// Strafe until the tag sits at the target offset.
///
/// Finishes once the tag has been out of sight for the configured timeout.
pub struct AlignToTag {
    target: AlignTarget,
    y_controller: PidController,
    lost_tag_timeout_s: f64,
    last_seen: f64,
    y: f64,
}

impl AlignToTag {
    pub fn new(target: AlignTarget, config: &AlignConfig, period: f64) -> Self {
        let mut y_controller = PidController::new(config.y_gains, period);
        y_controller.set_tolerance(config.y_tolerance);
        Self {
            target,
            y_controller,
            lost_tag_timeout_s: config.lost_tag_timeout_s,
            last_seen: 0.0,
            y: 0.0,
        }
    }

    pub fn target(&self) -> &AlignTarget {
        &self.target
    }
}

impl Command for AlignToTag {
    fn name(&self) -> &'static str {
        "AlignToTag"
    }

    fn initialize(&mut self, ctx: &mut CommandContext) {
        self.y_controller.reset();
        self.y_controller.set_setpoint(0.0);
        self.last_seen = ctx.time;
        self.y = ctx.vision.tag(self.target.camera()).map(|t| t.y).unwrap_or(0.0);
        info!("Aligning on {:?}", self.target);
    }

    fn execute(&mut self, ctx: &mut CommandContext) {
        let tag = ctx.vision.tag(self.target.camera());
        if let Some(reading) = tag {
            self.y = reading.y;
        }

        let error = self.y - self.target.offset();
        let strafe = self.y_controller.calculate(error);
        ctx.swerve.set_drive_speeds(0.0, strafe, 0.0, false);

        ctx.telemetry.number("Align/Y", self.y);
        ctx.telemetry.number("Align/Error", error);
        ctx.telemetry.flag("Align/At Setpoint", self.y_controller.at_setpoint());

        if tag.is_some() {
            self.last_seen = ctx.time;
        }
    }

    fn is_finished(&self, ctx: &CommandContext) -> bool {
        ctx.time - self.last_seen >= self.lost_tag_timeout_s
    }

    fn end(&mut self, ctx: &mut CommandContext, _interrupted: bool) {
        ctx.swerve.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::sim_swerve;
    use crate::commands::{CommandState, ScheduledCommand, TagCache};
    use crate::messages::{AlignSide, TagObservation};
    use crate::telemetry::TelemetryFrame;

    fn observation(camera: &str, y: f64) -> TagObservation {
        TagObservation {
            camera: camera.to_string(),
            has_tag: true,
            y,
            yaw: 0.0,
            distance: 1.0,
        }
    }

    #[test]
    fn test_targets_carry_their_camera() {
        let config = AlignConfig::default();
        let left = config.target(AlignSide::Left);
        assert_eq!(left.camera(), "RightCamera");
        assert_eq!(left.offset(), -6.5);
        assert_eq!(config.target(AlignSide::Right).camera(), "LeftCamera");
        assert_eq!(config.target(AlignSide::Center).offset(), 0.0);
    }

    #[test]
    fn test_strafes_on_offset_error() {
        let (mut swerve, _plant) = sim_swerve();
        let config = AlignConfig::default();
        let mut tags = TagCache::new(1.0);
        tags.observe(&observation("RightCamera", -4.5), 0.0);
        let mut frame = TelemetryFrame::new(0);

        let mut command = AlignToTag::new(config.target(AlignSide::Left), &config, 0.02);
        let mut ctx = CommandContext {
            swerve: &mut swerve,
            pad: None,
            base: None,
            vision: &tags,
            telemetry: &mut frame,
            time: 0.0,
        };
        command.initialize(&mut ctx);
        command.execute(&mut ctx);

        // error = -4.5 - (-6.5) = 2, output = p * (0 - 2)
        let expected = -2.0 * config.y_gains.p;
        let states = ctx.swerve.module_states();
        for state in states {
            let vy = state.speed_mps * state.angle.sin();
            assert!((vy - expected).abs() < 1e-9);
        }
        assert_eq!(frame.get_number("Align/Error"), Some(2.0));
    }

    #[test]
    fn test_finishes_after_tag_lost_and_stops() {
        let (mut swerve, plant) = sim_swerve();
        let config = AlignConfig::default();
        let mut tags = TagCache::new(0.1);
        let mut frame = TelemetryFrame::new(0);
        let mut command = ScheduledCommand::new(Box::new(AlignToTag::new(
            config.target(AlignSide::Right),
            &config,
            0.02,
        )));

        let mut time = 0.0;
        for _ in 0..10 {
            tags.observe(&observation("LeftCamera", 10.0), time);
            tags.expire(time);
            let mut ctx = CommandContext {
                swerve: &mut swerve,
                pad: None,
                base: None,
                vision: &tags,
                telemetry: &mut frame,
                time,
            };
            command.tick(&mut ctx);
            time += 0.02;
        }
        assert_eq!(command.state(), CommandState::Running);
        assert!(plant.drive(0).velocity() != 0.0);

        // Tag gone: keeps correcting on the last value until the timeout
        let lost_at = time - 0.02;
        while command.state() == CommandState::Running {
            tags.expire(time);
            let mut ctx = CommandContext {
                swerve: &mut swerve,
                pad: None,
                base: None,
                vision: &tags,
                telemetry: &mut frame,
                time,
            };
            command.tick(&mut ctx);
            time += 0.02;
            assert!(time < 5.0);
        }

        assert!(time - 0.02 - lost_at >= config.lost_tag_timeout_s - 1e-9);
        assert!((0..4).all(|i| plant.drive(i).velocity() == 0.0));
    }
}
