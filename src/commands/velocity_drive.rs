// Autonomous driving from path-follower velocities

use tracing::warn;

use super::{Command, CommandContext};
use crate::swerve::ChassisSpeeds;

/// Follows robot-relative `BaseCommand`s; stops while they are stale
pub struct VelocityDrive {
    stale: bool,
}

impl VelocityDrive {
    pub fn new() -> Self {
        Self { stale: false }
    }
}

impl Default for VelocityDrive {
    fn default() -> Self {
        Self::new()
    }
}

impl Command for VelocityDrive {
    fn name(&self) -> &'static str {
        "VelocityDrive"
    }

    fn initialize(&mut self, _ctx: &mut CommandContext) {
        self.stale = false;
    }

    fn execute(&mut self, ctx: &mut CommandContext) {
        match ctx.base {
            Some(cmd) => {
                self.stale = false;
                ctx.swerve
                    .set_chassis_speeds(ChassisSpeeds::new(cmd.x_vel, cmd.y_vel, cmd.theta_vel));
            }
            None => {
                if !self.stale {
                    warn!("Follower command stale, stopping drive");
                }
                self.stale = true;
                ctx.swerve.stop();
            }
        }
    }

    fn end(&mut self, ctx: &mut CommandContext, _interrupted: bool) {
        ctx.swerve.stop();
    }
}
