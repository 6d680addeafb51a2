// Module and chassis motion types

use serde::Serialize;

use crate::geometry::{Rotation2d, Translation2d};

/// Speed and wheel heading of one module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ModuleState {
    /// Signed wheel speed in m/s
    pub speed_mps: f64,
    pub angle: Rotation2d,
}

impl ModuleState {
    pub fn new(speed_mps: f64, angle: Rotation2d) -> Self {
        Self { speed_mps, angle }
    }

    /// Choose the equivalent target that needs the least steering travel.
    ///
    /// If the desired heading is more than 90 degrees away from `current`, the
    /// target is flipped by 180 degrees and the speed negated. The steer never
    /// has to move more than 90 degrees from `current` to reach the result.
    pub fn optimize(self, current: Rotation2d) -> ModuleState {
        let delta = self.angle.delta_from(current);
        if delta.degrees().abs() > 90.0 {
            ModuleState {
                speed_mps: -self.speed_mps,
                angle: (self.angle + Rotation2d::HALF_TURN).wrapped(),
            }
        } else {
            self
        }
    }
}

/// Cumulative wheel travel and heading of one module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ModulePosition {
    /// Distance travelled since the last encoder reset, in meters
    pub distance_m: f64,
    pub angle: Rotation2d,
}

impl ModulePosition {
    pub fn new(distance_m: f64, angle: Rotation2d) -> Self {
        Self { distance_m, angle }
    }
}

/// Chassis velocity in the robot frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ChassisSpeeds {
    /// Forward, m/s
    pub vx: f64,
    /// Left, m/s
    pub vy: f64,
    /// Counter-clockwise, rad/s
    pub omega: f64,
}

impl ChassisSpeeds {
    pub fn new(vx: f64, vy: f64, omega: f64) -> Self {
        Self { vx, vy, omega }
    }

    /// Convert field-relative speeds into the robot frame.
    ///
    /// The translation is rotated by the negative of the robot heading so that
    /// "forward" stays pointed away from the driver station.
    pub fn from_field_relative(vx: f64, vy: f64, omega: f64, heading: Rotation2d) -> Self {
        let robot = Translation2d::new(vx, vy).rotate_by(-heading);
        Self::new(robot.x, robot.y, omega)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{} != {}", a, b);
    }

    #[test]
    fn test_optimize_flips_when_far() {
        // Module at 170 degrees asked for 0 degrees: cheaper to point backwards
        let desired = ModuleState::new(1.0, Rotation2d::from_degrees(0.0));
        let out = desired.optimize(Rotation2d::from_degrees(170.0));
        approx(out.angle.degrees(), 180.0);
        approx(out.speed_mps, -1.0);
    }

    #[test]
    fn test_optimize_keeps_when_close() {
        let desired = ModuleState::new(2.0, Rotation2d::from_degrees(45.0));
        let out = desired.optimize(Rotation2d::from_degrees(-30.0));
        assert_eq!(out, desired);
    }

    #[test]
    fn test_optimize_never_exceeds_quarter_turn() {
        for current_deg in (-720..=720).step_by(7) {
            for desired_deg in (-540..=540).step_by(11) {
                let current = Rotation2d::from_degrees(current_deg as f64);
                let desired = ModuleState::new(1.5, Rotation2d::from_degrees(desired_deg as f64));
                let out = desired.optimize(current);

                let travel = out.angle.delta_from(current).degrees().abs();
                assert!(
                    travel <= 90.0 + 1e-9,
                    "travel {} from {} to {}",
                    travel,
                    current_deg,
                    desired_deg
                );
                approx(out.speed_mps.abs(), 1.5);
            }
        }
    }

    #[test]
    fn test_field_relative_rotates_by_negative_heading() {
        // Robot facing left: field-forward is robot-right
        let heading = Rotation2d::from_degrees(90.0);
        let speeds = ChassisSpeeds::from_field_relative(1.0, 0.0, 0.5, heading);
        approx(speeds.vx, 0.0);
        approx(speeds.vy, -1.0);
        approx(speeds.omega, 0.5);
    }
}
