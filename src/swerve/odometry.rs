// Pose estimate from wheel travel and the gyro

use super::{ModulePosition, NUM_MODULES, SwerveKinematics};
use crate::geometry::{Pose2d, Rotation2d};

/// Integrates module position deltas into a field pose.
///
/// Heading always comes from the gyro; the wheels only contribute translation.
#[derive(Debug, Clone)]
pub struct SwerveOdometry {
    pose: Pose2d,
    /// Field heading minus gyro heading
    gyro_offset: Rotation2d,
    previous_angle: Rotation2d,
    previous_positions: [ModulePosition; NUM_MODULES],
}

impl SwerveOdometry {
    pub fn new(
        gyro_angle: Rotation2d,
        positions: [ModulePosition; NUM_MODULES],
        initial: Pose2d,
    ) -> Self {
        Self {
            pose: initial,
            gyro_offset: initial.rotation - gyro_angle,
            previous_angle: initial.rotation,
            previous_positions: positions,
        }
    }

    pub fn pose(&self) -> Pose2d {
        self.pose
    }

    /// Re-seed the estimate. `positions` and `gyro_angle` are the current readings.
    pub fn reset_position(
        &mut self,
        gyro_angle: Rotation2d,
        positions: [ModulePosition; NUM_MODULES],
        pose: Pose2d,
    ) {
        self.pose = pose;
        self.gyro_offset = pose.rotation - gyro_angle;
        self.previous_angle = pose.rotation;
        self.previous_positions = positions;
    }

    pub fn update(
        &mut self,
        kinematics: &SwerveKinematics,
        gyro_angle: Rotation2d,
        positions: [ModulePosition; NUM_MODULES],
    ) -> Pose2d {
        let angle = gyro_angle + self.gyro_offset;

        let mut twist = kinematics.to_twist(&self.previous_positions, &positions);
        twist.dtheta = angle.delta_from(self.previous_angle).radians();

        let next = self.pose.exp(twist);
        self.pose = Pose2d {
            translation: next.translation,
            rotation: angle,
        };
        self.previous_angle = angle;
        self.previous_positions = positions;
        self.pose
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Translation2d;

    fn kinematics() -> SwerveKinematics {
        SwerveKinematics::new([
            Translation2d::new(0.3, 0.3),
            Translation2d::new(0.3, -0.3),
            Translation2d::new(-0.3, 0.3),
            Translation2d::new(-0.3, -0.3),
        ])
        .unwrap()
    }

    fn all(distance_m: f64, degrees: f64) -> [ModulePosition; NUM_MODULES] {
        [ModulePosition::new(distance_m, Rotation2d::from_degrees(degrees)); NUM_MODULES]
    }

    #[test]
    fn test_straight_line() {
        let kin = kinematics();
        let mut odometry = SwerveOdometry::new(Rotation2d::ZERO, all(0.0, 0.0), Pose2d::default());
        let pose = odometry.update(&kin, Rotation2d::ZERO, all(1.0, 0.0));
        assert!((pose.x() - 1.0).abs() < 1e-9);
        assert!(pose.y().abs() < 1e-9);
    }

    #[test]
    fn test_heading_follows_gyro_not_wheels() {
        let kin = kinematics();
        let mut odometry = SwerveOdometry::new(Rotation2d::ZERO, all(0.0, 0.0), Pose2d::default());
        let pose = odometry.update(&kin, Rotation2d::from_degrees(30.0), all(0.0, 0.0));
        assert!((pose.rotation.degrees() - 30.0).abs() < 1e-9);
        assert!(pose.translation.norm() < 1e-9);
    }

    #[test]
    fn test_robot_frame_travel_is_rotated_into_field() {
        let kin = kinematics();
        let heading = Rotation2d::from_degrees(90.0);
        let start = Pose2d::new(0.0, 0.0, heading);
        let mut odometry = SwerveOdometry::new(heading, all(0.0, 0.0), start);
        // Wheels pointing robot-forward while the robot faces field-left
        let pose = odometry.update(&kin, heading, all(2.0, 0.0));
        assert!(pose.x().abs() < 1e-9);
        assert!((pose.y() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_reset_applies_gyro_offset() {
        let kin = kinematics();
        let mut odometry = SwerveOdometry::new(Rotation2d::ZERO, all(0.0, 0.0), Pose2d::default());
        odometry.update(&kin, Rotation2d::ZERO, all(1.0, 0.0));

        // Gyro reads 45 but the robot is placed facing field-forward
        let pose = Pose2d::new(5.0, 1.0, Rotation2d::ZERO);
        odometry.reset_position(Rotation2d::from_degrees(45.0), all(1.0, 0.0), pose);
        let pose = odometry.pose();
        assert_eq!(pose, Pose2d::new(5.0, 1.0, Rotation2d::ZERO));

        let pose = odometry.update(&kin, Rotation2d::from_degrees(45.0), all(1.5, 0.0));
        assert!((pose.x() - 5.5).abs() < 1e-9);
        assert!(pose.rotation.degrees().abs() < 1e-9);
    }
}
