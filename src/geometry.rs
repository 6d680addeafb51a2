// Planar geometry used by the drive: rotations, translations, poses and twists.
//
// Conventions: x forward, y left, counter-clockwise positive rotation.

use std::f64::consts::{PI, TAU};
use std::ops::{Add, Neg, Sub};

use serde::{Deserialize, Serialize};

/// Wrap an angle in radians into (-pi, pi]
pub fn wrap_radians(angle: f64) -> f64 {
    let r = angle.rem_euclid(TAU);
    if r > PI { r - TAU } else { r }
}

/// A planar rotation stored in radians.
///
/// The stored value is not normalised, so a rotation can carry an unwrapped
/// angle. Use [`Rotation2d::wrapped`] to get the equivalent angle in (-pi, pi].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rotation2d {
    radians: f64,
}

impl Rotation2d {
    pub const ZERO: Rotation2d = Rotation2d { radians: 0.0 };
    pub const HALF_TURN: Rotation2d = Rotation2d { radians: PI };

    pub fn from_radians(radians: f64) -> Self {
        Self { radians }
    }

    pub fn from_degrees(degrees: f64) -> Self {
        Self::from_radians(degrees.to_radians())
    }

    pub fn from_rotations(rotations: f64) -> Self {
        Self::from_radians(rotations * TAU)
    }

    pub fn radians(&self) -> f64 {
        self.radians
    }

    pub fn degrees(&self) -> f64 {
        self.radians.to_degrees()
    }

    pub fn rotations(&self) -> f64 {
        self.radians / TAU
    }

    pub fn cos(&self) -> f64 {
        self.radians.cos()
    }

    pub fn sin(&self) -> f64 {
        self.radians.sin()
    }

    /// Equivalent rotation with the angle in (-pi, pi]
    pub fn wrapped(&self) -> Self {
        Self::from_radians(wrap_radians(self.radians))
    }

    /// Shortest signed angle from `other` to `self`, in (-pi, pi]
    pub fn delta_from(&self, other: Rotation2d) -> Rotation2d {
        (*self - other).wrapped()
    }
}

impl Add for Rotation2d {
    type Output = Rotation2d;

    fn add(self, rhs: Rotation2d) -> Rotation2d {
        Rotation2d::from_radians(self.radians + rhs.radians)
    }
}

impl Sub for Rotation2d {
    type Output = Rotation2d;

    fn sub(self, rhs: Rotation2d) -> Rotation2d {
        Rotation2d::from_radians(self.radians - rhs.radians)
    }
}

impl Neg for Rotation2d {
    type Output = Rotation2d;

    fn neg(self) -> Rotation2d {
        Rotation2d::from_radians(-self.radians)
    }
}

/// A planar translation in meters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Translation2d {
    pub x: f64,
    pub y: f64,
}

impl Translation2d {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn norm(&self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Direction of the vector. Undefined (zero) for the zero vector.
    pub fn angle(&self) -> Rotation2d {
        Rotation2d::from_radians(self.y.atan2(self.x))
    }

    pub fn rotate_by(&self, rotation: Rotation2d) -> Self {
        let (s, c) = (rotation.sin(), rotation.cos());
        Self::new(self.x * c - self.y * s, self.x * s + self.y * c)
    }
}

impl Add for Translation2d {
    type Output = Translation2d;

    fn add(self, rhs: Translation2d) -> Translation2d {
        Translation2d::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Translation2d {
    type Output = Translation2d;

    fn sub(self, rhs: Translation2d) -> Translation2d {
        Translation2d::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// A change in pose expressed in the robot frame at the start of the motion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Twist2d {
    pub dx: f64,
    pub dy: f64,
    pub dtheta: f64,
}

/// Chassis position estimate on the field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose2d {
    pub translation: Translation2d,
    pub rotation: Rotation2d,
}

impl Pose2d {
    pub fn new(x: f64, y: f64, rotation: Rotation2d) -> Self {
        Self {
            translation: Translation2d::new(x, y),
            rotation,
        }
    }

    pub fn x(&self) -> f64 {
        self.translation.x
    }

    pub fn y(&self) -> f64 {
        self.translation.y
    }

    /// Integrate a twist along a constant-curvature arc.
    pub fn exp(&self, twist: Twist2d) -> Pose2d {
        let (dx, dy, dtheta) = (twist.dx, twist.dy, twist.dtheta);
        let (sin_theta, cos_theta) = dtheta.sin_cos();

        // Series expansion near zero rotation keeps the straight-line case exact
        let (s, c) = if dtheta.abs() < 1e-9 {
            (1.0 - dtheta * dtheta / 6.0, 0.5 * dtheta)
        } else {
            (sin_theta / dtheta, (1.0 - cos_theta) / dtheta)
        };

        let local = Translation2d::new(dx * s - dy * c, dx * c + dy * s);

        Pose2d {
            translation: self.translation + local.rotate_by(self.rotation),
            rotation: Rotation2d::from_radians(self.rotation.radians() + dtheta),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < EPS
    }

    #[test]
    fn test_wrap_radians_range() {
        assert!(close(wrap_radians(PI), PI));
        assert!(close(wrap_radians(-PI), PI));
        assert!(close(wrap_radians(3.0 * PI / 2.0), -PI / 2.0));
        assert!(close(wrap_radians(-TAU - 0.25), -0.25));
    }

    #[test]
    fn test_delta_from_takes_short_way() {
        let a = Rotation2d::from_degrees(10.0);
        let b = Rotation2d::from_degrees(350.0);
        assert!((a.delta_from(b).degrees() - 20.0).abs() < 1e-9);
        assert!((b.delta_from(a).degrees() + 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_translation_rotate_quarter_turn() {
        let t = Translation2d::new(1.0, 0.0).rotate_by(Rotation2d::from_degrees(90.0));
        assert!(close(t.x, 0.0));
        assert!(close(t.y, 1.0));
    }

    #[test]
    fn test_pose_exp_straight_and_arc() {
        let start = Pose2d::new(1.0, 2.0, Rotation2d::from_degrees(90.0));
        let moved = start.exp(Twist2d { dx: 1.0, dy: 0.0, dtheta: 0.0 });
        assert!(close(moved.x(), 1.0));
        assert!(close(moved.y(), 3.0));

        // Quarter circle of radius 1 ends at (1, 1) facing left
        let arc = Pose2d::default().exp(Twist2d { dx: PI / 2.0, dy: 0.0, dtheta: PI / 2.0 });
        assert!(close(arc.x(), 1.0));
        assert!(close(arc.y(), 1.0));
        assert!(close(arc.rotation.radians(), PI / 2.0));
    }
}
