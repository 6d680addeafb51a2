// Swerve kinematics for the four-module base
//
// Inverse: chassis velocity (vx, vy, omega) -> per-module (speed, angle).
// Forward: per-module states/deltas -> chassis velocity / twist, least squares.
//
// Each module contributes two rows to the 8x3 inverse matrix:
//   [1, 0, -y_i]   (module x velocity)
//   [0, 1,  x_i]   (module y velocity)
// The forward matrix is its pseudo-inverse (A^T A)^-1 A^T, computed once.

use nalgebra::{SMatrix, SVector, Vector3};

use super::{ChassisSpeeds, ModulePosition, ModuleState, SwerveError, NUM_MODULES};
use crate::geometry::{Rotation2d, Translation2d, Twist2d};

type InverseMatrix = SMatrix<f64, { 2 * NUM_MODULES }, 3>;
type ForwardMatrix = SMatrix<f64, 3, { 2 * NUM_MODULES }>;
type ModuleVector = SVector<f64, { 2 * NUM_MODULES }>;

/// Below this speed a module has no meaningful heading
const SPEED_EPSILON_MPS: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct SwerveKinematics {
    locations: [Translation2d; NUM_MODULES],
    inverse: InverseMatrix,
    forward: ForwardMatrix,
    /// Last commanded angle per module, held when the command is ~zero
    headings: [Rotation2d; NUM_MODULES],
}

impl SwerveKinematics {
    /// Build the kinematics from the module offsets (FL, FR, BL, BR) relative
    /// to the chassis centre.
    pub fn new(locations: [Translation2d; NUM_MODULES]) -> Result<Self, SwerveError> {
        let mut inverse = InverseMatrix::zeros();
        for (i, loc) in locations.iter().enumerate() {
            inverse[(2 * i, 0)] = 1.0;
            inverse[(2 * i, 2)] = -loc.y;
            inverse[(2 * i + 1, 1)] = 1.0;
            inverse[(2 * i + 1, 2)] = loc.x;
        }

        let transpose = inverse.transpose();
        let normal = (transpose * inverse)
            .try_inverse()
            .ok_or(SwerveError::SingularGeometry)?;
        let forward = normal * transpose;

        Ok(Self {
            locations,
            inverse,
            forward,
            headings: [Rotation2d::ZERO; NUM_MODULES],
        })
    }

    pub fn locations(&self) -> &[Translation2d; NUM_MODULES] {
        &self.locations
    }

    /// Convert chassis speeds into module states.
    ///
    /// If every module would be (nearly) stationary, each module keeps its
    /// previously commanded angle with zero speed instead of snapping to an
    /// arbitrary heading.
    pub fn to_module_states(&mut self, speeds: ChassisSpeeds) -> [ModuleState; NUM_MODULES] {
        let chassis = Vector3::new(speeds.vx, speeds.vy, speeds.omega);
        let module_vectors: ModuleVector = self.inverse * chassis;

        let velocities: [Translation2d; NUM_MODULES] = std::array::from_fn(|i| {
            Translation2d::new(module_vectors[2 * i], module_vectors[2 * i + 1])
        });

        if velocities.iter().all(|v| v.norm() < SPEED_EPSILON_MPS) {
            return self.headings.map(|angle| ModuleState::new(0.0, angle));
        }

        let states = velocities.map(|v| ModuleState::new(v.norm(), v.angle()));
        for (heading, state) in self.headings.iter_mut().zip(states.iter()) {
            *heading = state.angle;
        }
        states
    }

    /// Least-squares chassis speeds from measured module states.
    pub fn to_chassis_speeds(&self, states: &[ModuleState; NUM_MODULES]) -> ChassisSpeeds {
        let mut module_vectors = ModuleVector::zeros();
        for (i, state) in states.iter().enumerate() {
            module_vectors[2 * i] = state.speed_mps * state.angle.cos();
            module_vectors[2 * i + 1] = state.speed_mps * state.angle.sin();
        }

        let chassis = self.forward * module_vectors;
        ChassisSpeeds::new(chassis[0], chassis[1], chassis[2])
    }

    /// Least-squares chassis twist between two sets of module positions.
    ///
    /// Each delta uses the travelled distance and the module's end angle.
    pub fn to_twist(
        &self,
        start: &[ModulePosition; NUM_MODULES],
        end: &[ModulePosition; NUM_MODULES],
    ) -> Twist2d {
        let mut module_vectors = ModuleVector::zeros();
        for i in 0..NUM_MODULES {
            let delta = end[i].distance_m - start[i].distance_m;
            module_vectors[2 * i] = delta * end[i].angle.cos();
            module_vectors[2 * i + 1] = delta * end[i].angle.sin();
        }

        let chassis = self.forward * module_vectors;
        Twist2d {
            dx: chassis[0],
            dy: chassis[1],
            dtheta: chassis[2],
        }
    }
}

/// Scale every module speed down by the same factor if any exceeds `max_speed_mps`.
pub fn desaturate(states: &mut [ModuleState; NUM_MODULES], max_speed_mps: f64) {
    let fastest = states
        .iter()
        .map(|s| s.speed_mps.abs())
        .fold(0.0_f64, f64::max);

    if fastest > max_speed_mps && fastest > 0.0 {
        let scale = max_speed_mps / fastest;
        for state in states.iter_mut() {
            state.speed_mps *= scale;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HALF: f64 = 0.3556;
    const EPS: f64 = 1e-6;

    fn square() -> SwerveKinematics {
        SwerveKinematics::new([
            Translation2d::new(HALF, HALF),
            Translation2d::new(HALF, -HALF),
            Translation2d::new(-HALF, HALF),
            Translation2d::new(-HALF, -HALF),
        ])
        .unwrap()
    }

    fn angle_close(a: Rotation2d, b_deg: f64) -> bool {
        a.delta_from(Rotation2d::from_degrees(b_deg)).degrees().abs() < 1e-6
    }

    #[test]
    fn test_forward_only() {
        let mut kin = square();
        let states = kin.to_module_states(ChassisSpeeds::new(1.0, 0.0, 0.0));
        for s in states {
            assert!((s.speed_mps - 1.0).abs() < EPS);
            assert!(angle_close(s.angle, 0.0));
        }
    }

    #[test]
    fn test_translation_matches_direction() {
        let mut kin = square();
        let speeds = ChassisSpeeds::new(0.6, -0.8, 0.0);
        let direction = Translation2d::new(0.6, -0.8).angle().degrees();
        for s in kin.to_module_states(speeds) {
            assert!((s.speed_mps - 1.0).abs() < EPS);
            assert!(angle_close(s.angle, direction));
        }
    }

    #[test]
    fn test_pure_rotation_tangential() {
        let mut kin = square();
        let states = kin.to_module_states(ChassisSpeeds::new(0.0, 0.0, 1.0));
        let expected_speed = HALF * std::f64::consts::SQRT_2;

        // CCW rotation: FL moves back-left, FR forward-left, BL back-right, BR forward-right
        let expected_angles = [135.0, 45.0, -135.0, -45.0];
        for (i, s) in states.iter().enumerate() {
            assert!((s.speed_mps - expected_speed).abs() < EPS);
            assert!((s.speed_mps - 0.503).abs() < 1e-3);
            assert!(
                angle_close(s.angle, expected_angles[i]),
                "module {} at {}",
                i,
                s.angle.degrees()
            );

            // Perpendicular to the radius vector
            let radius = kin.locations()[i];
            let dot = radius.x * s.angle.cos() + radius.y * s.angle.sin();
            assert!(dot.abs() < EPS);
        }
    }

    #[test]
    fn test_zero_command_holds_last_angles() {
        let mut kin = square();
        kin.to_module_states(ChassisSpeeds::new(0.0, 0.0, 1.0));
        let held = kin.to_module_states(ChassisSpeeds::default());
        let expected_angles = [135.0, 45.0, -135.0, -45.0];
        for (i, s) in held.iter().enumerate() {
            assert_eq!(s.speed_mps, 0.0);
            assert!(angle_close(s.angle, expected_angles[i]));
        }
    }

    #[test]
    fn test_round_trip_chassis_speeds() {
        let mut kin = square();
        let cases = [
            ChassisSpeeds::new(1.2, 0.0, 0.0),
            ChassisSpeeds::new(-0.4, 0.9, 0.0),
            ChassisSpeeds::new(0.0, 0.0, -2.0),
            ChassisSpeeds::new(0.7, -1.1, 1.6),
        ];
        for cs in cases {
            let states = kin.to_module_states(cs);
            let back = kin.to_chassis_speeds(&states);
            assert!((back.vx - cs.vx).abs() < EPS);
            assert!((back.vy - cs.vy).abs() < EPS);
            assert!((back.omega - cs.omega).abs() < EPS);
        }
    }

    #[test]
    fn test_twist_from_straight_travel() {
        let kin = square();
        let start = [ModulePosition::default(); NUM_MODULES];
        let end = [ModulePosition::new(0.5, Rotation2d::from_degrees(90.0)); NUM_MODULES];
        let twist = kin.to_twist(&start, &end);
        assert!(twist.dx.abs() < EPS);
        assert!((twist.dy - 0.5).abs() < EPS);
        assert!(twist.dtheta.abs() < EPS);
    }

    #[test]
    fn test_desaturate_preserves_ratios() {
        let mut states = [
            ModuleState::new(4.0, Rotation2d::ZERO),
            ModuleState::new(-2.0, Rotation2d::ZERO),
            ModuleState::new(1.0, Rotation2d::ZERO),
            ModuleState::new(0.0, Rotation2d::ZERO),
        ];
        desaturate(&mut states, 2.0);
        assert!((states[0].speed_mps - 2.0).abs() < EPS);
        assert!((states[1].speed_mps + 1.0).abs() < EPS);
        assert!((states[2].speed_mps - 0.5).abs() < EPS);
    }

    #[test]
    fn test_coincident_modules_rejected() {
        let result = SwerveKinematics::new([Translation2d::default(); NUM_MODULES]);
        assert!(matches!(result, Err(SwerveError::SingularGeometry)));
    }
}
