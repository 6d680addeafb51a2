// Swerve drive core
//
// Provides:
// - Module state types and angle optimisation
// - Chassis kinematics (inverse, least-squares forward, desaturation)
// - Per-module controller over the device traits
// - Odometry and the chassis-level coordinator

mod drive;
mod gains;
mod kinematics;
mod module;
mod odometry;
mod state;

pub use drive::Swerve;
pub use gains::{DriveGains, GainMode, GainProfile, GainRole, GainSet};
pub use kinematics::{SwerveKinematics, desaturate};
pub use module::{ModuleHardware, ModuleSetpoint, SwerveModule};
pub use odometry::SwerveOdometry;
pub use state::{ChassisSpeeds, ModulePosition, ModuleState};

/// Corners on the chassis
pub const NUM_MODULES: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum SwerveError {
    #[error("Module locations do not determine a chassis motion")]
    SingularGeometry,
}
