// Motor and sensor devices for the swerve base
//
// Provides:
// - Capability traits the drive core talks to (actuator, absolute encoder, gyro)
// - Feetech STS3215 serial protocol implementation
// - Feetech-backed actuators and encoders sharing one bus
// - IMU-fed gyro and simulated devices

mod driver;
pub mod feetech;
pub mod imu;
pub mod sim;

use crate::geometry::Rotation2d;
use crate::swerve::GainSet;

pub use driver::{FeetechActuator, FeetechEncoder, SharedBus, shared_bus};
pub use feetech::{FeetechBus, FeetechError};
pub use imu::{HeadingFeed, ImuGyro};

/// Errors reported by a device behind one of the capability traits
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Bus error: {0}")]
    Bus(#[from] FeetechError),

    #[error("Device {id} is not connected")]
    Disconnected { id: u8 },

    #[error("Shared bus lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, DeviceError>;

/// Static configuration pushed to an actuator's control loop.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ActuatorConfig {
    pub gains: GainSet,
    pub inverted: bool,
    /// Treat position targets as angles on a circle (steer)
    pub continuous_wrap: bool,
    /// Rotor rotations per mechanism rotation
    pub sensor_to_mechanism_ratio: f64,
    /// Mechanism zero relative to the raw sensor zero, in rotations
    pub offset_rotations: f64,
}

/// A closed-loop motor controller.
///
/// Commands are fire-and-forget; reads return the latest value the device
/// reported.
pub trait Actuator {
    fn apply_configuration(&mut self, config: &ActuatorConfig) -> Result<()>;

    /// Replace only the loop coefficients of an applied configuration
    fn set_gains(&mut self, gains: GainSet) -> Result<()>;

    /// Closed-loop position command, in mechanism rotations
    fn set_position_control(&mut self, target_rotations: f64) -> Result<()>;

    /// Closed-loop velocity command, in rotor rotations per second
    fn set_velocity_control(&mut self, target_rps: f64) -> Result<()>;

    fn stop_motor(&mut self) -> Result<()>;

    /// Rotor velocity in rotations per second
    fn velocity(&mut self) -> Result<f64>;

    /// Cumulative rotor position in rotations
    fn position(&mut self) -> Result<f64>;

    /// Overwrite the cumulative position counter
    fn set_position(&mut self, rotations: f64) -> Result<()>;

    fn is_connected(&self) -> bool;
}

/// A sensor reporting the absolute angle of a module.
pub trait AbsoluteEncoder {
    /// Absolute position in rotations, in [0, 1)
    fn absolute_position(&mut self) -> Result<f64>;

    fn is_connected(&self) -> bool;
}

/// Chassis heading source.
pub trait Gyro {
    /// Counter-clockwise positive heading
    fn heading(&mut self) -> Rotation2d;

    /// Make the current heading read as zero
    fn reset(&mut self);
}

/// Wrap a rotation count into [0, 1)
pub(crate) fn wrap_rotations(rotations: f64) -> f64 {
    let r = rotations.rem_euclid(1.0);
    // rem_euclid can round up to exactly 1.0 for tiny negative inputs
    if r >= 1.0 { 0.0 } else { r }
}
