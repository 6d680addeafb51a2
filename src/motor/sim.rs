// Simulated devices
//
// Each simulated actuator tracks its command instantly. A `SimPlant` advances
// the wheel odometers and the chassis yaw so the whole drive can run without a
// bus attached.

use std::sync::{Arc, Mutex};

use super::{
    AbsoluteEncoder, Actuator, ActuatorConfig, DeviceError, HeadingFeed, ImuGyro, Result,
    wrap_rotations,
};
use crate::config::RobotConfig;
use crate::geometry::Rotation2d;
use crate::swerve::{
    GainSet, ModuleHardware, ModuleState, NUM_MODULES, SwerveError, SwerveKinematics,
};

#[derive(Debug)]
struct SimMotorState {
    id: u8,
    connected: bool,
    config: ActuatorConfig,
    /// Full configuration passes applied so far
    configurations: u32,
    /// Mechanism rotations for steer, rotor rotations for drive
    position: f64,
    /// Rotor rotations per second
    velocity: f64,
}

/// Test-side view of a simulated motor
#[derive(Debug, Clone)]
pub struct SimMotorHandle {
    state: Arc<Mutex<SimMotorState>>,
}

impl SimMotorHandle {
    fn with<T>(&self, f: impl FnOnce(&mut SimMotorState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    pub fn id(&self) -> u8 {
        self.with(|s| s.id)
    }

    pub fn position(&self) -> f64 {
        self.with(|s| s.position)
    }

    pub fn set_position(&self, rotations: f64) {
        self.with(|s| s.position = rotations)
    }

    pub fn velocity(&self) -> f64 {
        self.with(|s| s.velocity)
    }

    pub fn config(&self) -> ActuatorConfig {
        self.with(|s| s.config)
    }

    pub fn configurations(&self) -> u32 {
        self.with(|s| s.configurations)
    }

    pub fn is_connected(&self) -> bool {
        self.with(|s| s.connected)
    }

    pub fn set_connected(&self, connected: bool) {
        self.with(|s| s.connected = connected)
    }

    /// Integrate velocity into position
    pub fn advance(&self, dt: f64) {
        self.with(|s| s.position += s.velocity * dt)
    }
}

pub struct SimActuator {
    handle: SimMotorHandle,
}

impl SimActuator {
    pub fn new(id: u8) -> (Self, SimMotorHandle) {
        let handle = SimMotorHandle {
            state: Arc::new(Mutex::new(SimMotorState {
                id,
                connected: true,
                config: ActuatorConfig::default(),
                configurations: 0,
                position: 0.0,
                velocity: 0.0,
            })),
        };
        (Self { handle: handle.clone() }, handle)
    }

    fn online<T>(&self, f: impl FnOnce(&mut SimMotorState) -> T) -> Result<T> {
        self.handle.with(|s| {
            if s.connected {
                Ok(f(s))
            } else {
                Err(DeviceError::Disconnected { id: s.id })
            }
        })
    }
}

impl Actuator for SimActuator {
    fn apply_configuration(&mut self, config: &ActuatorConfig) -> Result<()> {
        self.online(|s| {
            s.config = *config;
            s.configurations += 1;
        })
    }

    fn set_gains(&mut self, gains: GainSet) -> Result<()> {
        self.online(|s| s.config.gains = gains)
    }

    fn set_position_control(&mut self, target_rotations: f64) -> Result<()> {
        self.online(|s| {
            s.position = target_rotations;
            s.velocity = 0.0;
        })
    }

    fn set_velocity_control(&mut self, target_rps: f64) -> Result<()> {
        self.online(|s| s.velocity = target_rps)
    }

    fn stop_motor(&mut self) -> Result<()> {
        self.online(|s| s.velocity = 0.0)
    }

    fn velocity(&mut self) -> Result<f64> {
        self.online(|s| s.velocity)
    }

    fn position(&mut self) -> Result<f64> {
        self.online(|s| s.position)
    }

    fn set_position(&mut self, rotations: f64) -> Result<()> {
        self.online(|s| s.position = rotations)
    }

    fn is_connected(&self) -> bool {
        self.handle.is_connected()
    }
}

/// Absolute angle read from a simulated steer motor
pub struct SimEncoder {
    motor: SimMotorHandle,
}

impl SimEncoder {
    pub fn new(motor: SimMotorHandle) -> Self {
        Self { motor }
    }
}

impl AbsoluteEncoder for SimEncoder {
    fn absolute_position(&mut self) -> Result<f64> {
        if !self.motor.is_connected() {
            return Err(DeviceError::Disconnected { id: self.motor.id() });
        }
        Ok(wrap_rotations(self.motor.position()))
    }

    fn is_connected(&self) -> bool {
        self.motor.is_connected()
    }
}

/// Moves the simulated chassis according to what the modules are commanded
pub struct SimPlant {
    drives: [SimMotorHandle; NUM_MODULES],
    steers: [SimMotorHandle; NUM_MODULES],
    kinematics: SwerveKinematics,
    rotations_per_meter: f64,
    yaw: f64,
    feed: HeadingFeed,
}

/// Everything needed to build a drive on simulated devices
pub struct SimDevices {
    pub plant: SimPlant,
    pub hardware: [ModuleHardware; NUM_MODULES],
    pub gyro: ImuGyro,
}

impl SimPlant {
    pub fn build(config: &RobotConfig) -> std::result::Result<SimDevices, SwerveError> {
        let kinematics = SwerveKinematics::new(config.modules.each_ref().map(|m| m.location()))?;

        let mut drives = Vec::with_capacity(NUM_MODULES);
        let mut steers = Vec::with_capacity(NUM_MODULES);
        let hardware = std::array::from_fn(|i| {
            let module = &config.modules[i];
            let (drive, drive_handle) = SimActuator::new(module.drive_id);
            let (steer, steer_handle) = SimActuator::new(module.steer_id);
            let encoder = SimEncoder::new(steer_handle.clone());
            drives.push(drive_handle);
            steers.push(steer_handle);
            ModuleHardware {
                drive: Box::new(drive),
                steer: Box::new(steer),
                encoder: Box::new(encoder),
            }
        });

        let (gyro, feed) = ImuGyro::new();
        feed.publish(0.0);

        let plant = SimPlant {
            drives: std::array::from_fn(|i| drives[i].clone()),
            steers: std::array::from_fn(|i| steers[i].clone()),
            kinematics,
            rotations_per_meter: config.mechanism.drive_gear_ratio
                / config.mechanism.meters_per_rev,
            yaw: 0.0,
            feed,
        };

        Ok(SimDevices { plant, hardware, gyro })
    }

    pub fn drive(&self, index: usize) -> &SimMotorHandle {
        &self.drives[index]
    }

    pub fn steer(&self, index: usize) -> &SimMotorHandle {
        &self.steers[index]
    }

    pub fn yaw(&self) -> f64 {
        self.yaw
    }

    pub fn set_yaw(&mut self, yaw_radians: f64) {
        self.yaw = yaw_radians;
        self.feed.publish(yaw_radians);
    }

    pub fn step(&mut self, dt: f64) {
        let states: [ModuleState; NUM_MODULES] = std::array::from_fn(|i| {
            ModuleState::new(
                self.drives[i].velocity() / self.rotations_per_meter,
                Rotation2d::from_rotations(self.steers[i].position()),
            )
        });
        let speeds = self.kinematics.to_chassis_speeds(&states);

        for drive in &self.drives {
            drive.advance(dt);
        }
        self.set_yaw(self.yaw + speeds.omega * dt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::Gyro;

    #[test]
    fn test_disconnected_actuator_rejects_commands() {
        let (mut actuator, handle) = SimActuator::new(9);
        actuator.set_velocity_control(2.0).unwrap();
        handle.set_connected(false);

        assert!(matches!(
            actuator.set_velocity_control(5.0),
            Err(DeviceError::Disconnected { id: 9 })
        ));
        assert_eq!(handle.velocity(), 2.0);
        assert!(!actuator.is_connected());
    }

    #[test]
    fn test_encoder_wraps_steer_position() {
        let (_, handle) = SimActuator::new(2);
        handle.set_position(-0.25);
        let mut encoder = SimEncoder::new(handle);
        assert!((encoder.absolute_position().unwrap() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_plant_integrates_rotation() {
        let config = RobotConfig::default();
        let SimDevices {
            mut plant,
            mut hardware,
            mut gyro,
        } = SimPlant::build(&config).unwrap();

        // Point every wheel tangentially and spin
        let locations = config.modules.each_ref().map(|m| m.location());
        let mut kinematics = SwerveKinematics::new(locations).unwrap();
        let states = kinematics.to_module_states(crate::swerve::ChassisSpeeds::new(0.0, 0.0, 1.0));
        let m = &config.mechanism;
        let rotations_per_meter = m.drive_gear_ratio / m.meters_per_rev;
        for (hw, state) in hardware.iter_mut().zip(states) {
            hw.steer.set_position_control(state.angle.rotations()).unwrap();
            hw.drive.set_velocity_control(state.speed_mps * rotations_per_meter).unwrap();
        }

        for _ in 0..50 {
            plant.step(0.02);
        }
        assert!((plant.yaw() - 1.0).abs() < 1e-9);
        assert!((gyro.heading().radians() - 1.0).abs() < 1e-9);
    }
}
