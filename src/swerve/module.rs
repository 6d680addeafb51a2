// One swerve corner: drive actuator, steer actuator, absolute angle sensor.
//
// Device faults never reach the caller. A failed read falls back to the last
// value the device reported, a failed command is dropped, and the matching
// "Disconnected ..." alert is raised until the device answers again.

use serde::Serialize;
use tracing::debug;

use super::{GainRole, GainSet, ModulePosition, ModuleState};
use crate::config::{MechanismConfig, ModuleConfig};
use crate::geometry::{Rotation2d, Translation2d};
use crate::motor::{AbsoluteEncoder, Actuator, ActuatorConfig};
use crate::telemetry::{Alert, AlertLevel, Telemetry};

/// Devices owned by one module
pub struct ModuleHardware {
    pub drive: Box<dyn Actuator + Send>,
    pub steer: Box<dyn Actuator + Send>,
    pub encoder: Box<dyn AbsoluteEncoder + Send>,
}

/// Values from the latest `set_state`, for telemetry
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ModuleSetpoint {
    pub drive_set_rps: f64,
    pub steer_set_rotations: f64,
    pub desired: ModuleState,
    pub optimized: ModuleState,
}

struct ModuleAlerts {
    drive: Alert,
    steer: Alert,
    encoder: Alert,
}

fn disconnect_alert(device: &str, id: u8) -> Alert {
    Alert::new(format!("Disconnected {} {}", device, id), AlertLevel::Error)
}

pub struct SwerveModule {
    name: String,
    location: Translation2d,
    hw: ModuleHardware,
    drive_config: ActuatorConfig,
    steer_config: ActuatorConfig,
    /// Drive motor rotations per meter of wheel travel
    rotations_per_meter: f64,

    // Last-known sensor values
    angle: Rotation2d,
    drive_rps: f64,
    drive_rotations: f64,

    setpoint: ModuleSetpoint,
    alerts: ModuleAlerts,
}

impl SwerveModule {
    /// Configure the devices with the given starting gains.
    ///
    /// A device that fails to configure is alarmed and the module still comes
    /// up. A servo device retries its configuration on the next gain push.
    pub fn new(
        config: &ModuleConfig,
        mechanism: &MechanismConfig,
        hw: ModuleHardware,
        drive_gains: GainSet,
        steer_gains: GainSet,
    ) -> Self {
        let drive_config = ActuatorConfig {
            gains: drive_gains,
            inverted: mechanism.drive_inverted,
            continuous_wrap: false,
            sensor_to_mechanism_ratio: mechanism.drive_gear_ratio,
            offset_rotations: 0.0,
        };
        let steer_config = ActuatorConfig {
            gains: steer_gains,
            inverted: mechanism.steer_inverted,
            continuous_wrap: true,
            sensor_to_mechanism_ratio: mechanism.steer_gear_ratio,
            offset_rotations: config.encoder_offset_rotations,
        };

        let mut module = Self {
            name: config.name.clone(),
            location: config.location(),
            hw,
            drive_config,
            steer_config,
            rotations_per_meter: mechanism.drive_gear_ratio / mechanism.meters_per_rev,
            angle: Rotation2d::ZERO,
            drive_rps: 0.0,
            drive_rotations: 0.0,
            setpoint: ModuleSetpoint::default(),
            alerts: ModuleAlerts {
                drive: disconnect_alert("drive motor", config.drive_id),
                steer: disconnect_alert("steer motor", config.steer_id),
                encoder: disconnect_alert("encoder", config.encoder_id),
            },
        };

        let result = module.hw.drive.apply_configuration(&module.drive_config);
        module.absorb("drive configure", result);
        let result = module.hw.steer.apply_configuration(&module.steer_config);
        module.absorb("steer configure", result);

        module.read_angle();
        module.refresh_alerts();
        module
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> Translation2d {
        self.location
    }

    fn absorb<T>(&self, what: &str, result: crate::motor::Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                debug!("{} {} failed: {}", self.name, what, e);
                None
            }
        }
    }

    fn read_angle(&mut self) -> Rotation2d {
        let result = self.hw.encoder.absolute_position();
        if let Some(rotations) = self.absorb("encoder read", result) {
            self.angle = Rotation2d::from_rotations(rotations).wrapped();
        }
        self.angle
    }

    /// Drive the module toward `desired`, optimised against the measured angle.
    pub fn set_state(&mut self, desired: ModuleState) {
        let current = self.read_angle();
        let optimized = desired.optimize(current);

        let steer_set_rotations = optimized.angle.rotations();
        let result = self.hw.steer.set_position_control(steer_set_rotations);
        self.absorb("steer command", result);

        let drive_set_rps = optimized.speed_mps * self.rotations_per_meter;
        let result = self.hw.drive.set_velocity_control(drive_set_rps);
        self.absorb("drive command", result);

        self.setpoint = ModuleSetpoint {
            drive_set_rps,
            steer_set_rotations,
            desired,
            optimized,
        };
    }

    /// Measured wheel speed and angle
    pub fn state(&mut self) -> ModuleState {
        let angle = self.read_angle();
        let result = self.hw.drive.velocity();
        if let Some(rps) = self.absorb("drive velocity read", result) {
            self.drive_rps = rps;
        }
        ModuleState::new(self.drive_rps / self.rotations_per_meter, angle)
    }

    /// Cumulative wheel travel and angle, for odometry
    pub fn position(&mut self) -> ModulePosition {
        let angle = self.read_angle();
        let result = self.hw.drive.position();
        if let Some(rotations) = self.absorb("drive position read", result) {
            self.drive_rotations = rotations;
        }
        ModulePosition::new(self.drive_rotations / self.rotations_per_meter, angle)
    }

    pub fn stop(&mut self) {
        let result = self.hw.steer.stop_motor();
        self.absorb("steer stop", result);
        let result = self.hw.drive.stop_motor();
        self.absorb("drive stop", result);
    }

    /// Push new loop coefficients; used from the next command onward.
    ///
    /// Only the coefficients change. Mode and torque are left alone.
    pub fn set_gains(&mut self, role: GainRole, gains: GainSet) {
        let (device, config) = match role {
            GainRole::Drive => (&mut self.hw.drive, &mut self.drive_config),
            GainRole::Steer => (&mut self.hw.steer, &mut self.steer_config),
        };
        config.gains = gains;
        let result = device.set_gains(gains);
        self.absorb("gain push", result);
    }

    pub fn gains(&self, role: GainRole) -> GainSet {
        match role {
            GainRole::Drive => self.drive_config.gains,
            GainRole::Steer => self.steer_config.gains,
        }
    }

    /// Zero the drive distance counter. The absolute angle is untouched.
    pub fn reset_position(&mut self) {
        let result = self.hw.drive.set_position(0.0);
        if self.absorb("drive position reset", result).is_some() {
            self.drive_rotations = 0.0;
        }
    }

    /// Re-evaluate device connection alerts
    pub fn refresh_alerts(&mut self) {
        self.alerts.drive.set(!self.hw.drive.is_connected());
        self.alerts.steer.set(!self.hw.steer.is_connected());
        self.alerts.encoder.set(!self.hw.encoder.is_connected());
    }

    pub fn alerts(&self) -> [&Alert; 3] {
        [&self.alerts.drive, &self.alerts.steer, &self.alerts.encoder]
    }

    pub fn setpoint(&self) -> ModuleSetpoint {
        self.setpoint
    }

    /// Last-known values only; does not touch the bus
    pub fn log(&self, telemetry: &mut dyn Telemetry) {
        let key = |field: &str| format!("Swerve/{}/{}", self.name, field);
        telemetry.number(&key("drive actual speed"), self.drive_rps);
        telemetry.number(&key("drive set speed"), self.setpoint.drive_set_rps);
        telemetry.number(&key("steer actual angle"), self.angle.rotations());
        telemetry.number(&key("steer set angle"), self.setpoint.steer_set_rotations);
        telemetry.number(
            &key("desired state after optimize"),
            self.setpoint.optimized.angle.rotations(),
        );
    }
}
