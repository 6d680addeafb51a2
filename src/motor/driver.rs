// Feetech-backed swerve devices
//
// A module uses one servo in velocity mode for drive and one in position
// mode for steer. The steer servo's own 12-bit absolute position doubles as
// the module's absolute angle sensor. All servos share a single serial bus.
//
// The servos close their loops internally on P/I/D only. The velocity
// feedforward term of a gain set has no register and is not sent.

use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use super::feetech::{FeetechBus, FeetechError, OperatingMode, STEPS_PER_REVOLUTION};
use super::{AbsoluteEncoder, Actuator, ActuatorConfig, DeviceError, Result, wrap_rotations};
use crate::config::ServoConfig;
use crate::swerve::{GainRole, GainSet};

/// Servo bus shared by every device on the base
pub type SharedBus = Arc<Mutex<FeetechBus>>;

pub fn shared_bus(bus: FeetechBus) -> SharedBus {
    Arc::new(Mutex::new(bus))
}

const STEPS: f64 = STEPS_PER_REVOLUTION as f64;

/// Connection state of one servo.
///
/// Once a servo stops answering, calls fail fast without touching the bus
/// and every `retry_after`-th call tries it again, so a dead servo costs
/// one bus timeout per retry rather than one per call.
#[derive(Debug, Clone, Copy)]
struct Link {
    connected: bool,
    skipped: u32,
    retry_after: u32,
}

impl Link {
    fn new(retry_after: u32) -> Self {
        Self {
            connected: false,
            // first call always reaches the bus
            skipped: retry_after,
            retry_after,
        }
    }

    /// Whether the next call should reach the bus
    fn ready(&mut self) -> bool {
        if self.connected || self.skipped >= self.retry_after {
            self.skipped = 0;
            true
        } else {
            self.skipped += 1;
            false
        }
    }

    fn record(&mut self, ok: bool) {
        self.connected = ok;
    }
}

fn with_bus<T>(
    bus: &SharedBus,
    link: &mut Link,
    id: u8,
    op: impl FnOnce(&mut FeetechBus) -> std::result::Result<T, FeetechError>,
) -> Result<T> {
    if !link.ready() {
        return Err(DeviceError::Disconnected { id });
    }
    let mut guard = bus.lock().map_err(|_| DeviceError::Poisoned)?;
    let result = op(&mut guard);
    link.record(result.is_ok());
    result.map_err(DeviceError::from)
}

/// P, I, D as whole register counts: `gain * scale`, one byte each
fn coefficients(gains: GainSet, scale: f64) -> [u8; 3] {
    [gains.p, gains.i, gains.d].map(|g| (g * scale).round().clamp(0.0, 254.0) as u8)
}

/// Goal velocity register value, and whether `limit` cut it
fn velocity_steps(target_rps: f64, limit: u16) -> (i16, bool) {
    let limit = f64::from(limit.min(i16::MAX as u16));
    let steps = (target_rps * STEPS).round();
    (steps.clamp(-limit, limit) as i16, steps.abs() > limit)
}

/// Goal position register value for a mechanism angle in rotations
fn goal_position_steps(target_rotations: f64, config: &ActuatorConfig) -> u16 {
    let sign = if config.inverted { -1.0 } else { 1.0 };
    let sensor =
        sign * target_rotations * config.sensor_to_mechanism_ratio + config.offset_rotations;
    let sensor = if config.continuous_wrap {
        wrap_rotations(sensor)
    } else {
        sensor.clamp(0.0, 1.0 - 1.0 / STEPS)
    };
    ((sensor * STEPS).round() as u16) % STEPS_PER_REVOLUTION
}

/// Module angle in [0, 1) rotations from a raw steer servo position
fn angle_from_steps(raw: u16, offset_rotations: f64, inverted: bool) -> f64 {
    let sign = if inverted { -1.0 } else { 1.0 };
    wrap_rotations(sign * (f64::from(raw) / STEPS - offset_rotations))
}

/// Shortest signed step difference between two raw positions
fn step_delta(from: u16, to: u16) -> i32 {
    let raw = to as i32 - from as i32;
    let half = STEPS_PER_REVOLUTION as i32 / 2;
    (raw + half).rem_euclid(STEPS_PER_REVOLUTION as i32) - half
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ServoMode {
    Position,
    Velocity,
}

/// One STS3215 servo behind the [`Actuator`] interface
pub struct FeetechActuator {
    bus: SharedBus,
    id: u8,
    mode: ServoMode,
    config: ActuatorConfig,
    link: Link,
    /// Register counts per unit gain
    gain_scale: f64,
    max_velocity_steps: u16,
    configured: bool,
    torque_enabled: bool,
    /// Coefficients last written to the servo
    written: Option<[u8; 3]>,
    /// Whether the last velocity command hit `max_velocity_steps`
    limited: bool,
    /// Last raw position, for multi-turn accumulation
    last_raw: Option<u16>,
    /// Accumulated rotor rotations
    turns: f64,
}

impl FeetechActuator {
    /// Servo driving a wheel (velocity mode)
    pub fn drive(bus: SharedBus, id: u8, servo: &ServoConfig) -> Self {
        Self::new(bus, id, ServoMode::Velocity, servo)
    }

    /// Servo pointing a wheel (position mode)
    pub fn steer(bus: SharedBus, id: u8, servo: &ServoConfig) -> Self {
        Self::new(bus, id, ServoMode::Position, servo)
    }

    fn new(bus: SharedBus, id: u8, mode: ServoMode, servo: &ServoConfig) -> Self {
        let role = match mode {
            ServoMode::Velocity => GainRole::Drive,
            ServoMode::Position => GainRole::Steer,
        };
        Self {
            bus,
            id,
            mode,
            config: ActuatorConfig {
                sensor_to_mechanism_ratio: 1.0,
                ..ActuatorConfig::default()
            },
            link: Link::new(servo.retry_after),
            gain_scale: servo.gain_scale(role),
            max_velocity_steps: servo.max_velocity_steps,
            configured: false,
            torque_enabled: false,
            written: None,
            limited: false,
            last_raw: None,
            turns: 0.0,
        }
    }

    fn sign(&self) -> f64 {
        if self.config.inverted { -1.0 } else { 1.0 }
    }

    /// Write P/I/D if they differ from what the servo already holds
    fn push_gains(&mut self, gains: GainSet) -> Result<()> {
        let id = self.id;
        let counts = coefficients(gains, self.gain_scale);
        if self.written == Some(counts) {
            return Ok(());
        }
        let [p, i, d] = counts;
        debug!("Servo {} coefficients P={} I={} D={}", id, p, i, d);
        with_bus(&self.bus, &mut self.link, id, |bus| bus.set_pid_coefficients(id, p, i, d))?;
        self.written = Some(counts);
        Ok(())
    }

    fn ensure_torque(&mut self) -> Result<()> {
        if !self.torque_enabled {
            let id = self.id;
            with_bus(&self.bus, &mut self.link, id, |bus| bus.enable_torque(id))?;
            self.torque_enabled = true;
        }
        Ok(())
    }

    fn read_raw_position(&mut self) -> Result<u16> {
        let id = self.id;
        with_bus(&self.bus, &mut self.link, id, |bus| bus.present_position(id))
    }
}

impl Actuator for FeetechActuator {
    fn apply_configuration(&mut self, config: &ActuatorConfig) -> Result<()> {
        let id = self.id;
        let mode = match self.mode {
            ServoMode::Position => OperatingMode::Position,
            ServoMode::Velocity => OperatingMode::Velocity,
        };
        self.config = *config;
        self.configured = false;

        let reachable = with_bus(&self.bus, &mut self.link, id, |bus| bus.ping(id))?;
        if !reachable {
            self.link.record(false);
            warn!("Servo {} not responding to ping", id);
            return Err(DeviceError::Disconnected { id });
        }

        with_bus(&self.bus, &mut self.link, id, |bus| bus.set_operating_mode(id, mode))?;
        self.torque_enabled = true;
        self.written = None;
        self.push_gains(config.gains)?;
        self.configured = true;

        info!("Servo {} configured for {:?} control", id, self.mode);
        Ok(())
    }

    fn set_gains(&mut self, gains: GainSet) -> Result<()> {
        self.config.gains = gains;
        if !self.configured {
            let config = self.config;
            return self.apply_configuration(&config);
        }
        self.push_gains(gains)
    }

    fn set_position_control(&mut self, target_rotations: f64) -> Result<()> {
        self.ensure_torque()?;

        let id = self.id;
        let steps = goal_position_steps(target_rotations, &self.config);
        with_bus(&self.bus, &mut self.link, id, |bus| bus.set_goal_position(id, steps))
    }

    fn set_velocity_control(&mut self, target_rps: f64) -> Result<()> {
        self.ensure_torque()?;

        let id = self.id;
        let (steps, limited) = velocity_steps(self.sign() * target_rps, self.max_velocity_steps);
        if limited && !self.limited {
            warn!(
                "Servo {} asked for {:.0} steps/s, limited to {}",
                id,
                target_rps * STEPS,
                self.max_velocity_steps
            );
        }
        self.limited = limited;
        with_bus(&self.bus, &mut self.link, id, |bus| bus.set_goal_velocity(id, steps))
    }

    fn stop_motor(&mut self) -> Result<()> {
        let id = self.id;
        match self.mode {
            ServoMode::Velocity => {
                with_bus(&self.bus, &mut self.link, id, |bus| bus.set_goal_velocity(id, 0))
            }
            ServoMode::Position => {
                with_bus(&self.bus, &mut self.link, id, |bus| bus.disable_torque(id))?;
                self.torque_enabled = false;
                Ok(())
            }
        }
    }

    fn velocity(&mut self) -> Result<f64> {
        let id = self.id;
        let steps = with_bus(&self.bus, &mut self.link, id, |bus| bus.present_velocity(id))?;
        Ok(self.sign() * steps as f64 / STEPS)
    }

    fn position(&mut self) -> Result<f64> {
        let raw = self.read_raw_position()?;
        if let Some(last) = self.last_raw {
            self.turns += self.sign() * step_delta(last, raw) as f64 / STEPS;
        }
        self.last_raw = Some(raw);
        Ok(self.turns)
    }

    fn set_position(&mut self, rotations: f64) -> Result<()> {
        self.last_raw = Some(self.read_raw_position()?);
        self.turns = rotations;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.link.connected
    }
}

/// The steer servo's position register read as an absolute angle sensor
pub struct FeetechEncoder {
    bus: SharedBus,
    id: u8,
    /// Raw reading when the wheel points straight ahead, in rotations
    offset_rotations: f64,
    /// Matches the steer actuator's inversion
    inverted: bool,
    link: Link,
}

impl FeetechEncoder {
    pub fn new(
        bus: SharedBus,
        id: u8,
        offset_rotations: f64,
        inverted: bool,
        servo: &ServoConfig,
    ) -> Self {
        Self {
            bus,
            id,
            offset_rotations,
            inverted,
            link: Link::new(servo.retry_after),
        }
    }
}

impl AbsoluteEncoder for FeetechEncoder {
    fn absolute_position(&mut self) -> Result<f64> {
        let id = self.id;
        let raw = with_bus(&self.bus, &mut self.link, id, |bus| bus.present_position(id))?;
        Ok(angle_from_steps(raw, self.offset_rotations, self.inverted))
    }

    fn is_connected(&self) -> bool {
        self.link.connected
    }
}
