// PID/feedforward gain sets for the module actuators.

use serde::{Deserialize, Serialize};

/// Closed-loop coefficients for one actuator control loop.
///
/// `v` is velocity feedforward: output per unit of target velocity. It is
/// tuned and reported like the other terms, but neither device backend
/// consumes it: the Feetech servos have no feedforward register and the
/// simulated actuators track their targets exactly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GainSet {
    pub p: f64,
    pub i: f64,
    pub d: f64,
    #[serde(default)]
    pub v: f64,
}

impl GainSet {
    pub const fn new(p: f64, i: f64, d: f64, v: f64) -> Self {
        Self { p, i, d, v }
    }

    pub fn is_finite(&self) -> bool {
        [self.p, self.i, self.d, self.v].iter().all(|g| g.is_finite())
    }
}

/// Which of a module's two actuators a gain set belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GainRole {
    Drive,
    Steer,
}

impl GainRole {
    pub const ALL: [GainRole; 2] = [GainRole::Drive, GainRole::Steer];

    pub fn label(&self) -> &'static str {
        match self {
            GainRole::Drive => "Drive",
            GainRole::Steer => "Steer",
        }
    }
}

/// Gain profile selector, switched at the teleop/autonomous boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GainMode {
    #[default]
    Auto,
    Teleop,
}

/// Drive and steer gains for one operating mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GainProfile {
    pub drive: GainSet,
    pub steer: GainSet,
}

impl GainProfile {
    pub fn get(&self, role: GainRole) -> GainSet {
        match role {
            GainRole::Drive => self.drive,
            GainRole::Steer => self.steer,
        }
    }

    pub fn set(&mut self, role: GainRole, gains: GainSet) {
        match role {
            GainRole::Drive => self.drive = gains,
            GainRole::Steer => self.steer = gains,
        }
    }
}

/// Both operating-mode profiles for the drive.
///
/// Created once from configuration and kept for the life of the process. Only
/// the teleop profile is changed at runtime, through the tuning bridge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveGains {
    pub teleop: GainProfile,
    pub auto: GainProfile,
}

impl DriveGains {
    pub fn profile(&self, mode: GainMode) -> &GainProfile {
        match mode {
            GainMode::Teleop => &self.teleop,
            GainMode::Auto => &self.auto,
        }
    }
}

impl Default for DriveGains {
    fn default() -> Self {
        Self {
            teleop: GainProfile {
                drive: GainSet::new(0.3, 0.0, 0.0, 0.12),
                steer: GainSet::new(30.0, 0.0, 0.5, 0.0),
            },
            auto: GainProfile {
                drive: GainSet::new(0.25, 0.0, 0.0, 0.12),
                steer: GainSet::new(25.0, 0.0, 0.4, 0.0),
            },
        }
    }
}
