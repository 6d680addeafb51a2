// Fixed-period software PID, used where no device-side loop applies

use crate::swerve::GainSet;

#[derive(Debug, Clone)]
pub struct PidController {
    kp: f64,
    ki: f64,
    kd: f64,
    /// Seconds between calls to `calculate`
    period: f64,
    setpoint: f64,
    tolerance: f64,
    integral: f64,
    previous_error: Option<f64>,
    last_error: f64,
}

impl PidController {
    pub fn new(gains: GainSet, period: f64) -> Self {
        Self {
            kp: gains.p,
            ki: gains.i,
            kd: gains.d,
            period,
            setpoint: 0.0,
            tolerance: 0.05,
            integral: 0.0,
            previous_error: None,
            last_error: 0.0,
        }
    }

    pub fn set_setpoint(&mut self, setpoint: f64) {
        self.setpoint = setpoint;
    }

    pub fn set_tolerance(&mut self, tolerance: f64) {
        self.tolerance = tolerance;
    }

    /// Whether the last measurement was within tolerance of the setpoint
    pub fn at_setpoint(&self) -> bool {
        self.previous_error.is_some() && self.last_error.abs() <= self.tolerance
    }

    pub fn calculate(&mut self, measurement: f64) -> f64 {
        let error = self.setpoint - measurement;
        self.integral += error * self.period;
        // No derivative kick on the first sample
        let derivative = match self.previous_error {
            Some(previous) => (error - previous) / self.period,
            None => 0.0,
        };
        self.previous_error = Some(error);
        self.last_error = error;

        self.kp * error + self.ki * self.integral + self.kd * derivative
    }

    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.previous_error = None;
        self.last_error = 0.0;
    }
}
