// Outbound telemetry and passive operator alerts
//
// The drive writes named samples into a per-cycle frame; the runtime
// publishes the frame and does not care whether anyone listens.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TelemetryValue {
    Number(f64),
    Text(String),
    Flag(bool),
}

/// Sink for named samples
pub trait Telemetry {
    fn record(&mut self, key: &str, value: TelemetryValue);

    fn number(&mut self, key: &str, value: f64) {
        self.record(key, TelemetryValue::Number(value));
    }

    fn text(&mut self, key: &str, value: &str) {
        self.record(key, TelemetryValue::Text(value.to_string()));
    }

    fn flag(&mut self, key: &str, value: bool) {
        self.record(key, TelemetryValue::Flag(value));
    }
}

/// Samples collected during one cycle
#[derive(Debug, Clone, Default, Serialize)]
pub struct TelemetryFrame {
    pub cycle: u64,
    pub samples: BTreeMap<String, TelemetryValue>,
}

impl TelemetryFrame {
    pub fn new(cycle: u64) -> Self {
        Self {
            cycle,
            samples: BTreeMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&TelemetryValue> {
        self.samples.get(key)
    }

    pub fn get_number(&self, key: &str) -> Option<f64> {
        match self.samples.get(key) {
            Some(TelemetryValue::Number(n)) => Some(*n),
            _ => None,
        }
    }
}

impl Telemetry for TelemetryFrame {
    fn record(&mut self, key: &str, value: TelemetryValue) {
        self.samples.insert(key.to_string(), value);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Error,
    Warning,
}

/// A persistent condition shown to the operator while active.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub text: String,
    pub level: AlertLevel,
    pub active: bool,
}

impl Alert {
    pub fn new(text: impl Into<String>, level: AlertLevel) -> Self {
        Self {
            text: text.into(),
            level,
            active: false,
        }
    }

    /// Update the condition, logging only on transitions
    pub fn set(&mut self, active: bool) {
        if active == self.active {
            return;
        }
        self.active = active;
        if active {
            warn!("Alert raised: {}", self.text);
        } else {
            info!("Alert cleared: {}", self.text);
        }
    }
}
