// Live gain tuning for the teleop profile
//
// The operator edits values in an external key/value store; nothing reaches
// the modules until an explicit pull. Autonomous gains are never tuned live.

use std::collections::HashMap;

use tracing::{info, warn};

use crate::messages::TuningValue;
use crate::swerve::{GainProfile, GainRole, GainSet, Swerve};

/// External store of named numbers
pub trait TunableStore {
    fn get(&self, key: &str) -> Option<f64>;
    fn set(&mut self, key: &str, value: f64);
}

/// Store fed from bus updates
#[derive(Debug, Clone, Default)]
pub struct MemoryTunables {
    values: HashMap<String, f64>,
}

impl MemoryTunables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, update: &TuningValue) {
        self.values.insert(update.key.clone(), update.value);
    }
}

impl TunableStore for MemoryTunables {
    fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    fn set(&mut self, key: &str, value: f64) {
        self.values.insert(key.to_string(), value);
    }
}

const TERMS: [&str; 4] = ["P", "I", "D", "V"];

/// Result of one pull
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PullReport {
    /// Roles whose teleop gains changed
    pub updated: Vec<GainRole>,
    /// Whether the change already reached the modules
    pub pushed: bool,
}

pub struct TuningBridge {
    prefix: String,
}

impl TuningBridge {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    /// e.g. "/Tuning/Swerve/Drive P"
    pub fn key(&self, role: GainRole, term: &str) -> String {
        format!("{}/{} {}", self.prefix, role.label(), term)
    }

    /// Every tunable with its current value
    pub fn entries(&self, gains: &GainProfile) -> Vec<TuningValue> {
        GainRole::ALL
            .iter()
            .flat_map(|&role| {
                let set = gains.get(role);
                TERMS
                    .iter()
                    .zip([set.p, set.i, set.d, set.v])
                    .map(move |(term, value)| TuningValue {
                        key: self.key(role, term),
                        value,
                    })
            })
            .collect()
    }

    /// Publish defaults for keys the store does not know yet
    pub fn seed(&self, store: &mut dyn TunableStore, gains: &GainProfile) {
        for entry in self.entries(gains) {
            if store.get(&entry.key).is_none() {
                store.set(&entry.key, entry.value);
            }
        }
    }

    /// Read one role's gains, keeping `current` for missing or non-finite values
    fn read(&self, store: &dyn TunableStore, role: GainRole, current: GainSet) -> GainSet {
        let mut values = [current.p, current.i, current.d, current.v];
        for (value, term) in values.iter_mut().zip(TERMS) {
            let key = self.key(role, term);
            match store.get(&key) {
                Some(v) if v.is_finite() => *value = v,
                Some(v) => warn!("Ignoring non-finite tunable {} = {}", key, v),
                None => {}
            }
        }
        GainSet::new(values[0], values[1], values[2], values[3])
    }

    /// Copy the store into the teleop profile and push what changed
    pub fn pull(&self, store: &dyn TunableStore, swerve: &mut Swerve) -> PullReport {
        let mut report = PullReport::default();
        for role in GainRole::ALL {
            let current = swerve.gains().teleop.get(role);
            let next = self.read(store, role, current);
            if next == current {
                continue;
            }
            report.pushed = swerve.update_teleop_gains(role, next);
            report.updated.push(role);
            info!(
                "Teleop {} gains now P={} I={} D={} V={}",
                role.label(),
                next.p,
                next.i,
                next.d,
                next.v
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::sim_swerve;
    use crate::swerve::DriveGains;

    fn bridge() -> TuningBridge {
        TuningBridge::new("/Tuning/Swerve")
    }

    #[test]
    fn test_keys_and_seed() {
        let gains = DriveGains::default().teleop;
        let mut store = MemoryTunables::new();
        store.set("/Tuning/Swerve/Drive P", 9.0);
        bridge().seed(&mut store, &gains);

        assert_eq!(store.get("/Tuning/Swerve/Drive P"), Some(9.0));
        assert_eq!(store.get("/Tuning/Swerve/Steer D"), Some(gains.steer.d));
        assert_eq!(bridge().entries(&gains).len(), 8);
    }

    #[test]
    fn test_pull_pushes_teleop_gains() {
        let (mut swerve, plant) = sim_swerve();
        swerve.set_tele_pid();
        let mut store = MemoryTunables::new();
        bridge().seed(&mut store, &swerve.gains().teleop);

        store.set("/Tuning/Swerve/Steer P", 42.0);
        let report = bridge().pull(&store, &mut swerve);

        assert_eq!(report.updated, vec![GainRole::Steer]);
        assert!(report.pushed);
        assert_eq!(plant.steer(0).config().gains.p, 42.0);
        assert_eq!(swerve.gains().auto, DriveGains::default().auto);
    }

    #[test]
    fn test_pull_without_changes_is_quiet() {
        let (mut swerve, _plant) = sim_swerve();
        let mut store = MemoryTunables::new();
        bridge().seed(&mut store, &swerve.gains().teleop);
        assert_eq!(bridge().pull(&store, &mut swerve), PullReport::default());
    }

    #[test]
    fn test_pull_in_auto_is_deferred() {
        let (mut swerve, plant) = sim_swerve();
        let mut store = MemoryTunables::new();
        store.apply(&TuningValue {
            key: "/Tuning/Swerve/Drive V".to_string(),
            value: 0.2,
        });

        let report = bridge().pull(&store, &mut swerve);
        assert_eq!(report.updated, vec![GainRole::Drive]);
        assert!(!report.pushed);
        assert_eq!(plant.drive(1).config().gains, DriveGains::default().auto.drive);

        swerve.set_tele_pid();
        assert_eq!(plant.drive(1).config().gains.v, 0.2);
    }

    #[test]
    fn test_non_finite_values_ignored() {
        let (mut swerve, _plant) = sim_swerve();
        let mut store = MemoryTunables::new();
        store.set("/Tuning/Swerve/Drive P", f64::NAN);
        assert!(bridge().pull(&store, &mut swerve).updated.is_empty());
    }
}
