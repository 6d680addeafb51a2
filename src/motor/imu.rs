// Gyro fed by heading samples arriving over the bus
//
// The runtime writes each received IMU yaw into a `HeadingFeed`; the drive
// owns the matching `ImuGyro` and reads the latest value without blocking.

use std::sync::{Arc, Mutex};

use super::Gyro;
use crate::geometry::Rotation2d;

#[derive(Debug, Default)]
struct HeadingCell {
    /// Latest raw yaw, radians CCW positive
    raw: f64,
    samples: u64,
}

/// Writer side, held by whoever receives IMU samples
#[derive(Debug, Clone)]
pub struct HeadingFeed {
    cell: Arc<Mutex<HeadingCell>>,
}

impl HeadingFeed {
    pub fn publish(&self, yaw_radians: f64) {
        let mut cell = self.cell.lock().unwrap_or_else(|e| e.into_inner());
        cell.raw = yaw_radians;
        cell.samples += 1;
    }

    pub fn samples(&self) -> u64 {
        self.cell.lock().unwrap_or_else(|e| e.into_inner()).samples
    }
}

/// Reader side, owned exclusively by the drive
#[derive(Debug)]
pub struct ImuGyro {
    cell: Arc<Mutex<HeadingCell>>,
    zero: f64,
}

impl ImuGyro {
    /// Create a connected gyro/feed pair
    pub fn new() -> (Self, HeadingFeed) {
        let cell = Arc::new(Mutex::new(HeadingCell::default()));
        (
            Self {
                cell: cell.clone(),
                zero: 0.0,
            },
            HeadingFeed { cell },
        )
    }

    fn raw(&self) -> f64 {
        self.cell.lock().unwrap_or_else(|e| e.into_inner()).raw
    }
}

impl Gyro for ImuGyro {
    fn heading(&mut self) -> Rotation2d {
        Rotation2d::from_radians(self.raw() - self.zero)
    }

    fn reset(&mut self) {
        self.zero = self.raw();
    }
}
