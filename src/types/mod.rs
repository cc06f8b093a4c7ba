pub mod linalg;

pub use linalg::*;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// One accelerometer reading in device-frame units, ordered by arrival.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawAccelerationSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl RawAccelerationSample {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn as_vector(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }

    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Derived record handed to the presenter: raw axes plus the
/// linear-acceleration magnitude.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccelerometerData {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub magnitude: f64,
}

/// A position in the local tracking frame. Seeds the estimator and doubles
/// as the position-fix measurement.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationData {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl LocationData {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn as_vector(&self) -> PositionVec {
        PositionVec::new(self.x, self.y, self.z)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl From<PositionVec> for LocationData {
    fn from(v: PositionVec) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_magnitude() {
        let raw = RawAccelerationSample::new(3.0, 4.0, 0.0);
        assert_eq!(raw.magnitude(), 5.0);
    }

    #[test]
    fn test_location_finiteness() {
        assert!(LocationData::new(1.0, -2.0, 0.5).is_finite());
        assert!(!LocationData::new(f64::NAN, 0.0, 0.0).is_finite());
        assert!(!LocationData::new(0.0, f64::INFINITY, 0.0).is_finite());
    }
}
