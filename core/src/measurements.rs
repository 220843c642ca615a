//! GPS measurement type consumed by the navigation filters.
//!
//! A receiver fix carries ECEF position and velocity together with its own quality
//! indicators. The filters only need the stacked `[position, velocity]` vector, the
//! availability flag and the per-axis accuracies, from which the measurement noise
//! $R = \mathrm{diag}(\sigma_p^2 I_3, \sigma_v^2 I_3)$ is built.

use std::fmt::{self, Display};

use nalgebra::{Matrix6, Vector3, Vector6};

use crate::error::{Result, check_finite, check_non_negative};
use crate::noise::gps_measurement_noise;

/// HDOP reported when the receiver has no fix
pub const NO_FIX_HDOP: f64 = 99.9;

/// GPS position and velocity fix in the ECEF frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GPSMeasurement {
    /// ECEF position in meters
    pub position: Vector3<f64>,
    /// ECEF velocity in m/s
    pub velocity: Vector3<f64>,
    /// Whether the receiver produced a usable fix
    pub available: bool,
    /// Number of satellites tracked
    pub satellites: u32,
    /// Horizontal dilution of precision
    pub hdop: f64,
    /// 1-sigma position accuracy per axis in meters
    pub position_accuracy: f64,
    /// 1-sigma velocity accuracy per axis in m/s
    pub velocity_accuracy: f64,
    /// Measurement time in seconds
    pub timestamp: f64,
}
impl GPSMeasurement {
    /// A fix with typical quality indicators (8 satellites, HDOP 1.2).
    pub fn new(
        position: Vector3<f64>,
        velocity: Vector3<f64>,
        position_accuracy: f64,
        velocity_accuracy: f64,
        timestamp: f64,
    ) -> Self {
        GPSMeasurement {
            position,
            velocity,
            available: true,
            satellites: 8,
            hdop: 1.2,
            position_accuracy,
            velocity_accuracy,
            timestamp,
        }
    }
    /// A report with no fix.
    pub fn unavailable(timestamp: f64) -> Self {
        GPSMeasurement {
            available: false,
            satellites: 0,
            hdop: NO_FIX_HDOP,
            timestamp,
            ..Default::default()
        }
    }
    /// Stacked measurement vector $z = [p, v]$
    pub fn get_vector(&self) -> Vector6<f64> {
        Vector6::new(
            self.position[0],
            self.position[1],
            self.position[2],
            self.velocity[0],
            self.velocity[1],
            self.velocity[2],
        )
    }
    /// Measurement noise covariance $R$ from the accuracy fields
    pub fn get_noise(&self) -> Matrix6<f64> {
        gps_measurement_noise(self.position_accuracy, self.velocity_accuracy)
    }
    /// Check the fix can be fused: finite values and non-negative accuracies.
    pub fn validate(&self) -> Result<()> {
        check_finite("GPS measurement", self.get_vector().iter())?;
        check_non_negative("position_accuracy", self.position_accuracy)?;
        check_non_negative("velocity_accuracy", self.velocity_accuracy)?;
        Ok(())
    }
}
impl Display for GPSMeasurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.available {
            return write!(f, "GPSMeasurement {{ t: {:.2} s, no fix }}", self.timestamp);
        }
        write!(
            f,
            "GPSMeasurement {{ t: {:.2} s, pos: [{:.2}, {:.2}, {:.2}] m, vel: [{:.3}, {:.3}, {:.3}] m/s, sats: {}, hdop: {:.1}, acc: {:.2} m / {:.3} m/s }}",
            self.timestamp,
            self.position[0],
            self.position[1],
            self.position[2],
            self.velocity[0],
            self.velocity[1],
            self.velocity[2],
            self.satellites,
            self.hdop,
            self.position_accuracy,
            self.velocity_accuracy
        )
    }
}
