//! State estimation for launch vehicles
//!
//! This crate fuses inertial (IMU) and satellite navigation (GPS) measurements into a
//! continuously updated estimate of a launch vehicle's position, velocity, attitude and inertial
//! sensor biases. Everything is expressed in the Earth-centered Earth-fixed (ECEF) frame, which
//! stays valid from the pad through orbital insertion. The estimator consumes a truth-state
//! description and sensor readings and emits a [`NavigationState`] snapshot; how that snapshot
//! is displayed or stored is up to the caller.
//!
//! This crate is primarily built off of three additional dependencies:
//! - [`nalgebra`](https://crates.io/crates/nalgebra): fixed-size matrices for the filter math.
//! - [`nav-types`](https://crates.io/crates/nav-types): reference WGS84/ECEF types used to
//!   validate the geodesy in [earth].
//! - [`rand`](https://crates.io/crates/rand) and [`rand_distr`](https://crates.io/crates/rand_distr):
//!   seedable noise generation for the sensor simulator.
//!
//! ## Crate overview
//!
//! - [earth]: WGS84 constants, ECEF/geodetic conversions, the East-North-Up rotation and
//!   point-mass gravity.
//! - [error]: the [`NavError`] type returned by construction and filter steps.
//! - [kalman]: the 15-state [`kalman::ExtendedKalmanFilter`] and the 6-state
//!   [`kalman::ReducedKalmanFilter`].
//! - [linalg]: fixed-size Gauss-Jordan inversion and the shared Kalman correction kernel.
//! - [measurements]: the GPS fix type.
//! - [noise]: initial covariance, process noise and measurement noise construction.
//! - [sensors]: truth-state propagation and synthetic IMU/GPS measurements.
//! - [sim]: scenario configuration, the closed-loop scenario driver and CSV export.
//!
//! ## State definition
//!
//! The extended filter carries fifteen states:
//!
//! $$
//! x = [p_x, p_y, p_z, v_x, v_y, v_z, \phi, \theta, \psi, b_{a,x}, b_{a,y}, b_{a,z}, b_{g,x}, b_{g,y}, b_{g,z}]
//! $$
//!
//! Where:
//! - $p$ and $v$ are ECEF position (m) and velocity (m/s).
//! - $\phi$, $\theta$ and $\psi$ are roll, pitch and yaw (radians).
//! - $b_a$ and $b_g$ are the accelerometer (m/s^2) and gyroscope (rad/s) biases.
//!
//! The reduced filter keeps only $[p, v]$ and treats acceleration as process noise.
//!
//! ## Prediction model
//!
//! The extended filter uses a linear control model. The IMU input
//! $u = [a, \omega]$ is integrated over the step $dt$:
//!
//! $$
//! x_{k+1} = F x_k + B u_k, \quad F = I + \begin{bmatrix} 0 & I\,dt & 0 \\\\ 0 & 0 & 0 \\\\ 0 & 0 & 0 \end{bmatrix}, \quad
//! B = \begin{bmatrix} 0 & 0 \\\\ I\,dt & 0 \\\\ 0 & I\,dt \\\\ 0 & 0 \end{bmatrix}
//! $$
//!
//! so $a$ must already be a kinematic acceleration. Raw accelerometer output is specific force;
//! [`sensors::compensate_gravity`] adds gravity back before the reading is handed to the filter.
pub mod earth;
pub mod error;
pub mod kalman;
pub mod linalg;
pub mod measurements;
pub mod noise;
pub mod sensors;
pub mod sim;

pub use error::{NavError, Result};

use std::fmt::{self, Debug, Display};

use nalgebra::{DMatrix, DVector, SVector, Vector3};

use crate::earth::{Geodetic, ecef_to_geodetic};
use crate::error::check_finite;
use crate::noise::{ReducedCovariance, STATE_SIZE, StateCovariance};

/// Generic Bayesian navigation filter interface
///
/// Each filter names the control input it propagates with and the measurement it corrects
/// with. Both steps validate their input and leave the filter untouched on error.
pub trait NavigationFilter {
    /// Control input consumed by [`NavigationFilter::predict`]
    type Input;
    /// Observation consumed by [`NavigationFilter::update`]
    type Measurement;

    fn predict(&mut self, input: &Self::Input) -> Result<()>;
    fn update(&mut self, measurement: &Self::Measurement) -> Result<()>;
    fn get_estimate(&self) -> DVector<f64>;
    fn get_certainty(&self) -> DMatrix<f64>;
}

/// IMU sample: acceleration and angular rate.
///
/// Simulated samples carry specific force (what an accelerometer senses). The extended filter
/// expects kinematic acceleration, see [`sensors::compensate_gravity`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct IMUData {
    /// Acceleration in m/s^2
    pub accel: Vector3<f64>,
    /// Angular rate in rad/s
    pub gyro: Vector3<f64>,
    /// Sample time in seconds
    pub timestamp: f64,
}
impl IMUData {
    pub fn new(accel: Vector3<f64>, gyro: Vector3<f64>, timestamp: f64) -> Self {
        IMUData {
            accel,
            gyro,
            timestamp,
        }
    }
    /// Control vector $u = [a, \omega]$
    pub fn get_vector(&self) -> SVector<f64, 6> {
        SVector::<f64, 6>::new(
            self.accel[0],
            self.accel[1],
            self.accel[2],
            self.gyro[0],
            self.gyro[1],
            self.gyro[2],
        )
    }
    pub fn validate(&self) -> Result<()> {
        check_finite("IMU sample", self.get_vector().iter())
    }
}
impl Display for IMUData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IMUData {{ t: {:.3} s, accel: [{:.4}, {:.4}, {:.4}], gyro: [{:.4}, {:.4}, {:.4}] }}",
            self.timestamp,
            self.accel[0],
            self.accel[1],
            self.accel[2],
            self.gyro[0],
            self.gyro[1],
            self.gyro[2]
        )
    }
}
impl TryFrom<&[f64]> for IMUData {
    type Error = NavError;
    /// Six values: accel x, y, z then gyro x, y, z. The timestamp is zero.
    fn try_from(slice: &[f64]) -> Result<Self> {
        if slice.len() != 6 {
            return Err(NavError::StateLengthMismatch {
                expected: 6,
                actual: slice.len(),
            });
        }
        Ok(IMUData {
            accel: Vector3::new(slice[0], slice[1], slice[2]),
            gyro: Vector3::new(slice[3], slice[4], slice[5]),
            timestamp: 0.0,
        })
    }
}
impl From<IMUData> for Vec<f64> {
    fn from(data: IMUData) -> Self {
        data.get_vector().iter().cloned().collect()
    }
}

/// Snapshot of the 15-state navigation solution.
///
/// Produced by [`kalman::ExtendedKalmanFilter::get_navigation_state`]; it is a copy and does not
/// alias filter internals.
#[derive(Clone, Copy, PartialEq)]
pub struct NavigationState {
    /// ECEF position in meters
    pub position: Vector3<f64>,
    /// ECEF velocity in m/s
    pub velocity: Vector3<f64>,
    /// Roll, pitch and yaw in radians
    pub attitude: Vector3<f64>,
    /// Accelerometer bias in m/s^2
    pub accel_bias: Vector3<f64>,
    /// Gyroscope bias in rad/s
    pub gyro_bias: Vector3<f64>,
    /// 15x15 state covariance
    pub covariance: StateCovariance,
    /// Time of the last predict or update in seconds
    pub timestamp: f64,
}
impl Default for NavigationState {
    fn default() -> Self {
        NavigationState {
            position: Vector3::zeros(),
            velocity: Vector3::zeros(),
            attitude: Vector3::zeros(),
            accel_bias: Vector3::zeros(),
            gyro_bias: Vector3::zeros(),
            covariance: StateCovariance::zeros(),
            timestamp: 0.0,
        }
    }
}
impl NavigationState {
    /// Unpack a 15-element state vector.
    pub fn from_state_vector(
        state: &SVector<f64, STATE_SIZE>,
        covariance: StateCovariance,
        timestamp: f64,
    ) -> Self {
        NavigationState {
            position: state.fixed_rows::<3>(0).into_owned(),
            velocity: state.fixed_rows::<3>(3).into_owned(),
            attitude: state.fixed_rows::<3>(6).into_owned(),
            accel_bias: state.fixed_rows::<3>(9).into_owned(),
            gyro_bias: state.fixed_rows::<3>(12).into_owned(),
            covariance,
            timestamp,
        }
    }
    /// Pack into the 15-element state vector
    pub fn to_state_vector(&self) -> SVector<f64, STATE_SIZE> {
        let mut state = SVector::<f64, STATE_SIZE>::zeros();
        state.fixed_rows_mut::<3>(0).copy_from(&self.position);
        state.fixed_rows_mut::<3>(3).copy_from(&self.velocity);
        state.fixed_rows_mut::<3>(6).copy_from(&self.attitude);
        state.fixed_rows_mut::<3>(9).copy_from(&self.accel_bias);
        state.fixed_rows_mut::<3>(12).copy_from(&self.gyro_bias);
        state
    }
    /// Geodetic position of the estimate
    pub fn geodetic(&self) -> Geodetic {
        ecef_to_geodetic(&self.position)
    }
    /// 1-sigma position uncertainty per ECEF axis
    pub fn position_sigma(&self) -> Vector3<f64> {
        Vector3::new(
            self.covariance[(0, 0)].max(0.0).sqrt(),
            self.covariance[(1, 1)].max(0.0).sqrt(),
            self.covariance[(2, 2)].max(0.0).sqrt(),
        )
    }
    /// 1-sigma velocity uncertainty per ECEF axis
    pub fn velocity_sigma(&self) -> Vector3<f64> {
        Vector3::new(
            self.covariance[(3, 3)].max(0.0).sqrt(),
            self.covariance[(4, 4)].max(0.0).sqrt(),
            self.covariance[(5, 5)].max(0.0).sqrt(),
        )
    }
}
impl TryFrom<&[f64]> for NavigationState {
    type Error = NavError;
    /// Fifteen values in state order. The covariance is zero and the timestamp is zero.
    fn try_from(slice: &[f64]) -> Result<Self> {
        if slice.len() != STATE_SIZE {
            return Err(NavError::StateLengthMismatch {
                expected: STATE_SIZE,
                actual: slice.len(),
            });
        }
        let state = SVector::<f64, STATE_SIZE>::from_column_slice(slice);
        Ok(NavigationState::from_state_vector(
            &state,
            StateCovariance::zeros(),
            0.0,
        ))
    }
}
impl Debug for NavigationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavigationState")
            .field("position (m)", &self.position.as_slice())
            .field("velocity (m/s)", &self.velocity.as_slice())
            .field(
                "attitude (roll, pitch, yaw in deg)",
                &format_args!(
                    "[{:.2}, {:.2}, {:.2}]",
                    self.attitude[0].to_degrees(),
                    self.attitude[1].to_degrees(),
                    self.attitude[2].to_degrees()
                ),
            )
            .field("accel_bias (m/s^2)", &self.accel_bias.as_slice())
            .field("gyro_bias (rad/s)", &self.gyro_bias.as_slice())
            .field("covariance diagonal", &self.covariance.diagonal().as_slice())
            .field("timestamp (s)", &self.timestamp)
            .finish()
    }
}
impl Display for NavigationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lla = self.geodetic();
        write!(
            f,
            "NavigationState {{ t: {:.2} s, lat: {:.6} deg, lon: {:.6} deg, alt: {:.1} m, vel: [{:.2}, {:.2}, {:.2}] m/s, attitude: [{:.2}, {:.2}, {:.2}] deg }}",
            self.timestamp,
            lla.latitude_degrees(),
            lla.longitude_degrees(),
            lla.altitude,
            self.velocity[0],
            self.velocity[1],
            self.velocity[2],
            self.attitude[0].to_degrees(),
            self.attitude[1].to_degrees(),
            self.attitude[2].to_degrees()
        )
    }
}

/// Snapshot of the 6-state position/velocity solution.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReducedState {
    /// Position in meters
    pub position: Vector3<f64>,
    /// Velocity in m/s
    pub velocity: Vector3<f64>,
    /// 6x6 state covariance
    pub covariance: ReducedCovariance,
}

/// Wrap an angle to the range $[-\pi, \pi)$ radians
///
/// # Example
/// ```rust
/// use launchnav::wrap_to_pi;
/// use std::f64::consts::PI;
/// let wrapped = wrap_to_pi(3.0 * PI / 2.0);
/// assert!((wrapped + PI / 2.0).abs() < 1e-12);
/// ```
pub fn wrap_to_pi(angle: f64) -> f64 {
    use std::f64::consts::PI;
    (angle + PI).rem_euclid(2.0 * PI) - PI
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_wrap_to_pi() {
        assert_approx_eq!(wrap_to_pi(0.0), 0.0);
        assert_approx_eq!(wrap_to_pi(3.0 * PI / 2.0), -PI / 2.0, 1e-12);
        assert_approx_eq!(wrap_to_pi(-3.0 * PI / 2.0), PI / 2.0, 1e-12);
        assert_approx_eq!(wrap_to_pi(7.0 * PI + 0.1), -PI + 0.1, 1e-9);
        assert_approx_eq!(wrap_to_pi(1.0), 1.0, 1e-12);
    }

    #[test]
    fn imu_from_slice() {
        let imu = IMUData::try_from(&[1.0, 2.0, 3.0, 0.1, 0.2, 0.3][..]).unwrap();
        assert_eq!(imu.accel, Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(imu.gyro, Vector3::new(0.1, 0.2, 0.3));
        let back: Vec<f64> = imu.into();
        assert_eq!(back, vec![1.0, 2.0, 3.0, 0.1, 0.2, 0.3]);

        let err = IMUData::try_from(&[1.0, 2.0][..]).unwrap_err();
        assert_eq!(
            err,
            NavError::StateLengthMismatch {
                expected: 6,
                actual: 2
            }
        );
    }

    #[test]
    fn imu_rejects_non_finite() {
        let imu = IMUData::new(Vector3::new(f64::NAN, 0.0, 0.0), Vector3::zeros(), 0.0);
        assert!(imu.validate().is_err());
    }

    #[test]
    fn navigation_state_vector_layout() {
        let values: Vec<f64> = (0..15).map(|i| i as f64).collect();
        let state = NavigationState::try_from(values.as_slice()).unwrap();
        assert_eq!(state.position, Vector3::new(0.0, 1.0, 2.0));
        assert_eq!(state.velocity, Vector3::new(3.0, 4.0, 5.0));
        assert_eq!(state.attitude, Vector3::new(6.0, 7.0, 8.0));
        assert_eq!(state.accel_bias, Vector3::new(9.0, 10.0, 11.0));
        assert_eq!(state.gyro_bias, Vector3::new(12.0, 13.0, 14.0));
        assert_eq!(state.to_state_vector().as_slice(), values.as_slice());

        assert!(NavigationState::try_from(&values[..9]).is_err());
    }

    #[test]
    fn navigation_state_sigmas() {
        let mut state = NavigationState::default();
        state.covariance[(0, 0)] = 4.0;
        state.covariance[(5, 5)] = 0.25;
        assert_approx_eq!(state.position_sigma()[0], 2.0);
        assert_approx_eq!(state.velocity_sigma()[2], 0.5);
    }

    #[test]
    fn navigation_state_display() {
        let state = NavigationState {
            position: Vector3::new(earth::EQUATORIAL_RADIUS, 0.0, 100.0),
            ..Default::default()
        };
        let text = state.to_string();
        assert!(text.contains("lat:"));
        assert!(text.contains("alt:"));
        let debug = format!("{:?}", state);
        assert!(debug.contains("NavigationState"));
    }
}
