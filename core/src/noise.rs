//! Noise and covariance construction
//!
//! Builds the initial covariance $P_0$, the process noise $Q(dt)$ and the GPS measurement noise
//! $R$ from physical uncertainty parameters. Matrices are recomputed on every call from the
//! configuration and the time step; only the filter's evolving covariance is ever stored.
//!
//! The 15-state layout is `[position(3), velocity(3), roll, pitch, yaw, accel bias(3),
//! gyro bias(3)]` and the 6-state layout is `[position(3), velocity(3)]`.

use nalgebra::{Matrix6, SMatrix};
use serde::{Deserialize, Serialize};

use crate::error::{Result, check_non_negative};

/// Dimension of the extended navigation state
pub const STATE_SIZE: usize = 15;
/// Dimension of the reduced position/velocity state
pub const REDUCED_STATE_SIZE: usize = 6;

/// 15x15 covariance matrix
pub type StateCovariance = SMatrix<f64, STATE_SIZE, STATE_SIZE>;
/// 6x6 covariance matrix
pub type ReducedCovariance = SMatrix<f64, REDUCED_STATE_SIZE, REDUCED_STATE_SIZE>;

/// Default 1-sigma initial uncertainties for the 15-state filter
pub const DEFAULT_POSITION_SIGMA: f64 = 10.0; // m
pub const DEFAULT_VELOCITY_SIGMA: f64 = 1.0; // m/s
pub const DEFAULT_ATTITUDE_SIGMA: f64 = 0.1; // rad
pub const DEFAULT_ACCEL_BIAS_SIGMA: f64 = 0.1; // m/s^2
pub const DEFAULT_GYRO_BIAS_SIGMA: f64 = 0.01; // rad/s

/// Default reduced-filter initial position variance (m^2)
pub const DEFAULT_REDUCED_POSITION_VARIANCE: f64 = 100.0;
/// Default reduced-filter initial velocity variance (m^2/s^2)
pub const DEFAULT_REDUCED_VELOCITY_VARIANCE: f64 = 1.0;
/// Default reduced-filter acceleration noise standard deviation (m/s^2)
pub const DEFAULT_REDUCED_PROCESS_SIGMA: f64 = 0.5;
/// Default reduced-filter position measurement standard deviation (m)
pub const DEFAULT_REDUCED_POSITION_MEASUREMENT_SIGMA: f64 = 5.0;
/// Default reduced-filter velocity measurement standard deviation (m/s)
pub const DEFAULT_REDUCED_VELOCITY_MEASUREMENT_SIGMA: f64 = 0.5;
/// Smallest time step used to scale reduced-filter process noise (s)
pub const MIN_PROCESS_NOISE_DT: f64 = 1e-6;

/// Physical uncertainty parameters for the 15-state filter.
///
/// Initial values are 1-sigma standard deviations; the covariance diagonal holds their
/// squares. Process values are variance densities: position noise grows with $dt^2$, every
/// other block with $dt$. The bias densities are orders of magnitude smaller so the biases
/// behave as slow random walks.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseModel {
    pub position_sigma: f64,
    pub velocity_sigma: f64,
    pub attitude_sigma: f64,
    pub accel_bias_sigma: f64,
    pub gyro_bias_sigma: f64,
    /// Position variance per $s^2$
    pub position_process: f64,
    /// Velocity variance per second
    pub velocity_process: f64,
    /// Attitude variance per second
    pub attitude_process: f64,
    /// Accelerometer bias variance per second
    pub accel_bias_process: f64,
    /// Gyroscope bias variance per second
    pub gyro_bias_process: f64,
}
impl Default for NoiseModel {
    fn default() -> Self {
        NoiseModel {
            position_sigma: DEFAULT_POSITION_SIGMA,
            velocity_sigma: DEFAULT_VELOCITY_SIGMA,
            attitude_sigma: DEFAULT_ATTITUDE_SIGMA,
            accel_bias_sigma: DEFAULT_ACCEL_BIAS_SIGMA,
            gyro_bias_sigma: DEFAULT_GYRO_BIAS_SIGMA,
            position_process: 1.0,
            velocity_process: 0.1,
            attitude_process: 1e-4,
            accel_bias_process: 1e-6,
            gyro_bias_process: 1e-8,
        }
    }
}
impl NoiseModel {
    /// Check every parameter is finite and non-negative.
    pub fn validate(&self) -> Result<()> {
        check_non_negative("position_sigma", self.position_sigma)?;
        check_non_negative("velocity_sigma", self.velocity_sigma)?;
        check_non_negative("attitude_sigma", self.attitude_sigma)?;
        check_non_negative("accel_bias_sigma", self.accel_bias_sigma)?;
        check_non_negative("gyro_bias_sigma", self.gyro_bias_sigma)?;
        check_non_negative("position_process", self.position_process)?;
        check_non_negative("velocity_process", self.velocity_process)?;
        check_non_negative("attitude_process", self.attitude_process)?;
        check_non_negative("accel_bias_process", self.accel_bias_process)?;
        check_non_negative("gyro_bias_process", self.gyro_bias_process)?;
        Ok(())
    }
    /// Diagonal initial covariance $P_0$
    pub fn initial_covariance(&self) -> StateCovariance {
        block_diagonal([
            self.position_sigma.powi(2),
            self.velocity_sigma.powi(2),
            self.attitude_sigma.powi(2),
            self.accel_bias_sigma.powi(2),
            self.gyro_bias_sigma.powi(2),
        ])
    }
    /// Diagonal process noise $Q(dt)$ for one prediction step
    pub fn process_noise(&self, dt: f64) -> StateCovariance {
        block_diagonal([
            self.position_process * dt * dt,
            self.velocity_process * dt,
            self.attitude_process * dt,
            self.accel_bias_process * dt,
            self.gyro_bias_process * dt,
        ])
    }
}

/// Build a 15x15 diagonal matrix from one value per 3-element block.
fn block_diagonal(blocks: [f64; 5]) -> StateCovariance {
    let mut m = StateCovariance::zeros();
    for (block, value) in blocks.iter().enumerate() {
        for axis in 0..3 {
            m[(3 * block + axis, 3 * block + axis)] = *value;
        }
    }
    m
}

/// GPS measurement noise $R = \mathrm{diag}(\sigma_p^2 I_3, \sigma_v^2 I_3)$ from the receiver's
/// per-axis accuracy estimates.
pub fn gps_measurement_noise(position_accuracy: f64, velocity_accuracy: f64) -> Matrix6<f64> {
    let p = position_accuracy.powi(2);
    let v = velocity_accuracy.powi(2);
    Matrix6::from_diagonal(&nalgebra::Vector6::new(p, p, p, v, v, v))
}

/// Reduced-filter initial covariance $\mathrm{diag}(\sigma_p^2 I_3, \sigma_v^2 I_3)$ from
/// variances.
pub fn reduced_initial_covariance(
    position_variance: f64,
    velocity_variance: f64,
) -> ReducedCovariance {
    Matrix6::from_diagonal(&nalgebra::Vector6::new(
        position_variance,
        position_variance,
        position_variance,
        velocity_variance,
        velocity_variance,
        velocity_variance,
    ))
}

/// Reduced-filter process noise for a constant-velocity model driven by white acceleration
/// noise of standard deviation `sigma`.
///
/// Per axis the position/velocity pair receives
///
/// $$
/// \sigma^2 \begin{bmatrix} \tau^3/3 & \tau^2/2 \\\\ \tau^2/2 & \tau \end{bmatrix},
/// \quad \tau = \max(dt, \epsilon)
/// $$
///
/// with $\epsilon$ = [`MIN_PROCESS_NOISE_DT`], so a vanishing step still inflates the
/// covariance.
pub fn reduced_process_noise(sigma: f64, dt: f64) -> ReducedCovariance {
    let tau = dt.max(MIN_PROCESS_NOISE_DT);
    let q = sigma * sigma;
    let mut m = ReducedCovariance::zeros();
    for axis in 0..3 {
        m[(axis, axis)] = q * tau.powi(3) / 3.0;
        m[(axis, axis + 3)] = q * tau.powi(2) / 2.0;
        m[(axis + 3, axis)] = q * tau.powi(2) / 2.0;
        m[(axis + 3, axis + 3)] = q * tau;
    }
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::{is_symmetric, min_eigenvalue};
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn default_initial_covariance() {
        let p = NoiseModel::default().initial_covariance();
        assert_approx_eq!(p[(0, 0)], 100.0);
        assert_approx_eq!(p[(3, 3)], 1.0);
        assert_approx_eq!(p[(6, 6)], 0.01);
        assert_approx_eq!(p[(9, 9)], 0.01);
        assert_approx_eq!(p[(14, 14)], 1e-4);
        assert_eq!(p[(0, 1)], 0.0);
    }

    #[test]
    fn process_noise_scaling() {
        let model = NoiseModel::default();
        let q1 = model.process_noise(0.1);
        let q2 = model.process_noise(0.2);
        // Position scales with dt^2, the rest with dt
        assert_approx_eq!(q2[(0, 0)] / q1[(0, 0)], 4.0, 1e-12);
        assert_approx_eq!(q2[(4, 4)] / q1[(4, 4)], 2.0, 1e-12);
        assert_approx_eq!(q2[(12, 12)] / q1[(12, 12)], 2.0, 1e-12);
        assert!(q1[(12, 12)] < q1[(9, 9)]);
        assert!(q1[(9, 9)] < q1[(3, 3)]);
    }

    #[test]
    fn validation_rejects_negative() {
        let model = NoiseModel {
            velocity_process: -0.1,
            ..Default::default()
        };
        assert!(model.validate().is_err());
        assert!(NoiseModel::default().validate().is_ok());
    }

    #[test]
    fn gps_noise_from_accuracy() {
        let r = gps_measurement_noise(3.0, 0.2);
        assert_approx_eq!(r[(0, 0)], 9.0);
        assert_approx_eq!(r[(2, 2)], 9.0);
        assert_approx_eq!(r[(5, 5)], 0.04);
    }

    #[test]
    fn reduced_process_noise_is_psd() {
        let q = reduced_process_noise(DEFAULT_REDUCED_PROCESS_SIGMA, 0.1);
        assert!(is_symmetric(&q, 0.0));
        assert!(min_eigenvalue(&q) >= 0.0);
        assert_approx_eq!(q[(3, 3)], 0.025, 1e-12);
    }

    #[test]
    fn reduced_process_noise_floor() {
        let tiny = reduced_process_noise(1.0, 0.0);
        assert_approx_eq!(tiny[(3, 3)], MIN_PROCESS_NOISE_DT, 1e-18);
        assert!(tiny[(0, 0)] > 0.0);
    }
}
