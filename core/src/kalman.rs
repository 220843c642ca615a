//! Kalman-style navigation filters (15-state EKF and 6-state reduced filter)
//!
//! Both filters are owned structs holding fixed-size `nalgebra` state vectors and covariance
//! matrices. `predict` and `update` mutate the filter in place through `&mut self`, validate
//! their inputs first and leave the filter untouched when validation fails. The measurement
//! correction for both variants is the shared [`kalman_correct`] kernel, whose innovation
//! covariance inverse comes from the Gauss-Jordan routine in [`crate::linalg`].

use std::fmt::{self, Debug, Display};

use log::{debug, trace, warn};
use nalgebra::{DMatrix, DVector, Matrix6, SMatrix, SVector, Vector3, Vector6};
use serde::{Deserialize, Serialize};

use crate::error::{Result, check_finite, check_non_negative, check_time_step};
use crate::linalg::{kalman_correct, symmetrize};
use crate::measurements::GPSMeasurement;
use crate::noise::{
    DEFAULT_REDUCED_POSITION_MEASUREMENT_SIGMA, DEFAULT_REDUCED_POSITION_VARIANCE,
    DEFAULT_REDUCED_PROCESS_SIGMA, DEFAULT_REDUCED_VELOCITY_MEASUREMENT_SIGMA,
    DEFAULT_REDUCED_VELOCITY_VARIANCE, NoiseModel, REDUCED_STATE_SIZE, ReducedCovariance,
    STATE_SIZE, StateCovariance, reduced_initial_covariance, reduced_process_noise,
};
use crate::{IMUData, NavigationFilter, NavigationState, ReducedState, wrap_to_pi};

/// Default integration step in seconds
pub const DEFAULT_DT: f64 = 0.1;

/// Dimension of the IMU control vector
const INPUT_SIZE: usize = 6;
/// Dimension of the GPS measurement vector
const MEASUREMENT_SIZE: usize = 6;

type StateVector = SVector<f64, STATE_SIZE>;

/// Initial estimate for the extended filter
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct InitialState {
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
}
impl InitialState {
    /// Position and velocity with level attitude and zero biases
    pub fn new(position: Vector3<f64>, velocity: Vector3<f64>) -> Self {
        InitialState {
            position,
            velocity,
            ..Default::default()
        }
    }
    fn to_state_vector(self) -> StateVector {
        NavigationState {
            position: self.position,
            velocity: self.velocity,
            attitude: self.attitude,
            accel_bias: self.accel_bias,
            gyro_bias: self.gyro_bias,
            ..Default::default()
        }
        .to_state_vector()
    }
}

/// Extended filter configuration
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtendedFilterConfig {
    /// Integration step in seconds
    pub dt: f64,
    /// Initial and process noise parameters
    pub noise: NoiseModel,
}
impl Default for ExtendedFilterConfig {
    fn default() -> Self {
        ExtendedFilterConfig {
            dt: DEFAULT_DT,
            noise: NoiseModel::default(),
        }
    }
}
impl ExtendedFilterConfig {
    pub fn validate(&self) -> Result<()> {
        check_time_step(self.dt)?;
        self.noise.validate()
    }
}

/// State transition $F = I + (\text{position} \leftarrow \text{velocity})\,dt$
pub fn transition_matrix(dt: f64) -> StateCovariance {
    let mut f = StateCovariance::identity();
    for axis in 0..3 {
        f[(axis, 3 + axis)] = dt;
    }
    f
}

/// Control matrix $B$: velocity from acceleration and attitude from angular rate, both $\cdot dt$
pub fn control_matrix(dt: f64) -> SMatrix<f64, STATE_SIZE, INPUT_SIZE> {
    let mut b = SMatrix::<f64, STATE_SIZE, INPUT_SIZE>::zeros();
    for axis in 0..3 {
        b[(3 + axis, axis)] = dt;
        b[(6 + axis, 3 + axis)] = dt;
    }
    b
}

/// Observation matrix $H$ selecting position and velocity
pub fn observation_matrix() -> SMatrix<f64, MEASUREMENT_SIZE, STATE_SIZE> {
    let mut h = SMatrix::<f64, MEASUREMENT_SIZE, STATE_SIZE>::zeros();
    for i in 0..MEASUREMENT_SIZE {
        h[(i, i)] = 1.0;
    }
    h
}

/// Fifteen-state extended Kalman filter fusing IMU and GPS.
///
/// State order: `[position(3), velocity(3), roll, pitch, yaw, accel bias(3), gyro bias(3)]`.
///
/// # Predict
///
/// $$
/// \begin{aligned}
/// x &\leftarrow F x + B u \\\\
/// P &\leftarrow F P F^T + Q(dt)
/// \end{aligned}
/// $$
///
/// with $u = [a, \omega]$ from the IMU sample. Bias states propagate as random walks.
///
/// # Update
///
/// A GPS report without a fix is ignored. Otherwise $H$ selects position and velocity,
/// $R = \mathrm{diag}(\sigma^2)$ comes from the report's accuracy fields and the standard
/// correction $K = P H^T S^{-1}$, $x \leftarrow x + K y$, $P \leftarrow (I - K H) P$ is applied.
///
/// # Example
///
/// ```rust
/// use launchnav::NavigationFilter;
/// use launchnav::kalman::{ExtendedFilterConfig, ExtendedKalmanFilter, InitialState};
/// use launchnav::IMUData;
/// use nalgebra::Vector3;
///
/// let initial = InitialState::new(Vector3::new(6378137.0, 0.0, 0.0), Vector3::zeros());
/// let mut ekf = ExtendedKalmanFilter::new(initial, ExtendedFilterConfig::default()).unwrap();
/// let imu = IMUData::new(Vector3::new(0.0, 0.0, 9.81), Vector3::zeros(), 0.0);
/// ekf.predict(&imu).unwrap();
/// assert!((ekf.get_navigation_state().velocity[2] - 0.981).abs() < 1e-12);
/// ```
#[derive(Clone)]
pub struct ExtendedKalmanFilter {
    /// State estimate vector
    state: StateVector,
    /// State covariance matrix
    covariance: StateCovariance,
    /// Noise parameters used to build $Q(dt)$
    noise: NoiseModel,
    /// Integration step
    dt: f64,
    /// Time of the last predict or update
    timestamp: f64,
}
impl Debug for ExtendedKalmanFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EKF")
            .field("state", &self.state.as_slice())
            .field("covariance diagonal", &self.covariance.diagonal().as_slice())
            .field("noise", &self.noise)
            .field("dt", &self.dt)
            .field("timestamp", &self.timestamp)
            .finish()
    }
}
impl Display for ExtendedKalmanFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExtendedKalmanFilter {{ dt: {} s, ", self.dt)?;
        write!(f, "{} }}", self.get_navigation_state())
    }
}
impl ExtendedKalmanFilter {
    /// Create a new extended filter.
    ///
    /// # Errors
    /// * [`crate::NavError::InvalidTimeStep`] when `config.dt` is zero, negative or not finite.
    /// * [`crate::NavError::InvalidParameter`] for negative or non-finite noise parameters.
    /// * [`crate::NavError::NonFiniteInput`] when the initial state contains NaN or infinity.
    pub fn new(initial_state: InitialState, config: ExtendedFilterConfig) -> Result<Self> {
        config.validate()?;
        let state = initial_state.to_state_vector();
        check_finite("initial state", state.iter())?;
        Ok(ExtendedKalmanFilter {
            state,
            covariance: config.noise.initial_covariance(),
            noise: config.noise,
            dt: config.dt,
            timestamp: 0.0,
        })
    }
    /// Create a filter from a flat 15-element state in filter order.
    ///
    /// # Errors
    /// [`crate::NavError::StateLengthMismatch`] when `state` does not have fifteen elements, plus
    /// everything [`ExtendedKalmanFilter::new`] can return.
    pub fn from_state_vector(state: &[f64], config: ExtendedFilterConfig) -> Result<Self> {
        let nav = NavigationState::try_from(state)?;
        ExtendedKalmanFilter::new(
            InitialState {
                position: nav.position,
                velocity: nav.velocity,
                attitude: nav.attitude,
                accel_bias: nav.accel_bias,
                gyro_bias: nav.gyro_bias,
            },
            config,
        )
    }
    /// Integration step in seconds
    pub fn dt(&self) -> f64 {
        self.dt
    }
    /// Immutable snapshot of the current estimate
    pub fn get_navigation_state(&self) -> NavigationState {
        NavigationState::from_state_vector(&self.state, self.covariance, self.timestamp)
    }
    fn wrap_attitude(&mut self) {
        for i in 6..9 {
            self.state[i] = wrap_to_pi(self.state[i]);
        }
    }
}
impl NavigationFilter for ExtendedKalmanFilter {
    type Input = IMUData;
    type Measurement = GPSMeasurement;

    /// Propagate the state and covariance one step with an IMU sample.
    ///
    /// The acceleration must be kinematic (gravity included), see
    /// [`crate::sensors::compensate_gravity`].
    fn predict(&mut self, imu: &IMUData) -> Result<()> {
        imu.validate()?;
        let f = transition_matrix(self.dt);
        let b = control_matrix(self.dt);

        self.state = f * self.state + b * imu.get_vector();
        self.wrap_attitude();
        self.covariance =
            symmetrize(&(f * self.covariance * f.transpose() + self.noise.process_noise(self.dt)));
        self.timestamp += self.dt;

        trace!(
            "EKF predict t={:.3}: pos=[{:.2}, {:.2}, {:.2}] vel=[{:.3}, {:.3}, {:.3}]",
            self.timestamp,
            self.state[0],
            self.state[1],
            self.state[2],
            self.state[3],
            self.state[4],
            self.state[5]
        );
        Ok(())
    }

    /// Correct the estimate with a GPS report. Reports without a fix are a no-op.
    fn update(&mut self, gps: &GPSMeasurement) -> Result<()> {
        if !gps.available {
            debug!("GPS unavailable at t={:.3}, skipping update", gps.timestamp);
            return Ok(());
        }
        gps.validate()?;

        let correction = kalman_correct(
            &mut self.state,
            &mut self.covariance,
            &gps.get_vector(),
            &observation_matrix(),
            &gps.get_noise(),
        );
        if correction.pivot_clamped {
            warn!(
                "EKF update at t={:.3}: innovation covariance near singular, pivot clamped",
                gps.timestamp
            );
        }
        self.wrap_attitude();
        self.timestamp = self.timestamp.max(gps.timestamp);
        Ok(())
    }

    fn get_estimate(&self) -> DVector<f64> {
        DVector::from_column_slice(self.state.as_slice())
    }

    fn get_certainty(&self) -> DMatrix<f64> {
        DMatrix::from_column_slice(STATE_SIZE, STATE_SIZE, self.covariance.as_slice())
    }
}

/// Reduced filter configuration. Defaults are the documented constants in [`crate::noise`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReducedFilterConfig {
    /// Initial position variance (m^2)
    pub position_variance: f64,
    /// Initial velocity variance (m^2/s^2)
    pub velocity_variance: f64,
    /// White acceleration noise standard deviation (m/s^2)
    pub process_sigma: f64,
    /// Position measurement standard deviation (m)
    pub position_measurement_sigma: f64,
    /// Velocity measurement standard deviation (m/s)
    pub velocity_measurement_sigma: f64,
}
impl Default for ReducedFilterConfig {
    fn default() -> Self {
        ReducedFilterConfig {
            position_variance: DEFAULT_REDUCED_POSITION_VARIANCE,
            velocity_variance: DEFAULT_REDUCED_VELOCITY_VARIANCE,
            process_sigma: DEFAULT_REDUCED_PROCESS_SIGMA,
            position_measurement_sigma: DEFAULT_REDUCED_POSITION_MEASUREMENT_SIGMA,
            velocity_measurement_sigma: DEFAULT_REDUCED_VELOCITY_MEASUREMENT_SIGMA,
        }
    }
}
impl ReducedFilterConfig {
    pub fn validate(&self) -> Result<()> {
        check_non_negative("position_variance", self.position_variance)?;
        check_non_negative("velocity_variance", self.velocity_variance)?;
        check_non_negative("process_sigma", self.process_sigma)?;
        check_non_negative("position_measurement_sigma", self.position_measurement_sigma)?;
        check_non_negative("velocity_measurement_sigma", self.velocity_measurement_sigma)?;
        Ok(())
    }
    fn measurement_noise(&self) -> ReducedCovariance {
        reduced_initial_covariance(
            self.position_measurement_sigma.powi(2),
            self.velocity_measurement_sigma.powi(2),
        )
    }
}

/// Six-state position/velocity filter with a constant-velocity model.
///
/// Acceleration is not estimated; it enters as white process noise. The measurement is the
/// full state, so $H = I_6$.
#[derive(Clone, Debug)]
pub struct ReducedKalmanFilter {
    state: Vector6<f64>,
    covariance: ReducedCovariance,
    config: ReducedFilterConfig,
}
impl Display for ReducedKalmanFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ReducedKalmanFilter {{ pos: [{:.2}, {:.2}, {:.2}] m, ",
            self.state[0], self.state[1], self.state[2]
        )?;
        write!(
            f,
            "vel: [{:.3}, {:.3}, {:.3}] m/s }}",
            self.state[3], self.state[4], self.state[5]
        )
    }
}
impl ReducedKalmanFilter {
    /// Create a reduced filter from an initial position and velocity.
    pub fn new(
        position: Vector3<f64>,
        velocity: Vector3<f64>,
        config: ReducedFilterConfig,
    ) -> Result<Self> {
        config.validate()?;
        let state = Vector6::new(
            position[0],
            position[1],
            position[2],
            velocity[0],
            velocity[1],
            velocity[2],
        );
        check_finite("initial state", state.iter())?;
        Ok(ReducedKalmanFilter {
            state,
            covariance: reduced_initial_covariance(
                config.position_variance,
                config.velocity_variance,
            ),
            config,
        })
    }
    /// Current estimate and covariance
    pub fn get_state(&self) -> ReducedState {
        ReducedState {
            position: self.state.fixed_rows::<3>(0).into_owned(),
            velocity: self.state.fixed_rows::<3>(3).into_owned(),
            covariance: self.covariance,
        }
    }
}
impl NavigationFilter for ReducedKalmanFilter {
    /// Elapsed time in seconds
    type Input = f64;
    /// Stacked `[position, velocity]`
    type Measurement = Vector6<f64>;

    fn predict(&mut self, dt: &f64) -> Result<()> {
        let dt = check_time_step(*dt)?;
        let mut f = Matrix6::<f64>::identity();
        for axis in 0..3 {
            f[(axis, axis + 3)] = dt;
        }
        self.state = f * self.state;
        self.covariance = symmetrize(
            &(f * self.covariance * f.transpose()
                + reduced_process_noise(self.config.process_sigma, dt)),
        );
        Ok(())
    }

    fn update(&mut self, measurement: &Vector6<f64>) -> Result<()> {
        check_finite("position/velocity measurement", measurement.iter())?;
        let correction = kalman_correct(
            &mut self.state,
            &mut self.covariance,
            measurement,
            &Matrix6::identity(),
            &self.config.measurement_noise(),
        );
        if correction.pivot_clamped {
            warn!("reduced filter update: innovation covariance near singular, pivot clamped");
        }
        Ok(())
    }

    fn get_estimate(&self) -> DVector<f64> {
        DVector::from_column_slice(self.state.as_slice())
    }

    fn get_certainty(&self) -> DMatrix<f64> {
        DMatrix::from_column_slice(
            REDUCED_STATE_SIZE,
            REDUCED_STATE_SIZE,
            self.covariance.as_slice(),
        )
    }
}
