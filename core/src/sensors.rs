//! Ground truth propagation and synthetic IMU/GPS sensors
//!
//! The simulator turns a [`TruthState`] into the measurements a vehicle's IMU and GPS receiver
//! would report:
//!
//! - **IMU**: the accelerometer senses specific force, thrust/mass minus gravity, so a vehicle
//!   sitting on the pad reads $+g$ upward. A fixed bias and uniform noise in
//!   $[-A, +A]$ are added per axis. The gyroscope channel is bias plus noise.
//! - **GPS**: no fix above [`SensorConfig::gps_max_altitude`]. Accuracy degrades linearly with
//!   altitude through the factor $\max(1, 1 + h / h_s)$. Position and velocity carry uniform
//!   noise within the accuracy bounds.
//!
//! Randomness always comes from a caller-supplied generator. Every call draws the same number
//! of samples regardless of availability, so a seeded run is reproducible even when GPS drops
//! in and out.

use log::trace;
use nalgebra::Vector3;
use rand::Rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

use crate::IMUData;
use crate::earth::{Geodetic, ecef_to_enu_matrix, ecef_to_geodetic, gravitational_acceleration};
use crate::error::{NavError, Result, check_finite, check_non_negative, check_time_step};
use crate::measurements::GPSMeasurement;

/// Altitude above which the receiver reports no fix (m)
pub const DEFAULT_GPS_MAX_ALTITUDE: f64 = 80_000.0;
/// Satellites tracked with a fix
pub const MIN_SATELLITES: u32 = 8;
pub const MAX_SATELLITES: u32 = 12;
/// HDOP range with a fix
pub const MIN_HDOP: f64 = 1.2;
pub const MAX_HDOP: f64 = 2.0;

/// Vehicle thrust profile used by [`TruthState::step`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Propulsion {
    /// Propellant mass flow while burning (kg/s)
    pub mass_flow: f64,
    /// Burn duration from mission time zero (s)
    pub burn_time: f64,
    /// Mass below which the vehicle cannot burn (kg)
    pub dry_mass: f64,
}
impl Propulsion {
    /// Check the profile against the liftoff mass: non-negative flow and burn time, and a dry
    /// mass in `(0, mass]`.
    pub fn validate(&self, mass: f64) -> Result<()> {
        check_non_negative("mass_flow", self.mass_flow)?;
        check_non_negative("burn_time", self.burn_time)?;
        if !(mass.is_finite() && mass > 0.0) {
            return Err(NavError::InvalidParameter {
                name: "mass",
                value: mass,
            });
        }
        if !(self.dry_mass.is_finite() && self.dry_mass > 0.0 && self.dry_mass <= mass) {
            return Err(NavError::InvalidParameter {
                name: "dry_mass",
                value: self.dry_mass,
            });
        }
        Ok(())
    }
}

/// Ground-truth vehicle state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TruthState {
    /// ECEF position (m)
    pub position: Vector3<f64>,
    /// ECEF velocity (m/s)
    pub velocity: Vector3<f64>,
    /// Net force on the vehicle in ECEF (N), gravity included. Zero holds the vehicle at rest.
    pub thrust: Vector3<f64>,
    /// Vehicle mass (kg)
    pub mass: f64,
    /// Altitude above the WGS84 ellipsoid (m), kept consistent with `position`
    pub altitude: f64,
    /// Seconds since launch
    pub mission_time: f64,
}
impl TruthState {
    /// # Errors
    /// [`NavError::InvalidParameter`] for a non-positive mass and
    /// [`NavError::NonFiniteInput`] for NaN or infinite vectors.
    pub fn new(
        position: Vector3<f64>,
        velocity: Vector3<f64>,
        thrust: Vector3<f64>,
        mass: f64,
        mission_time: f64,
    ) -> Result<Self> {
        if !(mass.is_finite() && mass > 0.0) {
            return Err(NavError::InvalidParameter {
                name: "mass",
                value: mass,
            });
        }
        check_finite(
            "truth state",
            position.iter().chain(velocity.iter()).chain(thrust.iter()),
        )?;
        Ok(TruthState {
            position,
            velocity,
            thrust,
            mass,
            altitude: ecef_to_geodetic(&position).altitude,
            mission_time,
        })
    }
    /// Vehicle at rest over a site with a net force (N) pointing along local up.
    pub fn at_rest(site: &Geodetic, thrust: f64, mass: f64) -> Result<Self> {
        let up = ecef_to_enu_matrix(site.latitude, site.longitude).row(2).transpose();
        TruthState::new(site.to_ecef(), Vector3::zeros(), up * thrust, mass, 0.0)
    }
    /// Kinematic acceleration
    pub fn acceleration(&self) -> Vector3<f64> {
        self.thrust / self.mass
    }
    /// Specific force sensed by an ideal accelerometer: thrust/mass minus gravity
    pub fn specific_force(&self) -> Vector3<f64> {
        self.thrust / self.mass - gravitational_acceleration(&self.position)
    }
    /// Advance the vehicle `dt` seconds.
    ///
    /// Explicit Euler in the same order as the extended filter's transition model: position
    /// advances with the current velocity, then velocity with the current acceleration.
    /// Propellant burns at `propulsion.mass_flow` until `burn_time` or `dry_mass` is reached.
    /// After burn-out the vehicle is ballistic: the net force is its weight under inverse-square
    /// gravity and the accelerometer reads zero. There is no ground contact model.
    ///
    /// # Errors
    /// [`NavError::InvalidTimeStep`] for a bad `dt` and [`NavError::InvalidParameter`] when the
    /// burn would leave no mass. The state is unchanged on error.
    pub fn step(&mut self, dt: f64, propulsion: &Propulsion) -> Result<()> {
        let dt = check_time_step(dt)?;
        let mission_time = self.mission_time + dt;
        let burning = mission_time <= propulsion.burn_time && self.mass > propulsion.dry_mass;
        let mass = if burning {
            (self.mass - propulsion.mass_flow * dt).max(propulsion.dry_mass)
        } else {
            self.mass
        };
        if !(mass.is_finite() && mass > 0.0) {
            return Err(NavError::InvalidParameter {
                name: "mass",
                value: mass,
            });
        }

        let acceleration = self.acceleration();
        self.position += self.velocity * dt;
        self.velocity += acceleration * dt;
        self.mission_time = mission_time;
        self.mass = mass;
        if !burning {
            if self.mission_time - dt <= propulsion.burn_time {
                trace!("burn-out at t={:.2} s, mass {:.1} kg", self.mission_time, self.mass);
            }
            self.thrust = gravitational_acceleration(&self.position) * self.mass;
        }
        self.altitude = ecef_to_geodetic(&self.position).altitude;
        Ok(())
    }
}

/// Sensor error and availability parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Fixed accelerometer bias (m/s^2)
    pub accel_bias: [f64; 3],
    /// Fixed gyroscope bias (rad/s)
    pub gyro_bias: [f64; 3],
    /// Accelerometer noise amplitude; samples are uniform in [-A, A] (m/s^2)
    pub accel_noise: f64,
    /// Gyroscope noise amplitude (rad/s)
    pub gyro_noise: f64,
    /// Position accuracy at or below the degradation floor (m)
    pub gps_position_accuracy: f64,
    /// Velocity accuracy at or below the degradation floor (m/s)
    pub gps_velocity_accuracy: f64,
    /// Altitude over which accuracy grows by one base unit (m)
    pub gps_degradation_altitude: f64,
    /// No fix above this altitude (m)
    pub gps_max_altitude: f64,
}
impl Default for SensorConfig {
    fn default() -> Self {
        SensorConfig {
            accel_bias: [0.01, -0.02, 0.015],
            gyro_bias: [1e-4, -5e-5, 2e-4],
            accel_noise: 0.05,
            gyro_noise: 1e-3,
            gps_position_accuracy: 2.5,
            gps_velocity_accuracy: 0.1,
            gps_degradation_altitude: 20_000.0,
            gps_max_altitude: DEFAULT_GPS_MAX_ALTITUDE,
        }
    }
}
impl SensorConfig {
    /// Ideal sensors: no bias, no noise, full GPS accuracy.
    pub fn perfect() -> Self {
        SensorConfig {
            accel_bias: [0.0; 3],
            gyro_bias: [0.0; 3],
            accel_noise: 0.0,
            gyro_noise: 0.0,
            gps_position_accuracy: 0.0,
            gps_velocity_accuracy: 0.0,
            ..Default::default()
        }
    }
    pub fn validate(&self) -> Result<()> {
        check_finite("accel_bias", self.accel_bias.iter())?;
        check_finite("gyro_bias", self.gyro_bias.iter())?;
        check_non_negative("accel_noise", self.accel_noise)?;
        check_non_negative("gyro_noise", self.gyro_noise)?;
        check_non_negative("gps_position_accuracy", self.gps_position_accuracy)?;
        check_non_negative("gps_velocity_accuracy", self.gps_velocity_accuracy)?;
        if !(self.gps_degradation_altitude.is_finite() && self.gps_degradation_altitude > 0.0) {
            return Err(NavError::InvalidParameter {
                name: "gps_degradation_altitude",
                value: self.gps_degradation_altitude,
            });
        }
        if self.gps_max_altitude.is_nan() {
            return Err(NavError::InvalidParameter {
                name: "gps_max_altitude",
                value: self.gps_max_altitude,
            });
        }
        Ok(())
    }
    /// Accuracy multiplier at a given altitude, never below one
    pub fn altitude_factor(&self, altitude: f64) -> f64 {
        (1.0 + altitude / self.gps_degradation_altitude).max(1.0)
    }
}

/// A simulated IMU sample and the error parameters used to generate it
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimulatedImu {
    pub measurement: IMUData,
    pub accel_bias: Vector3<f64>,
    pub gyro_bias: Vector3<f64>,
    pub accel_noise: f64,
    pub gyro_noise: f64,
}

fn symmetric_uniform(amplitude: f64) -> Result<Uniform<f64>> {
    Uniform::new_inclusive(-amplitude, amplitude)
        .map_err(|e| NavError::Distribution(e.to_string()))
}

fn sample_vector<R: Rng + ?Sized>(distribution: &Uniform<f64>, rng: &mut R) -> Vector3<f64> {
    Vector3::new(
        distribution.sample(rng),
        distribution.sample(rng),
        distribution.sample(rng),
    )
}

/// Generate the IMU sample covering the next `dt` seconds of `truth`.
///
/// The sample is stamped at `truth.mission_time + dt`.
///
/// # Example
/// ```rust
/// use launchnav::earth::Geodetic;
/// use launchnav::sensors::{SensorConfig, TruthState, simulate_imu};
/// use rand::SeedableRng;
///
/// let truth = TruthState::at_rest(&Geodetic::from_degrees(0.0, 0.0, 0.0), 0.0, 1000.0).unwrap();
/// let mut rng = rand::rngs::StdRng::seed_from_u64(42);
/// let imu = simulate_imu(&truth, 0.1, &SensorConfig::perfect(), &mut rng).unwrap();
/// assert!((imu.measurement.accel[0] - 9.798).abs() < 1e-3);
/// ```
pub fn simulate_imu<R: Rng + ?Sized>(
    truth: &TruthState,
    dt: f64,
    config: &SensorConfig,
    rng: &mut R,
) -> Result<SimulatedImu> {
    let dt = check_time_step(dt)?;
    config.validate()?;
    let accel_bias = Vector3::from(config.accel_bias);
    let gyro_bias = Vector3::from(config.gyro_bias);

    let accel_noise = sample_vector(&symmetric_uniform(config.accel_noise)?, rng);
    let gyro_noise = sample_vector(&symmetric_uniform(config.gyro_noise)?, rng);
    let accel = truth.specific_force() + accel_bias + accel_noise;
    let gyro = gyro_bias + gyro_noise;

    Ok(SimulatedImu {
        measurement: IMUData::new(accel, gyro, truth.mission_time + dt),
        accel_bias,
        gyro_bias,
        accel_noise: config.accel_noise,
        gyro_noise: config.gyro_noise,
    })
}

/// Generate the GPS report for `truth`.
///
/// # Example
/// ```rust
/// use launchnav::earth::Geodetic;
/// use launchnav::sensors::{SensorConfig, TruthState, simulate_gps};
/// use rand::SeedableRng;
///
/// let site = Geodetic::from_degrees(0.0, 0.0, 90_000.0);
/// let truth = TruthState::at_rest(&site, 0.0, 1000.0).unwrap();
/// let mut rng = rand::rngs::StdRng::seed_from_u64(42);
/// let gps = simulate_gps(&truth, &SensorConfig::default(), &mut rng).unwrap();
/// assert!(!gps.available);
/// ```
pub fn simulate_gps<R: Rng + ?Sized>(
    truth: &TruthState,
    config: &SensorConfig,
    rng: &mut R,
) -> Result<GPSMeasurement> {
    config.validate()?;
    let available = truth.altitude <= config.gps_max_altitude;
    let factor = config.altitude_factor(truth.altitude);
    let position_accuracy = config.gps_position_accuracy * factor;
    let velocity_accuracy = config.gps_velocity_accuracy * factor;

    let position_noise = sample_vector(&symmetric_uniform(position_accuracy)?, rng);
    let velocity_noise = sample_vector(&symmetric_uniform(velocity_accuracy)?, rng);
    let satellites = Uniform::new_inclusive(MIN_SATELLITES, MAX_SATELLITES)
        .map_err(|e| NavError::Distribution(e.to_string()))?
        .sample(rng);
    let hdop = Uniform::new_inclusive(MIN_HDOP, MAX_HDOP)
        .map_err(|e| NavError::Distribution(e.to_string()))?
        .sample(rng);

    if !available {
        return Ok(GPSMeasurement::unavailable(truth.mission_time));
    }
    Ok(GPSMeasurement {
        position: truth.position + position_noise,
        velocity: truth.velocity + velocity_noise,
        available,
        satellites,
        hdop,
        position_accuracy,
        velocity_accuracy,
        timestamp: truth.mission_time,
    })
}

/// Convert a specific-force IMU sample at `position` into kinematic acceleration by adding
/// gravity back.
pub fn compensate_gravity(imu: &IMUData, position: &Vector3<f64>) -> IMUData {
    IMUData {
        accel: imu.accel + gravitational_acceleration(position),
        ..*imu
    }
}
