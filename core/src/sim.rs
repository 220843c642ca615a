//! Closed-loop scenario simulation and result export.
//!
//! This module provides:
//! - [`ScenarioConfig`]: everything needed to reproduce a run, readable from and writable to
//!   JSON, YAML or TOML
//! - [`run_scenario`]: truth propagation → simulated IMU → gravity compensation → EKF
//!   predict, with simulated GPS updates every `gps_interval` ticks
//! - [`NavigationResult`]: per-step estimate and truth rows with CSV import/export and error
//!   statistics

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use log::{debug, info, warn};
use nalgebra::Vector3;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::earth::Geodetic;
use crate::error::{NavError, Result, check_finite};
use crate::kalman::{ExtendedFilterConfig, ExtendedKalmanFilter, InitialState};
use crate::linalg::{is_symmetric, min_eigenvalue};
use crate::sensors::{
    Propulsion, SensorConfig, TruthState, compensate_gravity, simulate_gps, simulate_imu,
};
use crate::{NavigationFilter, NavigationState};

fn default_seed() -> u64 {
    42
}

/// Scenario definition: vehicle, launch site, sensors, filter and run length.
///
/// Every field has a default so partial configuration files are accepted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Label carried into the results
    pub name: String,
    /// Launch site latitude (deg)
    pub latitude: f64,
    /// Launch site longitude (deg)
    pub longitude: f64,
    /// Launch site altitude above the ellipsoid (m)
    pub altitude: f64,
    /// Net force at liftoff along local up, gravity included (N)
    pub thrust: f64,
    /// Liftoff mass (kg)
    pub mass: f64,
    pub propulsion: Propulsion,
    /// Number of IMU ticks to simulate
    pub steps: usize,
    /// IMU ticks between GPS reports
    pub gps_interval: usize,
    /// Error added to the true position to seed the filter (m, ECEF)
    pub initial_position_error: [f64; 3],
    /// Error added to the true velocity to seed the filter (m/s, ECEF)
    pub initial_velocity_error: [f64; 3],
    /// Random number generator seed for reproducible sensor noise
    #[serde(default = "default_seed")]
    pub seed: u64,
    pub filter: ExtendedFilterConfig,
    pub sensors: SensorConfig,
}
impl Default for ScenarioConfig {
    fn default() -> Self {
        ScenarioConfig {
            name: "ascent".to_string(),
            latitude: 28.5729,
            longitude: -80.649,
            altitude: 3.0,
            thrust: 5.0e5,
            mass: 100_000.0,
            propulsion: Propulsion {
                mass_flow: 400.0,
                burn_time: 150.0,
                dry_mass: 20_000.0,
            },
            steps: 1800,
            gps_interval: 10,
            initial_position_error: [5.0, -5.0, 5.0],
            initial_velocity_error: [0.5, 0.0, -0.5],
            seed: default_seed(),
            filter: ExtendedFilterConfig::default(),
            sensors: SensorConfig::default(),
        }
    }
}
impl ScenarioConfig {
    /// Launch site as a geodetic position
    pub fn launch_site(&self) -> Geodetic {
        Geodetic::from_degrees(self.latitude, self.longitude, self.altitude)
    }
    /// Check the scenario can be run.
    pub fn validate(&self) -> Result<()> {
        self.filter.validate()?;
        self.sensors.validate()?;
        check_finite(
            "launch site",
            [self.latitude, self.longitude, self.altitude, self.thrust].iter(),
        )?;
        check_finite(
            "initial estimate error",
            self.initial_position_error
                .iter()
                .chain(self.initial_velocity_error.iter()),
        )?;
        self.propulsion.validate(self.mass)?;
        if self.gps_interval == 0 {
            return Err(NavError::InvalidParameter {
                name: "gps_interval",
                value: 0.0,
            });
        }
        Ok(())
    }

    /// Write the configuration to a JSON file (pretty-printed).
    pub fn to_json<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self).map_err(io::Error::other)
    }
    /// Read the configuration from a JSON file.
    pub fn from_json<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        serde_json::from_reader(file).map_err(io::Error::other)
    }
    /// Write the configuration as YAML.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = File::create(path)?;
        let s = serde_yaml::to_string(self).map_err(io::Error::other)?;
        file.write_all(s.as_bytes())
    }
    /// Read the configuration from YAML.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        serde_yaml::from_reader(file).map_err(io::Error::other)
    }
    /// Write the configuration as TOML.
    pub fn to_toml<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = File::create(path)?;
        let s = toml::to_string(self).map_err(io::Error::other)?;
        file.write_all(s.as_bytes())
    }
    /// Read the configuration from TOML.
    pub fn from_toml<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let mut s = String::new();
        File::open(path)?.read_to_string(&mut s)?;
        toml::from_str(&s).map_err(io::Error::other)
    }
    /// Generic write: choose format by file extension (.json/.yaml/.yml/.toml)
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let p = path.as_ref();
        match extension(p).as_deref() {
            Some("json") => self.to_json(p),
            Some("yaml") | Some("yml") => self.to_yaml(p),
            Some("toml") => self.to_toml(p),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "unsupported file extension",
            )),
        }
    }
    /// Generic read: choose format by file extension (.json/.yaml/.yml/.toml)
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let p = path.as_ref();
        match extension(p).as_deref() {
            Some("json") => Self::from_json(p),
            Some("yaml") | Some("yml") => Self::from_yaml(p),
            Some("toml") => Self::from_toml(p),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "unsupported file extension",
            )),
        }
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
}

/// One row of a scenario run: the filter estimate next to the truth it tracks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NavigationRecord {
    pub step: usize,
    /// Mission time (s)
    pub time: f64,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_m: f64,
    pub pos_x_m: f64,
    pub pos_y_m: f64,
    pub pos_z_m: f64,
    pub vel_x_mps: f64,
    pub vel_y_mps: f64,
    pub vel_z_mps: f64,
    pub roll_deg: f64,
    pub pitch_deg: f64,
    pub yaw_deg: f64,
    pub truth_x_m: f64,
    pub truth_y_m: f64,
    pub truth_z_m: f64,
    pub truth_vx_mps: f64,
    pub truth_vy_mps: f64,
    pub truth_vz_mps: f64,
    pub truth_altitude_m: f64,
    /// Euclidean position error (m)
    pub position_error_m: f64,
    /// Euclidean velocity error (m/s)
    pub velocity_error_mps: f64,
    /// Norm of the per-axis 1-sigma position uncertainty (m)
    pub position_sigma_m: f64,
    /// Whether a GPS fix was fused on this step
    pub gps_fused: bool,
}
impl NavigationRecord {
    pub fn new(
        step: usize,
        estimate: &NavigationState,
        truth: &TruthState,
        gps_fused: bool,
    ) -> Self {
        let lla = estimate.geodetic();
        NavigationRecord {
            step,
            time: truth.mission_time,
            latitude_deg: lla.latitude_degrees(),
            longitude_deg: lla.longitude_degrees(),
            altitude_m: lla.altitude,
            pos_x_m: estimate.position[0],
            pos_y_m: estimate.position[1],
            pos_z_m: estimate.position[2],
            vel_x_mps: estimate.velocity[0],
            vel_y_mps: estimate.velocity[1],
            vel_z_mps: estimate.velocity[2],
            roll_deg: estimate.attitude[0].to_degrees(),
            pitch_deg: estimate.attitude[1].to_degrees(),
            yaw_deg: estimate.attitude[2].to_degrees(),
            truth_x_m: truth.position[0],
            truth_y_m: truth.position[1],
            truth_z_m: truth.position[2],
            truth_vx_mps: truth.velocity[0],
            truth_vy_mps: truth.velocity[1],
            truth_vz_mps: truth.velocity[2],
            truth_altitude_m: truth.altitude,
            position_error_m: (estimate.position - truth.position).norm(),
            velocity_error_mps: (estimate.velocity - truth.velocity).norm(),
            position_sigma_m: estimate.position_sigma().norm(),
            gps_fused,
        }
    }
    /// Estimated ECEF position
    pub fn position(&self) -> Vector3<f64> {
        Vector3::new(self.pos_x_m, self.pos_y_m, self.pos_z_m)
    }
}

/// Summary error statistics over a run
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ErrorSummary {
    pub final_position_error: f64,
    pub mean_position_error: f64,
    pub max_position_error: f64,
    pub final_velocity_error: f64,
    pub mean_velocity_error: f64,
    /// Number of steps on which a GPS fix was fused
    pub gps_updates: usize,
}

/// Result of a navigation run.
#[derive(Clone, Debug)]
pub struct NavigationResult {
    /// Name or identifier for this run
    pub name: String,
    /// One record per step, starting with the initial estimate at step zero
    pub records: Vec<NavigationRecord>,
    /// Full filter state at the end of the run; `None` for results loaded from disk
    pub final_state: Option<NavigationState>,
}
impl NavigationResult {
    /// Creates a new NavigationResult with no records.
    pub fn new(name: &str) -> Self {
        NavigationResult {
            name: name.to_string(),
            records: Vec::new(),
            final_state: None,
        }
    }
    /// Error statistics over all records
    pub fn summary(&self) -> ErrorSummary {
        let Some(last) = self.records.last() else {
            return ErrorSummary::default();
        };
        ErrorSummary {
            final_position_error: last.position_error_m,
            mean_position_error: self.mean_of(|r| r.position_error_m),
            max_position_error: self
                .records
                .iter()
                .map(|r| r.position_error_m)
                .fold(0.0, f64::max),
            final_velocity_error: last.velocity_error_mps,
            mean_velocity_error: self.mean_of(|r| r.velocity_error_mps),
            gps_updates: self.records.iter().filter(|r| r.gps_fused).count(),
        }
    }
    fn mean_of(&self, field: fn(&NavigationRecord) -> f64) -> f64 {
        self.records.iter().map(field).sum::<f64>() / self.records.len() as f64
    }
    /// Writes the records to a CSV file with a header row.
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for record in &self.records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }
    /// Reads records previously written by [`NavigationResult::to_csv`].
    pub fn from_csv<P: AsRef<Path>>(path: P, name: &str) -> io::Result<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut result = NavigationResult::new(name);
        for record in reader.deserialize() {
            result.records.push(record?);
        }
        Ok(result)
    }
}

/// Run a closed-loop scenario.
///
/// Each tick:
/// 1. the IMU sample covering the next `dt` is simulated from the truth,
/// 2. the truth advances `dt`,
/// 3. gravity at the estimated position is added back to the sample and the filter predicts,
/// 4. every `gps_interval` ticks a GPS report is simulated and fused (a report without a fix is
///    a no-op inside the filter).
///
/// The truth and the filter share one discretization: position advances with the velocity
/// from the start of the tick, then velocity with the tick's acceleration. Dead-reckoning
/// error therefore comes from sensor errors and gravity compensation at the estimated
/// position, not from integrator mismatch.
///
/// The same configuration always produces the same result.
pub fn run_scenario(config: &ScenarioConfig) -> Result<NavigationResult> {
    config.validate()?;
    let mut rng = StdRng::seed_from_u64(config.seed);

    let mut truth = TruthState::at_rest(&config.launch_site(), config.thrust, config.mass)?;
    let initial = InitialState::new(
        truth.position + Vector3::from(config.initial_position_error),
        truth.velocity + Vector3::from(config.initial_velocity_error),
    );
    let mut ekf = ExtendedKalmanFilter::new(initial, config.filter)?;
    let dt = ekf.dt();

    info!(
        "Running scenario '{}': {} steps at dt={} s, GPS every {} steps, seed {}",
        config.name, config.steps, dt, config.gps_interval, config.seed
    );

    let mut result = NavigationResult::new(&config.name);
    let initial_record = NavigationRecord::new(0, &ekf.get_navigation_state(), &truth, false);
    result.records.push(initial_record);

    let mut gps_had_fix = true;
    for step in 1..=config.steps {
        let imu = simulate_imu(&truth, dt, &config.sensors, &mut rng)?;
        truth.step(dt, &config.propulsion)?;
        let kinematic = compensate_gravity(&imu.measurement, &ekf.get_navigation_state().position);
        ekf.predict(&kinematic)?;

        let mut gps_fused = false;
        if step % config.gps_interval == 0 {
            let gps = simulate_gps(&truth, &config.sensors, &mut rng)?;
            if gps.available != gps_had_fix {
                info!(
                    "GPS {} at t={:.1} s (altitude {:.0} m)",
                    if gps.available { "reacquired" } else { "lost" },
                    truth.mission_time,
                    truth.altitude
                );
                gps_had_fix = gps.available;
            }
            debug!("{}", gps);
            ekf.update(&gps)?;
            gps_fused = gps.available;
        }
        let record = NavigationRecord::new(step, &ekf.get_navigation_state(), &truth, gps_fused);
        result.records.push(record);
    }

    let final_state = ekf.get_navigation_state();
    let covariance = &final_state.covariance;
    if !is_symmetric(covariance, 1e-6) || min_eigenvalue(covariance) < -1e-9 {
        warn!("final covariance is not symmetric positive semi-definite");
    }
    result.final_state = Some(final_state);

    let summary = result.summary();
    info!(
        "Scenario '{}' finished: final position error {:.2} m, mean {:.2} m, {} GPS updates",
        config.name,
        summary.final_position_error,
        summary.mean_position_error,
        summary.gps_updates
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use tempfile::NamedTempFile;

    fn short_scenario() -> ScenarioConfig {
        ScenarioConfig {
            steps: 100,
            ..Default::default()
        }
    }

    #[test]
    fn config_file_formats() {
        let config = ScenarioConfig {
            name: "formats".to_string(),
            seed: 7,
            ..Default::default()
        };
        for suffix in [".json", ".yaml", ".toml"] {
            let file = NamedTempFile::with_suffix(suffix).unwrap();
            config.to_file(file.path()).unwrap();
            let loaded = ScenarioConfig::from_file(file.path()).unwrap();
            assert_eq!(loaded, config, "round trip through {}", suffix);
        }
    }

    #[test]
    fn config_rejects_unknown_extension() {
        let file = NamedTempFile::with_suffix(".ini").unwrap();
        let err = ScenarioConfig::default().to_file(file.path()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn partial_config_uses_defaults() {
        let json = r#"{"steps": 5, "sensors": {"accel_noise": 0.2}}"#;
        let config: ScenarioConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.steps, 5);
        assert_eq!(config.seed, 42);
        assert_approx_eq!(config.sensors.accel_noise, 0.2);
        assert_approx_eq!(config.sensors.gyro_noise, SensorConfig::default().gyro_noise);
        assert_approx_eq!(config.filter.dt, 0.1);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = short_scenario();
        config.gps_interval = 0;
        assert!(run_scenario(&config).is_err());

        let mut config = short_scenario();
        config.filter.dt = 0.0;
        assert!(matches!(run_scenario(&config), Err(NavError::InvalidTimeStep(_))));
    }

    #[test]
    fn partial_propulsion_block_is_rejected() {
        // dry_mass falls back to zero, which would let the burn empty the vehicle
        let json = r#"{"steps": 3000, "propulsion": {"mass_flow": 400.0, "burn_time": 1000.0}}"#;
        let config: ScenarioConfig = serde_json::from_str(json).unwrap();
        assert_approx_eq!(config.propulsion.dry_mass, 0.0);
        let expected = Err(NavError::InvalidParameter {
            name: "dry_mass",
            value: 0.0,
        });
        assert_eq!(config.validate(), expected);
        assert!(matches!(
            run_scenario(&config),
            Err(NavError::InvalidParameter { name: "dry_mass", .. })
        ));
    }

    #[test]
    fn negative_mass_flow_is_rejected() {
        let mut config = short_scenario();
        config.propulsion.mass_flow = -400.0;
        assert!(matches!(
            run_scenario(&config),
            Err(NavError::InvalidParameter { name: "mass_flow", .. })
        ));

        let mut config = short_scenario();
        config.propulsion.dry_mass = config.mass + 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn scenario_records_every_step() {
        let result = run_scenario(&short_scenario()).unwrap();
        assert_eq!(result.records.len(), 101);
        assert_eq!(result.records[0].step, 0);
        assert_approx_eq!(result.records[100].time, 10.0, 1e-9);
        assert_eq!(result.summary().gps_updates, 10);
        assert!(result.final_state.is_some());
        // The vehicle is climbing
        let climb = result.records[100].truth_altitude_m - result.records[0].truth_altitude_m;
        assert!(climb > 100.0);
    }

    #[test]
    fn scenario_is_deterministic() {
        let a = run_scenario(&short_scenario()).unwrap();
        let b = run_scenario(&short_scenario()).unwrap();
        assert_eq!(a.records, b.records);

        let reseeded = ScenarioConfig {
            seed: 1,
            ..short_scenario()
        };
        let other = run_scenario(&reseeded).unwrap();
        assert_ne!(a.records, other.records);
    }

    #[test]
    fn csv_round_trip() {
        let config = ScenarioConfig {
            steps: 20,
            ..Default::default()
        };
        let result = run_scenario(&config).unwrap();
        let file = NamedTempFile::with_suffix(".csv").unwrap();
        result.to_csv(file.path()).unwrap();
        let loaded = NavigationResult::from_csv(file.path(), "loaded").unwrap();
        assert_eq!(loaded.records.len(), result.records.len());
        assert_eq!(loaded.records[20].gps_fused, result.records[20].gps_fused);
        let offset = loaded.records[20].position() - result.records[20].position();
        assert!(offset.norm() < 1e-6);
        assert!(loaded.final_state.is_none());
    }

    #[test]
    fn empty_summary() {
        assert_eq!(NavigationResult::new("empty").summary(), ErrorSummary::default());
    }
}
