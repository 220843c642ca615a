//! End-to-end tests for the navigation core.
//!
//! These exercise the public API the way the simulator binary does: geodesy conversions over a
//! grid of sites, the extended filter through long mixed predict/update sequences, and complete
//! seeded scenarios with and without GPS. Error bounds are regression checks derived from the
//! default sensor and noise parameters, not design goals.
use launchnav::earth::{Geodetic, ecef_to_geodetic, geodetic_to_ecef};
use launchnav::kalman::{
    ExtendedFilterConfig, ExtendedKalmanFilter, InitialState, ReducedFilterConfig,
    ReducedKalmanFilter,
};
use launchnav::linalg::{is_symmetric, min_eigenvalue};
use launchnav::measurements::GPSMeasurement;
use launchnav::sensors::{
    Propulsion, SensorConfig, TruthState, compensate_gravity, simulate_gps, simulate_imu,
};
use launchnav::sim::{NavigationResult, ScenarioConfig, run_scenario};
use launchnav::{IMUData, NavigationFilter, wrap_to_pi};

use assert_approx_eq::assert_approx_eq;
use nalgebra::{Vector3, Vector6};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use tempfile::{NamedTempFile, tempdir};

/// A vehicle held at rest on the equator for the whole run
fn hover_scenario(steps: usize) -> ScenarioConfig {
    ScenarioConfig {
        name: "hover".to_string(),
        latitude: 0.0,
        longitude: 0.0,
        altitude: 0.0,
        thrust: 0.0,
        mass: 1000.0,
        propulsion: Propulsion {
            mass_flow: 0.0,
            burn_time: 1.0e9,
            dry_mass: 500.0,
        },
        steps,
        ..Default::default()
    }
}

#[test]
fn geodetic_round_trip_grid() {
    for lat in (-80..=80).step_by(10) {
        for lon in (-180..180).step_by(45) {
            for altitude in [0.0, 500.0, 10_000.0, 20_000.0] {
                let site = Geodetic::from_degrees(lat as f64, lon as f64, altitude);
                let ecef = geodetic_to_ecef(site.latitude, site.longitude, site.altitude);
                let back = ecef_to_geodetic(&ecef);
                assert!(
                    (back.latitude - site.latitude).abs() < 1e-9,
                    "latitude at ({}, {}, {})",
                    lat,
                    lon,
                    altitude
                );
                assert!(wrap_to_pi(back.longitude - site.longitude).abs() < 1e-9);
                assert!((back.altitude - altitude).abs() < 0.01);
                // Going forward again lands on the same point
                assert!((back.to_ecef() - ecef).norm() < 0.01);
            }
        }
    }
}

#[test]
fn covariance_stays_symmetric_psd_under_mixed_sequence() {
    let start = geodetic_to_ecef(0.3, -1.2, 100.0);
    let mut ekf = ExtendedKalmanFilter::new(
        InitialState::new(start, Vector3::zeros()),
        ExtendedFilterConfig::default(),
    )
    .unwrap();
    let mut rng = StdRng::seed_from_u64(11);
    let accel_noise = Normal::new(0.0, 0.5).unwrap();

    for step in 1..=400 {
        let accel = Vector3::new(
            accel_noise.sample(&mut rng),
            accel_noise.sample(&mut rng),
            accel_noise.sample(&mut rng),
        );
        let imu = IMUData::new(accel, Vector3::new(0.01, -0.02, 0.03), 0.0);
        ekf.predict(&imu).unwrap();

        if step % 7 == 0 {
            let nav = ekf.get_navigation_state();
            let gps = if step % 21 == 0 {
                GPSMeasurement::unavailable(nav.timestamp)
            } else {
                GPSMeasurement::new(
                    nav.position + Vector3::new(1.0, -2.0, 0.5),
                    nav.velocity,
                    2.5,
                    0.1,
                    nav.timestamp,
                )
            };
            ekf.update(&gps).unwrap();
        }

        let covariance = ekf.get_navigation_state().covariance;
        assert!(is_symmetric(&covariance, 1e-9), "asymmetric at step {}", step);
        assert!(min_eigenvalue(&covariance) > -1e-9, "indefinite at step {}", step);
    }
}

#[test]
fn filter_tracks_simulated_sensors_step_by_step() {
    let site = Geodetic::from_degrees(28.5, -80.6, 3.0);
    let propulsion = Propulsion {
        mass_flow: 2.0,
        burn_time: 60.0,
        dry_mass: 500.0,
    };
    let mut truth = TruthState::at_rest(&site, 15_000.0, 1000.0).unwrap();
    let config = SensorConfig::default();
    let mut ekf = ExtendedKalmanFilter::new(
        InitialState::new(truth.position, truth.velocity),
        ExtendedFilterConfig::default(),
    )
    .unwrap();
    let mut rng = StdRng::seed_from_u64(3);

    for step in 1..=300 {
        let imu = simulate_imu(&truth, 0.1, &config, &mut rng).unwrap();
        truth.step(0.1, &propulsion).unwrap();
        let kinematic =
            compensate_gravity(&imu.measurement, &ekf.get_navigation_state().position);
        ekf.predict(&kinematic).unwrap();
        if step % 10 == 0 {
            let gps = simulate_gps(&truth, &config, &mut rng).unwrap();
            assert!(gps.available);
            ekf.update(&gps).unwrap();
        }
    }
    let nav = ekf.get_navigation_state();
    assert_approx_eq!(nav.timestamp, truth.mission_time, 1e-6);
    assert!(truth.altitude > 1_000.0);
    assert!((nav.position - truth.position).norm() < 15.0);
    assert!((nav.velocity - truth.velocity).norm() < 2.0);
}

#[test]
fn noise_free_prediction_matches_truth() {
    let site = Geodetic::from_degrees(28.5, -80.6, 3.0);
    let propulsion = Propulsion {
        mass_flow: 5.0,
        burn_time: 3.0,
        dry_mass: 800.0,
    };
    let mut truth = TruthState::at_rest(&site, 20_000.0, 1000.0).unwrap();
    let mut ekf = ExtendedKalmanFilter::new(
        InitialState::new(truth.position, truth.velocity),
        ExtendedFilterConfig::default(),
    )
    .unwrap();

    // Burn then coast, so both the powered and ballistic phases are covered
    for _ in 0..50 {
        let sensed = IMUData::new(truth.specific_force(), Vector3::zeros(), truth.mission_time);
        let kinematic = compensate_gravity(&sensed, &truth.position);
        truth.step(ekf.dt(), &propulsion).unwrap();
        ekf.predict(&kinematic).unwrap();
    }
    let nav = ekf.get_navigation_state();
    assert_approx_eq!(nav.timestamp, truth.mission_time, 1e-9);
    assert!((nav.position - truth.position).norm() < 1e-6);
    assert!((nav.velocity - truth.velocity).norm() < 1e-6);
    assert!(truth.velocity.norm() > 10.0);
}

#[test]
fn stationary_truth_converges() {
    let config = hover_scenario(300);
    let result = run_scenario(&config).unwrap();
    let summary = result.summary();
    let initial_error = result.records[0].position_error_m;

    assert_eq!(summary.gps_updates, 30);
    assert!(summary.final_position_error < 5.0);
    assert!(summary.final_position_error < initial_error);
    assert!(summary.final_velocity_error < 0.5);
    let tail = &result.records[200..];
    let tail_mean = tail.iter().map(|r| r.position_error_m).sum::<f64>() / tail.len() as f64;
    assert!(tail_mean < 5.0);
    // The truth itself does not move
    let first = &result.records[0];
    let last = result.records.last().unwrap();
    assert_approx_eq!(first.truth_x_m, last.truth_x_m, 1e-6);
    assert!(last.position_sigma_m < first.position_sigma_m);
}

#[test]
fn dead_reckoning_drifts_without_gps() {
    let closed = run_scenario(&hover_scenario(300)).unwrap();
    let mut config = hover_scenario(300);
    config.sensors.gps_max_altitude = -1.0e6;
    let dead = run_scenario(&config).unwrap();

    assert_eq!(dead.summary().gps_updates, 0);
    assert!(dead.summary().final_position_error > closed.summary().final_position_error);
    for pair in dead.records.windows(2) {
        assert!(pair[1].position_sigma_m > pair[0].position_sigma_m);
    }
}

#[test]
fn ascent_loses_gps_above_ceiling() {
    let config = ScenarioConfig::default();
    let result = run_scenario(&config).unwrap();
    let summary = result.summary();

    let reports = config.steps / config.gps_interval;
    assert!(summary.gps_updates > reports / 2);
    assert!(summary.gps_updates < reports);

    let last_fix = result.records.iter().rposition(|r| r.gps_fused).unwrap();
    assert!(result.records[last_fix].truth_altitude_m <= 80_000.0);
    let last = result.records.last().unwrap();
    assert!(last.truth_altitude_m > 80_000.0);
    assert!(last.position_sigma_m > result.records[last_fix].position_sigma_m);

    let final_state = result.final_state.unwrap();
    assert!(is_symmetric(&final_state.covariance, 1e-6));
}

#[test]
fn reduced_filter_tracks_constant_velocity() {
    let velocity = Vector3::new(100.0, -20.0, 300.0);
    let start = geodetic_to_ecef(0.0, 0.0, 0.0);
    let mut filter = ReducedKalmanFilter::new(
        start + Vector3::new(20.0, -15.0, 10.0),
        Vector3::zeros(),
        ReducedFilterConfig::default(),
    )
    .unwrap();

    for step in 1..=60 {
        filter.predict(&1.0).unwrap();
        let position = start + velocity * step as f64;
        let z = Vector6::new(
            position[0],
            position[1],
            position[2],
            velocity[0],
            velocity[1],
            velocity[2],
        );
        filter.update(&z).unwrap();
    }
    let state = filter.get_state();
    let truth = start + velocity * 60.0;
    assert!((state.position - truth).norm() < 5.0);
    assert!((state.velocity - velocity).norm() < 0.5);
    assert!(is_symmetric(&state.covariance, 1e-9));
}

#[test]
fn scenario_files_round_trip() {
    let dir = tempdir().unwrap();
    let config = ScenarioConfig {
        name: "file".to_string(),
        steps: 50,
        seed: 1234,
        ..Default::default()
    };
    for name in ["scenario.json", "scenario.yaml", "scenario.yml", "scenario.toml"] {
        let path = dir.path().join(name);
        config.to_file(&path).unwrap();
        let loaded = ScenarioConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }
    let loaded = ScenarioConfig::from_file(dir.path().join("scenario.toml")).unwrap();
    let from_file = run_scenario(&loaded).unwrap();
    let direct = run_scenario(&config).unwrap();
    assert_eq!(from_file.records, direct.records);
}

#[test]
fn results_export_to_csv() {
    let result = run_scenario(&hover_scenario(30)).unwrap();
    let file = NamedTempFile::with_suffix(".csv").unwrap();
    result.to_csv(file.path()).unwrap();

    let text = std::fs::read_to_string(file.path()).unwrap();
    let mut lines = text.lines();
    let header = lines.next().unwrap();
    assert!(header.starts_with("step,time,latitude_deg"));
    assert!(header.contains("gps_fused"));
    assert_eq!(lines.count(), 31);

    let loaded = NavigationResult::from_csv(file.path(), "hover").unwrap();
    assert_eq!(loaded.summary().gps_updates, result.summary().gps_updates);
    assert_approx_eq!(
        loaded.summary().final_position_error,
        result.summary().final_position_error,
        1e-9
    );
}
