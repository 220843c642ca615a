//! Earth model constants and coordinate transforms
//!
//! This module contains the WGS84 ellipsoid constants and the stateless conversions the
//! navigation filters and the sensor simulator depend on. All filter states are expressed in
//! the Earth-centered Earth-fixed (ECEF) frame; these functions let callers move between
//! ECEF, geodetic (latitude, longitude, altitude) coordinates and a local East-North-Up (ENU)
//! frame anchored at a geodetic location.
//!
//! # Coordinate Systems
//! - **ECEF**: right-handed Cartesian frame with its origin at the Earth's center of mass,
//!   the z-axis through the north pole and the x-axis through the prime meridian at the
//!   equator. Units are meters.
//! - **Geodetic**: latitude and longitude in radians and altitude in meters above the WGS84
//!   ellipsoid.
//! - **ENU**: local-level frame tangent to the ellipsoid at a reference location.
//!
//! The forward conversion (geodetic to ECEF) is closed form. The inverse runs a fixed number
//! of fixed-point iterations on latitude ([`GEODETIC_ITERATIONS`]) so the cost is bounded and
//! deterministic. Near the poles the accuracy of the inverse degrades but it always returns a
//! finite result.
//!
//! For validation, [`Geodetic`] converts into the [`nav-types`](https://crates.io/crates/nav-types)
//! `WGS84` type, which carries an independent implementation of the same ellipsoid.

use nalgebra::{Matrix3, Vector3};
use nav_types::WGS84;
use serde::{Deserialize, Serialize};

// Earth constants (WGS84)
/// Earth's equatorial radius (semi-major axis $a$) in meters
pub const EQUATORIAL_RADIUS: f64 = 6378137.0;
/// Earth's flattening factor ($f$)
pub const FLATTENING: f64 = 1.0 / 298.257223563;
/// Earth's polar radius (semi-minor axis $b = a(1 - f)$) in meters
pub const POLAR_RADIUS: f64 = EQUATORIAL_RADIUS * (1.0 - FLATTENING);
/// Earth's first eccentricity squared ($e^2 = f(2 - f)$)
pub const ECCENTRICITY_SQUARED: f64 = FLATTENING * (2.0 - FLATTENING);
/// Earth's standard gravitational parameter ($GM$) in $m^3/s^2$
pub const GRAVITATIONAL_PARAMETER: f64 = 3.986004418e14;
/// Number of latitude refinements performed by [`ecef_to_geodetic`]
pub const GEODETIC_ITERATIONS: usize = 5;
/// Below this value of $|\cos\phi|$ altitude is recovered from the z-axis instead of the
/// equatorial-plane distance
const POLAR_COSINE_THRESHOLD: f64 = 1e-3;

/// Geodetic position on the WGS84 ellipsoid.
///
/// Angles are stored in radians. Use [`Geodetic::from_degrees`] when working from surveyed
/// coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Geodetic {
    /// Geodetic latitude in radians
    pub latitude: f64,
    /// Longitude in radians
    pub longitude: f64,
    /// Height above the ellipsoid in meters
    pub altitude: f64,
}
impl Geodetic {
    pub fn new(latitude: f64, longitude: f64, altitude: f64) -> Self {
        Geodetic {
            latitude,
            longitude,
            altitude,
        }
    }
    /// Build a geodetic position from latitude and longitude in degrees
    pub fn from_degrees(latitude: f64, longitude: f64, altitude: f64) -> Self {
        Geodetic {
            latitude: latitude.to_radians(),
            longitude: longitude.to_radians(),
            altitude,
        }
    }
    /// Latitude in degrees
    pub fn latitude_degrees(&self) -> f64 {
        self.latitude.to_degrees()
    }
    /// Longitude in degrees
    pub fn longitude_degrees(&self) -> f64 {
        self.longitude.to_degrees()
    }
    /// ECEF position of this location
    pub fn to_ecef(&self) -> Vector3<f64> {
        geodetic_to_ecef(self.latitude, self.longitude, self.altitude)
    }
}
impl From<Geodetic> for WGS84<f64> {
    fn from(position: Geodetic) -> Self {
        WGS84::from_degrees_and_meters(
            position.latitude_degrees(),
            position.longitude_degrees(),
            position.altitude,
        )
    }
}

/// Prime vertical radius of curvature ($N$) at a given geodetic latitude
///
/// # Parameters
/// - `latitude` - geodetic latitude in radians
///
/// # Returns
/// The radius of curvature in the prime vertical in meters
pub fn prime_vertical_radius(latitude: f64) -> f64 {
    let sin_lat = latitude.sin();
    EQUATORIAL_RADIUS / (1.0 - ECCENTRICITY_SQUARED * sin_lat * sin_lat).sqrt()
}

/// Convert an ECEF position to geodetic coordinates.
///
/// Longitude is solved directly. Latitude is seeded with the zero-altitude solution and then
/// refined [`GEODETIC_ITERATIONS`] times:
///
/// $$
/// N = \frac{a}{\sqrt{1 - e^2 \sin^2\phi}}, \quad
/// h = \frac{p}{\cos\phi} - N, \quad
/// \phi \leftarrow \operatorname{atan2}\left(z, p\left(1 - e^2 \frac{N}{N + h}\right)\right)
/// $$
///
/// where $p = \sqrt{x^2 + y^2}$. Within a milliradian of the poles the altitude is taken as
/// $h = z / \sin\phi - N(1 - e^2)$, which stays finite when $\cos\phi \to 0$.
///
/// # Parameters
/// - `ecef` - position in the ECEF frame, meters
///
/// # Returns
/// The geodetic position. No error is ever returned; accuracy degrades near the poles and at
/// the Earth's center.
///
/// # Example
/// ```rust
/// use launchnav::earth;
/// let position = earth::ecef_to_geodetic(&nalgebra::Vector3::new(6378137.0, 0.0, 0.0));
/// assert!(position.altitude.abs() < 1e-6);
/// ```
pub fn ecef_to_geodetic(ecef: &Vector3<f64>) -> Geodetic {
    let (x, y, z) = (ecef[0], ecef[1], ecef[2]);
    let longitude = y.atan2(x);
    let p = x.hypot(y);
    if p == 0.0 && z == 0.0 {
        return Geodetic::new(0.0, longitude, -EQUATORIAL_RADIUS);
    }

    let mut latitude = z.atan2(p * (1.0 - ECCENTRICITY_SQUARED));
    let mut altitude = 0.0;
    for _ in 0..GEODETIC_ITERATIONS {
        let n = prime_vertical_radius(latitude);
        altitude = altitude_from_latitude(p, z, latitude, n);
        latitude = z.atan2(p * (1.0 - ECCENTRICITY_SQUARED * n / (n + altitude)));
    }
    altitude = altitude_from_latitude(p, z, latitude, prime_vertical_radius(latitude));

    Geodetic {
        latitude,
        longitude,
        altitude,
    }
}

fn altitude_from_latitude(p: f64, z: f64, latitude: f64, n: f64) -> f64 {
    let cos_lat = latitude.cos();
    if cos_lat.abs() < POLAR_COSINE_THRESHOLD {
        z / latitude.sin() - n * (1.0 - ECCENTRICITY_SQUARED)
    } else {
        p / cos_lat - n
    }
}

/// Convert geodetic coordinates to an ECEF position.
///
/// $$
/// x = (N + h)\cos\phi\cos\lambda, \quad
/// y = (N + h)\cos\phi\sin\lambda, \quad
/// z = (N(1 - e^2) + h)\sin\phi
/// $$
///
/// # Parameters
/// - `latitude` - geodetic latitude in radians
/// - `longitude` - longitude in radians
/// - `altitude` - height above the ellipsoid in meters
///
/// # Example
/// ```rust
/// use launchnav::earth;
/// let ecef = earth::geodetic_to_ecef(0.0, 0.0, 0.0);
/// assert!((ecef[0] - earth::EQUATORIAL_RADIUS).abs() < 1e-6);
/// ```
pub fn geodetic_to_ecef(latitude: f64, longitude: f64, altitude: f64) -> Vector3<f64> {
    let n = prime_vertical_radius(latitude);
    let (sin_lat, cos_lat) = latitude.sin_cos();
    let (sin_lon, cos_lon) = longitude.sin_cos();
    Vector3::new(
        (n + altitude) * cos_lat * cos_lon,
        (n + altitude) * cos_lat * sin_lon,
        (n * (1.0 - ECCENTRICITY_SQUARED) + altitude) * sin_lat,
    )
}

/// Rotation from the ECEF frame to the local East-North-Up frame at a geodetic location.
///
/// Rows are the East, North and Up unit vectors expressed in ECEF:
///
/// $$
/// C_e^n = \begin{bmatrix}
/// -\sin\lambda & \cos\lambda & 0 \\\\
/// -\sin\phi\cos\lambda & -\sin\phi\sin\lambda & \cos\phi \\\\
/// \cos\phi\cos\lambda & \cos\phi\sin\lambda & \sin\phi
/// \end{bmatrix}
/// $$
///
/// # Parameters
/// - `latitude` - geodetic latitude in radians
/// - `longitude` - longitude in radians
pub fn ecef_to_enu_matrix(latitude: f64, longitude: f64) -> Matrix3<f64> {
    let (sin_lat, cos_lat) = latitude.sin_cos();
    let (sin_lon, cos_lon) = longitude.sin_cos();
    Matrix3::new(
        -sin_lon,
        cos_lon,
        0.0,
        -sin_lat * cos_lon,
        -sin_lat * sin_lon,
        cos_lat,
        cos_lat * cos_lon,
        cos_lat * sin_lon,
        sin_lat,
    )
}

/// Rotation from the local East-North-Up frame back to ECEF (transpose of
/// [`ecef_to_enu_matrix`]).
pub fn enu_to_ecef_matrix(latitude: f64, longitude: f64) -> Matrix3<f64> {
    ecef_to_enu_matrix(latitude, longitude).transpose()
}

/// Express an ECEF position relative to a geodetic origin in that origin's ENU frame.
pub fn ecef_to_enu(position: &Vector3<f64>, origin: &Geodetic) -> Vector3<f64> {
    ecef_to_enu_matrix(origin.latitude, origin.longitude) * (position - origin.to_ecef())
}

/// Point-mass gravitational acceleration at an ECEF position, $-GM\,r/|r|^3$.
///
/// Returns zero at the Earth's center.
pub fn gravitational_acceleration(position: &Vector3<f64>) -> Vector3<f64> {
    let radius = position.norm();
    if radius == 0.0 {
        return Vector3::zeros();
    }
    -GRAVITATIONAL_PARAMETER / radius.powi(3) * position
}
