//! Error types for the navigation core.
//!
//! Construction and input validation fail fast with a [`NavError`]. Numerical
//! degradation (near-singular innovation covariance, GPS outages, polar
//! geodesy) is never an error; it is handled in place and reported through
//! the `log` facade instead.

use thiserror::Error;

/// Errors raised by filter construction, filter steps and sensor simulation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum NavError {
    /// Integration step was zero, negative or not finite
    #[error("invalid time step: {0} s (must be positive and finite)")]
    InvalidTimeStep(f64),

    /// A noise, sensor or vehicle parameter was negative or not finite
    #[error("invalid parameter `{name}`: {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    /// A flat slice did not match the fixed state or input length
    #[error("state length mismatch: expected {expected}, got {actual}")]
    StateLengthMismatch { expected: usize, actual: usize },

    /// NaN or infinity found in an input vector
    #[error("non-finite values in {0}")]
    NonFiniteInput(&'static str),

    /// Failure constructing a sampling distribution
    #[error("distribution error: {0}")]
    Distribution(String),
}

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, NavError>;

/// Reject zero, negative and non-finite time steps.
pub(crate) fn check_time_step(dt: f64) -> Result<f64> {
    if dt.is_finite() && dt > 0.0 {
        Ok(dt)
    } else {
        Err(NavError::InvalidTimeStep(dt))
    }
}

/// Reject negative and non-finite parameters. Zero is allowed.
pub(crate) fn check_non_negative(name: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(NavError::InvalidParameter { name, value })
    }
}

/// Reject any NaN or infinity in a slice of values.
pub(crate) fn check_finite<'a, I>(what: &'static str, values: I) -> Result<()>
where
    I: IntoIterator<Item = &'a f64>,
{
    if values.into_iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(NavError::NonFiniteInput(what))
    }
}
