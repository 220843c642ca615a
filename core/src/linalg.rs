//! Fixed-size linear algebra kernels shared by the navigation filters.
//!
//! Public API:
//!     pub fn gauss_jordan_inverse<const N: usize>(m: &SMatrix<f64, N, N>) -> Inversion<N>
//!     pub fn kalman_correct<const N: usize, const M: usize>(...) -> Correction<M>
//!
//! Helpers (each isolated for testing):
//!     - symmetrize()
//!     - is_symmetric()
//!     - min_eigenvalue()
//!
//! All kernels work on stack-allocated `nalgebra` matrices whose dimensions are fixed at
//! compile time (6x6 and 15x15 in this crate), so the same code serves both filter variants.

use nalgebra::linalg::SymmetricEigen;
use nalgebra::{DMatrix, SMatrix, SVector};

/// Pivot magnitude below which Gauss-Jordan elimination searches for a better row and, failing
/// that, clamps the pivot.
pub const PIVOT_THRESHOLD: f64 = 1e-12;

/// Result of [`gauss_jordan_inverse`].
#[derive(Clone, Copy, Debug)]
pub struct Inversion<const N: usize> {
    /// The (possibly regularized) inverse
    pub inverse: SMatrix<f64, N, N>,
    /// True when at least one pivot had to be clamped to [`PIVOT_THRESHOLD`]; the inverse is
    /// then only an approximation
    pub pivot_clamped: bool,
}

/// Result of a single [`kalman_correct`] step.
#[derive(Clone, Copy, Debug)]
pub struct Correction<const M: usize> {
    /// Innovation $y = z - Hx$
    pub innovation: SVector<f64, M>,
    /// Propagated from the innovation covariance inversion
    pub pivot_clamped: bool,
}

/// Symmetrize a matrix: P ← 0.5 (P + Pᵀ)
///
/// Removes the round-off asymmetry that accumulates through repeated covariance updates.
#[inline]
pub fn symmetrize<const N: usize>(m: &SMatrix<f64, N, N>) -> SMatrix<f64, N, N> {
    0.5 * (m + m.transpose())
}

/// Invert a square matrix with Gauss-Jordan elimination and partial pivoting.
///
/// The elimination runs on the augmented system $[A \mid I]$. When a diagonal pivot is smaller
/// in magnitude than [`PIVOT_THRESHOLD`], the rows below it are searched for the
/// largest-magnitude entry in that column and swapped in. If no row is better, the pivot is
/// clamped to $\pm$[`PIVOT_THRESHOLD`] (keeping its sign) and elimination continues. The
/// routine therefore never fails; a clamped pivot is reported through
/// [`Inversion::pivot_clamped`] and the result should be treated as degraded.
///
/// # Arguments
/// * `m` - square matrix to invert
///
/// # Example
/// ```rust
/// use launchnav::linalg::gauss_jordan_inverse;
/// use nalgebra::Matrix2;
/// let result = gauss_jordan_inverse(&Matrix2::new(4.0, 7.0, 2.0, 6.0));
/// assert!(!result.pivot_clamped);
/// assert!((result.inverse[(0, 0)] - 0.6).abs() < 1e-12);
/// ```
pub fn gauss_jordan_inverse<const N: usize>(m: &SMatrix<f64, N, N>) -> Inversion<N> {
    let mut a = *m;
    let mut inverse = SMatrix::<f64, N, N>::identity();
    let mut pivot_clamped = false;

    for col in 0..N {
        if a[(col, col)].abs() < PIVOT_THRESHOLD {
            let mut best = col;
            for row in (col + 1)..N {
                if a[(row, col)].abs() > a[(best, col)].abs() {
                    best = row;
                }
            }
            if best != col {
                a.swap_rows(col, best);
                inverse.swap_rows(col, best);
            }
        }

        let mut pivot = a[(col, col)];
        if pivot.abs() < PIVOT_THRESHOLD {
            pivot = if pivot.is_sign_negative() {
                -PIVOT_THRESHOLD
            } else {
                PIVOT_THRESHOLD
            };
            a[(col, col)] = pivot;
            pivot_clamped = true;
        }

        for j in 0..N {
            a[(col, j)] /= pivot;
            inverse[(col, j)] /= pivot;
        }

        for row in 0..N {
            if row == col {
                continue;
            }
            let factor = a[(row, col)];
            if factor == 0.0 {
                continue;
            }
            for j in 0..N {
                a[(row, j)] -= factor * a[(col, j)];
                inverse[(row, j)] -= factor * inverse[(col, j)];
            }
        }
    }

    Inversion {
        inverse,
        pivot_clamped,
    }
}

/// Linear Kalman measurement correction, applied in place.
///
/// $$
/// \begin{aligned}
/// y &= z - H x \\\\
/// S &= H P H^T + R \\\\
/// K &= P H^T S^{-1} \\\\
/// x &\leftarrow x + K y \\\\
/// P &\leftarrow (I - K H) P
/// \end{aligned}
/// $$
///
/// $S^{-1}$ comes from [`gauss_jordan_inverse`]. The updated covariance is symmetrized before
/// it is written back.
///
/// # Arguments
/// * `state` - state estimate $x$ (N)
/// * `covariance` - state covariance $P$ (NxN)
/// * `measurement` - measurement $z$ (M)
/// * `observation` - measurement matrix $H$ (MxN)
/// * `measurement_noise` - measurement covariance $R$ (MxM)
pub fn kalman_correct<const N: usize, const M: usize>(
    state: &mut SVector<f64, N>,
    covariance: &mut SMatrix<f64, N, N>,
    measurement: &SVector<f64, M>,
    observation: &SMatrix<f64, M, N>,
    measurement_noise: &SMatrix<f64, M, M>,
) -> Correction<M> {
    let innovation = measurement - observation * *state;
    let innovation_covariance =
        symmetrize(&(observation * *covariance * observation.transpose() + measurement_noise));
    let inversion = gauss_jordan_inverse(&innovation_covariance);
    let gain = *covariance * observation.transpose() * inversion.inverse;

    *state += gain * innovation;
    let identity = SMatrix::<f64, N, N>::identity();
    *covariance = symmetrize(&((identity - gain * observation) * *covariance));

    Correction {
        innovation,
        pivot_clamped: inversion.pivot_clamped,
    }
}

/// Check whether a matrix is symmetric to within an absolute tolerance.
pub fn is_symmetric<const N: usize>(m: &SMatrix<f64, N, N>, tolerance: f64) -> bool {
    (0..N).all(|i| (0..i).all(|j| (m[(i, j)] - m[(j, i)]).abs() <= tolerance))
}

/// Smallest eigenvalue of a symmetric matrix.
///
/// Used to confirm a covariance is positive semi-definite. The input is symmetrized first.
pub fn min_eigenvalue<const N: usize>(m: &SMatrix<f64, N, N>) -> f64 {
    let p = symmetrize(m);
    let dynamic = DMatrix::from_column_slice(N, N, p.as_slice());
    SymmetricEigen::new(dynamic)
        .eigenvalues
        .iter()
        .cloned()
        .fold(f64::INFINITY, f64::min)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use nalgebra::{Matrix2, Matrix3, Matrix6, Vector2};

    fn assert_identity<const N: usize>(m: &SMatrix<f64, N, N>, tol: f64) {
        for i in 0..N {
            for j in 0..N {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_approx_eq!(m[(i, j)], expected, tol);
            }
        }
    }

    #[test]
    fn symmetrize_averages_off_diagonals() {
        let m = Matrix2::new(1.0, 2.0, 4.0, 3.0);
        let s = symmetrize(&m);
        assert_eq!(s, Matrix2::new(1.0, 3.0, 3.0, 3.0));
        assert!(is_symmetric(&s, 0.0));
        assert!(!is_symmetric(&m, 1e-9));
    }

    #[test]
    fn inverse_two_by_two() {
        let m = Matrix2::new(4.0, 7.0, 2.0, 6.0);
        let result = gauss_jordan_inverse(&m);
        assert!(!result.pivot_clamped);
        assert_approx_eq!(result.inverse[(0, 0)], 0.6, 1e-12);
        assert_approx_eq!(result.inverse[(0, 1)], -0.7, 1e-12);
        assert_approx_eq!(result.inverse[(1, 0)], -0.2, 1e-12);
        assert_approx_eq!(result.inverse[(1, 1)], 0.4, 1e-12);
    }

    #[test]
    fn inverse_needs_row_swap() {
        // Zero leading pivot forces a search down the first column
        let m = Matrix3::new(0.0, 2.0, 1.0, 3.0, 0.0, 1.0, 1.0, 1.0, 0.0);
        let result = gauss_jordan_inverse(&m);
        assert!(!result.pivot_clamped);
        assert_identity(&(m * result.inverse), 1e-12);
    }

    #[test]
    fn inverse_of_covariance_sized_matrix() {
        let mut m = Matrix6::<f64>::identity() * 4.0;
        for i in 0..5 {
            m[(i, i + 1)] = 0.5;
            m[(i + 1, i)] = 0.5;
        }
        let result = gauss_jordan_inverse(&m);
        assert!(!result.pivot_clamped);
        assert_identity(&(m * result.inverse), 1e-10);
    }

    #[test]
    fn singular_matrix_is_clamped_not_fatal() {
        let m = Matrix2::new(1.0, 2.0, 2.0, 4.0);
        let result = gauss_jordan_inverse(&m);
        assert!(result.pivot_clamped);
        assert!(result.inverse.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn zero_matrix_clamps_every_pivot() {
        let result = gauss_jordan_inverse(&Matrix2::<f64>::zeros());
        assert!(result.pivot_clamped);
        assert_approx_eq!(result.inverse[(0, 0)], 1.0 / PIVOT_THRESHOLD, 1.0);
        assert_approx_eq!(result.inverse[(1, 1)], 1.0 / PIVOT_THRESHOLD, 1.0);
    }

    #[test]
    fn scalar_kalman_correction() {
        // Two equal-variance estimates should meet in the middle with half the variance
        let mut x = SVector::<f64, 1>::new(0.0);
        let mut p = SMatrix::<f64, 1, 1>::new(4.0);
        let z = SVector::<f64, 1>::new(2.0);
        let h = SMatrix::<f64, 1, 1>::identity();
        let r = SMatrix::<f64, 1, 1>::new(4.0);
        let correction = kalman_correct(&mut x, &mut p, &z, &h, &r);
        assert!(!correction.pivot_clamped);
        assert_approx_eq!(correction.innovation[0], 2.0);
        assert_approx_eq!(x[0], 1.0);
        assert_approx_eq!(p[(0, 0)], 2.0);
    }

    #[test]
    fn partial_observation_leaves_unobserved_uncorrelated_states() {
        let mut x = Vector2::new(0.0, 5.0);
        let mut p = Matrix2::new(1.0, 0.0, 0.0, 1.0);
        let z = SVector::<f64, 1>::new(1.0);
        let h = SMatrix::<f64, 1, 2>::new(1.0, 0.0);
        let r = SMatrix::<f64, 1, 1>::new(1.0);
        kalman_correct(&mut x, &mut p, &z, &h, &r);
        assert_approx_eq!(x[0], 0.5);
        assert_approx_eq!(x[1], 5.0);
        assert_approx_eq!(p[(0, 0)], 0.5);
        assert_approx_eq!(p[(1, 1)], 1.0);
    }

    #[test]
    fn eigenvalue_check() {
        let m = Matrix2::new(2.0, 1.0, 1.0, 2.0);
        assert_approx_eq!(min_eigenvalue(&m), 1.0, 1e-12);
        let indefinite = Matrix2::new(1.0, 2.0, 2.0, 1.0);
        assert_approx_eq!(min_eigenvalue(&indefinite), -1.0, 1e-12);
    }
}
