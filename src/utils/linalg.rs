//! Dense linear algebra on ndarray matrices.
//!
//! Thin wrappers over nalgebra's LU and Cholesky decompositions that take and
//! return ndarray types and report failure as `None`, leaving it to callers to
//! choose the matching error variant.

use nalgebra::DMatrix;
use ndarray::{Array1, Array2};

use super::matrix_convert::{
    nalgebra_to_ndarray, nalgebra_vec_to_ndarray, ndarray_to_nalgebra, ndarray_vec_to_nalgebra,
};

/// An LU pivot smaller than this fraction of the largest pivot marks the
/// matrix as singular. Relative, so rescaling the matrix does not change the
/// verdict.
pub const SINGULARITY_TOLERANCE: f64 = 1e-12;

/// `true` if the diagonal of the LU factor `u` has a vanishing pivot.
fn has_vanishing_pivot(u: &DMatrix<f64>) -> bool {
    let pivots: Vec<f64> = u.diagonal().iter().map(|p| p.abs()).collect();
    if pivots.iter().any(|p| !p.is_finite()) {
        return true;
    }
    let largest = pivots.iter().cloned().fold(0.0, f64::max);
    let smallest = pivots.iter().cloned().fold(f64::INFINITY, f64::min);
    largest == 0.0 || smallest < SINGULARITY_TOLERANCE * largest
}

/// Determinant of a square matrix via LU decomposition.
pub fn determinant(a: &Array2<f64>) -> f64 {
    ndarray_to_nalgebra(a).lu().determinant()
}

/// Inverse of a general square matrix.
///
/// # Returns
///
/// * `None` if the matrix is singular or numerically close to singular
pub fn inverse(a: &Array2<f64>) -> Option<Array2<f64>> {
    let lu = ndarray_to_nalgebra(a).lu();
    if has_vanishing_pivot(&lu.u()) {
        return None;
    }
    lu.try_inverse().map(|inv| nalgebra_to_ndarray(&inv))
}

/// Solve `a x = b` for a square matrix `a`.
///
/// # Returns
///
/// * `None` if `a` is singular or numerically close to singular
pub fn solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let lu = ndarray_to_nalgebra(a).lu();
    if has_vanishing_pivot(&lu.u()) {
        return None;
    }
    lu.solve(&ndarray_vec_to_nalgebra(b))
        .map(|x| nalgebra_vec_to_ndarray(&x))
}

/// Cholesky factorization of a symmetric matrix, returning the inverse and
/// the log-determinant.
///
/// # Returns
///
/// * `Some((inverse, log_det))` if the matrix is positive definite
/// * `None` otherwise
pub fn spd_inverse_and_log_det(a: &Array2<f64>) -> Option<(Array2<f64>, f64)> {
    if a.iter().any(|x| !x.is_finite()) {
        return None;
    }

    let chol = ndarray_to_nalgebra(a).cholesky()?;

    // log|A| = 2 * sum(log(L_ii))
    let l = chol.l();
    let log_det = 2.0 * l.diagonal().iter().map(|d| d.ln()).sum::<f64>();
    if !log_det.is_finite() {
        return None;
    }

    Some((nalgebra_to_ndarray(&chol.inverse()), log_det))
}

/// Log-determinant of a symmetric positive definite matrix.
pub fn spd_log_det(a: &Array2<f64>) -> Option<f64> {
    spd_inverse_and_log_det(a).map(|(_, log_det)| log_det)
}
