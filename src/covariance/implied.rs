//! Model-implied covariance.
//!
//! With `B[child][parent]` holding edge coefficients and `Ω` the error
//! covariance, the structural equations `X = B X + e` give
//! `Σ = (I - B)^-1 Ω (I - B)^-T`.

use ndarray::{Array2, Axis};

use crate::error::{Result, SemOptError};
use crate::utils::linalg;

/// Compute the implied covariance over all variables.
///
/// # Arguments
///
/// * `edge_coef` - `B`, with `B[i][j]` the coefficient of the edge `j -> i`
/// * `error_cov` - `Ω`, symmetric error covariance
///
/// # Returns
///
/// * The implied covariance `Σ`
///
/// # Errors
///
/// * `SemOptError::NonInvertibleStructure` if `I - B` is singular
/// * `SemOptError::DimensionMismatch` if the matrices are not square and equal in size
pub fn compute_implied(edge_coef: &Array2<f64>, error_cov: &Array2<f64>) -> Result<Array2<f64>> {
    let n = edge_coef.nrows();
    if edge_coef.ncols() != n || error_cov.dim() != (n, n) {
        return Err(SemOptError::DimensionMismatch(format!(
            "B is {:?} and Omega is {:?}; both must be {}x{}",
            edge_coef.dim(),
            error_cov.dim(),
            n,
            n
        )));
    }

    // Σ = Ω when there are no edges
    if edge_coef.iter().all(|&b| b == 0.0) {
        return Ok(error_cov.clone());
    }

    let i_minus_b = Array2::<f64>::eye(n) - edge_coef;
    let inv = linalg::inverse(&i_minus_b).ok_or_else(|| {
        SemOptError::NonInvertibleStructure(
            "I - B is singular for the current coefficients".to_string(),
        )
    })?;

    let sigma = inv.dot(error_cov).dot(&inv.t());

    // Clean up round-off asymmetry
    Ok((&sigma + &sigma.t()) * 0.5)
}

/// Implied covariance over all variables, with observed/latent index sets.
#[derive(Debug, Clone)]
pub struct ImpliedCovariance {
    matrix: Array2<f64>,
    observed: Vec<usize>,
    latent: Vec<usize>,
}

impl ImpliedCovariance {
    /// Compute `Σ` and remember which rows are observed and which latent.
    ///
    /// # Arguments
    ///
    /// * `edge_coef` - `B`
    /// * `error_cov` - `Ω`
    /// * `observed` - Variable positions of measured variables
    /// * `latent` - Variable positions of latent variables
    pub fn compute(
        edge_coef: &Array2<f64>,
        error_cov: &Array2<f64>,
        observed: &[usize],
        latent: &[usize],
    ) -> Result<Self> {
        let matrix = compute_implied(edge_coef, error_cov)?;
        Ok(Self {
            matrix,
            observed: observed.to_vec(),
            latent: latent.to_vec(),
        })
    }

    /// Full implied covariance.
    pub fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }

    /// Σ_yy, observed by observed.
    pub fn yy(&self) -> Array2<f64> {
        self.block(&self.observed, &self.observed)
    }

    /// Σ_yz, observed by latent.
    pub fn yz(&self) -> Array2<f64> {
        self.block(&self.observed, &self.latent)
    }

    /// Σ_zy, latent by observed.
    pub fn zy(&self) -> Array2<f64> {
        self.block(&self.latent, &self.observed)
    }

    /// Σ_zz, latent by latent.
    pub fn zz(&self) -> Array2<f64> {
        self.block(&self.latent, &self.latent)
    }

    fn block(&self, rows: &[usize], cols: &[usize]) -> Array2<f64> {
        self.matrix.select(Axis(0), rows).select(Axis(1), cols)
    }
}
