//! Maximum-likelihood discrepancy between sample and implied covariance.
//!
//! `FML = log|Σ| + tr(S Σ^-1) - log|S| - p` (Bollen 1989, p. 107) and
//! `χ² = (n - 1) FML`. Evaluation failures (a Σ that is not positive
//! definite, a singular S) are reported as `NaN` rather than as errors, so
//! optimizers can keep ranking candidate points.

use ndarray::Array2;

use crate::error::{Result, SemOptError};
use crate::utils::linalg;

/// Traces below this are treated as an internal inconsistency.
const NEGATIVE_TRACE_TOLERANCE: f64 = -1e-8;

/// FML evaluator bound to one sample covariance.
///
/// `log|S|` is computed once on construction and reused for every
/// evaluation.
#[derive(Debug, Clone)]
pub struct FitFunction {
    sample: Array2<f64>,
    log_det_sample: f64,
}

impl FitFunction {
    /// Create a fit function for the sample covariance `s`.
    ///
    /// # Errors
    ///
    /// * `SemOptError::InvalidInput` if `s` is not square
    pub fn new(s: &Array2<f64>) -> Result<Self> {
        if s.nrows() != s.ncols() {
            return Err(SemOptError::InvalidInput(format!(
                "Sample covariance must be square, got {:?}",
                s.dim()
            )));
        }

        // A PSD but singular S has no finite log-determinant; every FML is then NaN
        let log_det_sample = match linalg::spd_log_det(s) {
            Some(log_det) => log_det,
            None => {
                let det = linalg::determinant(s);
                if det > 0.0 {
                    det.ln()
                } else {
                    f64::NAN
                }
            }
        };

        Ok(Self {
            sample: s.clone(),
            log_det_sample,
        })
    }

    /// Number of variables `p`.
    pub fn dim(&self) -> usize {
        self.sample.nrows()
    }

    /// Evaluate FML, reporting a non-positive-definite Σ as an error.
    ///
    /// # Errors
    ///
    /// * `SemOptError::DimensionMismatch` if Σ and S differ in size
    /// * `SemOptError::NonPositiveDefiniteCovariance` if Σ is not positive definite
    /// * `SemOptError::NumericalInconsistency` if `tr(S Σ^-1)` comes out negative
    pub fn try_fml(&self, sigma: &Array2<f64>) -> Result<f64> {
        let p = self.dim();
        if sigma.dim() != (p, p) {
            return Err(SemOptError::DimensionMismatch(format!(
                "Implied covariance is {:?}, sample covariance is {}x{}",
                sigma.dim(),
                p,
                p
            )));
        }

        let (sigma_inv, log_det_sigma) =
            linalg::spd_inverse_and_log_det(sigma).ok_or_else(|| {
                SemOptError::NonPositiveDefiniteCovariance(
                    "Cholesky factorization of the implied covariance failed".to_string(),
                )
            })?;

        // tr(S Σ^-1) = sum_ij S_ij (Σ^-1)_ji
        let trace: f64 = self
            .sample
            .indexed_iter()
            .map(|((i, j), s)| s * sigma_inv[[j, i]])
            .sum();

        if trace < NEGATIVE_TRACE_TOLERANCE {
            return Err(SemOptError::NumericalInconsistency(format!(
                "tr(S Sigma^-1) = {} is negative",
                trace
            )));
        }

        Ok(log_det_sigma + trace - self.log_det_sample - p as f64)
    }

    /// Evaluate FML.
    ///
    /// # Returns
    ///
    /// * `Ok(NaN)` if Σ is not positive definite or S is singular
    ///
    /// # Errors
    ///
    /// * `SemOptError::NumericalInconsistency` if the trace term is negative
    /// * `SemOptError::DimensionMismatch` if Σ and S differ in size
    pub fn fml(&self, sigma: &Array2<f64>) -> Result<f64> {
        match self.try_fml(sigma) {
            Ok(value) => Ok(value),
            Err(SemOptError::NonPositiveDefiniteCovariance(_)) => Ok(f64::NAN),
            Err(e) => Err(e),
        }
    }

    /// `(n - 1) * FML`.
    pub fn chi_square(&self, sigma: &Array2<f64>, sample_size: usize) -> Result<f64> {
        Ok((sample_size as f64 - 1.0) * self.fml(sigma)?)
    }
}

/// FML for a one-off sample/implied pair.
pub fn fml(s: &Array2<f64>, sigma: &Array2<f64>) -> Result<f64> {
    FitFunction::new(s)?.fml(sigma)
}

/// Chi-square statistic `(n - 1) * FML` for a one-off sample/implied pair.
pub fn chi_square(s: &Array2<f64>, sigma: &Array2<f64>, sample_size: usize) -> Result<f64> {
    FitFunction::new(s)?.chi_square(sigma, sample_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_zero_at_perfect_fit() {
        let s = array![[2.0, 0.3, 0.1], [0.3, 1.0, 0.4], [0.1, 0.4, 1.5]];
        assert_abs_diff_eq!(fml(&s, &s).unwrap(), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(chi_square(&s, &s, 500).unwrap(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_known_value() {
        // S = I, Σ = 2I over p = 2: 2 ln 2 + 1 - 0 - 2
        let s = Array2::<f64>::eye(2);
        let sigma = Array2::<f64>::eye(2) * 2.0;
        let expected = 2.0 * 2f64.ln() - 1.0;
        assert_abs_diff_eq!(fml(&s, &sigma).unwrap(), expected, epsilon = 1e-12);
        assert_abs_diff_eq!(
            chi_square(&s, &sigma, 101).unwrap(),
            100.0 * expected,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_positive_away_from_sample() {
        let s = array![[1.0, 0.5], [0.5, 1.0]];
        let candidates = [
            array![[1.0, 0.0], [0.0, 1.0]],
            array![[1.0, 0.4], [0.4, 1.0]],
            array![[3.0, -0.5], [-0.5, 0.2]],
        ];
        for sigma in candidates.iter() {
            assert!(fml(&s, sigma).unwrap() > 0.0);
        }
    }

    #[test]
    fn test_non_pd_sigma_is_nan() {
        let s = Array2::<f64>::eye(2);
        let sigma = array![[1.0, 2.0], [2.0, 1.0]];
        assert!(fml(&s, &sigma).unwrap().is_nan());

        let f = FitFunction::new(&s).unwrap();
        assert!(matches!(
            f.try_fml(&sigma),
            Err(SemOptError::NonPositiveDefiniteCovariance(_))
        ));
    }

    #[test]
    fn test_singular_sample_is_nan() {
        let s = array![[1.0, 1.0], [1.0, 1.0]];
        assert!(fml(&s, &Array2::<f64>::eye(2)).unwrap().is_nan());
    }

    #[test]
    fn test_dimension_mismatch() {
        let f = FitFunction::new(&Array2::<f64>::eye(2)).unwrap();
        assert!(matches!(
            f.fml(&Array2::<f64>::eye(3)),
            Err(SemOptError::DimensionMismatch(_))
        ));
    }
}
