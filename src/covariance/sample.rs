//! Sample covariance input.

use ndarray::Array2;

use crate::error::{Result, SemOptError};

/// Largest asymmetry tolerated in a sample covariance matrix.
const SYMMETRY_TOLERANCE: f64 = 1e-8;

/// A named sample covariance matrix with its sample size.
///
/// The matrix is validated on construction and immutable afterwards, so one
/// instance can be shared read-only across every optimizer and thread.
#[derive(Debug, Clone)]
pub struct SampleCovariance {
    names: Vec<String>,
    matrix: Array2<f64>,
    sample_size: usize,
}

impl SampleCovariance {
    /// Create a validated sample covariance.
    ///
    /// # Arguments
    ///
    /// * `names` - Variable name for each row/column
    /// * `matrix` - Symmetric covariance matrix
    /// * `sample_size` - Number of observations the matrix was computed from
    ///
    /// # Errors
    ///
    /// * `SemOptError::InvalidInput` if the matrix is not square, does not
    ///   match the names, contains missing (NaN) or infinite values, is not
    ///   symmetric, or the sample size is below 2
    pub fn new<S: AsRef<str>>(
        names: &[S],
        matrix: Array2<f64>,
        sample_size: usize,
    ) -> Result<Self> {
        let (rows, cols) = matrix.dim();
        if rows != cols {
            return Err(SemOptError::InvalidInput(format!(
                "Covariance matrix must be square, got {}x{}",
                rows, cols
            )));
        }
        if rows == 0 {
            return Err(SemOptError::InvalidInput(
                "Covariance matrix is empty".to_string(),
            ));
        }
        if names.len() != rows {
            return Err(SemOptError::InvalidInput(format!(
                "Expected {} variable names, got {}",
                rows,
                names.len()
            )));
        }
        if sample_size < 2 {
            return Err(SemOptError::InvalidInput(format!(
                "Sample size must be at least 2, got {}",
                sample_size
            )));
        }
        if let Some(((i, j), _)) = matrix.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(SemOptError::InvalidInput(format!(
                "Covariance matrix has a missing or infinite value at ({}, {})",
                i, j
            )));
        }
        for i in 0..rows {
            for j in (i + 1)..rows {
                if (matrix[[i, j]] - matrix[[j, i]]).abs() > SYMMETRY_TOLERANCE {
                    return Err(SemOptError::InvalidInput(format!(
                        "Covariance matrix is not symmetric at ({}, {})",
                        i, j
                    )));
                }
            }
        }

        let names: Vec<String> = names.iter().map(|s| s.as_ref().to_string()).collect();
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(SemOptError::InvalidInput(format!(
                    "Duplicate variable name '{}'",
                    name
                )));
            }
        }

        Ok(Self {
            names,
            matrix,
            sample_size,
        })
    }

    /// Variable names, in matrix order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// The covariance matrix.
    pub fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }

    /// Number of observations.
    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    /// Number of variables.
    pub fn dim(&self) -> usize {
        self.names.len()
    }

    /// Reorder the matrix into the given variable order.
    ///
    /// # Errors
    ///
    /// * `SemOptError::InvalidInput` if the variable count differs or a name
    ///   is not present in the sample
    pub fn aligned_to<S: AsRef<str>>(&self, order: &[S]) -> Result<Array2<f64>> {
        if order.len() != self.dim() {
            return Err(SemOptError::InvalidInput(format!(
                "Model has {} measured variables but the sample covariance has {}",
                order.len(),
                self.dim()
            )));
        }

        let idx = order
            .iter()
            .map(|name| {
                let name = name.as_ref();
                self.names.iter().position(|n| n == name).ok_or_else(|| {
                    SemOptError::InvalidInput(format!(
                        "Measured variable '{}' is missing from the sample covariance",
                        name
                    ))
                })
            })
            .collect::<Result<Vec<usize>>>()?;

        Ok(Array2::from_shape_fn((idx.len(), idx.len()), |(i, j)| {
            self.matrix[[idx[i], idx[j]]]
        }))
    }
}
