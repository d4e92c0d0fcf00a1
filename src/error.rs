use thiserror::Error;

/// Error types for the semopt-rs library.
#[derive(Error, Debug)]
pub enum SemOptError {
    /// `I - B` is singular, so no implied covariance exists for these coefficients.
    #[error("Non-invertible structure: {0}")]
    NonInvertibleStructure(String),

    /// The implied covariance is not positive definite (or not invertible).
    #[error("Implied covariance is not positive definite: {0}")]
    NonPositiveDefiniteCovariance(String),

    /// A computation produced a value that is impossible for valid inputs.
    #[error("Numerical inconsistency: {0}")]
    NumericalInconsistency(String),

    /// The EM regression matrix of a node's parents is not invertible.
    #[error("Singular normal equations while regressing '{node}' on its parents")]
    SingularNormalEquations { node: String },

    /// An iterative routine hit its iteration cap.
    #[error("Maximum iterations exceeded in {routine} (limit {limit})")]
    MaxIterationsExceeded { routine: &'static str, limit: usize },

    /// A variable could not be resolved by name in the target model.
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    /// Invalid input data.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The optimization was cancelled or ran past its deadline.
    #[error("Optimization cancelled")]
    Cancelled,

    /// Error indicating a mismatch in vector or matrix dimensions.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Error for parameter-related problems.
    #[error("Parameter error: {0}")]
    ParameterError(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl From<crate::parameters::ParameterError> for SemOptError {
    fn from(err: crate::parameters::ParameterError) -> Self {
        SemOptError::ParameterError(format!("{}", err))
    }
}

/// Result type alias for semopt-rs operations.
pub type Result<T> = std::result::Result<T, SemOptError>;
