//! Configuration options for the SEM optimizers.
//!
//! This module defines the configuration structs for the EM, Powell and
//! restart optimizers. Defaults carry the constants the algorithms are tuned
//! for; changing the line-search constants changes convergence behavior.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SemOptError};
use crate::parameters::ParamType;

/// Configuration options for the EM optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmConfig {
    /// Stop when the FML score changes by at most this much. Default: 1e-4
    pub func_tolerance: f64,

    /// Maximum number of EM iterations. Default: 10_000
    pub max_iterations: usize,

    /// Reset free parameters (coefficients 0, variances 1, covariances 0)
    /// before iterating. When false, iteration starts from the model's
    /// current values. Default: true
    pub reset_start: bool,
}

impl Default for EmConfig {
    fn default() -> Self {
        Self {
            func_tolerance: 1e-4,
            max_iterations: 10_000,
            reset_start: true,
        }
    }
}

/// Configuration options for the one-dimensional line search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineSearchConfig {
    /// Default ratio by which successive bracket intervals are magnified. Default: 1.618034
    pub gold: f64,

    /// Maximum magnification allowed for a parabolic-fit step. Default: 100.0
    pub glimit: f64,

    /// Guard against division by zero in the parabolic extrapolation. Default: 1e-20
    pub tiny: f64,

    /// Golden-section ratio used by Brent's method. Default: 0.3819660
    pub cgold: f64,

    /// Fractional precision of the located minimum. Default: 2e-7
    pub tol: f64,

    /// Absolute precision for a minimum that happens to be exactly zero. Default: 1e-10
    pub zeps: f64,

    /// Maximum number of Brent iterations. Default: 100
    pub max_iterations: usize,

    /// Maximum number of bracket expansions. Default: 1_000
    pub max_bracket_steps: usize,
}

impl Default for LineSearchConfig {
    fn default() -> Self {
        Self {
            gold: 1.618034,
            glimit: 100.0,
            tiny: 1e-20,
            cgold: 0.3819660,
            tol: 2e-7,
            zeps: 1e-10,
            max_iterations: 100,
            max_bracket_steps: 1_000,
        }
    }
}

/// Configuration options for Powell's direction-set method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowellConfig {
    /// Fractional tolerance on the function value. Default: 1e-6
    pub ftol: f64,

    /// Maximum number of outer iterations. Default: 200
    pub max_iterations: usize,

    /// Line search settings
    pub line_search: LineSearchConfig,
}

impl Default for PowellConfig {
    fn default() -> Self {
        Self {
            ftol: 1e-6,
            max_iterations: 200,
            line_search: LineSearchConfig::default(),
        }
    }
}

/// Ranges from which restart trials draw their starting values.
///
/// A draw is additionally restricted to the parameter's own bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StartBounds {
    /// Range for edge coefficients. Default: (-1, 1)
    pub coef: (f64, f64),

    /// Range for error covariances. Default: (-1, 1)
    pub covar: (f64, f64),

    /// Range for error variances. Default: (1e-4, 1)
    pub var: (f64, f64),
}

impl StartBounds {
    /// Check that every range is finite and ordered.
    ///
    /// # Errors
    ///
    /// * `SemOptError::InvalidInput` naming the first bad range
    pub fn validate(&self) -> Result<()> {
        for (label, (lo, hi)) in [("coef", self.coef), ("covar", self.covar), ("var", self.var)] {
            if !lo.is_finite() || !hi.is_finite() || lo > hi {
                return Err(SemOptError::InvalidInput(format!(
                    "Start range for {} must be finite with lo <= hi, got ({}, {})",
                    label, lo, hi
                )));
            }
        }
        Ok(())
    }

    /// Range for a parameter type.
    pub fn range(&self, param_type: ParamType) -> (f64, f64) {
        match param_type {
            ParamType::Coef => self.coef,
            ParamType::Var => self.var,
            ParamType::Covar => self.covar,
        }
    }
}

impl Default for StartBounds {
    fn default() -> Self {
        Self {
            coef: (-1.0, 1.0),
            covar: (-1.0, 1.0),
            var: (1e-4, 1.0),
        }
    }
}

/// Configuration options for the restart optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestartConfig {
    /// Number of randomized trials after the first. Values below 1 count as 1. Default: 1
    pub num_restarts: usize,

    /// Seed for the random starting points. `None` draws one from entropy. Default: None
    pub seed: Option<u64>,

    /// Run EM from the caller's values before the first trial. Default: false
    pub em_warm_start: bool,

    /// Ranges for random starting values
    pub start_bounds: StartBounds,

    /// Run trials on the rayon pool (requires the `parallel` feature). Default: true
    pub parallel: bool,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            num_restarts: 1,
            seed: None,
            em_warm_start: false,
            start_bounds: StartBounds::default(),
            parallel: true,
        }
    }
}
