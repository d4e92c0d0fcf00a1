//! Parameter definition and implementation
//!
//! A parameter is either an edge coefficient (an ordered parent/child pair) or
//! an error (co)variance (an unordered pair of variables). Node identity is
//! held as stable integer handles into the model's variable list; names are
//! only consulted when values are merged between models.

use crate::parameters::bounds::{Bounds, BoundsError};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors that can occur when working with parameters
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
    #[error("Parameter '{name}' is fixed and cannot be varied")]
    FixedParameter { name: String },

    #[error("Bounds error: {0}")]
    BoundsError(#[from] BoundsError),

    #[error("Parameter '{name}' not found")]
    ParameterNotFound { name: String },

    #[error("Non-finite value {value} for parameter '{name}'")]
    NonFiniteValue { name: String, value: f64 },
}

/// The kind of quantity a parameter stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamType {
    /// Linear coefficient of a directed edge `from -> to`
    Coef,

    /// Variance of a variable's error term
    Var,

    /// Covariance between the error terms of two variables
    Covar,
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::Coef => write!(f, "COEF"),
            ParamType::Var => write!(f, "VAR"),
            ParamType::Covar => write!(f, "COVAR"),
        }
    }
}

/// Unique identity of a parameter: its type plus a node pair.
///
/// Coefficient keys are ordered (`node_a` is the parent, `node_b` the child).
/// Covariance keys are stored with the smaller index first, so `(a, b)` and
/// `(b, a)` name the same parameter. Variance keys have `node_a == node_b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParamKey {
    pub param_type: ParamType,
    pub node_a: usize,
    pub node_b: usize,
}

impl ParamKey {
    /// Key for the coefficient of the edge `parent -> child`.
    pub fn coef(parent: usize, child: usize) -> Self {
        Self {
            param_type: ParamType::Coef,
            node_a: parent,
            node_b: child,
        }
    }

    /// Key for the error variance of `node`.
    pub fn var(node: usize) -> Self {
        Self {
            param_type: ParamType::Var,
            node_a: node,
            node_b: node,
        }
    }

    /// Key for the error covariance between `a` and `b`, in either order.
    pub fn covar(a: usize, b: usize) -> Self {
        Self {
            param_type: ParamType::Covar,
            node_a: a.min(b),
            node_b: a.max(b),
        }
    }
}

/// A single SEM parameter with its current value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    /// Name of the parameter (`B1`, `T3`, ...)
    name: String,

    /// Type and node pair
    key: ParamKey,

    /// Current value of the parameter
    value: f64,

    /// Value when the parameter was created
    init_value: f64,

    /// Fixed parameters are never touched by an optimizer
    fixed: bool,

    /// Minimum and maximum bounds for the parameter value
    bounds: Bounds,
}

impl Parameter {
    /// Create a new free parameter.
    ///
    /// Variances get `[0, ∞)` bounds; coefficients and covariances are unbounded.
    ///
    /// # Examples
    ///
    /// ```
    /// use semopt_rs::parameters::{ParamKey, ParamType, Parameter};
    ///
    /// let param = Parameter::new("T1", ParamKey::var(0), 1.0);
    /// assert_eq!(param.name(), "T1");
    /// assert_eq!(param.param_type(), ParamType::Var);
    /// assert_eq!(param.bounds().min, 0.0);
    /// assert!(!param.is_fixed());
    /// ```
    pub fn new(name: &str, key: ParamKey, value: f64) -> Self {
        let bounds = match key.param_type {
            ParamType::Var => Bounds::nonnegative(),
            ParamType::Coef | ParamType::Covar => Bounds::unbounded(),
        };

        Self {
            name: name.to_string(),
            key,
            value,
            init_value: value,
            fixed: false,
            bounds,
        }
    }

    /// Get the name of the parameter
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the identity key of the parameter
    pub fn key(&self) -> ParamKey {
        self.key
    }

    /// Get the type of the parameter
    pub fn param_type(&self) -> ParamType {
        self.key.param_type
    }

    /// Get the current value of the parameter
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Get the value the parameter was created with
    pub fn init_value(&self) -> f64 {
        self.init_value
    }

    /// Set the value of the parameter
    ///
    /// # Arguments
    ///
    /// * `value` - The new value for the parameter
    ///
    /// # Returns
    ///
    /// `Ok(())` if the value was set, or an error if the value is not finite
    /// or lies outside the parameter's bounds
    pub fn set_value(&mut self, value: f64) -> Result<(), ParameterError> {
        if !value.is_finite() {
            return Err(ParameterError::NonFiniteValue {
                name: self.name.clone(),
                value,
            });
        }

        if !self.bounds.is_within_bounds(value) {
            return Err(ParameterError::BoundsError(BoundsError::ValueOutsideBounds {
                value,
                min: self.bounds.min,
                max: self.bounds.max,
            }));
        }

        self.value = value;
        Ok(())
    }

    /// Store a value produced by an optimizer without a bounds check.
    ///
    /// Direct optimizers search an unconstrained space and score out-of-bounds
    /// points with a penalty, so the stored value may briefly leave the bounds.
    pub(crate) fn set_value_unchecked(&mut self, value: f64) {
        self.value = value;
    }

    /// Reset the parameter to its initial value
    pub fn reset(&mut self) {
        self.value = self.bounds.clamp(self.init_value);
    }

    /// Check whether the parameter is held fixed during optimization
    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    /// Fix or free the parameter
    pub fn set_fixed(&mut self, fixed: bool) {
        self.fixed = fixed;
    }

    /// Get the bounds of the parameter
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Replace the bounds, clamping the current value into them
    pub fn set_bounds(&mut self, bounds: Bounds) {
        self.bounds = bounds;
        self.value = bounds.clamp(self.value);
    }

    /// `true` if the current value satisfies the bounds
    pub fn is_within_bounds(&self) -> bool {
        self.bounds.is_within_bounds(self.value)
    }
}
