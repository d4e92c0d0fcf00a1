//! Objective definition trait and the SEM fitting objective.
//!
//! This module defines the `Objective` trait, a scalar function of a
//! free-parameter vector to be minimized by a direct (derivative-free)
//! optimizer, and `SemObjective`, the FML discrepancy of a SEM model as a
//! function of its free parameters.

use ndarray::{Array1, Array2, Axis};

use crate::covariance::{compute_implied, FitFunction, SampleCovariance};
use crate::error::{Result, SemOptError};
use crate::model::{place_parameter, SemModel};
use crate::parameters::{Bounds, ParamKey};

/// Value returned for candidate points at which the model cannot be scored.
///
/// Large but finite, so comparisons in line searches stay meaningful.
pub const PENALTY: f64 = 1e20;

/// A trait representing a scalar minimization problem.
pub trait Objective {
    /// Evaluate the objective at the given parameters.
    ///
    /// # Arguments
    ///
    /// * `params` - The parameter values at which to evaluate the objective
    ///
    /// # Returns
    ///
    /// * The objective value, or an error if the evaluation hit a condition
    ///   that should abort the optimization
    fn eval(&self, params: &Array1<f64>) -> Result<f64>;

    /// Get the number of parameters in the problem.
    fn parameter_count(&self) -> usize;
}

impl<F> Objective for (usize, F)
where
    F: Fn(&Array1<f64>) -> f64,
{
    fn eval(&self, params: &Array1<f64>) -> Result<f64> {
        Ok((self.1)(params))
    }

    fn parameter_count(&self) -> usize {
        self.0
    }
}

/// FML of a SEM as a function of its free parameters.
///
/// Holds a snapshot of the model's fixed values and the layout of its free
/// parameters, so evaluation never touches the model itself. Points where
/// `I - B` is singular, Σ_yy is not positive definite, or a parameter leaves
/// its bounds are scored [`PENALTY`].
#[derive(Debug, Clone)]
pub struct SemObjective {
    fit: FitFunction,
    base_edge_coef: Array2<f64>,
    base_error_cov: Array2<f64>,
    free: Vec<(ParamKey, Bounds)>,
    measured: Vec<usize>,
}

impl SemObjective {
    /// Build the objective for a model and sample.
    ///
    /// # Errors
    ///
    /// * `SemOptError::InvalidInput` if the sample does not match the model's
    ///   measured variables
    pub fn new(model: &SemModel, sample: &SampleCovariance) -> Result<Self> {
        let fit = FitFunction::new(&model.align(sample)?)?;

        let free: Vec<(ParamKey, Bounds)> = model
            .free_parameters()
            .iter()
            .map(|p| (p.key(), p.bounds()))
            .collect();

        // Free entries are overwritten on every evaluation
        let mut base_edge_coef = model.edge_coef();
        let mut base_error_cov = model.error_cov();
        for &(key, _) in &free {
            place_parameter(key, 0.0, &mut base_edge_coef, &mut base_error_cov);
        }

        Ok(Self {
            fit,
            base_edge_coef,
            base_error_cov,
            free,
            measured: model.measured_indices().to_vec(),
        })
    }

    /// Evaluate FML without the penalty substitution.
    ///
    /// # Returns
    ///
    /// * `Ok(NaN)` if the point cannot be scored
    pub fn fml(&self, params: &Array1<f64>) -> Result<f64> {
        if params.len() != self.free.len() {
            return Err(SemOptError::DimensionMismatch(format!(
                "Expected {} free parameters, got {}",
                self.free.len(),
                params.len()
            )));
        }

        let mut edge_coef = self.base_edge_coef.clone();
        let mut error_cov = self.base_error_cov.clone();
        for (&(key, _), &value) in self.free.iter().zip(params.iter()) {
            place_parameter(key, value, &mut edge_coef, &mut error_cov);
        }

        let sigma = match compute_implied(&edge_coef, &error_cov) {
            Ok(sigma) => sigma,
            Err(SemOptError::NonInvertibleStructure(_)) => return Ok(f64::NAN),
            Err(e) => return Err(e),
        };
        let sigma_yy = sigma
            .select(Axis(0), &self.measured)
            .select(Axis(1), &self.measured);

        self.fit.fml(&sigma_yy)
    }
}

impl Objective for SemObjective {
    fn eval(&self, params: &Array1<f64>) -> Result<f64> {
        let out_of_bounds = self
            .free
            .iter()
            .zip(params.iter())
            .any(|(&(_, bounds), &value)| !bounds.is_within_bounds(value));
        if out_of_bounds {
            return Ok(PENALTY);
        }

        let value = self.fml(params)?;
        if value.is_finite() {
            Ok(value)
        } else {
            Ok(PENALTY)
        }
    }

    fn parameter_count(&self) -> usize {
        self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::SemGraph;
    use crate::parameters::ParamType;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn scenario_b() -> (SemModel, SampleCovariance) {
        let mut g = SemGraph::new();
        g.add_measured("A").unwrap();
        g.add_measured("B").unwrap();
        g.add_directed_edge("A", "B").unwrap();
        let mut model = SemModel::new(g).unwrap();
        let var_a = model.key(ParamType::Var, "A", "A").unwrap();
        model.fix_parameter(var_a, 1.0).unwrap();

        let sample =
            SampleCovariance::new(&["A", "B"], array![[1.0, 0.5], [0.5, 1.0]], 100).unwrap();
        (model, sample)
    }

    #[test]
    fn test_objective_matches_model_fml() {
        let (mut model, sample) = scenario_b();
        let objective = SemObjective::new(&model, &sample).unwrap();
        assert_eq!(objective.parameter_count(), 2);

        let x = array![0.3, 0.8];
        model.set_free_values(&x).unwrap();
        assert_abs_diff_eq!(
            objective.eval(&x).unwrap(),
            model.fml(&sample).unwrap(),
            epsilon = 1e-12
        );

        // Optimum: b = 0.5, Var(e_B) = 0.75
        assert_abs_diff_eq!(objective.eval(&array![0.5, 0.75]).unwrap(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_penalty_for_unscorable_points() {
        let (model, sample) = scenario_b();
        let objective = SemObjective::new(&model, &sample).unwrap();

        // Negative variance leaves the bounds
        assert_eq!(objective.eval(&array![0.5, -0.1]).unwrap(), PENALTY);

        // Zero variance is in bounds but Σ_yy is singular
        assert!(objective.fml(&array![0.0, 0.0]).unwrap().is_nan());
        assert_eq!(objective.eval(&array![0.0, 0.0]).unwrap(), PENALTY);

        assert!(matches!(
            objective.eval(&array![0.5]),
            Err(SemOptError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn test_closure_objective() {
        let f = (2, |x: &Array1<f64>| x.iter().map(|v| v * v).sum::<f64>());
        assert_eq!(f.parameter_count(), 2);
        assert_eq!(f.eval(&array![1.0, 2.0]).unwrap(), 5.0);
    }
}
