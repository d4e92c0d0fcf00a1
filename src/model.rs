//! The live SEM model: a graph plus one parameter per coefficient and error
//! (co)variance.
//!
//! Variables (measured and latent nodes, never error nodes) are numbered by
//! their position in graph insertion order. Those positions are the row and
//! column indices of `B`, `Ω` and `Σ`, and the node handles stored in every
//! [`ParamKey`].

use std::collections::HashMap;
use std::fmt;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::covariance::{FitFunction, ImpliedCovariance, SampleCovariance};
use crate::error::{Result, SemOptError};
use crate::graph::{NodeRole, SemGraph};
use crate::parameters::{Bounds, ParamKey, ParamType, Parameter, ParameterError};

/// Starting value of a freshly created coefficient.
const DEFAULT_COEF: f64 = 0.0;

/// Starting value of a freshly created error variance.
const DEFAULT_VARIANCE: f64 = 1.0;

/// Starting value of a freshly created error covariance.
const DEFAULT_COVARIANCE: f64 = 0.0;

/// A SEM over a fixed graph with a mutable parameter assignment.
#[derive(Debug, Clone)]
pub struct SemModel {
    graph: SemGraph,
    /// Graph node index of each variable position
    variables: Vec<usize>,
    /// Variable position of each graph node index
    position: HashMap<usize, usize>,
    measured: Vec<usize>,
    latent: Vec<usize>,
    parameters: Vec<Parameter>,
    lookup: HashMap<ParamKey, usize>,
}

/// One row of a parameter export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterEstimate {
    pub name: String,
    pub param_type: ParamType,
    pub node_a: String,
    pub node_b: String,
    pub value: f64,
    pub fixed: bool,
}

impl SemModel {
    /// Build the parameter list for a graph.
    ///
    /// Creates one coefficient per directed edge between variables (`B1`,
    /// `B2`, ...), then one error variance per variable and one error
    /// covariance per bidirected edge (`T1`, `T2`, ...). All start free.
    ///
    /// # Errors
    ///
    /// * `SemOptError::InvalidInput` if the graph has no measured variable
    pub fn new(graph: SemGraph) -> Result<Self> {
        let variables = graph.variables();
        let position: HashMap<usize, usize> = variables
            .iter()
            .enumerate()
            .map(|(pos, &node)| (node, pos))
            .collect();

        let (measured, latent): (Vec<usize>, Vec<usize>) = (0..variables.len())
            .partition(|&pos| graph.node(variables[pos]).role == NodeRole::Measured);

        if measured.is_empty() {
            return Err(SemOptError::InvalidInput(
                "Model has no measured variables".to_string(),
            ));
        }

        let mut parameters = Vec::new();

        for (k, (parent, child)) in graph.structural_edges().enumerate() {
            let key = ParamKey::coef(position[&parent], position[&child]);
            parameters.push(Parameter::new(&format!("B{}", k + 1), key, DEFAULT_COEF));
        }

        let mut t = 0;
        for pos in 0..variables.len() {
            t += 1;
            parameters.push(Parameter::new(
                &format!("T{}", t),
                ParamKey::var(pos),
                DEFAULT_VARIANCE,
            ));
        }
        for &(a, b) in graph.bidirected_edges() {
            t += 1;
            parameters.push(Parameter::new(
                &format!("T{}", t),
                ParamKey::covar(position[&a], position[&b]),
                DEFAULT_COVARIANCE,
            ));
        }

        let lookup = parameters
            .iter()
            .enumerate()
            .map(|(i, p)| (p.key(), i))
            .collect();

        Ok(Self {
            graph,
            variables,
            position,
            measured,
            latent,
            parameters,
            lookup,
        })
    }

    /// The underlying graph.
    pub fn graph(&self) -> &SemGraph {
        &self.graph
    }

    /// Number of variables (measured plus latent).
    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    /// Name of the variable at `pos`.
    pub fn variable_name(&self, pos: usize) -> &str {
        &self.graph.node(self.variables[pos]).name
    }

    /// Variable position for a name, if it names a measured or latent variable.
    pub fn variable_position(&self, name: &str) -> Option<usize> {
        self.graph
            .node_index(name)
            .and_then(|idx| self.position.get(&idx).copied())
    }

    /// Positions of the measured variables.
    pub fn measured_indices(&self) -> &[usize] {
        &self.measured
    }

    /// Positions of the latent variables.
    pub fn latent_indices(&self) -> &[usize] {
        &self.latent
    }

    /// Names of the measured variables, in position order.
    pub fn measured_names(&self) -> Vec<String> {
        self.measured
            .iter()
            .map(|&pos| self.variable_name(pos).to_string())
            .collect()
    }

    /// Parent positions of the variable at `pos`, excluding its error node.
    pub fn parent_positions(&self, pos: usize) -> Vec<usize> {
        self.graph
            .parents(self.variables[pos])
            .into_iter()
            .map(|node| self.position[&node])
            .collect()
    }

    /// All parameters.
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Parameter with the given key.
    pub fn parameter(&self, key: ParamKey) -> Option<&Parameter> {
        self.lookup.get(&key).map(|&i| &self.parameters[i])
    }

    /// Parameter with the given name (`B1`, `T2`, ...).
    pub fn parameter_by_name(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name() == name)
    }

    /// Resolve a key from a type and two variable names.
    ///
    /// For coefficients `a` is the parent and `b` the child; for variances
    /// `a` and `b` must be the same variable.
    ///
    /// # Errors
    ///
    /// * `SemOptError::UnknownVariable` if a name is not a variable of this model
    pub fn key(&self, param_type: ParamType, a: &str, b: &str) -> Result<ParamKey> {
        let pos_a = self
            .variable_position(a)
            .ok_or_else(|| SemOptError::UnknownVariable(a.to_string()))?;
        let pos_b = self
            .variable_position(b)
            .ok_or_else(|| SemOptError::UnknownVariable(b.to_string()))?;

        Ok(match param_type {
            ParamType::Coef => ParamKey::coef(pos_a, pos_b),
            ParamType::Var => ParamKey {
                param_type,
                node_a: pos_a,
                node_b: pos_b,
            },
            ParamType::Covar => ParamKey::covar(pos_a, pos_b),
        })
    }

    fn index_of(&self, key: ParamKey) -> Result<usize> {
        self.lookup.get(&key).copied().ok_or_else(|| {
            SemOptError::ParameterError(format!(
                "No {} parameter between variables {} and {}",
                key.param_type, key.node_a, key.node_b
            ))
        })
    }

    /// Set a parameter's value, checking its bounds.
    pub fn set_parameter_value(&mut self, key: ParamKey, value: f64) -> Result<()> {
        let idx = self.index_of(key)?;
        self.parameters[idx].set_value(value)?;
        Ok(())
    }

    /// Fix a parameter at `value`.
    pub fn fix_parameter(&mut self, key: ParamKey, value: f64) -> Result<()> {
        let idx = self.index_of(key)?;
        self.parameters[idx].set_value(value)?;
        self.parameters[idx].set_fixed(true);
        Ok(())
    }

    /// Let an optimizer move a previously fixed parameter.
    pub fn free_parameter(&mut self, key: ParamKey) -> Result<()> {
        let idx = self.index_of(key)?;
        self.parameters[idx].set_fixed(false);
        Ok(())
    }

    /// Replace a parameter's bounds.
    pub fn set_parameter_bounds(&mut self, key: ParamKey, bounds: Bounds) -> Result<()> {
        let idx = self.index_of(key)?;
        self.parameters[idx].set_bounds(bounds);
        Ok(())
    }

    /// Store an optimizer-produced value for a free parameter.
    pub(crate) fn assign(&mut self, key: ParamKey, value: f64) {
        if let Some(&idx) = self.lookup.get(&key) {
            if !self.parameters[idx].is_fixed() {
                self.parameters[idx].set_value_unchecked(value);
            }
        }
    }

    /// Free parameters, in parameter order.
    pub fn free_parameters(&self) -> Vec<&Parameter> {
        self.parameters.iter().filter(|p| !p.is_fixed()).collect()
    }

    /// Number of free parameters.
    pub fn num_free(&self) -> usize {
        self.parameters.iter().filter(|p| !p.is_fixed()).count()
    }

    /// Current values of the free parameters.
    pub fn free_values(&self) -> Array1<f64> {
        self.parameters
            .iter()
            .filter(|p| !p.is_fixed())
            .map(|p| p.value())
            .collect()
    }

    /// Overwrite the free parameters from a vector in [`free_values`](Self::free_values) order.
    ///
    /// Values are stored as given, without a bounds check.
    ///
    /// # Errors
    ///
    /// * `SemOptError::DimensionMismatch` if the vector length differs from the free count
    /// * `SemOptError::ParameterError` if a value is not finite
    pub fn set_free_values(&mut self, values: &Array1<f64>) -> Result<()> {
        let n = self.num_free();
        if values.len() != n {
            return Err(SemOptError::DimensionMismatch(format!(
                "Expected {} free parameter values, got {}",
                n,
                values.len()
            )));
        }

        let free: Vec<usize> = (0..self.parameters.len())
            .filter(|&i| !self.parameters[i].is_fixed())
            .collect();

        if let Some((&idx, &value)) = free.iter().zip(values.iter()).find(|(_, v)| !v.is_finite()) {
            return Err(ParameterError::NonFiniteValue {
                name: self.parameters[idx].name().to_string(),
                value,
            }
            .into());
        }

        for (&idx, &value) in free.iter().zip(values.iter()) {
            self.parameters[idx].set_value_unchecked(value);
        }
        Ok(())
    }

    /// `true` if every parameter lies inside its bounds.
    pub fn is_within_bounds(&self) -> bool {
        self.parameters.iter().all(|p| p.is_within_bounds())
    }

    /// Variables whose error variance is below zero (Heywood cases).
    ///
    /// EM can leave a variance here; the other optimizers keep every
    /// parameter inside its bounds.
    pub fn negative_variances(&self) -> Vec<&str> {
        self.parameters
            .iter()
            .filter(|p| p.param_type() == ParamType::Var && p.value() < 0.0)
            .map(|p| self.variable_name(p.key().node_a))
            .collect()
    }

    /// Edge coefficient matrix `B`, with `B[child][parent]`.
    pub fn edge_coef(&self) -> Array2<f64> {
        let (b, _) = self.matrices();
        b
    }

    /// Error covariance matrix `Ω`.
    pub fn error_cov(&self) -> Array2<f64> {
        let (_, omega) = self.matrices();
        omega
    }

    fn matrices(&self) -> (Array2<f64>, Array2<f64>) {
        let n = self.num_variables();
        let mut b = Array2::zeros((n, n));
        let mut omega = Array2::zeros((n, n));
        for param in &self.parameters {
            place_parameter(param.key(), param.value(), &mut b, &mut omega);
        }
        (b, omega)
    }

    /// Implied covariance at the current parameter values.
    pub fn implied_covariance(&self) -> Result<ImpliedCovariance> {
        let (b, omega) = self.matrices();
        ImpliedCovariance::compute(&b, &omega, &self.measured, &self.latent)
    }

    /// Sample covariance reordered to this model's measured variables.
    ///
    /// # Errors
    ///
    /// * `SemOptError::InvalidInput` if the sample does not cover exactly the
    ///   measured variables
    pub fn align(&self, sample: &SampleCovariance) -> Result<Array2<f64>> {
        sample.aligned_to(&self.measured_names())
    }

    /// FML at the current parameter values.
    ///
    /// # Returns
    ///
    /// * `Ok(NaN)` if `I - B` is singular or Σ_yy is not positive definite
    pub fn fml(&self, sample: &SampleCovariance) -> Result<f64> {
        let fit = FitFunction::new(&self.align(sample)?)?;
        match self.implied_covariance() {
            Ok(implied) => fit.fml(&implied.yy()),
            Err(SemOptError::NonInvertibleStructure(_)) => Ok(f64::NAN),
            Err(e) => Err(e),
        }
    }

    /// Chi-square `(n - 1) * FML` at the current parameter values.
    pub fn chi_square(&self, sample: &SampleCovariance) -> Result<f64> {
        Ok((sample.sample_size() as f64 - 1.0) * self.fml(sample)?)
    }

    /// Degrees of freedom `p(p+1)/2 - #free`.
    pub fn dof(&self) -> i64 {
        let p = self.measured.len() as i64;
        p * (p + 1) / 2 - self.num_free() as i64
    }

    /// BIC as `χ² - dof ln(n)`.
    pub fn bic(&self, sample: &SampleCovariance) -> Result<f64> {
        let chi_square = self.chi_square(sample)?;
        Ok(chi_square - self.dof() as f64 * (sample.sample_size() as f64).ln())
    }

    /// RMSEA as `sqrt(χ² - dof) / sqrt(dof (n - 1))`.
    ///
    /// # Returns
    ///
    /// * `NaN` when `dof <= 0` or `χ² < dof`
    pub fn rmsea(&self, sample: &SampleCovariance) -> Result<f64> {
        let dof = self.dof();
        if dof <= 0 {
            return Ok(f64::NAN);
        }
        let chi_square = self.chi_square(sample)?;
        let dof = dof as f64;
        Ok((chi_square - dof).sqrt() / (dof * (sample.sample_size() as f64 - 1.0)).sqrt())
    }

    /// Copy parameter values from another model, matching variables by name.
    ///
    /// Only parameters that are free in `self` are written. Every parameter
    /// is resolved before any value is written, so a failure leaves `self`
    /// untouched.
    ///
    /// # Errors
    ///
    /// * `SemOptError::UnknownVariable` if a variable of `source` does not
    ///   exist in `self`
    /// * `SemOptError::ParameterError` if `self` has no parameter of the same
    ///   type between the resolved variables
    pub fn merge_parameter_values(&mut self, source: &SemModel) -> Result<()> {
        let mut updates = Vec::with_capacity(source.parameters.len());

        for param in &source.parameters {
            let key = param.key();
            let a = source.variable_name(key.node_a);
            let b = source.variable_name(key.node_b);
            let target = self.index_of(self.key(key.param_type, a, b)?)?;
            updates.push((target, param.value()));
        }

        for (idx, value) in updates {
            if !self.parameters[idx].is_fixed() {
                self.parameters[idx].set_value_unchecked(value);
            }
        }
        Ok(())
    }

    /// Export every parameter with variable names resolved.
    pub fn estimates(&self) -> Vec<ParameterEstimate> {
        self.parameters
            .iter()
            .map(|p| ParameterEstimate {
                name: p.name().to_string(),
                param_type: p.param_type(),
                node_a: self.variable_name(p.key().node_a).to_string(),
                node_b: self.variable_name(p.key().node_b).to_string(),
                value: p.value(),
                fixed: p.is_fixed(),
            })
            .collect()
    }

    /// Parameter export as JSON.
    pub fn estimates_to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.estimates())?)
    }
}

impl fmt::Display for SemModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Parameters:")?;
        for est in self.estimates() {
            let arrow = match est.param_type {
                ParamType::Coef => "->",
                ParamType::Var | ParamType::Covar => "<->",
            };
            writeln!(
                f,
                "  {:<5} {:<6} {} {} {}  {:.6}{}",
                est.name,
                est.param_type,
                est.node_a,
                arrow,
                est.node_b,
                est.value,
                if est.fixed { " (fixed)" } else { "" }
            )?;
        }
        Ok(())
    }
}

/// Write one parameter value into `B` or `Ω`.
pub(crate) fn place_parameter(
    key: ParamKey,
    value: f64,
    edge_coef: &mut Array2<f64>,
    error_cov: &mut Array2<f64>,
) {
    match key.param_type {
        ParamType::Coef => edge_coef[[key.node_b, key.node_a]] = value,
        ParamType::Var => error_cov[[key.node_a, key.node_a]] = value,
        ParamType::Covar => {
            error_cov[[key.node_a, key.node_b]] = value;
            error_cov[[key.node_b, key.node_a]] = value;
        }
    }
}
