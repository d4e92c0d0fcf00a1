//! EM-style coordinate descent for SEMs with latent variables.
//!
//! The E-step replaces the unobserved latent moments with their conditional
//! expectations given the sample covariance and the current model:
//!
//! ```text
//! β    = Σ_zy Σ_yy^-1
//! E_zy = β S
//! E_zz = Σ_zz - β Σ_yz + β S βᵀ
//! ```
//!
//! The M-step regresses every variable on its free parents within that
//! expected covariance. Each node is fitted by its own least-squares
//! regression rather than by a joint update, so the likelihood is not
//! guaranteed to improve on every iteration.

use std::fmt;

use ndarray::{Array1, Array2, Axis};

use crate::covariance::{FitFunction, ImpliedCovariance, SampleCovariance};
use crate::error::{Result, SemOptError};
use crate::model::{place_parameter, SemModel};
use crate::parameters::{ParamKey, ParamType};
use crate::utils::linalg;

use super::cancel::{self, Cancellation};
use super::config::EmConfig;
use super::convergence::ConvergenceStatus;
use super::observer::{default_observer, SharedObserver};
use super::{SemFit, SemOptimizer};

/// Regression layout of one variable.
#[derive(Debug, Clone)]
struct NodeRegression {
    pos: usize,
    name: String,
    /// Parents whose coefficients are free
    free_parents: Vec<usize>,
    /// Parents with fixed coefficients, and those coefficients
    fixed_parents: Vec<(usize, f64)>,
    free_variance: bool,
}

/// Working state of one EM run.
///
/// Built fresh for every [`EmOptimizer::optimize`] call and owned by it.
#[derive(Debug, Clone)]
pub struct EmWorkspace {
    measured: Vec<usize>,
    latent: Vec<usize>,
    regressions: Vec<NodeRegression>,
    free_covariances: Vec<ParamKey>,
    free_keys: Vec<ParamKey>,
    edge_coef: Array2<f64>,
    error_cov: Array2<f64>,
    sample: Array2<f64>,
    fit: FitFunction,
    expected: Array2<f64>,
}

impl EmWorkspace {
    /// Set up the workspace for `model` and `sample`.
    ///
    /// With `reset_start`, free coefficients start at 0, free variances at 1
    /// and free covariances at 0; otherwise at the model's current values.
    ///
    /// # Errors
    ///
    /// * `SemOptError::InvalidInput` if the sample does not match the model
    pub fn new(model: &SemModel, sample: &SampleCovariance, reset_start: bool) -> Result<Self> {
        let aligned = model.align(sample)?;
        let fit = FitFunction::new(&aligned)?;
        let n = model.num_variables();

        let mut edge_coef = model.edge_coef();
        let mut error_cov = model.error_cov();

        let mut regressions: Vec<NodeRegression> = (0..n)
            .map(|pos| NodeRegression {
                pos,
                name: model.variable_name(pos).to_string(),
                free_parents: Vec::new(),
                fixed_parents: Vec::new(),
                free_variance: false,
            })
            .collect();
        let mut free_covariances = Vec::new();
        let mut free_keys = Vec::new();

        for param in model.parameters() {
            let key = param.key();
            if !param.is_fixed() {
                free_keys.push(key);
                if reset_start {
                    let start = match key.param_type {
                        ParamType::Coef | ParamType::Covar => 0.0,
                        ParamType::Var => 1.0,
                    };
                    place_parameter(key, start, &mut edge_coef, &mut error_cov);
                }
            }

            match key.param_type {
                ParamType::Coef => {
                    let node = &mut regressions[key.node_b];
                    if param.is_fixed() {
                        node.fixed_parents.push((key.node_a, param.value()));
                    } else {
                        node.free_parents.push(key.node_a);
                    }
                }
                ParamType::Var => regressions[key.node_a].free_variance = !param.is_fixed(),
                ParamType::Covar => {
                    if !param.is_fixed() {
                        free_covariances.push(key);
                    }
                }
            }
        }

        for node in regressions.iter_mut() {
            node.free_parents.sort_unstable();
        }

        Ok(Self {
            measured: model.measured_indices().to_vec(),
            latent: model.latent_indices().to_vec(),
            regressions,
            free_covariances,
            free_keys,
            edge_coef,
            error_cov,
            sample: aligned,
            fit,
            expected: Array2::zeros((n, n)),
        })
    }

    /// Current edge coefficients `B`.
    pub fn edge_coef(&self) -> &Array2<f64> {
        &self.edge_coef
    }

    /// Current error covariance `Ω`.
    pub fn error_cov(&self) -> &Array2<f64> {
        &self.error_cov
    }

    /// Expected joint covariance of measured and latent variables from the
    /// last E-step.
    pub fn expected(&self) -> &Array2<f64> {
        &self.expected
    }

    fn implied(&self) -> Result<ImpliedCovariance> {
        ImpliedCovariance::compute(&self.edge_coef, &self.error_cov, &self.measured, &self.latent)
    }

    /// E-step.
    ///
    /// # Errors
    ///
    /// * `SemOptError::NonInvertibleStructure` if `I - B` is singular
    /// * `SemOptError::NonPositiveDefiniteCovariance` if Σ_yy cannot be inverted
    pub fn expectation(&mut self) -> Result<()> {
        // Measured block is the sample itself
        let mut expected = Array2::zeros(self.edge_coef.dim());
        for (a, &i) in self.measured.iter().enumerate() {
            for (b, &j) in self.measured.iter().enumerate() {
                expected[[i, j]] = self.sample[[a, b]];
            }
        }

        if !self.latent.is_empty() {
            let sigma = self.implied()?;
            let sigma_yy = sigma.yy();
            let sigma_zy = sigma.zy();
            let sigma_yz = sigma.yz();
            let sigma_zz = sigma.zz();

            let (sigma_yy_inv, _) = linalg::spd_inverse_and_log_det(&sigma_yy).ok_or_else(|| {
                SemOptError::NonPositiveDefiniteCovariance(
                    "implied covariance of the measured variables is not positive definite"
                        .to_string(),
                )
            })?;

            let beta = sigma_zy.dot(&sigma_yy_inv);
            let e_zy = beta.dot(&self.sample);
            let e_zz = &sigma_zz - &beta.dot(&sigma_yz) + &e_zy.dot(&beta.t());

            for (a, &i) in self.latent.iter().enumerate() {
                for (b, &j) in self.measured.iter().enumerate() {
                    expected[[i, j]] = e_zy[[a, b]];
                    expected[[j, i]] = e_zy[[a, b]];
                }
                for (b, &j) in self.latent.iter().enumerate() {
                    expected[[i, j]] = e_zz[[a, b]];
                }
            }
        }

        self.expected = expected;
        Ok(())
    }

    /// M-step.
    ///
    /// # Errors
    ///
    /// * `SemOptError::SingularNormalEquations` if a node's free parents are
    ///   collinear in the expected covariance
    pub fn maximization(&mut self) -> Result<()> {
        let c = &self.expected;

        for node in &self.regressions {
            let i = node.pos;

            // Moments of the node with its fixed-coefficient parents subtracted
            let cov_with = |j: usize| -> f64 {
                c[[i, j]]
                    - node
                        .fixed_parents
                        .iter()
                        .map(|&(k, b)| b * c[[k, j]])
                        .sum::<f64>()
            };
            let mut variance = cov_with(i);
            for &(k, b) in &node.fixed_parents {
                variance -= b * c[[k, i]];
                variance += b * node
                    .fixed_parents
                    .iter()
                    .map(|&(l, b_l)| b_l * c[[k, l]])
                    .sum::<f64>();
            }

            if !node.free_parents.is_empty() {
                let parents_cov = c
                    .select(Axis(0), &node.free_parents)
                    .select(Axis(1), &node.free_parents);
                let node_parents_cov: Array1<f64> =
                    node.free_parents.iter().map(|&j| cov_with(j)).collect();

                let edges = linalg::solve(&parents_cov, &node_parents_cov).ok_or_else(|| {
                    SemOptError::SingularNormalEquations {
                        node: node.name.clone(),
                    }
                })?;

                for (&j, &coef) in node.free_parents.iter().zip(edges.iter()) {
                    self.edge_coef[[i, j]] = coef;
                }
                variance -= node_parents_cov.dot(&edges);
            }

            if node.free_variance {
                self.error_cov[[i, i]] = variance;
            }
        }

        if !self.free_covariances.is_empty() {
            let n = self.edge_coef.nrows();
            let i_minus_b = Array2::<f64>::eye(n) - &self.edge_coef;
            let residual = i_minus_b.dot(c).dot(&i_minus_b.t());
            for key in &self.free_covariances {
                let value = residual[[key.node_a, key.node_b]];
                self.error_cov[[key.node_a, key.node_b]] = value;
                self.error_cov[[key.node_b, key.node_a]] = value;
            }
        }

        Ok(())
    }

    /// FML at the current coefficients, `NaN` if it cannot be scored.
    pub fn score(&self) -> Result<f64> {
        match self.implied() {
            Ok(sigma) => self.fit.fml(&sigma.yy()),
            Err(SemOptError::NonInvertibleStructure(_)) => Ok(f64::NAN),
            Err(e) => Err(e),
        }
    }

    /// Copy the fitted free parameters into `model`.
    ///
    /// A negative error variance (a Heywood case) is written as is and
    /// logged; see [`SemModel::negative_variances`].
    fn write_back(&self, model: &mut SemModel) {
        for &key in &self.free_keys {
            let value = match key.param_type {
                ParamType::Coef => self.edge_coef[[key.node_b, key.node_a]],
                ParamType::Var | ParamType::Covar => self.error_cov[[key.node_a, key.node_b]],
            };
            if key.param_type == ParamType::Var && value < 0.0 {
                log::warn!(
                    "EM estimated a negative error variance {} for {}",
                    value,
                    model.variable_name(key.node_a)
                );
            }
            model.assign(key, value);
        }
    }
}

/// EM optimizer.
#[derive(Clone)]
pub struct EmOptimizer {
    config: EmConfig,
    observer: SharedObserver,
    cancellation: Option<Cancellation>,
}

impl fmt::Debug for EmOptimizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmOptimizer")
            .field("config", &self.config)
            .field("cancellable", &self.cancellation.is_some())
            .finish()
    }
}

impl Default for EmOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl EmOptimizer {
    /// Create an EM optimizer with default configuration.
    pub fn new() -> Self {
        Self::with_config(EmConfig::default())
    }

    /// Create an EM optimizer with the given configuration.
    pub fn with_config(config: EmConfig) -> Self {
        Self {
            config,
            observer: default_observer(),
            cancellation: None,
        }
    }

    /// Set the score tolerance.
    pub fn with_func_tolerance(mut self, func_tolerance: f64) -> Self {
        self.config.func_tolerance = func_tolerance;
        self
    }

    /// Set the maximum number of iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    /// Start from the model's current values instead of the reset values.
    pub fn with_reset_start(mut self, reset_start: bool) -> Self {
        self.config.reset_start = reset_start;
        self
    }

    /// Report progress to `observer`.
    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Stop with `SemOptError::Cancelled` once `cancellation` fires.
    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    /// The configuration in use.
    pub fn config(&self) -> &EmConfig {
        &self.config
    }
}

impl EmOptimizer {
    fn run(
        &self,
        model: &mut SemModel,
        sample: &SampleCovariance,
        reset_start: bool,
    ) -> Result<SemFit> {
        let mut workspace = EmWorkspace::new(model, sample, reset_start)?;

        let mut score = f64::INFINITY;
        let mut iteration = 0;

        loop {
            cancel::check(&self.cancellation)?;
            if iteration >= self.config.max_iterations {
                return Err(SemOptError::MaxIterationsExceeded {
                    routine: "em",
                    limit: self.config.max_iterations,
                });
            }
            iteration += 1;

            workspace.expectation()?;
            workspace.maximization()?;

            let new_score = workspace.score()?;
            if !new_score.is_finite() {
                return Err(SemOptError::NonPositiveDefiniteCovariance(format!(
                    "EM score is {} after iteration {}",
                    new_score, iteration
                )));
            }
            self.observer.on_em_iteration(iteration, new_score);

            if (new_score - score).abs() <= self.config.func_tolerance {
                break;
            }
            score = new_score;
        }

        log::debug!("EM converged after {} iterations", iteration);

        workspace.write_back(model);
        SemFit::from_model(
            self.name(),
            model,
            sample,
            iteration,
            iteration,
            ConvergenceStatus::ScoreConvergence,
        )
    }
}

impl SemOptimizer for EmOptimizer {
    fn optimize(&self, model: &mut SemModel, sample: &SampleCovariance) -> Result<SemFit> {
        self.run(model, sample, self.config.reset_start)
    }

    fn optimize_from_current(
        &self,
        model: &mut SemModel,
        sample: &SampleCovariance,
    ) -> Result<SemFit> {
        self.run(model, sample, false)
    }

    fn name(&self) -> &'static str {
        "em"
    }
}
