//! Powell's direction-set method.
//!
//! Derivative-free minimization over the free-parameter vector: repeated
//! line minimizations along a set of directions, with the direction of
//! largest decrease replaced by the net displacement when the
//! quadratic-decrease test allows it (Press et al., *Numerical Recipes*,
//! section 10.5).

use std::fmt;

use ndarray::{Array1, Array2};

use crate::covariance::SampleCovariance;
use crate::error::{Result, SemOptError};
use crate::model::SemModel;
use crate::problem::{Objective, SemObjective};

use super::cancel::{self, Cancellation};
use super::config::{LineSearchConfig, PowellConfig};
use super::convergence::ConvergenceStatus;
use super::line_search::{minimize_along, Evaluator};
use super::observer::{default_observer, SharedObserver};
use super::{SemFit, SemOptimizer};

/// Absolute slack in the convergence test, for minima at exactly zero.
const TINY: f64 = 1e-25;

/// Result of a Powell minimization.
#[derive(Debug, Clone)]
pub struct PowellResult {
    /// Parameters at the minimum found
    pub params: Array1<f64>,

    /// Objective value at `params`
    pub value: f64,

    /// Number of outer iterations performed
    pub iterations: usize,

    /// Number of objective evaluations
    pub func_evals: usize,

    /// How the minimization terminated
    pub status: ConvergenceStatus,
}

/// Powell's direction-set minimizer.
#[derive(Clone)]
pub struct PowellOptimizer {
    config: PowellConfig,
    observer: SharedObserver,
    cancellation: Option<Cancellation>,
}

impl fmt::Debug for PowellOptimizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PowellOptimizer")
            .field("config", &self.config)
            .field("cancellable", &self.cancellation.is_some())
            .finish()
    }
}

impl Default for PowellOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl PowellOptimizer {
    /// Create a Powell optimizer with default configuration.
    pub fn new() -> Self {
        Self::with_config(PowellConfig::default())
    }

    /// Create a Powell optimizer with the given configuration.
    pub fn with_config(config: PowellConfig) -> Self {
        Self {
            config,
            observer: default_observer(),
            cancellation: None,
        }
    }

    /// Set the fractional function tolerance.
    pub fn with_ftol(mut self, ftol: f64) -> Self {
        self.config.ftol = ftol;
        self
    }

    /// Set the maximum number of outer iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    /// Replace the line search settings.
    pub fn with_line_search(mut self, line_search: LineSearchConfig) -> Self {
        self.config.line_search = line_search;
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
    pub fn config(&self) -> &PowellConfig {
        &self.config
    }

    /// Minimize `objective` starting from `initial`.
    ///
    /// # Arguments
    ///
    /// * `objective` - The function to minimize
    /// * `initial` - Starting point, of length `objective.parameter_count()`
    ///
    /// # Returns
    ///
    /// * `Result<PowellResult>` - The minimum found
    ///
    /// # Errors
    ///
    /// * `SemOptError::DimensionMismatch` if `initial` has the wrong length
    /// * `SemOptError::MaxIterationsExceeded` if the outer loop or a line
    ///   search hits its cap
    /// * `SemOptError::Cancelled` if cancellation fires
    pub fn minimize<O: Objective>(
        &self,
        objective: &O,
        initial: &Array1<f64>,
    ) -> Result<PowellResult> {
        let n = objective.parameter_count();
        if initial.len() != n {
            return Err(SemOptError::DimensionMismatch(format!(
                "Initial point has {} entries, objective expects {}",
                initial.len(),
                n
            )));
        }

        let evaluator = Evaluator::new(objective);
        let line_search = &self.config.line_search;

        let mut p = initial.clone();
        let mut fret = evaluator.eval(&p)?;

        if n == 0 {
            return Ok(PowellResult {
                params: p,
                value: fret,
                iterations: 0,
                func_evals: evaluator.count(),
                status: ConvergenceStatus::NothingToOptimize,
            });
        }

        let mut xi = Array2::<f64>::eye(n);
        let mut pt = p.clone();
        let mut iteration = 0;

        loop {
            cancel::check(&self.cancellation)?;
            iteration += 1;

            let fp = fret;
            let mut ibig = 0;
            let mut del = 0.0;

            for i in 0..n {
                let mut xit = xi.column(i).to_owned();
                let fptt = fret;
                fret = minimize_along(&evaluator, &mut p, &mut xit, line_search)?;
                if fptt - fret > del {
                    del = fptt - fret;
                    ibig = i;
                }
            }

            self.observer.on_powell_iteration(iteration, fret);

            if 2.0 * (fp - fret) <= self.config.ftol * (fp.abs() + fret.abs()) + TINY {
                log::debug!(
                    "Powell converged after {} iterations ({} evaluations), f = {:.8}",
                    iteration,
                    evaluator.count(),
                    fret
                );
                return Ok(PowellResult {
                    params: p,
                    value: fret,
                    iterations: iteration,
                    func_evals: evaluator.count(),
                    status: ConvergenceStatus::FunctionValueConvergence,
                });
            }

            if iteration >= self.config.max_iterations {
                return Err(SemOptError::MaxIterationsExceeded {
                    routine: "powell",
                    limit: self.config.max_iterations,
                });
            }

            // Extrapolated point and average direction moved
            let ptt = &p * 2.0 - &pt;
            let mut xit = &p - &pt;
            pt.assign(&p);

            let fptt = evaluator.eval(&ptt)?;
            if fptt < fp {
                let t = 2.0 * (fp - 2.0 * fret + fptt) * (fp - fret - del).powi(2)
                    - del * (fp - fptt).powi(2);
                if t < 0.0 {
                    fret = minimize_along(&evaluator, &mut p, &mut xit, line_search)?;
                    let last = xi.column(n - 1).to_owned();
                    xi.column_mut(ibig).assign(&last);
                    xi.column_mut(n - 1).assign(&xit);
                }
            }
        }
    }
}

impl SemOptimizer for PowellOptimizer {
    fn optimize(&self, model: &mut SemModel, sample: &SampleCovariance) -> Result<SemFit> {
        let objective = SemObjective::new(model, sample)?;
        let result = self.minimize(&objective, &model.free_values())?;

        model.set_free_values(&result.params)?;
        SemFit::from_model(
            self.name(),
            model,
            sample,
            result.iterations,
            result.func_evals,
            result.status,
        )
    }

    fn name(&self) -> &'static str {
        "powell"
    }
}
