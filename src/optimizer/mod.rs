//! SEM optimizers.
//!
//! Every optimizer implements [`SemOptimizer`]: it fits the free parameters
//! of a [`SemModel`] to a [`SampleCovariance`] in place and reports a
//! [`SemFit`]. Optimizers are composed by injection; [`RestartOptimizer`]
//! wraps any other optimizer.
//!
//! ```rust
//! use ndarray::array;
//! use semopt_rs::covariance::SampleCovariance;
//! use semopt_rs::graph::SemGraph;
//! use semopt_rs::model::SemModel;
//! use semopt_rs::optimizer::{PowellOptimizer, SemOptimizer};
//!
//! let mut graph = SemGraph::new();
//! graph.add_measured("A").unwrap();
//! graph.add_measured("B").unwrap();
//! graph.add_directed_edge("A", "B").unwrap();
//! let mut model = SemModel::new(graph).unwrap();
//!
//! let sample = SampleCovariance::new(&["A", "B"], array![[1.0, 0.5], [0.5, 1.0]], 100).unwrap();
//! let fit = PowellOptimizer::new().optimize(&mut model, &sample).unwrap();
//! assert!(fit.fml < 1e-6);
//! ```

use std::fmt;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::covariance::SampleCovariance;
use crate::error::Result;
use crate::model::SemModel;

pub mod cancel;
pub mod config;
pub mod convergence;
pub mod em;
pub mod line_search;
pub mod observer;
pub mod powell;
pub mod restart;

pub use cancel::Cancellation;
pub use config::{EmConfig, LineSearchConfig, PowellConfig, RestartConfig, StartBounds};
pub use convergence::ConvergenceStatus;
pub use em::{EmOptimizer, EmWorkspace};
pub use observer::{LogObserver, NoopObserver, OptimizationObserver, SharedObserver};
pub use powell::{PowellOptimizer, PowellResult};
pub use restart::RestartOptimizer;

/// A strategy that fits a SEM's free parameters in place.
pub trait SemOptimizer: Send + Sync {
    /// Fit `model` to `sample`, writing the estimates into `model`.
    ///
    /// On error the model's parameter values are left as they were.
    fn optimize(&self, model: &mut SemModel, sample: &SampleCovariance) -> Result<SemFit>;

    /// Like [`optimize`](Self::optimize), but always starting from the
    /// model's current free values.
    ///
    /// Restart trials call this so a randomized start is not discarded.
    /// Optimizers that already start from the model need not override it.
    fn optimize_from_current(
        &self,
        model: &mut SemModel,
        sample: &SampleCovariance,
    ) -> Result<SemFit> {
        self.optimize(model, sample)
    }

    /// Number of randomized restarts this strategy performs.
    fn num_restarts(&self) -> usize {
        0
    }

    /// Short name used in logs and reports.
    fn name(&self) -> &'static str;
}

/// Result of fitting a SEM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemFit {
    /// Optimizer that produced the fit
    pub optimizer: String,

    /// FML at the written-back parameters
    pub fml: f64,

    /// `(n - 1) * fml`
    pub chi_square: f64,

    /// Free parameter values, in model order
    pub free_values: Array1<f64>,

    /// Outer iterations of the optimizer (of the winning trial for restarts)
    pub iterations: usize,

    /// Objective evaluations
    pub func_evals: usize,

    /// How the optimizer terminated
    pub status: ConvergenceStatus,

    /// Human-readable summary of the status
    pub message: String,
}

impl SemFit {
    /// Build a fit report from the model's current values.
    pub(crate) fn from_model(
        optimizer: impl Into<String>,
        model: &SemModel,
        sample: &SampleCovariance,
        iterations: usize,
        func_evals: usize,
        status: ConvergenceStatus,
    ) -> Result<Self> {
        let fml = model.fml(sample)?;
        Ok(Self {
            optimizer: optimizer.into(),
            fml,
            chi_square: (sample.sample_size() as f64 - 1.0) * fml,
            free_values: model.free_values(),
            iterations,
            func_evals,
            status,
            message: status.description(),
        })
    }

    /// Serialize the fit as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for SemFit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "SEM Fit ({}):", self.optimizer)?;
        writeln!(f, "  Status: {}", self.message)?;
        writeln!(f, "  FML: {:.6e}", self.fml)?;
        writeln!(f, "  Chi-square: {:.6}", self.chi_square)?;
        writeln!(f, "  Iterations: {}", self.iterations)?;
        writeln!(f, "  Function evaluations: {}", self.func_evals)?;
        writeln!(f, "  Free values: {:?}", self.free_values)?;
        Ok(())
    }
}
