//! How an optimizer run ended.

use serde::{Deserialize, Serialize};

/// Termination reason of a successful optimizer call.
///
/// Failures (iteration caps, singular regressions, cancellation) are errors,
/// so every status here describes a converged or best-effort result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConvergenceStatus {
    /// Powell's relative function-value test was met.
    FunctionValueConvergence,

    /// The EM score changed by less than its tolerance.
    ScoreConvergence,

    /// There were no free parameters to move.
    NothingToOptimize,

    /// Best of several restart trials.
    BestOfTrials {
        /// Trials run
        trials: usize,
        /// Trials that produced a fit
        succeeded: usize,
    },
}

impl ConvergenceStatus {
    /// Returns true if the status came from a single converged run.
    pub fn is_converged(&self) -> bool {
        matches!(
            self,
            ConvergenceStatus::FunctionValueConvergence
                | ConvergenceStatus::ScoreConvergence
                | ConvergenceStatus::NothingToOptimize
        )
    }

    /// Returns a description of the convergence status.
    pub fn description(&self) -> String {
        match self {
            ConvergenceStatus::FunctionValueConvergence => {
                "Converged: small relative function value change".to_string()
            }
            ConvergenceStatus::ScoreConvergence => "Converged: small score change".to_string(),
            ConvergenceStatus::NothingToOptimize => "No free parameters".to_string(),
            ConvergenceStatus::BestOfTrials { trials, succeeded } => format!(
                "Best of {} restart trials ({} succeeded)",
                trials, succeeded
            ),
        }
    }
}
