//! Progress callbacks for long-running fits.

use std::sync::Arc;

/// Receives progress events from the optimizers.
///
/// All hooks default to doing nothing. Observers are shared across restart
/// trials running on different threads, hence `Send + Sync`.
pub trait OptimizationObserver: Send + Sync {
    /// Called after each EM iteration with its FML score.
    fn on_em_iteration(&self, _iteration: usize, _score: f64) {}

    /// Called after each Powell iteration with the current objective value.
    fn on_powell_iteration(&self, _iteration: usize, _value: f64) {}

    /// Called when a restart trial finishes with its chi-square.
    fn on_restart_trial(&self, _trial: usize, _chi_square: f64) {}
}

/// Shared observer handle held by the optimizers.
pub type SharedObserver = Arc<dyn OptimizationObserver>;

/// Forwards every event to `log::debug!`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl OptimizationObserver for LogObserver {
    fn on_em_iteration(&self, iteration: usize, score: f64) {
        log::debug!("EM iteration {}: score = {:.8}", iteration, score);
    }

    fn on_powell_iteration(&self, iteration: usize, value: f64) {
        log::debug!("Powell iteration {}: f = {:.8}", iteration, value);
    }

    fn on_restart_trial(&self, trial: usize, chi_square: f64) {
        log::debug!("Restart trial {}: chi-square = {:.6}", trial, chi_square);
    }
}

/// Ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl OptimizationObserver for NoopObserver {}

pub(crate) fn default_observer() -> SharedObserver {
    Arc::new(LogObserver)
}
