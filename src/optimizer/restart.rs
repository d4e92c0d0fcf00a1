//! Multi-start wrapper around any SEM optimizer.
//!
//! Trial 0 starts from the caller's values (optionally warm-started by EM);
//! every further trial draws its free parameters uniformly from
//! [`StartBounds`](super::config::StartBounds), and the inner optimizer
//! continues from there rather than from its own default start. Each trial
//! fits its own clone
//! of the model, so trials share nothing but the read-only sample and can run
//! on the rayon pool. The lowest chi-square wins and is merged back into the
//! caller's model by variable name.

use std::fmt;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::covariance::SampleCovariance;
use crate::error::{Result, SemOptError};
use crate::model::SemModel;

use super::cancel::{self, Cancellation};
use super::config::{RestartConfig, StartBounds};
use super::convergence::ConvergenceStatus;
use super::em::EmOptimizer;
use super::observer::{default_observer, SharedObserver};
use super::{SemFit, SemOptimizer};

/// One finished trial.
struct Trial {
    index: usize,
    model: SemModel,
    fit: SemFit,
}

/// Runs an inner optimizer from several starting points and keeps the best.
#[derive(Clone)]
pub struct RestartOptimizer {
    inner: Arc<dyn SemOptimizer>,
    config: RestartConfig,
    observer: SharedObserver,
    cancellation: Option<Cancellation>,
}

impl fmt::Debug for RestartOptimizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestartOptimizer")
            .field("inner", &self.inner.name())
            .field("config", &self.config)
            .field("cancellable", &self.cancellation.is_some())
            .finish()
    }
}

impl RestartOptimizer {
    /// Wrap `inner` with the default restart configuration.
    pub fn new(inner: Arc<dyn SemOptimizer>) -> Self {
        Self::with_config(inner, RestartConfig::default())
    }

    /// Wrap `inner` with the given configuration.
    pub fn with_config(inner: Arc<dyn SemOptimizer>, config: RestartConfig) -> Self {
        Self {
            inner,
            config,
            observer: default_observer(),
            cancellation: None,
        }
    }

    /// Set the number of randomized trials. Values below 1 count as 1.
    pub fn with_num_restarts(mut self, num_restarts: usize) -> Self {
        self.config.num_restarts = num_restarts;
        self
    }

    /// Seed the random starting points.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Warm-start trial 0 with EM from the caller's values.
    pub fn with_em_warm_start(mut self, em_warm_start: bool) -> Self {
        self.config.em_warm_start = em_warm_start;
        self
    }

    /// Set the ranges for random starting values.
    ///
    /// # Errors
    ///
    /// * `SemOptError::InvalidInput` if a range is not finite or is reversed
    pub fn with_start_bounds(mut self, start_bounds: StartBounds) -> Result<Self> {
        start_bounds.validate()?;
        self.config.start_bounds = start_bounds;
        Ok(self)
    }

    /// Run trials in parallel when the `parallel` feature is enabled.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.config.parallel = parallel;
        self
    }

    /// Report finished trials to `observer`.
    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Stop with `SemOptError::Cancelled` once `cancellation` fires.
    ///
    /// Checked before every trial. Pass the same token to the inner optimizer
    /// to stop trials that are already running.
    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    /// The configuration in use.
    pub fn config(&self) -> &RestartConfig {
        &self.config
    }

    /// Draw every free parameter of `model` uniformly from its start range.
    fn randomize(&self, model: &mut SemModel, rng: &mut StdRng) -> Result<()> {
        let values: Vec<f64> = model
            .free_parameters()
            .iter()
            .map(|param| {
                let (lo, hi) = self.config.start_bounds.range(param.param_type());
                let (lo, hi) = param.bounds().intersect(lo, hi);
                if lo < hi {
                    rng.gen_range(lo..hi)
                } else {
                    lo
                }
            })
            .collect();
        model.set_free_values(&values.into())
    }

    fn run_trial(
        &self,
        index: usize,
        base_seed: u64,
        model: &SemModel,
        sample: &SampleCovariance,
    ) -> Result<Trial> {
        cancel::check(&self.cancellation)?;

        let mut trial_model = model.clone();
        if index == 0 {
            if self.config.em_warm_start {
                let mut em = EmOptimizer::new()
                    .with_reset_start(false)
                    .with_observer(self.observer.clone());
                if let Some(token) = &self.cancellation {
                    em = em.with_cancellation(token.clone());
                }
                match em.optimize(&mut trial_model, sample) {
                    Ok(_) => {}
                    Err(SemOptError::Cancelled) => return Err(SemOptError::Cancelled),
                    Err(e) => {
                        log::warn!("EM warm start failed, using the given values: {}", e);
                        trial_model = model.clone();
                    }
                }
            }
        } else {
            let mut rng = StdRng::seed_from_u64(base_seed.wrapping_add(index as u64));
            self.randomize(&mut trial_model, &mut rng)?;
        }

        let fit = self.inner.optimize_from_current(&mut trial_model, sample)?;
        self.observer.on_restart_trial(index, fit.chi_square);

        Ok(Trial {
            index,
            model: trial_model,
            fit,
        })
    }

    fn run_trials(
        &self,
        trials: usize,
        base_seed: u64,
        model: &SemModel,
        sample: &SampleCovariance,
    ) -> Vec<Result<Trial>> {
        #[cfg(feature = "parallel")]
        {
            if self.config.parallel {
                return (0..trials)
                    .into_par_iter()
                    .map(|index| self.run_trial(index, base_seed, model, sample))
                    .collect();
            }
        }

        (0..trials)
            .map(|index| self.run_trial(index, base_seed, model, sample))
            .collect()
    }
}

/// Chi-square used for ranking; NaN ranks last.
fn rank(chi_square: f64) -> f64 {
    if chi_square.is_nan() {
        f64::INFINITY
    } else {
        chi_square
    }
}

impl SemOptimizer for RestartOptimizer {
    fn optimize(&self, model: &mut SemModel, sample: &SampleCovariance) -> Result<SemFit> {
        // Reject bad input before any trial runs
        model.align(sample)?;
        self.config.start_bounds.validate()?;
        cancel::check(&self.cancellation)?;

        let trials = self.num_restarts() + 1;
        let base_seed = self
            .config
            .seed
            .unwrap_or_else(|| rand::thread_rng().gen());

        let results = self.run_trials(trials, base_seed, model, sample);

        let mut best: Option<Trial> = None;
        let mut first_error = None;
        let mut succeeded = 0;
        let mut func_evals = 0;

        for result in results {
            match result {
                Ok(trial) => {
                    succeeded += 1;
                    func_evals += trial.fit.func_evals;
                    let better = best
                        .as_ref()
                        .map_or(true, |b| rank(trial.fit.chi_square) < rank(b.fit.chi_square));
                    if better {
                        best = Some(trial);
                    }
                }
                Err(SemOptError::Cancelled) => return Err(SemOptError::Cancelled),
                Err(e) => {
                    log::warn!("Restart trial failed: {}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        let best = match (best, first_error) {
            (Some(best), _) => best,
            (None, Some(e)) => return Err(e),
            (None, None) => {
                return Err(SemOptError::InvalidInput(
                    "No restart trials were run".to_string(),
                ))
            }
        };

        log::debug!(
            "Restart trial {} of {} won with chi-square {:.6}",
            best.index,
            trials,
            best.fit.chi_square
        );

        model.merge_parameter_values(&best.model)?;
        SemFit::from_model(
            format!("restart({})", self.inner.name()),
            model,
            sample,
            best.fit.iterations,
            func_evals,
            ConvergenceStatus::BestOfTrials { trials, succeeded },
        )
    }

    fn num_restarts(&self) -> usize {
        self.config.num_restarts.max(1)
    }

    fn name(&self) -> &'static str {
        "restart"
    }
}
