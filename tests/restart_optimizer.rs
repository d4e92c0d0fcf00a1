//! Tests for the multi-start optimizer with injected inner optimizers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use approx::assert_abs_diff_eq;
use ndarray::array;
use semopt_rs::optimizer::{ConvergenceStatus, RestartConfig, StartBounds};
use semopt_rs::{
    EmOptimizer, ParamType, PowellOptimizer, RestartOptimizer, SampleCovariance, SemFit,
    SemGraph, SemModel, SemOptError, SemOptimizer,
};

fn scenario() -> (SemModel, SampleCovariance) {
    let mut g = SemGraph::new();
    g.add_measured("A").unwrap();
    g.add_measured("B").unwrap();
    g.add_directed_edge("A", "B").unwrap();
    let model = SemModel::new(g).unwrap();
    let sample =
        SampleCovariance::new(&["A", "B"], array![[2.0, 0.8], [0.8, 1.0]], 120).unwrap();
    (model, sample)
}

/// Fails on its first `failures` calls, then delegates to Powell.
struct Flaky {
    failures: usize,
    calls: AtomicUsize,
}

impl Flaky {
    fn new(failures: usize) -> Self {
        Self {
            failures,
            calls: AtomicUsize::new(0),
        }
    }
}

impl SemOptimizer for Flaky {
    fn optimize(&self, model: &mut SemModel, sample: &SampleCovariance) -> semopt_rs::Result<SemFit> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err(SemOptError::NumericalInconsistency("flaky".to_string()));
        }
        PowellOptimizer::new().optimize(model, sample)
    }

    fn name(&self) -> &'static str {
        "flaky"
    }
}

#[test]
fn test_restart_around_em() {
    let (mut model, sample) = scenario();
    let restart = RestartOptimizer::new(Arc::new(EmOptimizer::new()))
        .with_num_restarts(2)
        .with_seed(42);

    let fit = restart.optimize(&mut model, &sample).unwrap();
    assert_eq!(fit.optimizer, "restart(em)");
    assert_eq!(
        fit.status,
        ConvergenceStatus::BestOfTrials {
            trials: 3,
            succeeded: 3
        }
    );

    let coef = model.key(ParamType::Coef, "A", "B").unwrap();
    assert_abs_diff_eq!(model.parameter(coef).unwrap().value(), 0.4, epsilon = 1e-8);
    assert_abs_diff_eq!(fit.fml, 0.0, epsilon = 1e-10);
}

#[test]
fn test_failed_trials_are_skipped() {
    let (mut model, sample) = scenario();
    let restart = RestartOptimizer::new(Arc::new(Flaky::new(1)))
        .with_num_restarts(2)
        .with_seed(1)
        .with_parallel(false);

    let fit = restart.optimize(&mut model, &sample).unwrap();
    assert_eq!(
        fit.status,
        ConvergenceStatus::BestOfTrials {
            trials: 3,
            succeeded: 2
        }
    );
    assert!(fit.fml < 1e-6);
}

#[test]
fn test_all_trials_failing_returns_first_error() {
    let (mut model, sample) = scenario();
    let before = model.free_values();
    let restart = RestartOptimizer::new(Arc::new(Flaky::new(usize::MAX)))
        .with_num_restarts(3)
        .with_seed(1);

    let err = restart.optimize(&mut model, &sample).unwrap_err();
    assert!(matches!(err, SemOptError::NumericalInconsistency(ref msg) if msg == "flaky"));
    assert_eq!(model.free_values(), before);
}

#[test]
fn test_sample_mismatch_runs_no_trials() {
    let (mut model, _) = scenario();
    let other =
        SampleCovariance::new(&["A", "C"], array![[1.0, 0.0], [0.0, 1.0]], 50).unwrap();
    let inner = Arc::new(Flaky::new(0));
    let restart = RestartOptimizer::new(inner.clone()).with_seed(1);

    assert!(matches!(
        restart.optimize(&mut model, &other),
        Err(SemOptError::InvalidInput(_))
    ));
    assert_eq!(inner.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_same_seed_same_result() {
    let config = RestartConfig {
        num_restarts: 3,
        seed: Some(99),
        start_bounds: StartBounds {
            coef: (-0.5, 0.5),
            covar: (-0.5, 0.5),
            var: (0.1, 2.0),
        },
        ..RestartConfig::default()
    };

    let (mut a, sample) = scenario();
    let (mut b, _) = scenario();
    let fit_a = RestartOptimizer::with_config(Arc::new(PowellOptimizer::new()), config.clone())
        .optimize(&mut a, &sample)
        .unwrap();
    let fit_b = RestartOptimizer::with_config(Arc::new(PowellOptimizer::new()), config)
        .optimize(&mut b, &sample)
        .unwrap();

    assert_eq!(fit_a.free_values, fit_b.free_values);
    assert_eq!(fit_a.chi_square, fit_b.chi_square);
}
