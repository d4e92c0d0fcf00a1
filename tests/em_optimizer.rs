//! Tests for the EM optimizer through the public API.

use std::sync::{Arc, Mutex};

use approx::assert_abs_diff_eq;
use ndarray::array;
use semopt_rs::optimizer::{ConvergenceStatus, EmConfig};
use semopt_rs::{
    Cancellation, EmOptimizer, OptimizationObserver, ParamType, SampleCovariance, SemGraph,
    SemModel, SemOptError, SemOptimizer,
};

fn mediation() -> (SemModel, SampleCovariance) {
    let mut g = SemGraph::new();
    for name in ["X", "M", "Y"] {
        g.add_measured(name).unwrap();
    }
    g.add_directed_edge("X", "M").unwrap();
    g.add_directed_edge("M", "Y").unwrap();
    g.add_directed_edge("X", "Y").unwrap();
    let model = SemModel::new(g).unwrap();

    let s = array![[1.5, 0.6, 0.5], [0.6, 1.2, 0.7], [0.5, 0.7, 2.0]];
    let sample = SampleCovariance::new(&["X", "M", "Y"], s, 300).unwrap();
    (model, sample)
}

#[derive(Default)]
struct ScoreRecorder {
    scores: Mutex<Vec<(usize, f64)>>,
}

impl OptimizationObserver for ScoreRecorder {
    fn on_em_iteration(&self, iteration: usize, score: f64) {
        self.scores.lock().unwrap().push((iteration, score));
    }
}

#[test]
fn test_saturated_mediation_fits_exactly() {
    let (mut model, sample) = mediation();
    assert_eq!(model.dof(), 0);

    let fit = EmOptimizer::new().optimize(&mut model, &sample).unwrap();
    assert_eq!(fit.optimizer, "em");
    assert_eq!(fit.status, ConvergenceStatus::ScoreConvergence);
    assert_abs_diff_eq!(fit.fml, 0.0, epsilon = 1e-10);
    assert_abs_diff_eq!(fit.chi_square, 0.0, epsilon = 1e-8);

    // X -> M is a simple regression
    let key = model.key(ParamType::Coef, "X", "M").unwrap();
    assert_abs_diff_eq!(model.parameter(key).unwrap().value(), 0.4, epsilon = 1e-10);
    assert_eq!(fit.free_values, model.free_values());
}

#[test]
fn test_observer_sees_every_iteration() {
    let (mut model, sample) = mediation();
    let recorder = Arc::new(ScoreRecorder::default());

    let fit = EmOptimizer::new()
        .with_observer(recorder.clone())
        .optimize(&mut model, &sample)
        .unwrap();

    let scores = recorder.scores.lock().unwrap();
    assert_eq!(scores.len(), fit.iterations);
    for (i, (iteration, score)) in scores.iter().enumerate() {
        assert_eq!(*iteration, i + 1);
        assert!(score.is_finite());
    }
}

#[test]
fn test_iteration_cap_leaves_model_untouched() {
    let (mut model, sample) = mediation();
    let before = model.free_values();

    let em = EmOptimizer::with_config(EmConfig {
        max_iterations: 1,
        ..EmConfig::default()
    });
    let err = em.optimize(&mut model, &sample).unwrap_err();
    assert!(matches!(
        err,
        SemOptError::MaxIterationsExceeded {
            routine: "em",
            limit: 1
        }
    ));
    assert_eq!(model.free_values(), before);
}

#[test]
fn test_cancelled_before_start() {
    let (mut model, sample) = mediation();
    let token = Cancellation::new();
    token.cancel();

    let result = EmOptimizer::new()
        .with_cancellation(token)
        .optimize(&mut model, &sample);
    assert!(matches!(result, Err(SemOptError::Cancelled)));
}

#[test]
fn test_fixed_variance_is_kept() {
    let (mut model, sample) = mediation();
    let var_x = model.key(ParamType::Var, "X", "X").unwrap();
    model.fix_parameter(var_x, 1.0).unwrap();

    let fit = EmOptimizer::new().optimize(&mut model, &sample).unwrap();
    assert_eq!(model.parameter(var_x).unwrap().value(), 1.0);
    assert_eq!(fit.free_values.len(), 5);
    // Var(X) no longer matches the sample
    assert!(fit.fml > 0.0);
}
