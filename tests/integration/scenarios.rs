//! Fits of small models with known solutions, across all optimizers.

use std::sync::Arc;
use std::time::Duration;

use approx::assert_abs_diff_eq;
use ndarray::{array, Array2};
use semopt_rs::optimizer::ConvergenceStatus;
use semopt_rs::{
    Cancellation, EmOptimizer, ParamType, ParameterEstimate, PowellOptimizer, RestartOptimizer,
    SampleCovariance, SemGraph, SemModel, SemOptError, SemOptimizer,
};

use crate::test_helpers::{coef, init_logger, matrix_approx_eq, one_factor_model, variance};

fn single_edge() -> SemModel {
    let mut g = SemGraph::new();
    g.add_measured("A").unwrap();
    g.add_measured("B").unwrap();
    g.add_directed_edge("A", "B").unwrap();
    SemModel::new(g).unwrap()
}

fn identity_sample() -> SampleCovariance {
    SampleCovariance::new(&["A", "B"], Array2::eye(2), 100).unwrap()
}

fn correlated_sample() -> SampleCovariance {
    SampleCovariance::new(&["A", "B"], array![[1.0, 0.5], [0.5, 1.0]], 100).unwrap()
}

fn optimizers() -> Vec<Box<dyn SemOptimizer>> {
    vec![
        Box::new(PowellOptimizer::new()),
        Box::new(EmOptimizer::new()),
        Box::new(
            RestartOptimizer::new(Arc::new(PowellOptimizer::new()))
                .with_num_restarts(2)
                .with_seed(17),
        ),
    ]
}

#[test]
fn test_independent_variables() {
    init_logger();

    for optimizer in optimizers() {
        let mut model = single_edge();
        let fit = optimizer.optimize(&mut model, &identity_sample()).unwrap();

        assert_abs_diff_eq!(coef(&model, "A", "B"), 0.0, epsilon = 1e-3);
        assert_abs_diff_eq!(variance(&model, "A"), 1.0, epsilon = 1e-3);
        assert_abs_diff_eq!(variance(&model, "B"), 1.0, epsilon = 1e-3);
        assert!(fit.fml < 1e-6, "{} left FML at {}", optimizer.name(), fit.fml);
    }
}

#[test]
fn test_correlated_pair() {
    init_logger();

    for optimizer in optimizers() {
        let mut model = single_edge();
        let var_a = model.key(ParamType::Var, "A", "A").unwrap();
        model.fix_parameter(var_a, 1.0).unwrap();

        let sample = correlated_sample();
        let fit = optimizer.optimize(&mut model, &sample).unwrap();

        assert_abs_diff_eq!(coef(&model, "A", "B"), 0.5, epsilon = 1e-3);
        assert_abs_diff_eq!(variance(&model, "B"), 0.75, epsilon = 1e-3);
        assert_eq!(variance(&model, "A"), 1.0);

        // Report agrees with the model it wrote
        let implied = model.implied_covariance().unwrap().yy();
        assert!(matrix_approx_eq(&implied, sample.matrix(), 1e-3));
        assert_abs_diff_eq!(
            model.chi_square(&sample).unwrap(),
            fit.chi_square,
            epsilon = 1e-12
        );
        assert_eq!(fit.free_values, model.free_values());
    }
}

#[test]
fn test_one_factor_with_warm_start() {
    init_logger();
    let loadings = [0.8, 0.7, 0.6, 0.5];
    let (mut model, sample) = one_factor_model(&loadings, 500);
    for i in 1..=loadings.len() {
        let key = model.key(ParamType::Coef, "L", &format!("X{}", i)).unwrap();
        model.set_parameter_value(key, 0.5).unwrap();
    }

    let restart = RestartOptimizer::new(Arc::new(PowellOptimizer::new()))
        .with_num_restarts(3)
        .with_seed(2024)
        .with_em_warm_start(true);
    let fit = restart.optimize(&mut model, &sample).unwrap();

    // Loadings are identified up to a common sign
    for (i, &expected) in loadings.iter().enumerate() {
        let name = format!("X{}", i + 1);
        assert_abs_diff_eq!(coef(&model, "L", &name).abs(), expected, epsilon = 1e-2);
        assert_abs_diff_eq!(variance(&model, &name), 1.0 - expected * expected, epsilon = 1e-2);
    }
    assert_eq!(variance(&model, "L"), 1.0);
    assert!(fit.fml < 1e-4);
    assert_eq!(model.dof(), 2);
    assert!(matches!(fit.status, ConvergenceStatus::BestOfTrials { trials: 4, .. }));
}

#[test]
fn test_restarted_em_leaves_zero_loadings() {
    init_logger();
    let loadings = [0.8, 0.7, 0.6, 0.5];
    let (mut model, sample) = one_factor_model(&loadings, 500);

    // Plain EM resets the loadings to zero and stays there
    let mut plain = model.clone();
    EmOptimizer::new().optimize(&mut plain, &sample).unwrap();
    assert_eq!(coef(&plain, "L", "X1"), 0.0);

    let inner = EmOptimizer::new().with_func_tolerance(1e-10);
    let fit = RestartOptimizer::new(Arc::new(inner))
        .with_num_restarts(5)
        .with_seed(7)
        .optimize(&mut model, &sample)
        .unwrap();

    for (i, &expected) in loadings.iter().enumerate() {
        let name = format!("X{}", i + 1);
        assert_abs_diff_eq!(coef(&model, "L", &name).abs(), expected, epsilon = 1e-2);
    }
    assert!(fit.fml < 1e-4, "restart(em) left FML at {}", fit.fml);
    assert_eq!(fit.optimizer, "restart(em)");
}

#[test]
fn test_em_and_powell_agree() {
    init_logger();
    let mut g = SemGraph::new();
    for name in ["X1", "X2", "Y"] {
        g.add_measured(name).unwrap();
    }
    g.add_directed_edge("X1", "Y").unwrap();
    g.add_directed_edge("X2", "Y").unwrap();
    let s = array![[1.0, 0.3, 0.6], [0.3, 1.0, 0.4], [0.6, 0.4, 1.2]];
    let sample = SampleCovariance::new(&["X1", "X2", "Y"], s, 200).unwrap();

    let mut by_em = SemModel::new(g.clone()).unwrap();
    let mut by_powell = SemModel::new(g).unwrap();
    let em_fit = EmOptimizer::new()
        .with_func_tolerance(1e-10)
        .optimize(&mut by_em, &sample)
        .unwrap();
    let powell_fit = PowellOptimizer::new()
        .with_ftol(1e-10)
        .optimize(&mut by_powell, &sample)
        .unwrap();

    // X1 and X2 are uncorrelated in the model, so the fit is not exact
    assert_eq!(by_em.dof(), 1);
    assert!(em_fit.chi_square > 0.0);
    assert!(powell_fit.chi_square <= em_fit.chi_square + 1e-4);
}

#[test]
fn test_zero_restarts_behaves_like_one() {
    let make = |n| {
        RestartOptimizer::new(Arc::new(PowellOptimizer::new()))
            .with_num_restarts(n)
            .with_seed(8)
    };

    let mut a = single_edge();
    let mut b = single_edge();
    let fit_a = make(0).optimize(&mut a, &correlated_sample()).unwrap();
    let fit_b = make(1).optimize(&mut b, &correlated_sample()).unwrap();

    assert_eq!(fit_a.status, fit_b.status);
    assert_eq!(fit_a.free_values, fit_b.free_values);
}

#[test]
fn test_expired_deadline_cancels_every_optimizer() {
    let token = Cancellation::with_timeout(Duration::ZERO);
    let optimizers: Vec<Box<dyn SemOptimizer>> = vec![
        Box::new(PowellOptimizer::new().with_cancellation(token.clone())),
        Box::new(EmOptimizer::new().with_cancellation(token.clone())),
        Box::new(
            RestartOptimizer::new(Arc::new(PowellOptimizer::new())).with_cancellation(token),
        ),
    ];

    for optimizer in optimizers {
        let mut model = single_edge();
        let before = model.free_values();
        assert!(matches!(
            optimizer.optimize(&mut model, &identity_sample()),
            Err(SemOptError::Cancelled)
        ));
        assert_eq!(model.free_values(), before);
    }
}

#[test]
fn test_mismatched_sample_is_invalid_input() {
    let sample =
        SampleCovariance::new(&["A", "Z"], array![[1.0, 0.0], [0.0, 1.0]], 100).unwrap();

    for optimizer in optimizers() {
        let mut model = single_edge();
        assert!(matches!(
            optimizer.optimize(&mut model, &sample),
            Err(SemOptError::InvalidInput(_))
        ));
    }
}

#[test]
fn test_json_export() {
    let mut model = single_edge();
    let fit = PowellOptimizer::new()
        .optimize(&mut model, &correlated_sample())
        .unwrap();

    let value: serde_json::Value = serde_json::from_str(&fit.to_json().unwrap()).unwrap();
    assert_eq!(value["optimizer"], "powell");
    assert!(value["chi_square"].as_f64().unwrap() >= 0.0);

    let estimates: Vec<ParameterEstimate> =
        serde_json::from_str(&model.estimates_to_json().unwrap()).unwrap();
    assert_eq!(estimates.len(), 3);
    assert_eq!(estimates[0].name, "B1");
    assert_eq!(estimates[0].node_a, "A");
    assert_eq!(estimates[0].node_b, "B");
    for (read, current) in estimates.iter().zip(model.estimates()) {
        assert_eq!(read.param_type, current.param_type);
        assert_abs_diff_eq!(read.value, current.value, epsilon = 1e-12);
    }

    assert!(fit.to_string().contains("powell"));
}
