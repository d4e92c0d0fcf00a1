//! Tests for the model-implied covariance.

use approx::assert_relative_eq;
use ndarray::{array, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use semopt_rs::covariance::{compute_implied, ImpliedCovariance};
use semopt_rs::SemOptError;

#[test]
fn test_no_edges_is_exactly_omega() {
    let mut rng = ChaCha8Rng::seed_from_u64(99);

    for n in 1..=6 {
        let a = Array2::from_shape_fn((n, n), |_| rng.gen_range(-1.0..1.0));
        let omega = a.dot(&a.t()) + Array2::<f64>::eye(n);
        let b = Array2::<f64>::zeros((n, n));

        assert_eq!(compute_implied(&b, &omega).unwrap(), omega);
    }
}

#[test]
fn test_chain_matches_path_tracing() {
    // X -> Y -> Z with coefficients 0.6 and 0.5, unit exogenous variance
    let b = array![[0.0, 0.0, 0.0], [0.6, 0.0, 0.0], [0.0, 0.5, 0.0]];
    let omega = array![[1.0, 0.0, 0.0], [0.0, 0.64, 0.0], [0.0, 0.0, 0.75]];
    let sigma = compute_implied(&b, &omega).unwrap();

    assert_relative_eq!(sigma[[0, 0]], 1.0, epsilon = 1e-12);
    assert_relative_eq!(sigma[[1, 1]], 1.0, epsilon = 1e-12);
    assert_relative_eq!(sigma[[2, 2]], 1.0, epsilon = 1e-12);
    assert_relative_eq!(sigma[[0, 1]], 0.6, epsilon = 1e-12);
    assert_relative_eq!(sigma[[1, 2]], 0.5, epsilon = 1e-12);
    assert_relative_eq!(sigma[[0, 2]], 0.3, epsilon = 1e-12);
    assert_eq!(sigma, sigma.t());
}

#[test]
fn test_correlated_errors() {
    let b = Array2::<f64>::zeros((2, 2));
    let omega = array![[1.0, 0.4], [0.4, 2.0]];
    let implied = ImpliedCovariance::compute(&b, &omega, &[0, 1], &[]).unwrap();

    assert_eq!(implied.yy(), omega);
    assert_eq!(implied.matrix(), &omega);
}

#[test]
fn test_feedback_loop() {
    // X <-> Y feedback with gain 0.25 is fine, gain 1 is singular
    let omega = Array2::<f64>::eye(2);
    let stable = array![[0.0, 0.5], [0.5, 0.0]];
    let sigma = compute_implied(&stable, &omega).unwrap();
    // (I - B)^-1 = 1/0.75 [[1, 0.5], [0.5, 1]]
    let k = 1.0 / 0.75;
    assert_relative_eq!(sigma[[0, 0]], k * k * 1.25, epsilon = 1e-12);
    assert_relative_eq!(sigma[[0, 1]], k * k * 1.0, epsilon = 1e-12);

    let singular = array![[0.0, 1.0], [1.0, 0.0]];
    assert!(matches!(
        compute_implied(&singular, &omega),
        Err(SemOptError::NonInvertibleStructure(_))
    ));
}
