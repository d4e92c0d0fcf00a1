//! # semopt-rs
//!
//! `semopt-rs` fits linear structural equation models (SEMs) to a sample
//! covariance matrix by maximum likelihood.
//!
//! The library provides:
//! - A graph and parameter model for SEMs with measured and latent variables
//! - Model-implied covariance and the FML discrepancy / chi-square statistic
//! - An EM optimizer that exploits conditional expectations of latent moments
//! - Powell's derivative-free direction-set method with Brent line search
//! - A multi-restart wrapper that runs any optimizer from random starts
//!
//! ## Basic Usage
//!
//! ```
//! use std::sync::Arc;
//!
//! use ndarray::array;
//! use semopt_rs::{
//!     PowellOptimizer, RestartOptimizer, SampleCovariance, SemGraph, SemModel, SemOptimizer,
//! };
//!
//! let mut graph = SemGraph::new();
//! graph.add_measured("X").unwrap();
//! graph.add_measured("Y").unwrap();
//! graph.add_directed_edge("X", "Y").unwrap();
//! let mut model = SemModel::new(graph).unwrap();
//!
//! let sample = SampleCovariance::new(&["X", "Y"], array![[2.0, 0.8], [0.8, 1.0]], 200).unwrap();
//!
//! let restart = RestartOptimizer::new(Arc::new(PowellOptimizer::new()))
//!     .with_num_restarts(3)
//!     .with_seed(1);
//! let fit = restart.optimize(&mut model, &sample).unwrap();
//! assert!(fit.chi_square < 1e-4);
//! ```

// Public modules
pub mod covariance;
pub mod error;
pub mod graph;
pub mod model;
pub mod optimizer;
pub mod parameters;
pub mod problem;
pub mod utils;

// Re-exports for convenience
pub use covariance::{compute_implied, FitFunction, ImpliedCovariance, SampleCovariance};
pub use error::{Result, SemOptError};
pub use graph::{NodeRole, SemGraph};
pub use model::{ParameterEstimate, SemModel};
pub use optimizer::{
    Cancellation, EmOptimizer, OptimizationObserver, PowellOptimizer, RestartOptimizer, SemFit,
    SemOptimizer,
};
pub use parameters::{Bounds, ParamKey, ParamType, Parameter};
pub use problem::{Objective, SemObjective};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
