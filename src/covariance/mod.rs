//! Covariance matrices: the sample input, the model-implied covariance, and
//! the FML discrepancy between them.

pub mod fit;
pub mod implied;
pub mod sample;

pub use fit::{chi_square, fml, FitFunction};
pub use implied::{compute_implied, ImpliedCovariance};
pub use sample::SampleCovariance;
