//! Utility functions and helpers for the semopt-rs library.

pub mod linalg;
pub mod matrix_convert;

// Re-export commonly used utilities
pub use matrix_convert::{
    nalgebra_to_ndarray, nalgebra_vec_to_ndarray, ndarray_to_nalgebra, ndarray_vec_to_nalgebra,
};
