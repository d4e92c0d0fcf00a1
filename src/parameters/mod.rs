//! # Parameter System
//!
//! SEM parameters are edge coefficients (`COEF`) and error variances and
//! covariances (`VAR`, `COVAR`). Each parameter is uniquely keyed by its type
//! and node pair, carries numeric bounds, and is either free (moved by the
//! optimizers) or fixed (held at its value).
//!
//! ## Example Usage
//!
//! ```rust
//! use semopt_rs::parameters::{Bounds, ParamKey, Parameter};
//!
//! let mut coef = Parameter::new("B1", ParamKey::coef(0, 1), 0.0);
//! coef.set_bounds(Bounds::new(-5.0, 5.0).unwrap());
//! coef.set_value(0.7).unwrap();
//!
//! let mut var = Parameter::new("T1", ParamKey::var(0), 1.0);
//! var.set_fixed(true);
//! assert!(var.set_value(-1.0).is_err());
//! ```

pub mod bounds;
pub mod parameter;

// Re-export key types
pub use bounds::{Bounds, BoundsError};
pub use parameter::{ParamKey, ParamType, Parameter, ParameterError};
