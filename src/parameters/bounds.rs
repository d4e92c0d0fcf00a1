//! Numeric bounds on SEM parameters.
//!
//! Variances carry a lower bound of zero by default; coefficients and error
//! covariances are unbounded. The objective function uses the bounds to reject
//! candidate points, and the restart optimizer uses them to clip its random
//! starting ranges.

use serde::{Deserialize, Serialize};
use std::f64::{INFINITY, NEG_INFINITY};
use thiserror::Error;

/// Errors that can occur when working with parameter bounds
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BoundsError {
    #[error("Invalid bounds: min ({min}) must not exceed max ({max})")]
    InvalidBounds { min: f64, max: f64 },

    #[error("Parameter value {value} is outside bounds: [{min}, {max}]")]
    ValueOutsideBounds { value: f64, min: f64, max: f64 },

    #[error("Bounds must not be NaN")]
    NanBound,
}

/// Closed interval `[min, max]` a parameter value must lie in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    /// Minimum allowed value for the parameter
    pub min: f64,

    /// Maximum allowed value for the parameter
    pub max: f64,
}

impl Serialize for Bounds {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("Bounds", 2)?;

        // JSON has no infinities, so open ends are written as null
        let min = if self.min == NEG_INFINITY { None } else { Some(self.min) };
        let max = if self.max == INFINITY { None } else { Some(self.max) };
        state.serialize_field("min", &min)?;
        state.serialize_field("max", &max)?;

        state.end()
    }
}

impl<'de> Deserialize<'de> for Bounds {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct BoundsHelper {
            #[serde(default)]
            min: Option<f64>,

            #[serde(default)]
            max: Option<f64>,
        }

        let helper = BoundsHelper::deserialize(deserializer)?;

        Bounds::new(
            helper.min.unwrap_or(NEG_INFINITY),
            helper.max.unwrap_or(INFINITY),
        )
        .map_err(serde::de::Error::custom)
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl Bounds {
    /// Create a new bounds constraint with min and max values
    ///
    /// # Arguments
    ///
    /// * `min` - Minimum allowed value for the parameter
    /// * `max` - Maximum allowed value for the parameter
    ///
    /// # Returns
    ///
    /// A new `Bounds` object if min <= max, or an error otherwise
    ///
    /// # Examples
    ///
    /// ```
    /// use semopt_rs::parameters::Bounds;
    ///
    /// let bounds = Bounds::new(0.0, 10.0).unwrap();
    /// assert_eq!(bounds.min, 0.0);
    /// assert_eq!(bounds.max, 10.0);
    /// ```
    pub fn new(min: f64, max: f64) -> Result<Self, BoundsError> {
        if min.is_nan() || max.is_nan() {
            return Err(BoundsError::NanBound);
        }
        if min > max {
            return Err(BoundsError::InvalidBounds { min, max });
        }

        Ok(Self { min, max })
    }

    /// Bounds from negative to positive infinity.
    pub fn unbounded() -> Self {
        Self {
            min: NEG_INFINITY,
            max: INFINITY,
        }
    }

    /// Bounds `[0, ∞)`, the default for variance parameters.
    pub fn nonnegative() -> Self {
        Self {
            min: 0.0,
            max: INFINITY,
        }
    }

    /// Check if a value is within the bounds
    pub fn is_within_bounds(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// `true` if min is finite
    pub fn has_lower_bound(&self) -> bool {
        self.min.is_finite()
    }

    /// `true` if max is finite
    pub fn has_upper_bound(&self) -> bool {
        self.max.is_finite()
    }

    /// Clamp a value to be within the bounds
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }

    /// Intersect these bounds with the interval `[lo, hi]`.
    ///
    /// If the two intervals are disjoint, the result collapses onto the end of
    /// `self` closest to `[lo, hi]`.
    ///
    /// # Arguments
    ///
    /// * `lo` - Lower end of the other interval
    /// * `hi` - Upper end of the other interval
    ///
    /// # Returns
    ///
    /// The `(min, max)` pair of the intersection
    pub fn intersect(&self, lo: f64, hi: f64) -> (f64, f64) {
        let min = self.clamp(lo.max(self.min));
        let max = self.clamp(hi.min(self.max));
        if min > max {
            (max, max)
        } else {
            (min, max)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_creation() {
        let bounds = Bounds::new(-1.0, 1.0).unwrap();
        assert_eq!(bounds.min, -1.0);
        assert_eq!(bounds.max, 1.0);

        assert_eq!(
            Bounds::new(2.0, 1.0),
            Err(BoundsError::InvalidBounds { min: 2.0, max: 1.0 })
        );
        assert_eq!(Bounds::new(f64::NAN, 1.0), Err(BoundsError::NanBound));

        let var = Bounds::nonnegative();
        assert!(var.has_lower_bound());
        assert!(!var.has_upper_bound());
        assert!(!Bounds::default().has_lower_bound());
    }

    #[test]
    fn test_is_within_bounds_and_clamp() {
        let bounds = Bounds::nonnegative();
        assert!(bounds.is_within_bounds(0.0));
        assert!(bounds.is_within_bounds(1e12));
        assert!(!bounds.is_within_bounds(-1e-12));
        assert!(!bounds.is_within_bounds(f64::NAN));

        assert_eq!(bounds.clamp(-3.0), 0.0);
        assert_eq!(bounds.clamp(3.0), 3.0);
    }

    #[test]
    fn test_intersect() {
        let var = Bounds::nonnegative();
        assert_eq!(var.intersect(1e-4, 1.0), (1e-4, 1.0));
        assert_eq!(var.intersect(-1.0, 1.0), (0.0, 1.0));

        let narrow = Bounds::new(0.2, 0.3).unwrap();
        assert_eq!(narrow.intersect(-1.0, 1.0), (0.2, 0.3));

        // Disjoint intervals collapse to a point
        assert_eq!(narrow.intersect(2.0, 5.0), (0.3, 0.3));
    }

    #[test]
    fn test_serialization_of_open_ends() {
        let json = serde_json::to_string(&Bounds::nonnegative()).unwrap();
        assert_eq!(json, r#"{"min":0.0,"max":null}"#);

        let back: Bounds = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Bounds::nonnegative());

        let bad = serde_json::from_str::<Bounds>(r#"{"min":3.0,"max":1.0}"#);
        assert!(bad.is_err());
    }
}
