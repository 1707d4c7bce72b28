//! Logarithmic index mapping implementation.

use snafu::ensure;

use super::IndexMapping;
use crate::error::{InvalidParameterSnafu, SketchError};

/// Relative slack below `f64::MAX` for the largest representative value.
///
/// Rounding in `ln`, `exp`, and the index computation can place a reconstructed value a few hundred ulps above its exact
/// position; this leaves several thousand.
const OVERFLOW_MARGIN: f64 = 1e-12;

/// Logarithmic index mapping.
///
/// Maps values to indices using `index = floor(ln(value) / ln(gamma))`, where `gamma = (1 + alpha) / (1 - alpha)` and
/// `alpha` is the relative accuracy. Bucket `i` covers `[gamma^i, gamma^(i+1))`, and its representative value is placed
/// so that both edges of the bucket are exactly `alpha` away from it in relative terms.
#[derive(Clone, Debug, PartialEq)]
pub struct LogarithmicMapping {
    /// The relative accuracy guarantee.
    relative_accuracy: f64,
    /// The base of the logarithm, determines bucket widths.
    gamma: f64,
    /// Precomputed 1/ln(gamma).
    multiplier: f64,
    /// Minimum value that can be indexed.
    min_indexable_value: f64,
    /// Maximum value that can be indexed.
    max_indexable_value: f64,
}

impl LogarithmicMapping {
    /// Creates a new logarithmic mapping with the given relative accuracy.
    ///
    /// # Errors
    ///
    /// If the relative accuracy is not strictly between 0 and 1, an error is returned.
    ///
    /// # Example
    ///
    /// ```
    /// use paged_ddsketch::LogarithmicMapping;
    ///
    /// // Create a mapping with 1% relative accuracy
    /// let mapping = LogarithmicMapping::new(0.01).unwrap();
    /// ```
    pub fn new(relative_accuracy: f64) -> Result<Self, SketchError> {
        ensure!(
            relative_accuracy > 0.0 && relative_accuracy < 1.0,
            InvalidParameterSnafu {
                name: "relative_accuracy",
                reason: "must be between 0 and 1 (exclusive)",
            }
        );

        let gamma = (1.0 + relative_accuracy) / (1.0 - relative_accuracy);
        let multiplier = 1.0 / gamma.ln();

        // The lower bound keeps indices above `i32::MIN` and keeps the lower edge of the smallest bucket a normal
        // float. The upper bound keeps indices below `i32::MAX` and keeps the representative value of the largest
        // bucket, which sits above the bucket's lower edge by a factor of 2*gamma/(gamma+1), from overflowing.
        let min_indexable_value =
            (f64::from(i32::MIN) / multiplier + 1.0).exp().max(f64::MIN_POSITIVE * gamma);
        let max_indexable_value = (f64::from(i32::MAX) / multiplier - 1.0)
            .exp()
            .min(f64::MAX / (2.0 * gamma) * (gamma + 1.0) * (1.0 - OVERFLOW_MARGIN));

        Ok(Self {
            relative_accuracy,
            gamma,
            multiplier,
            min_indexable_value,
            max_indexable_value,
        })
    }

    /// Returns the gamma value used for this mapping.
    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// Returns the lower bound of the bucket at the given index.
    pub fn lower_bound(&self, index: i32) -> f64 {
        (f64::from(index) / self.multiplier).exp()
    }
}

impl IndexMapping for LogarithmicMapping {
    fn index(&self, value: f64) -> i32 {
        (value.ln() * self.multiplier).floor() as i32
    }

    fn value(&self, index: i32) -> f64 {
        self.lower_bound(index) * (1.0 + (self.gamma - 1.0) / (self.gamma + 1.0))
    }

    fn relative_accuracy(&self) -> f64 {
        self.relative_accuracy
    }

    fn min_indexable_value(&self) -> f64 {
        self.min_indexable_value
    }

    fn max_indexable_value(&self) -> f64 {
        self.max_indexable_value
    }

    fn is_mergeable(&self, other: &Self) -> bool {
        self.relative_accuracy == other.relative_accuracy
    }
}

impl Default for LogarithmicMapping {
    /// Creates a logarithmic mapping with 1% relative accuracy.
    fn default() -> Self {
        Self::new(0.01).expect("0.01 is a valid relative accuracy")
    }
}
