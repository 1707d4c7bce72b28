//! Index mapping.

mod logarithmic;
pub use self::logarithmic::LogarithmicMapping;

/// Maps values to bucket indices and vice versa.
///
/// The mapping defines the relationship between floating-point values and integer bucket indices, determining the
/// relative accuracy of the sketch.
pub trait IndexMapping: Clone + Send + Sync {
    /// Returns the index of the bucket for the given positive value.
    ///
    /// The value must be within `[min_indexable_value, max_indexable_value]`. For negative values, use the index of the
    /// absolute value and store it in the negative store.
    fn index(&self, value: f64) -> i32;

    /// Returns the representative value for the given index.
    ///
    /// Any value that maps to `index` is within the relative accuracy of the value returned here.
    fn value(&self, index: i32) -> f64;

    /// Returns the relative accuracy of this mapping.
    fn relative_accuracy(&self) -> f64;

    /// Returns the smallest positive value that can be indexed.
    ///
    /// Magnitudes at or below this value are collapsed into the zero bucket by the sketch.
    fn min_indexable_value(&self) -> f64;

    /// Returns the largest positive value that can be indexed.
    fn max_indexable_value(&self) -> f64;

    /// Returns `true` if sketches using `self` and `other` can be merged.
    fn is_mergeable(&self, other: &Self) -> bool;
}
