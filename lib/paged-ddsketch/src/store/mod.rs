//! Store implementations for sketch buckets.
//!
//! A store manages the bucket weights for either positive or negative values.

mod paged;
pub use self::paged::PagedStore;

use crate::error::SketchError;

/// A store for sketch buckets.
///
/// Stores hold a non-negative weight for each bucket index across the full `i32` range. Weights are real-valued, which
/// allows recording pre-aggregated or fractional observations.
pub trait Store: Send + Sync {
    /// Adds the given weight to the bucket at the given index.
    ///
    /// Adding a weight of zero does nothing. Callers must not pass negative or non-finite weights.
    fn add(&mut self, index: i32, weight: f64);

    /// Returns the total weight across all buckets.
    fn total_weight(&self) -> f64;

    /// Returns the minimum index with a positive weight, or `None` if empty.
    fn min_index(&self) -> Option<i32>;

    /// Returns the maximum index with a positive weight, or `None` if empty.
    fn max_index(&self) -> Option<i32>;

    /// Returns the index of the bucket containing the given rank.
    ///
    /// The rank is 0-indexed, so rank 0 is the first observation. Negative ranks are treated as 0, and ranks at or
    /// beyond the total weight resolve to the maximum index.
    ///
    /// # Errors
    ///
    /// If the store holds no weight at all, [`SketchError::NotFound`] is returned.
    fn key_at_rank(&mut self, rank: f64) -> Result<i32, SketchError>;

    /// Returns `true` if `other` can be merged into this store.
    fn is_mergeable(&self, other: &Self) -> bool;

    /// Merges another store into this one, consuming it.
    ///
    /// # Errors
    ///
    /// If the stores are not mergeable, [`SketchError::NotMergeable`] is returned and neither store is modified.
    fn merge(&mut self, other: Self) -> Result<(), SketchError>
    where
        Self: Sized;

    /// Returns whether the store is empty.
    fn is_empty(&self) -> bool;

    /// Clears all buckets from the store.
    fn clear(&mut self);
}
