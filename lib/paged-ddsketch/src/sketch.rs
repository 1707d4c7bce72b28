//! Paged DDSketch implementation.

use snafu::{ensure, OptionExt as _};
use tracing::debug;

use crate::error::{EmptySketchSnafu, InvalidArgumentSnafu, NotMergeableSnafu, OutOfRangeSnafu, SketchError};
use crate::mapping::{IndexMapping, LogarithmicMapping};
use crate::store::{PagedStore, Store};

/// A fast and fully-mergeable quantile sketch with relative-error guarantees.
///
/// Positive and negative values are tracked in separate stores, keyed by the bucket index of their magnitude. Values
/// whose magnitude is too small to be indexed are counted in a dedicated zero bucket, and reported back as exactly
/// zero.
///
/// Defaults to a logarithmic index mapping and a [`PagedStore`] for each sign, which works well for skewed, long-tailed
/// data such as latencies.
///
/// # Merging
///
/// Sketches can only be merged with sketches of the same type, so mismatched mapping or storage kinds are rejected at
/// compile time. The mapping configuration (relative accuracy) and the store configuration (page length) must also match,
/// which is checked at runtime. Merging consumes the other sketch.
///
/// # Example
///
/// ```
/// use paged_ddsketch::DDSketch;
///
/// let mut left = DDSketch::with_relative_accuracy(0.01).unwrap();
/// left.add(1.0).unwrap();
/// left.add(2.0).unwrap();
///
/// let mut right = DDSketch::with_relative_accuracy(0.01).unwrap();
/// right.record(3.0, 2.0).unwrap();
///
/// left.merge(right).unwrap();
/// assert_eq!(left.count(), 4.0);
///
/// let median = left.quantile_value(0.5).unwrap();
/// ```
#[derive(Clone, Debug)]
pub struct DDSketch<M: IndexMapping = LogarithmicMapping, S: Store = PagedStore> {
    /// The index mapping for this sketch.
    mapping: M,

    /// Store for positive values.
    positive_store: S,

    /// Store for negative values.
    negative_store: S,

    /// Weight of values that map to zero.
    zero_count: f64,
}

impl DDSketch<LogarithmicMapping, PagedStore> {
    /// Creates a new `DDSketch` with the given relative accuracy.
    ///
    /// Uses a logarithmic mapping and the default page length for both stores.
    ///
    /// # Errors
    ///
    /// If the relative accuracy is not between `0` and `1` (exclusive), an error is returned.
    pub fn with_relative_accuracy(relative_accuracy: f64) -> Result<Self, SketchError> {
        let mapping = LogarithmicMapping::new(relative_accuracy)?;
        Ok(Self::new(mapping, PagedStore::new(), PagedStore::new()))
    }
}

impl<M: IndexMapping, S: Store> DDSketch<M, S> {
    /// Creates a new `DDSketch` with the given mapping and stores.
    pub fn new(mapping: M, positive_store: S, negative_store: S) -> Self {
        Self {
            mapping,
            positive_store,
            negative_store,
            zero_count: 0.0,
        }
    }

    /// Adds a single value to the sketch.
    ///
    /// # Errors
    ///
    /// If the value cannot be indexed, an error is returned. See [`record`][Self::record].
    pub fn add(&mut self, value: f64) -> Result<(), SketchError> {
        self.record(value, 1.0)
    }

    /// Records a value with the given count.
    ///
    /// The count is a weight, and doesn't have to be a whole number. Values whose magnitude is at or below the
    /// mapping's minimum indexable value are counted as zero.
    ///
    /// # Errors
    ///
    /// If the count is negative or not finite, or if the value is not finite or its magnitude exceeds the mapping's
    /// maximum indexable value, an error is returned and the sketch is left unchanged.
    pub fn record(&mut self, value: f64, count: f64) -> Result<(), SketchError> {
        ensure!(
            count >= 0.0 && count.is_finite(),
            InvalidArgumentSnafu {
                reason: "count must be a finite, non-negative number",
            }
        );
        self.validate_value(value)?;

        self.record_unchecked(value, count);
        Ok(())
    }

    /// Adds each of the given values to the sketch.
    ///
    /// All values are validated before any of them are added, so either every value is added or none are.
    ///
    /// # Errors
    ///
    /// If any value cannot be indexed, an error is returned for the first such value and the sketch is left
    /// unchanged.
    pub fn record_batch(&mut self, values: &[f64]) -> Result<(), SketchError> {
        for value in values {
            self.validate_value(*value)?;
        }

        for value in values {
            self.record_unchecked(*value, 1.0);
        }
        Ok(())
    }

    fn validate_value(&self, value: f64) -> Result<(), SketchError> {
        let max_magnitude = self.mapping.max_indexable_value();
        ensure!(
            value.is_finite() && value.abs() <= max_magnitude,
            OutOfRangeSnafu { value, max_magnitude }
        );
        Ok(())
    }

    fn record_unchecked(&mut self, value: f64, count: f64) {
        let min_magnitude = self.mapping.min_indexable_value();
        if value > min_magnitude {
            let index = self.mapping.index(value);
            self.positive_store.add(index, count);
        } else if value < -min_magnitude {
            let index = self.mapping.index(-value);
            self.negative_store.add(index, count);
        } else {
            self.zero_count += count;
        }
    }

    /// Merges another sketch into this one, consuming it.
    ///
    /// # Errors
    ///
    /// If the sketches have different relative accuracies, or their stores have different configurations, an error is
    /// returned and this sketch is left unchanged.
    pub fn merge(&mut self, other: Self) -> Result<(), SketchError> {
        ensure!(
            self.mapping.is_mergeable(&other.mapping),
            NotMergeableSnafu {
                reason: "sketches use different relative accuracies",
            }
        );
        ensure!(
            self.positive_store.is_mergeable(&other.positive_store)
                && self.negative_store.is_mergeable(&other.negative_store),
            NotMergeableSnafu {
                reason: "sketches use different store configurations",
            }
        );

        self.positive_store.merge(other.positive_store)?;
        self.negative_store.merge(other.negative_store)?;
        self.zero_count += other.zero_count;
        Ok(())
    }

    /// Merges all of the given sketches together.
    ///
    /// The first sketch is used as the accumulator, and every other sketch is merged into it, in order.
    ///
    /// # Errors
    ///
    /// If no sketches are given, or if any sketch cannot be merged with the first, an error is returned.
    pub fn merge_all<I>(sketches: I) -> Result<Self, SketchError>
    where
        I: IntoIterator<Item = Self>,
    {
        let mut sketches = sketches.into_iter();
        let mut merged = sketches.next().context(InvalidArgumentSnafu {
            reason: "at least one sketch is required to merge",
        })?;

        let mut merged_count = 1;
        for sketch in sketches {
            merged.merge(sketch)?;
            merged_count += 1;
        }

        debug!(sketches = merged_count, count = merged.count(), "Merged sketches.");
        Ok(merged)
    }

    /// Returns the approximate value at the given quantile.
    ///
    /// The returned value is within the sketch's relative accuracy of the value at the nearest rank of
    /// `quantile * (count - 1)`.
    ///
    /// This takes `&mut self` because stores may reorganize buffered data to answer rank queries, but the recorded
    /// values are never changed.
    ///
    /// # Errors
    ///
    /// If the quantile is not within `[0, 1]`, or the sketch is empty, an error is returned.
    pub fn quantile_value(&mut self, quantile: f64) -> Result<f64, SketchError> {
        ensure!(
            (0.0..=1.0).contains(&quantile),
            InvalidArgumentSnafu {
                reason: "quantile must be between 0 and 1 (inclusive)",
            }
        );

        let count = self.count();
        ensure!(count > 0.0, EmptySketchSnafu);

        // Fractional weights can bring the total below one, which would otherwise make the rank negative.
        let rank = (quantile * (count - 1.0)).max(0.0);
        let negative_count = self.negative_store.total_weight();

        if rank < negative_count {
            // Negative values are stored by magnitude, so the rank has to be mirrored.
            let index = lookup_rank(&mut self.negative_store, negative_count - 1.0 - rank);
            Ok(-self.mapping.value(index))
        } else if rank < self.zero_count + negative_count {
            Ok(0.0)
        } else {
            let index = lookup_rank(&mut self.positive_store, rank - self.zero_count - negative_count);
            Ok(self.mapping.value(index))
        }
    }

    /// Returns the approximate values at each of the given quantiles, in order.
    ///
    /// # Errors
    ///
    /// If any quantile is not within `[0, 1]`, or the sketch is empty, an error is returned.
    pub fn quantile_values(&mut self, quantiles: &[f64]) -> Result<Vec<f64>, SketchError> {
        quantiles
            .iter()
            .map(|quantile| self.quantile_value(*quantile))
            .collect()
    }

    /// Returns `true` if the sketch is empty.
    pub fn is_empty(&self) -> bool {
        self.count() == 0.0
    }

    /// Returns the total weight of all values recorded in the sketch.
    pub fn count(&self) -> f64 {
        self.negative_store.total_weight() + self.positive_store.total_weight() + self.zero_count
    }

    /// Clears the sketch, removing all values.
    pub fn clear(&mut self) {
        self.positive_store.clear();
        self.negative_store.clear();
        self.zero_count = 0.0;
    }

    /// Returns a reference to the index mapping.
    pub fn mapping(&self) -> &M {
        &self.mapping
    }

    /// Returns a reference to the positive value store.
    pub fn positive_store(&self) -> &S {
        &self.positive_store
    }

    /// Returns a reference to the negative value store.
    pub fn negative_store(&self) -> &S {
        &self.negative_store
    }

    /// Returns the weight of values mapped to zero.
    pub fn zero_count(&self) -> f64 {
        self.zero_count
    }

    /// Returns the relative accuracy of this sketch.
    pub fn relative_accuracy(&self) -> f64 {
        self.mapping.relative_accuracy()
    }
}

impl<M: IndexMapping + Default, S: Store + Default> Default for DDSketch<M, S> {
    fn default() -> Self {
        Self::new(M::default(), S::default(), S::default())
    }
}

fn lookup_rank<S: Store>(store: &mut S, rank: f64) -> i32 {
    match store.key_at_rank(rank) {
        Ok(index) => index,
        Err(e) => unreachable!("rank lookup failed on non-empty store: {}", e),
    }
}
