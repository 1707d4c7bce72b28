use snafu::Snafu;

/// Errors returned by sketch, mapping, and store operations.
///
/// Every operation validates its inputs before touching any state, so an error always means that nothing was changed.
#[derive(Clone, Debug, PartialEq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SketchError {
    /// A construction parameter was outside of its valid range.
    #[snafu(display("Invalid parameter '{}': {}", name, reason))]
    InvalidParameter {
        /// Name of the parameter.
        name: &'static str,

        /// Why the parameter was rejected.
        reason: &'static str,
    },

    /// An operation argument was invalid.
    #[snafu(display("Invalid argument: {}", reason))]
    InvalidArgument {
        /// Why the argument was rejected.
        reason: &'static str,
    },

    /// The value cannot be mapped to a bucket.
    #[snafu(display("Value {} is not finite or exceeds the indexable magnitude {}.", value, max_magnitude))]
    OutOfRange {
        /// The rejected value.
        value: f64,

        /// The largest magnitude the sketch can index.
        max_magnitude: f64,
    },

    /// The operands of a merge have incompatible configurations.
    #[snafu(display("Cannot merge: {}", reason))]
    NotMergeable {
        /// Which part of the configuration differs.
        reason: &'static str,
    },

    /// A quantile was requested from a sketch that holds no values.
    #[snafu(display("Cannot compute a quantile of an empty sketch."))]
    EmptySketch,

    /// A rank lookup was made against a store that holds no weight.
    #[snafu(display("No bucket with a positive weight exists in the store."))]
    NotFound,
}
