//! A mergeable quantile sketch with relative-error guarantees, backed by paged bucket storage.
//!
//! Values are mapped to logarithmically-sized buckets, so any quantile answered by the sketch is within a fixed
//! relative error of the true value. Bucket weights live in a [`PagedStore`], which buffers single hits and only
//! materializes dense pages of weights when doing so is cheaper than keeping the hits around individually. This keeps
//! long-tailed, sparse distributions small in memory.
//!
//! Sketches built independently, such as one per thread or shard, can be merged into a single sketch that
//! answers queries as if it had seen every value directly.
//!
//! # Quick Start
//!
//! ```
//! use paged_ddsketch::DDSketch;
//!
//! // Create a sketch with 1% relative accuracy.
//! let mut sketch = DDSketch::with_relative_accuracy(0.01).unwrap();
//!
//! sketch.record(1.5, 1.0).unwrap();
//! sketch.record(2.5, 3.0).unwrap();
//! sketch.add(-3.5).unwrap();
//!
//! let p50 = sketch.quantile_value(0.5).unwrap();
//! assert!((p50 - 2.5).abs() <= 2.5 * 0.01);
//! ```
#![deny(warnings)]
#![deny(missing_docs)]

mod error;
pub use self::error::SketchError;

pub mod mapping;
pub use self::mapping::{IndexMapping, LogarithmicMapping};

pub mod store;
pub use self::store::{PagedStore, Store};

mod sketch;
pub use self::sketch::DDSketch;
