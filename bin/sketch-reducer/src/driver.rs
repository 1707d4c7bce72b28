use std::{thread, time::Instant};

use anyhow::{anyhow, Context as _, Error};
use paged_ddsketch::{DDSketch, SketchError};
use rand::{rngs::SmallRng, SeedableRng as _};
use rand_distr::{Distribution as _, Normal};
use tracing::{debug, info};

use crate::config::Config;

/// Reduction driver.
///
/// Builds one sketch per shard concurrently, merges them all into a single sketch, and reports the configured quantiles.
pub struct Driver {
    config: Config,
    sampler: Normal<f64>,
}

impl Driver {
    /// Creates a new `Driver` based on the given configuration.
    ///
    /// # Errors
    ///
    /// If the configured distribution or relative accuracy is invalid, an error is returned.
    pub fn new(config: Config) -> Result<Self, Error> {
        let sampler = config.distribution.sampler()?;

        // Catch a bad accuracy before spawning anything.
        DDSketch::with_relative_accuracy(config.relative_accuracy).context("Invalid relative accuracy.")?;

        Ok(Self { config, sampler })
    }

    /// Runs the driver, returning the value at each configured quantile of the merged sketch.
    ///
    /// # Errors
    ///
    /// If any sketch fails to record a value, or the sketches cannot be merged, an error is returned.
    pub fn reduce(&self) -> Result<Vec<f64>, Error> {
        let shards = self.config.sketches.get();

        let start = Instant::now();
        let sketches = thread::scope(|s| {
            let handles = (0..shards)
                .map(|shard| s.spawn(move || self.build_shard(shard)))
                .collect::<Vec<_>>();

            handles
                .into_iter()
                .enumerate()
                .map(|(shard, handle)| {
                    handle
                        .join()
                        .map_err(|_| anyhow!("Shard {} panicked while recording values.", shard))?
                        .with_context(|| format!("Failed to build sketch for shard {}.", shard))
                })
                .collect::<Result<Vec<_>, Error>>()
        })?;
        let build_duration = start.elapsed();

        let start = Instant::now();
        let mut merged = DDSketch::merge_all(sketches).context("Failed to merge sketches.")?;
        let merge_duration = start.elapsed();

        info!(
            "Built {} sketches in {:?} and merged them in {:?} ({} total weight).",
            shards,
            build_duration,
            merge_duration,
            merged.count()
        );

        merged
            .quantile_values(&self.config.quantiles)
            .context("Failed to compute quantiles of merged sketch.")
    }

    /// Runs the driver, logging the value at each configured quantile of the merged sketch.
    ///
    /// # Errors
    ///
    /// If reduction fails, an error is returned.
    pub fn run(self) -> Result<(), Error> {
        let values = self.reduce()?;
        for (quantile, value) in self.config.quantiles.iter().zip(values) {
            info!(quantile, value, "Quantile computed.");
        }

        Ok(())
    }

    fn build_shard(&self, shard: usize) -> Result<DDSketch, SketchError> {
        let mut rng = SmallRng::seed_from_u64(self.config.seed.wrapping_add(shard as u64));
        let mut sketch = DDSketch::with_relative_accuracy(self.config.relative_accuracy)?;

        for _ in 0..self.config.values_per_sketch {
            let value = self.sampler.sample(&mut rng);
            sketch.record(value, self.config.count_per_value)?;
        }

        debug!(shard, count = sketch.count(), "Shard sketch built.");
        Ok(sketch)
    }
}
