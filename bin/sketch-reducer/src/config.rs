use std::{num::NonZeroUsize, path::Path};

use anyhow::{ensure, Context as _, Error};
use rand_distr::Normal;
use serde::Deserialize;

/// Distribution that sample values are drawn from.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Distribution {
    /// Normal (Gaussian) distribution.
    Normal {
        /// Mean of the distribution.
        mean: f64,

        /// Standard deviation of the distribution.
        std_dev: f64,
    },
}

impl Distribution {
    /// Builds a sampler for this distribution.
    ///
    /// # Errors
    ///
    /// If the distribution parameters are invalid, an error is returned.
    pub fn sampler(&self) -> Result<Normal<f64>, Error> {
        match self {
            Self::Normal { mean, std_dev } => {
                ensure!(
                    std_dev.is_finite() && *std_dev >= 0.0,
                    "Invalid normal distribution (mean={}, std_dev={}): std_dev must be a finite, non-negative number.",
                    mean,
                    std_dev
                );
                Normal::new(*mean, *std_dev)
                    .with_context(|| format!("Invalid normal distribution (mean={}, std_dev={}).", mean, std_dev))
            }
        }
    }
}

impl Default for Distribution {
    fn default() -> Self {
        Self::Normal {
            mean: 0.0,
            std_dev: 1.0,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Relative accuracy of every sketch.
    pub relative_accuracy: f64,

    /// Number of sketches to build, each on its own thread.
    pub sketches: NonZeroUsize,

    /// Number of values sampled into each sketch.
    pub values_per_sketch: usize,

    /// Count that every sampled value is recorded with.
    pub count_per_value: f64,

    /// Quantiles to report from the merged sketch.
    pub quantiles: Vec<f64>,

    /// A fixed source of entropy for the random number generators used to sample values.
    ///
    /// Each sketch derives its own generator from this seed, so the same configuration always produces the same
    /// report.
    pub seed: u64,

    /// Distribution to sample values from.
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    pub distribution: Distribution,
}

impl Config {
    /// Attempts to load a serialized `Config` from the given file path.
    ///
    /// # Errors
    ///
    /// If an error occurs while reading the file, deserializing the configuration data, or the configuration is not
    /// valid, it will be returned.
    pub fn try_from_file<P>(config_path: P) -> Result<Self, Error>
    where
        P: AsRef<Path>,
    {
        let config_path = config_path.as_ref();
        let config_file_raw = std::fs::read_to_string(config_path).context("Failed to read configuration file.")?;
        Self::try_from_yaml(&config_file_raw)
    }

    fn try_from_yaml(raw: &str) -> Result<Self, Error> {
        let config: Self = serde_yaml::from_str(raw).context("Failed to parse configuration file.")?;
        config.validate()?;

        Ok(config)
    }

    /// Validates the settings that the sketches themselves would otherwise only reject part-way through a run.
    fn validate(&self) -> Result<(), Error> {
        ensure!(
            self.count_per_value.is_finite() && self.count_per_value >= 0.0,
            "count_per_value must be a finite, non-negative number (got {}).",
            self.count_per_value
        );
        ensure!(!self.quantiles.is_empty(), "At least one quantile must be configured.");
        for quantile in &self.quantiles {
            ensure!(
                (0.0..=1.0).contains(quantile),
                "Quantile {} is not between 0 and 1 (inclusive).",
                quantile
            );
        }
        self.distribution.sampler()?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            relative_accuracy: 0.001,
            sketches: NonZeroUsize::new(100).unwrap_or(NonZeroUsize::MIN),
            values_per_sketch: 1000,
            count_per_value: 10.0,
            quantiles: vec![0.5, 0.9, 0.95, 0.99],
            seed: 0xDEADBEEF,
            distribution: Distribution::default(),
        }
    }
}
