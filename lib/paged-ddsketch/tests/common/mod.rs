use dhat::HeapStats;
use rand::SeedableRng;
use rand_distr::{Distribution, Pareto};

pub fn make_points(size: usize, seed: u64) -> Vec<f64> {
    // Latency-like samples, in microseconds: a big hump at the beginning with a long tail, bottoming out at 15
    // milliseconds and tailing off all the way up to 10 seconds.
    let distribution = Pareto::new(1.0, 1.0).expect("pareto distribution should be valid");

    let mut rng = rand::rngs::SmallRng::seed_from_u64(seed);
    distribution
        .sample_iter(&mut rng)
        .map(|n| n * 10_000.0)
        .filter(|n| *n > 15_000.0 && *n < 10_000_000.0)
        .take(size)
        .collect::<Vec<_>>()
}

#[non_exhaustive]
pub struct HeapDelta {
    pub total_blocks: u64,
    pub total_bytes: u64,
}

impl HeapDelta {
    pub fn between(before: &HeapStats, after: &HeapStats) -> Self {
        Self {
            total_blocks: after.total_blocks - before.total_blocks,
            total_bytes: after.total_bytes - before.total_bytes,
        }
    }
}
