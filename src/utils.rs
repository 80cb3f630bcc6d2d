// Small numeric helpers shared by the network, the agent and the metrics code.

use rand::SeedableRng;
use rand::rngs::StdRng;

/// Seeded RNG. Every stochastic component takes one of these so runs and
/// tests are reproducible.
pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Index of the largest element; ties go to the lowest index.
/// Returns 0 for an empty slice.
pub fn argmax(v: &[f32]) -> usize {
    let mut best_i = 0;
    for i in 1..v.len() {
        // strict `>` keeps the earliest maximum
        if v[i] > v[best_i] {
            best_i = i;
        }
    }
    best_i
}

/// Largest element, `NEG_INFINITY` for an empty slice.
pub fn max_value(v: &[f32]) -> f32 {
    v.iter().copied().fold(f32::NEG_INFINITY, f32::max)
}

pub fn has_non_finite(xs: &[f32]) -> bool {
    xs.iter().any(|&v| !v.is_finite())
}

/// min / max / mean of a slice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stats {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
}

pub fn vec_stats(xs: &[f32]) -> Stats {
    if xs.is_empty() {
        return Stats { min: 0.0, max: 0.0, mean: 0.0 };
    }
    let mut mn = xs[0];
    let mut mx = xs[0];
    let mut sum = 0.0f32;
    for &v in xs {
        if v < mn { mn = v; }
        if v > mx { mx = v; }
        sum += v;
    }
    Stats { min: mn, max: mx, mean: sum / (xs.len() as f32) }
}
