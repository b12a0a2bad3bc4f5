//! Per-player wealth and per-curve shape parameters.
//!
//! Wealth is drawn by inverse-transform sampling from the configured
//! distribution, with the uniform draw rescaled above a per-player floor so
//! that every player can afford a bit more than its reference VM.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::DatasetMeta;
use crate::distribution::WealthDist;
use crate::error::Result;
use crate::reference::ReferenceFleet;

/// Curve frequencies are drawn from `FREQ_MIN..FREQ_MAX`.
pub const FREQ_MIN: u32 = 3;
pub const FREQ_MAX: u32 = 8;

/// Wealth must cover this multiple of the reference core count.
pub const CORE_MARGIN: f64 = 1.1;

/// Keeps uniform draws away from the degenerate ends of the quantile function.
pub const EPS: f64 = f32::EPSILON as f64;

/// Raw per-seed samples (`dist_data`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Distributions {
    /// N×D control point counts.
    pub val_freq: Vec<Vec<u32>>,
    /// N×D interior local-maxima caps.
    pub val_local_maximum: Vec<Vec<u32>>,
    /// Reference fleet rows backing each player.
    pub azure_players: Vec<usize>,
    pub cores: Vec<f64>,
    pub wealth_uniform: Vec<f64>,
    pub wealth: Vec<f64>,
}

pub fn sample_frequencies<R: Rng>(rng: &mut R, n: usize, ndim: usize) -> Vec<Vec<u32>> {
    (0..n)
        .map(|_| {
            (0..ndim)
                .map(|_| rng.random_range(FREQ_MIN..FREQ_MAX))
                .collect()
        })
        .collect()
}

/// Each entry uniform in `[0, min(freq - 3, cap)]`, or all zeros without a cap.
pub fn sample_local_maxima<R: Rng>(rng: &mut R, freq: &[Vec<u32>], cap: Option<u32>) -> Vec<Vec<u32>> {
    freq.iter()
        .map(|fs| {
            fs.iter()
                .map(|&f| match cap {
                    Some(cap) => {
                        let hi = f.saturating_sub(FREQ_MIN).min(cap);
                        rng.random_range(0..=hi)
                    }
                    None => 0,
                })
                .collect()
        })
        .collect()
}

/// Lowest quantile a player with `cores` reference cores may draw.
pub fn wealth_floor(dist: &WealthDist, cores: f64) -> f64 {
    (dist.cdf(cores * CORE_MARGIN) + EPS).min(1.0 - EPS)
}

/// Uniform draws in `(EPS, 1 - EPS)` rescaled into `[floor_i, 1)`.
pub fn sample_wealth_uniform<R: Rng>(rng: &mut R, dist: &WealthDist, cores: &[f64]) -> Vec<f64> {
    cores
        .iter()
        .map(|&c| {
            let floor = wealth_floor(dist, c);
            let u = EPS + rng.random::<f64>() * (1.0 - 2.0 * EPS);
            u * (1.0 - floor) + floor
        })
        .collect()
}

/// Wealth is a pure function of the stored uniform sample.
pub fn wealth_from_uniform(dist: &WealthDist, uniform: &[f64]) -> Vec<f64> {
    uniform.iter().map(|&u| dist.ppf(u)).collect()
}

/// Draw every distribution a dataset needs, in a fixed RNG order.
pub fn generate_distributions<R: Rng>(
    rng: &mut R,
    meta: &DatasetMeta,
    fleet: &ReferenceFleet,
) -> Result<Distributions> {
    let val_freq = sample_frequencies(rng, meta.n, meta.ndim);
    let val_local_maximum = sample_local_maxima(rng, &val_freq, meta.valuation.local_maxima_cap());

    let (azure_players, cores) = fleet.sample_players(rng, meta.n)?;

    let dist = &meta.valuation.wealth_dist;
    let wealth_uniform = sample_wealth_uniform(rng, dist, &cores);
    let wealth = wealth_from_uniform(dist, &wealth_uniform);

    #[cfg(feature = "instrument")]
    {
        for (player, ((&c, &u), &w)) in cores.iter().zip(&wealth_uniform).zip(&wealth).enumerate() {
            tracing::info!(
                target: "wealth",
                player = player as u64,
                cores = c,
                floor = wealth_floor(dist, c),
                uniform = u,
                wealth = w,
            );
        }
    }

    Ok(Distributions {
        val_freq,
        val_local_maximum,
        azure_players,
        cores,
        wealth_uniform,
        wealth,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_frequencies_in_range() {
        let mut rng = StdRng::seed_from_u64(1);
        let freq = sample_frequencies(&mut rng, 50, 4);
        assert_eq!(freq.len(), 50);
        assert!(freq.iter().flatten().all(|f| (FREQ_MIN..FREQ_MAX).contains(f)));
    }

    #[test]
    fn test_local_maxima_bounded_by_freq_and_cap() {
        let mut rng = StdRng::seed_from_u64(2);
        let freq = sample_frequencies(&mut rng, 200, 3);

        let capped = sample_local_maxima(&mut rng, &freq, Some(2));
        for (fs, ls) in freq.iter().zip(&capped) {
            for (&f, &l) in fs.iter().zip(ls) {
                assert!(l <= (f - FREQ_MIN).min(2), "f={} l={}", f, l);
            }
        }
        // A cap of 2 over 600 curves should hit the cap at least once.
        assert!(capped.iter().flatten().any(|&l| l == 2));

        let uncapped = sample_local_maxima(&mut rng, &freq, None);
        assert!(uncapped.iter().flatten().all(|&l| l == 0));
    }

    #[test]
    fn test_wealth_above_floor() {
        let dist = WealthDist::default();
        let cores = vec![1.0, 2.0, 4.0, 8.0, 16.0, 32.0];
        let mut rng = StdRng::seed_from_u64(3);

        let uniform = sample_wealth_uniform(&mut rng, &dist, &cores);
        let wealth = wealth_from_uniform(&dist, &uniform);

        for ((&c, &u), &w) in cores.iter().zip(&uniform).zip(&wealth) {
            assert!(u > dist.cdf(c * CORE_MARGIN) && u < 1.0);
            assert!(w > c * CORE_MARGIN, "cores={} wealth={}", c, w);
        }
    }

    #[test]
    fn test_wealth_reproducible_from_uniform() {
        let dist = WealthDist::lomax(1.5, 0.0, 64.0).unwrap();
        let uniform = vec![0.2, 0.5, 0.999];
        assert_eq!(
            wealth_from_uniform(&dist, &uniform),
            wealth_from_uniform(&dist, &uniform)
        );
    }
}
