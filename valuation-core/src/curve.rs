//! Sparse valuation control points and their corner-cutting refinement.
//!
//! Every curve starts at `(0, 0)`, ends at `x = 1`, and is normalised so its
//! highest point is `y = 1`. Wealth scaling happens later, at sampling time.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::ValuationConfig;
use crate::wealth::Distributions;

/// Number of Chaikin passes applied to every sparse curve.
pub const REFINE_DEPTH: usize = 5;

/// Interior control points are jittered by at most this fraction of a grid cell.
const X_JITTER: f64 = 0.4;

/// A polyline stored as parallel coordinate vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Curve {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl Curve {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Number of strict interior local maxima of `y`.
    pub fn local_maxima(&self) -> usize {
        self.y
            .windows(3)
            .filter(|w| w[0] < w[1] && w[1] > w[2])
            .count()
    }

    /// Chord slopes between consecutive points.
    pub fn slopes(&self) -> Vec<f64> {
        self.x
            .windows(2)
            .zip(self.y.windows(2))
            .map(|(x, y)| (y[1] - y[0]) / (x[1] - x[0]))
            .collect()
    }
}

/// How a sparse curve is shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveMode {
    /// Rising with non-increasing chord slopes.
    Concave,
    /// Free-form with at most this many interior local maxima (0 = strictly rising).
    Free { local_maxima: u32 },
}

/// Build `freq` sparse control points on `[0, 1] × [0, 1]`.
pub fn init_control_points<R: Rng>(rng: &mut R, freq: usize, mode: CurveMode) -> Curve {
    let freq = freq.max(2);
    let x = control_x(rng, freq);
    let mut y = match mode {
        CurveMode::Concave => concave_y(rng, &x),
        CurveMode::Free { local_maxima } => free_y(rng, freq, local_maxima as usize),
    };

    let top = y.iter().copied().fold(0.0, f64::max);
    if top > 0.0 {
        y.iter_mut().for_each(|v| *v /= top);
    }
    Curve { x, y }
}

/// `0`, stratified interior points, `1`.
fn control_x<R: Rng>(rng: &mut R, freq: usize) -> Vec<f64> {
    let step = 1.0 / (freq - 1) as f64;
    let mut x = Vec::with_capacity(freq);
    x.push(0.0);
    for k in 1..freq - 1 {
        let jitter = X_JITTER * (2.0 * rng.random::<f64>() - 1.0);
        x.push(step * (k as f64 + jitter));
    }
    x.push(1.0);
    x
}

/// Integrate sorted-descending positive slopes over the given x grid.
fn concave_y<R: Rng>(rng: &mut R, x: &[f64]) -> Vec<f64> {
    let mut slopes: Vec<f64> = (1..x.len())
        .map(|_| 0.05 + 0.95 * rng.random::<f64>())
        .collect();
    slopes.sort_by(|a, b| b.total_cmp(a));

    let mut y = Vec::with_capacity(x.len());
    y.push(0.0);
    for (k, s) in slopes.iter().enumerate() {
        y.push(y[k] + s * (x[k + 1] - x[k]));
    }
    y
}

/// Rising walk where up to `limit` steps (never the first) are descents.
/// Each maximal run of descents creates exactly one interior local maximum.
fn free_y<R: Rng>(rng: &mut R, freq: usize, limit: usize) -> Vec<f64> {
    let steps = freq - 1;
    let mut descending = vec![false; steps];
    let candidates = steps.saturating_sub(1);
    let count = limit.min(candidates);
    if count > 0 {
        for i in rand::seq::index::sample(rng, candidates, count) {
            descending[i + 1] = true;
        }
    }

    let mut y = Vec::with_capacity(freq);
    y.push(0.0);
    for &down in &descending {
        let prev = y[y.len() - 1];
        let u = rng.random::<f64>();
        let next = if down {
            prev * (0.2 + 0.6 * u)
        } else {
            prev + 0.1 + 0.9 * u
        };
        y.push(next);
    }
    y
}

/// Chaikin corner cutting: each edge becomes its 1/4 and 3/4 points, ends kept.
pub fn refine_chaikin(curve: &Curve, depth: usize) -> Curve {
    let mut pts: Vec<(f64, f64)> = curve.x.iter().copied().zip(curve.y.iter().copied()).collect();
    if pts.len() < 2 {
        return curve.clone();
    }

    for _ in 0..depth {
        let mut next = Vec::with_capacity(2 * pts.len());
        next.push(pts[0]);
        for w in pts.windows(2) {
            let (a, b) = (w[0], w[1]);
            next.push(lerp(a, b, 0.25));
            next.push(lerp(a, b, 0.75));
        }
        next.push(pts[pts.len() - 1]);
        pts = next;
    }

    let (x, y) = pts.into_iter().unzip();
    Curve { x, y }
}

fn lerp(a: (f64, f64), b: (f64, f64), t: f64) -> (f64, f64) {
    (a.0 + (b.0 - a.0) * t, a.1 + (b.1 - a.1) * t)
}

/// Sparse control points for every (player, dimension).
pub fn init_valuations<R: Rng>(
    rng: &mut R,
    dist: &Distributions,
    valuation: &ValuationConfig,
) -> Vec<Vec<Curve>> {
    dist.val_freq
        .iter()
        .zip(&dist.val_local_maximum)
        .enumerate()
        .map(|(_player, (fs, ls))| {
            fs.iter()
                .zip(ls)
                .enumerate()
                .map(|(_dim, (&f, &l))| {
                    let mode = if valuation.concave {
                        CurveMode::Concave
                    } else {
                        CurveMode::Free { local_maxima: l }
                    };
                    let curve = init_control_points(rng, f as usize, mode);

                    #[cfg(feature = "instrument")]
                    tracing::info!(
                        target: "curve",
                        player = _player as u64,
                        dim = _dim as u64,
                        freq = f as u64,
                        local_maxima_cap = l as u64,
                        local_maxima = curve.local_maxima() as u64,
                    );

                    curve
                })
                .collect()
        })
        .collect()
}

/// Dense refined curves (`val-xy`) from sparse control points.
pub fn refine_valuations(init: &[Vec<Curve>]) -> Vec<Vec<Curve>> {
    init.iter()
        .map(|cs| cs.iter().map(|c| refine_chaikin(c, REFINE_DEPTH)).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn strictly_increasing(v: &[f64]) -> bool {
        v.windows(2).all(|w| w[0] < w[1])
    }

    #[test]
    fn test_control_points_span_unit_square() {
        let mut rng = StdRng::seed_from_u64(11);
        for freq in 3..8 {
            for mode in [CurveMode::Concave, CurveMode::Free { local_maxima: 2 }] {
                let c = init_control_points(&mut rng, freq, mode);
                assert_eq!(c.len(), freq);
                assert_eq!(c.x[0], 0.0);
                assert_eq!(c.x[freq - 1], 1.0);
                assert!(strictly_increasing(&c.x), "x = {:?}", c.x);
                assert_eq!(c.y[0], 0.0);
                let top = c.y.iter().copied().fold(f64::MIN, f64::max);
                assert!((top - 1.0).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_concave_mode_slopes_non_increasing() {
        let mut rng = StdRng::seed_from_u64(12);
        for _ in 0..100 {
            let c = init_control_points(&mut rng, 7, CurveMode::Concave);
            let s = c.slopes();
            assert!(s.iter().all(|&v| v > 0.0));
            assert!(s.windows(2).all(|w| w[1] <= w[0] + 1e-12), "slopes = {:?}", s);
        }
    }

    #[test]
    fn test_free_mode_respects_local_maxima_cap() {
        let mut rng = StdRng::seed_from_u64(13);
        for limit in 0..4u32 {
            for _ in 0..100 {
                let c = init_control_points(&mut rng, 7, CurveMode::Free { local_maxima: limit });
                assert!(c.local_maxima() <= limit as usize);
                if limit == 0 {
                    assert!(strictly_increasing(&c.y));
                }
            }
        }
    }

    #[test]
    fn test_chaikin_single_pass() {
        let c = Curve {
            x: vec![0.0, 1.0],
            y: vec![0.0, 1.0],
        };
        let r = refine_chaikin(&c, 1);
        assert_eq!(r.x, vec![0.0, 0.25, 0.75, 1.0]);
        assert_eq!(r.y, vec![0.0, 0.25, 0.75, 1.0]);
    }

    #[test]
    fn test_chaikin_preserves_shape() {
        let mut rng = StdRng::seed_from_u64(14);
        let sparse = init_control_points(&mut rng, 6, CurveMode::Concave);
        let dense = refine_chaikin(&sparse, REFINE_DEPTH);

        assert_eq!(dense.len(), sparse.len() << REFINE_DEPTH);
        assert_eq!(dense.x[0], 0.0);
        assert_eq!(*dense.x.last().unwrap(), 1.0);
        assert!(strictly_increasing(&dense.x));
        assert!(dense.y.windows(2).all(|w| w[1] >= w[0]));
        let s = dense.slopes();
        assert!(s.windows(2).all(|w| w[1] <= w[0] + 1e-9));

        // Deterministic
        assert_eq!(dense, refine_chaikin(&sparse, REFINE_DEPTH));
    }

    #[test]
    fn test_chaikin_does_not_add_local_maxima() {
        let c = Curve {
            x: vec![0.0, 0.3, 0.5, 0.8, 1.0],
            y: vec![0.0, 1.0, 0.4, 0.9, 0.2],
        };
        assert_eq!(refine_chaikin(&c, REFINE_DEPTH).local_maxima(), 2);
    }
}
