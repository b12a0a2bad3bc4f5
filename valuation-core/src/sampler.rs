//! Evaluating refined curves on experiment grids.

use std::ops::Range;

use ndarray::Array1;

use crate::curve::Curve;
use crate::error::{Result, ValuationError};
use crate::repair::Repair;
use crate::spline::CubicSpline;

/// Requested grid: `ndim` copies of one size, or one size per dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridShape {
    Uniform(usize),
    Explicit(Vec<usize>),
}

impl From<usize> for GridShape {
    fn from(size: usize) -> Self {
        GridShape::Uniform(size)
    }
}

impl From<Vec<usize>> for GridShape {
    fn from(sizes: Vec<usize>) -> Self {
        GridShape::Explicit(sizes)
    }
}

impl From<&[usize]> for GridShape {
    fn from(sizes: &[usize]) -> Self {
        GridShape::Explicit(sizes.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for GridShape {
    fn from(sizes: [usize; N]) -> Self {
        GridShape::Explicit(sizes.to_vec())
    }
}

impl GridShape {
    /// Per-dimension sizes for an `ndim`-dimensional request against a
    /// dataset with `max_ndim` valuation dimensions.
    pub fn resolve(&self, ndim: usize, max_ndim: usize) -> Result<Vec<usize>> {
        if ndim == 0 {
            return Err(ValuationError::DimensionMismatch(
                "at least one dimension must be requested".to_string(),
            ));
        }
        if ndim > max_ndim {
            return Err(ValuationError::DimensionMismatch(format!(
                "requested {ndim} dimensions but the dataset has {max_ndim}"
            )));
        }

        let shape = match self {
            GridShape::Uniform(size) => vec![*size; ndim],
            GridShape::Explicit(sizes) => {
                if sizes.len() != ndim {
                    return Err(ValuationError::DimensionMismatch(format!(
                        "shape {sizes:?} has {} dimensions, expected {ndim}",
                        sizes.len()
                    )));
                }
                sizes.clone()
            }
        };

        if shape.contains(&0) {
            return Err(ValuationError::DimensionMismatch(format!(
                "shape {shape:?} has an empty axis"
            )));
        }
        Ok(shape)
    }
}

/// `size` evenly spaced points over `[0, 1]`, both ends included.
pub fn linspace(size: usize) -> Vec<f64> {
    match size {
        0 => Vec::new(),
        1 => vec![0.0],
        _ => {
            let last = (size - 1) as f64;
            (0..size).map(|i| i as f64 / last).collect()
        }
    }
}

/// Curve parameter values per axis.
pub fn unit_axes(shape: &[usize]) -> Vec<Vec<f64>> {
    shape.iter().map(|&s| linspace(s)).collect()
}

/// Allocation indices per axis.
pub fn index_axes(shape: &[usize]) -> Vec<Range<usize>> {
    shape.iter().map(|&s| 0..s).collect()
}

/// Balanced shape with roughly `total` grid points: `ndim - 1` equal axes of
/// `floor(total^(1/ndim))` and a last axis absorbing the remainder.
pub fn shape_for_gridpoints(total: usize, ndim: usize) -> Vec<usize> {
    if ndim == 0 {
        return Vec::new();
    }
    let mut side = (total as f64).powf(1.0 / ndim as f64) as usize;
    // Guard against powf landing just below an exact root.
    if (side + 1).checked_pow(ndim as u32).is_some_and(|p| p <= total) {
        side += 1;
    }
    let side = side.max(1);

    let mut shape = vec![side; ndim - 1];
    let rest: usize = shape.iter().product();
    shape.push((total as f64 / rest as f64).round() as usize);
    shape
}

/// Splines for every (player, dimension).
pub fn build_splines(curves: &[Vec<Curve>]) -> Result<Vec<Vec<CubicSpline>>> {
    curves
        .iter()
        .map(|cs| cs.iter().map(CubicSpline::from_curve).collect())
        .collect()
}

/// One repaired, unscaled 1-D slice per requested dimension of one player.
pub fn sample_player(splines: &[CubicSpline], shape: &[usize], repair: Repair) -> Vec<Array1<f64>> {
    splines
        .iter()
        .zip(unit_axes(shape))
        .map(|(spline, axis)| {
            let mut values = spline.sample(&axis);
            repair.apply(&mut values);
            Array1::from(values)
        })
        .collect()
}

/// Multiply every slice of every player by `factor[player]`.
pub fn scale_slices(slices: &mut [Vec<Array1<f64>>], factor: impl Fn(usize) -> f64) {
    for (i, player) in slices.iter_mut().enumerate() {
        let f = factor(i);
        for slice in player.iter_mut() {
            slice.mapv_inplace(|v| v * f);
        }
    }
}
