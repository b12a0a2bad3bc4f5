//! Natural cubic interpolation through refined curve points.
//!
//! Each (player, dimension) curve gets one spline, built once and evaluated
//! on whatever grid an experiment asks for.

use crate::curve::Curve;
use crate::error::{Result, ValuationError};

/// Natural cubic spline (zero second derivative at both ends).
///
/// Stores the knots and the second derivative at each knot; evaluation
/// outside the knot range extrapolates the first/last polynomial piece.
#[derive(Debug, Clone, PartialEq)]
pub struct CubicSpline {
    x: Vec<f64>,
    y: Vec<f64>,
    m: Vec<f64>,
}

impl CubicSpline {
    pub fn natural(x: &[f64], y: &[f64]) -> Result<Self> {
        if x.len() != y.len() {
            return Err(ValuationError::InvalidCurve(format!(
                "{} x values but {} y values",
                x.len(),
                y.len()
            )));
        }
        if x.len() < 2 {
            return Err(ValuationError::InvalidCurve(
                "a spline needs at least two knots".to_string(),
            ));
        }
        if let Some(w) = x.windows(2).find(|w| !(w[0] < w[1])) {
            return Err(ValuationError::InvalidCurve(format!(
                "knots must be strictly increasing, found {} then {}",
                w[0], w[1]
            )));
        }

        let m = second_derivatives(x, y);
        Ok(Self {
            x: x.to_vec(),
            y: y.to_vec(),
            m,
        })
    }

    pub fn from_curve(curve: &Curve) -> Result<Self> {
        Self::natural(&curve.x, &curve.y)
    }

    pub fn eval(&self, t: f64) -> f64 {
        let last = self.x.len() - 2;
        let i = self.x.partition_point(|&k| k <= t).saturating_sub(1).min(last);

        let h = self.x[i + 1] - self.x[i];
        let a = self.x[i + 1] - t;
        let b = t - self.x[i];
        let (m0, m1) = (self.m[i], self.m[i + 1]);

        (m0 * a * a * a + m1 * b * b * b) / (6.0 * h)
            + (self.y[i] / h - m0 * h / 6.0) * a
            + (self.y[i + 1] / h - m1 * h / 6.0) * b
    }

    pub fn sample(&self, ts: &[f64]) -> Vec<f64> {
        ts.iter().map(|&t| self.eval(t)).collect()
    }
}

/// Solve the tridiagonal system for knot second derivatives (Thomas algorithm).
fn second_derivatives(x: &[f64], y: &[f64]) -> Vec<f64> {
    let n = x.len();
    let mut m = vec![0.0; n];
    if n < 3 {
        return m;
    }

    let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();

    // Interior rows i = 1..n-1: h[i-1] m[i-1] + 2(h[i-1] + h[i]) m[i] + h[i] m[i+1] = rhs[i]
    let mut c_prime = vec![0.0; n];
    let mut d_prime = vec![0.0; n];
    for i in 1..n - 1 {
        let lower = h[i - 1];
        let diag = 2.0 * (h[i - 1] + h[i]);
        let upper = h[i];
        let rhs = 6.0 * ((y[i + 1] - y[i]) / h[i] - (y[i] - y[i - 1]) / h[i - 1]);

        let denom = diag - lower * c_prime[i - 1];
        c_prime[i] = upper / denom;
        d_prime[i] = (rhs - lower * d_prime[i - 1]) / denom;
    }

    for i in (1..n - 1).rev() {
        m[i] = d_prime[i] - c_prime[i] * m[i + 1];
    }
    m
}
