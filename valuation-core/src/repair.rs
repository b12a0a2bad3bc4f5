//! Shape repair for sampled curves.
//!
//! Cubic interpolation through a monotone (or concave) polygon can overshoot
//! between knots, so samples are repaired after evaluation.

/// Which repair a sampled slice gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repair {
    None,
    /// Non-decreasing.
    Rising,
    /// Non-decreasing with non-increasing first differences.
    ConcaveRising,
}

impl Repair {
    pub fn apply(self, values: &mut [f64]) {
        match self {
            Repair::None => {}
            Repair::Rising => fix_rising(values),
            Repair::ConcaveRising => fix_concave_rising(values),
        }
    }
}

/// Lift every value to the running maximum.
pub fn fix_rising(values: &mut [f64]) {
    let mut high = f64::NEG_INFINITY;
    for v in values.iter_mut() {
        high = high.max(*v);
        *v = high;
    }
}

/// Replace values with their least concave majorant, flattened after its peak.
pub fn fix_concave_rising(values: &mut [f64]) {
    let n = values.len();
    if n < 3 {
        fix_rising(values);
        return;
    }

    // Upper hull over (index, value); drop the middle point of any non-concave turn.
    let mut hull: Vec<usize> = Vec::with_capacity(n);
    for c in 0..n {
        while hull.len() >= 2 {
            let a = hull[hull.len() - 2];
            let b = hull[hull.len() - 1];
            let lhs = (values[b] - values[a]) * (c - b) as f64;
            let rhs = (values[c] - values[b]) * (b - a) as f64;
            if lhs <= rhs {
                hull.pop();
            } else {
                break;
            }
        }
        hull.push(c);
    }

    for w in hull.windows(2) {
        let (a, b) = (w[0], w[1]);
        let (va, vb) = (values[a], values[b]);
        let slope = (vb - va) / (b - a) as f64;
        for k in a + 1..b {
            values[k] = va + slope * (k - a) as f64;
        }
    }

    let peak = hull
        .iter()
        .copied()
        .max_by(|&i, &j| values[i].total_cmp(&values[j]).then(j.cmp(&i)))
        .unwrap_or(0);
    let top = values[peak];
    values[peak..].iter_mut().for_each(|v| *v = top);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diffs(v: &[f64]) -> Vec<f64> {
        v.windows(2).map(|w| w[1] - w[0]).collect()
    }

    #[test]
    fn test_fix_rising_removes_descents() {
        let mut v = vec![0.0, 0.5, 0.4, 0.6, 0.1, 0.9];
        fix_rising(&mut v);
        assert_eq!(v, vec![0.0, 0.5, 0.5, 0.6, 0.6, 0.9]);
    }

    #[test]
    fn test_fix_concave_rising_on_convex_input() {
        let mut v = vec![0.0, 0.1, 0.4, 0.9, 1.6];
        fix_concave_rising(&mut v);
        // Majorant of a convex sequence is the chord between its ends.
        for (k, x) in v.iter().enumerate() {
            assert!((x - 0.4 * k as f64).abs() < 1e-12, "v = {:?}", v);
        }
    }

    #[test]
    fn test_fix_concave_rising_flattens_after_peak() {
        let mut v = vec![0.0, 0.6, 1.0, 0.7, 0.8, 0.2];
        fix_concave_rising(&mut v);
        assert_eq!(v[0], 0.0);
        assert!((v[1] - 0.6).abs() < 1e-12);
        assert_eq!(&v[2..], &[1.0, 1.0, 1.0, 1.0]);

        let d = diffs(&v);
        assert!(d.iter().all(|&x| x >= 0.0));
        assert!(d.windows(2).all(|w| w[1] <= w[0] + 1e-12));
    }

    #[test]
    fn test_concave_input_unchanged() {
        let orig = vec![0.0, 0.5, 0.8, 0.95, 1.0];
        let mut v = orig.clone();
        fix_concave_rising(&mut v);
        assert_eq!(v, orig);
    }

    #[test]
    fn test_none_leaves_values() {
        let mut v = vec![1.0, 0.0, 2.0];
        Repair::None.apply(&mut v);
        assert_eq!(v, vec![1.0, 0.0, 2.0]);
    }
}
