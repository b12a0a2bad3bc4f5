//! Wealth distribution families.
//!
//! Parameters follow the scipy convention used by the experiment configs:
//! zero or one shape parameter, then `loc` and `scale`. Every family maps
//! `x` to the standard variable `z = (x - loc) / scale` and back.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Exp, Gamma, LogNormal, Pareto};

use crate::error::{Result, ValuationError};

/// Closed set of supported families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Lomax,
    Pareto,
    Exponential,
    LogNormal,
    Gamma,
}

/// Name → family mapping, including aliases. Lookup is case-insensitive.
const FAMILIES: &[(&str, Family)] = &[
    ("lomax", Family::Lomax),
    ("pareto2", Family::Lomax),
    ("pareto", Family::Pareto),
    ("expon", Family::Exponential),
    ("exponential", Family::Exponential),
    ("lognorm", Family::LogNormal),
    ("lognormal", Family::LogNormal),
    ("gamma", Family::Gamma),
];

impl Family {
    pub fn from_name(name: &str) -> Result<Self> {
        let lower = name.to_ascii_lowercase();
        FAMILIES
            .iter()
            .find(|(n, _)| *n == lower)
            .map(|(_, f)| *f)
            .ok_or_else(|| ValuationError::UnknownDistribution(name.to_string()))
    }

    /// Canonical (scipy) name.
    pub fn name(self) -> &'static str {
        match self {
            Family::Lomax => "lomax",
            Family::Pareto => "pareto",
            Family::Exponential => "expon",
            Family::LogNormal => "lognorm",
            Family::Gamma => "gamma",
        }
    }

    /// Number of shape parameters before `loc`/`scale`.
    pub fn shape_params(self) -> usize {
        match self {
            Family::Exponential => 0,
            _ => 1,
        }
    }
}

/// Serialized form: `{"family": "lomax", "params": [1.16], "loc": 0, "scale": 128}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistSpec {
    pub family: String,
    #[serde(default)]
    pub params: Vec<f64>,
    #[serde(default)]
    pub loc: f64,
    #[serde(default = "unit_scale")]
    pub scale: f64,
}

fn unit_scale() -> f64 {
    1.0
}

/// A validated wealth distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DistSpec", into = "DistSpec")]
pub struct WealthDist {
    family: Family,
    shape: f64,
    loc: f64,
    scale: f64,
}

impl WealthDist {
    pub fn lomax(c: f64, loc: f64, scale: f64) -> Result<Self> {
        Self::new(Family::Lomax, &[c], loc, scale)
    }

    pub fn pareto(b: f64, loc: f64, scale: f64) -> Result<Self> {
        Self::new(Family::Pareto, &[b], loc, scale)
    }

    pub fn exponential(loc: f64, scale: f64) -> Result<Self> {
        Self::new(Family::Exponential, &[], loc, scale)
    }

    pub fn lognormal(s: f64, loc: f64, scale: f64) -> Result<Self> {
        Self::new(Family::LogNormal, &[s], loc, scale)
    }

    pub fn gamma(a: f64, loc: f64, scale: f64) -> Result<Self> {
        Self::new(Family::Gamma, &[a], loc, scale)
    }

    pub fn new(family: Family, params: &[f64], loc: f64, scale: f64) -> Result<Self> {
        let invalid = |reason: String| ValuationError::InvalidDistribution {
            family: family.name().to_string(),
            reason,
        };

        if params.len() != family.shape_params() {
            return Err(invalid(format!(
                "expected {} shape parameter(s), got {}",
                family.shape_params(),
                params.len()
            )));
        }
        if !loc.is_finite() {
            return Err(invalid(format!("loc must be finite, got {loc}")));
        }
        if !(scale.is_finite() && scale > 0.0) {
            return Err(invalid(format!("scale must be positive, got {scale}")));
        }
        let shape = params.first().copied().unwrap_or(1.0);
        if !(shape.is_finite() && shape > 0.0) {
            return Err(invalid(format!("shape must be positive, got {shape}")));
        }

        let dist = Self {
            family,
            shape,
            loc,
            scale,
        };
        // Let statrs reject anything it would refuse later.
        dist.standard().map_err(invalid)?;
        Ok(dist)
    }

    pub fn family(&self) -> Family {
        self.family
    }

    /// Cumulative distribution function.
    pub fn cdf(&self, x: f64) -> f64 {
        let z = (x - self.loc) / self.scale;
        match self.standard() {
            Ok(Standard::Lomax(c)) => {
                if z <= 0.0 {
                    0.0
                } else {
                    -(-c * z.ln_1p()).exp_m1()
                }
            }
            Ok(Standard::Pareto(d)) => d.cdf(z),
            Ok(Standard::Exponential(d)) => d.cdf(z),
            Ok(Standard::LogNormal(d)) => d.cdf(z),
            Ok(Standard::Gamma(d)) => d.cdf(z),
            Err(_) => f64::NAN,
        }
    }

    /// Quantile function (inverse CDF). `NaN` outside `[0, 1]`.
    pub fn ppf(&self, q: f64) -> f64 {
        if !(0.0..=1.0).contains(&q) {
            return f64::NAN;
        }
        let z = match self.standard() {
            Ok(Standard::Lomax(c)) => ((-q).ln_1p() / -c).exp_m1(),
            Ok(Standard::Pareto(d)) => d.inverse_cdf(q),
            Ok(Standard::Exponential(d)) => d.inverse_cdf(q),
            Ok(Standard::LogNormal(d)) => d.inverse_cdf(q),
            Ok(Standard::Gamma(d)) => d.inverse_cdf(q),
            Err(_) => f64::NAN,
        };
        self.loc + self.scale * z
    }

    fn standard(&self) -> std::result::Result<Standard, String> {
        let s = self.shape;
        Ok(match self.family {
            Family::Lomax => Standard::Lomax(s),
            Family::Pareto => Standard::Pareto(Pareto::new(1.0, s).map_err(|e| e.to_string())?),
            Family::Exponential => Standard::Exponential(Exp::new(1.0).map_err(|e| e.to_string())?),
            Family::LogNormal => {
                Standard::LogNormal(LogNormal::new(0.0, s).map_err(|e| e.to_string())?)
            }
            Family::Gamma => Standard::Gamma(Gamma::new(s, 1.0).map_err(|e| e.to_string())?),
        })
    }
}

/// Standardized (`loc = 0`, `scale = 1`) form of a family.
enum Standard {
    Lomax(f64),
    Pareto(Pareto),
    Exponential(Exp),
    LogNormal(LogNormal),
    Gamma(Gamma),
}

impl Default for WealthDist {
    /// Lomax with `c = log_4(5)`, `loc = 0`, `scale = 128`: the wealth
    /// distribution used by the standard experiment datasets.
    fn default() -> Self {
        Self {
            family: Family::Lomax,
            shape: 5f64.log(4.0),
            loc: 0.0,
            scale: 128.0,
        }
    }
}

impl TryFrom<DistSpec> for WealthDist {
    type Error = ValuationError;

    fn try_from(spec: DistSpec) -> Result<Self> {
        let family = Family::from_name(&spec.family)?;
        Self::new(family, &spec.params, spec.loc, spec.scale)
    }
}

impl From<WealthDist> for DistSpec {
    fn from(dist: WealthDist) -> Self {
        let params = if dist.family.shape_params() == 0 {
            Vec::new()
        } else {
            vec![dist.shape]
        };
        DistSpec {
            family: dist.family.name().to_string(),
            params,
            loc: dist.loc,
            scale: dist.scale,
        }
    }
}
