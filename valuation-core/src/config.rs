//! Dataset configuration and the standard experiment presets.

use serde::{Deserialize, Serialize};

use crate::distribution::WealthDist;
use crate::error::{Result, ValuationError};
use crate::repair::Repair;

/// Valuation generation options (`meta.valuation`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ValuationConfig {
    pub wealth_dist: WealthDist,
    /// Generate concave curves and repair samples to concave-and-rising.
    #[serde(default)]
    pub concave: bool,
    /// Cap on interior local maxima per curve. Unset or non-positive means rising only.
    #[serde(default)]
    pub local_maximum_limit: Option<i32>,
}

impl Default for ValuationConfig {
    fn default() -> Self {
        Self {
            wealth_dist: WealthDist::default(),
            concave: false,
            local_maximum_limit: None,
        }
    }
}

impl ValuationConfig {
    pub fn is_rising(&self) -> bool {
        self.local_maximum_limit.is_none_or(|l| l <= 0)
    }

    /// Positive local-maximum limit, if any.
    pub fn local_maxima_cap(&self) -> Option<u32> {
        self.local_maximum_limit
            .filter(|&l| l > 0)
            .map(|l| l as u32)
    }

    /// Post-sampling repair pass implied by this config.
    pub fn repair(&self) -> Repair {
        if self.concave {
            Repair::ConcaveRising
        } else if self.is_rising() {
            Repair::Rising
        } else {
            Repair::None
        }
    }
}

/// Dataset metadata (`meta`). `generate_time` is the idempotency marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DatasetMeta {
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Number of players.
    pub n: usize,
    /// Number of resource dimensions.
    pub ndim: usize,
    #[serde(default)]
    pub seed: Option<u64>,
    pub valuation: ValuationConfig,
    /// Seconds spent refining curves; present once data has been generated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate_time: Option<f64>,
}

fn default_prefix() -> String {
    "vcg".to_string()
}

impl DatasetMeta {
    pub fn new(n: usize, ndim: usize, valuation: ValuationConfig) -> Self {
        Self {
            prefix: default_prefix(),
            n,
            ndim,
            seed: None,
            valuation,
            generate_time: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// 256 players over 6 free-form rising dimensions.
    pub fn nonconcave() -> Self {
        Self::new(256, 6, ValuationConfig::default()).with_prefix("vcg-nonconcave")
    }

    /// [`Self::nonconcave`] with up to 3 interior local maxima per curve.
    pub fn nonrising() -> Self {
        let mut meta = Self::nonconcave().with_prefix("vcg-nonrising");
        meta.valuation.local_maximum_limit = Some(3);
        meta
    }

    /// [`Self::nonconcave`] with concave curves.
    pub fn concave() -> Self {
        let mut meta = Self::nonconcave().with_prefix("vcg-concave");
        meta.valuation.concave = true;
        meta
    }

    /// Directory-style name: `{prefix}-{ndim}d-{n}p`.
    pub fn name(&self) -> String {
        format!("{}-{}d-{}p", self.prefix, self.ndim, self.n)
    }

    pub fn is_generated(&self) -> bool {
        self.generate_time.is_some()
    }

    pub fn validate(&self) -> Result<()> {
        if self.n == 0 {
            return Err(ValuationError::DimensionMismatch(
                "dataset needs at least one player".to_string(),
            ));
        }
        if self.ndim == 0 {
            return Err(ValuationError::DimensionMismatch(
                "dataset needs at least one dimension".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::Family;

    #[test]
    fn test_presets() {
        let base = DatasetMeta::nonconcave();
        assert_eq!(base.name(), "vcg-nonconcave-6d-256p");
        assert_eq!(base.valuation.wealth_dist.family(), Family::Lomax);
        assert_eq!(base.valuation.repair(), Repair::Rising);

        let nonrising = DatasetMeta::nonrising();
        assert_eq!(nonrising.valuation.local_maxima_cap(), Some(3));
        assert_eq!(nonrising.valuation.repair(), Repair::None);

        let concave = DatasetMeta::concave();
        assert_eq!(concave.valuation.repair(), Repair::ConcaveRising);
    }

    #[test]
    fn test_non_positive_limit_means_rising() {
        let mut cfg = ValuationConfig::default();
        cfg.local_maximum_limit = Some(0);
        assert!(cfg.is_rising());
        cfg.local_maximum_limit = Some(-2);
        assert!(cfg.is_rising());
        assert_eq!(cfg.local_maxima_cap(), None);
    }

    #[test]
    fn test_meta_json_keys() {
        let json = r#"{
            "n": 4,
            "ndim": 2,
            "valuation": {
                "wealth-dist": {"family": "lomax", "params": [1.2], "scale": 100},
                "local-maximum-limit": 2
            }
        }"#;
        let meta: DatasetMeta = serde_json::from_str(json).unwrap();
        assert_eq!(meta.prefix, "vcg");
        assert_eq!(meta.valuation.local_maximum_limit, Some(2));
        assert!(!meta.valuation.concave);
        assert!(!meta.is_generated());

        let unknown = json.replace("lomax", "weibull");
        let err = serde_json::from_str::<DatasetMeta>(&unknown).unwrap_err();
        assert!(err.to_string().contains("weibull"));
    }

    #[test]
    fn test_validate_rejects_empty_dataset() {
        let meta = DatasetMeta::new(0, 2, ValuationConfig::default());
        assert!(meta.validate().is_err());
        let meta = DatasetMeta::new(3, 0, ValuationConfig::default());
        assert!(meta.validate().is_err());
    }
}
