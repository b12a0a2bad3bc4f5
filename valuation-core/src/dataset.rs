//! Dataset context: configuration, generated tiers, and the derived spline cache.
//!
//! Tiers, in generation order:
//! - `dist`: raw per-seed samples (`dist_data`)
//! - `init`: sparse control points (`init_data`)
//! - `data`: dense refined curves and dependency trees (persisted artifacts)
//!
//! Generated tiers are only written by the `generate_*` methods. Sampling
//! reads them and fills the spline cache, which is never persisted.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::OnceLock;
use std::time::Instant;

use ndarray::{Array1, ArrayD};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::DatasetMeta;
use crate::curve::{self, Curve};
use crate::dependency::{self, DependencyTree, ResourceDependency, compose_elementwise};
use crate::error::{Result, ValuationError};
use crate::reference::ReferenceFleet;
use crate::sampler::{self, GridShape};
use crate::spline::CubicSpline;
use crate::wealth::{self, Distributions};

/// Sparse control points (`init_data`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitData {
    pub val: Vec<Vec<Curve>>,
}

/// Persisted artifacts (`data`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalData {
    #[serde(rename = "val-xy", default, skip_serializing_if = "Option::is_none")]
    pub val_xy: Option<Vec<Vec<Curve>>>,
    /// Per-player trees keyed `resource_dependency_<name>`.
    #[serde(flatten)]
    pub resource_dependency: BTreeMap<String, Vec<DependencyTree>>,
}

/// Output of [`Dataset::get_vals`], one entry per requested player.
#[derive(Debug, Clone, PartialEq)]
pub struct Valuations {
    /// Per-dimension 1-D slices, scaled by `wealth / ndim` when wealth-factored.
    pub slices: Vec<Vec<Array1<f64>>>,
    /// Joint surfaces over the full grid, scaled by `wealth` when wealth-factored.
    pub surfaces: Vec<ArrayD<f64>>,
}

/// A dataset as parsed, before its tiers are checked against `meta`.
#[derive(Deserialize)]
struct StoredDataset {
    meta: DatasetMeta,
    #[serde(default)]
    dist: Option<Distributions>,
    #[serde(default)]
    init: Option<InitData>,
    #[serde(default)]
    data: FinalData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "StoredDataset")]
pub struct Dataset {
    pub meta: DatasetMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dist: Option<Distributions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    init: Option<InitData>,
    #[serde(default)]
    data: FinalData,
    #[serde(skip)]
    splines: OnceLock<Vec<Vec<CubicSpline>>>,
}

impl Dataset {
    pub fn new(meta: DatasetMeta) -> Self {
        Self {
            meta,
            dist: None,
            init: None,
            data: FinalData::default(),
            splines: OnceLock::new(),
        }
    }

    pub fn n(&self) -> usize {
        self.meta.n
    }

    pub fn ndim(&self) -> usize {
        self.meta.ndim
    }

    pub fn is_generated(&self) -> bool {
        self.meta.is_generated()
    }

    pub fn distributions(&self) -> Result<&Distributions> {
        self.dist.as_ref().ok_or(ValuationError::NotGenerated("distributions"))
    }

    pub fn wealth(&self) -> Result<&[f64]> {
        Ok(&self.distributions()?.wealth)
    }

    pub fn init_curves(&self) -> Result<&[Vec<Curve>]> {
        self.init
            .as_ref()
            .map(|i| i.val.as_slice())
            .ok_or(ValuationError::NotGenerated("initial control points"))
    }

    pub fn curves(&self) -> Result<&[Vec<Curve>]> {
        self.data
            .val_xy
            .as_deref()
            .ok_or(ValuationError::NotGenerated("refined curves"))
    }

    /// Stored trees for a named dependency family.
    pub fn dependency_trees(&self, name: &str) -> Result<&[DependencyTree]> {
        self.data
            .resource_dependency
            .get(&dependency::dependency_key(name))
            .map(Vec::as_slice)
            .ok_or_else(|| ValuationError::UnknownResourceDependency(name.to_string()))
    }

    /// Top-level generation. Does nothing if the dataset is already generated.
    pub fn generate(&mut self, fleet: &ReferenceFleet) -> Result<bool> {
        if self.is_generated() {
            #[cfg(feature = "instrument")]
            tracing::info!(target: "generation", dataset = %self.meta.name(), skipped = true);
            return Ok(false);
        }
        self.generate_init_data(fleet)?;
        self.generate_data()
    }

    /// Draw distributions, sparse control points and dependency trees from the
    /// dataset seed, fixing a fresh seed first if none is stored.
    pub fn generate_init_data(&mut self, fleet: &ReferenceFleet) -> Result<()> {
        self.meta.validate()?;
        let seed = *self.meta.seed.get_or_insert_with(|| rand::rng().random());
        let mut rng = StdRng::seed_from_u64(seed);

        #[cfg(feature = "instrument")]
        tracing::info!(
            target: "generation",
            dataset = %self.meta.name(),
            seed = seed,
            n = self.meta.n as u64,
            ndim = self.meta.ndim as u64,
        );

        let dist = wealth::generate_distributions(&mut rng, &self.meta, fleet)?;
        let val = curve::init_valuations(&mut rng, &dist, &self.meta.valuation);
        let trees = dependency::generate_trees(&mut rng, self.meta.n, self.meta.ndim);

        self.dist = Some(dist);
        self.init = Some(InitData { val });
        self.data.resource_dependency = trees;
        Ok(())
    }

    /// Refine the sparse control points and stamp `generate-time`.
    /// Returns `false` without touching anything if already generated.
    pub fn generate_data(&mut self) -> Result<bool> {
        if self.is_generated() {
            return Ok(false);
        }

        let start = Instant::now();
        let val_xy = curve::refine_valuations(self.init_curves()?);
        let elapsed = start.elapsed().as_secs_f64();

        self.data.val_xy = Some(val_xy);
        self.splines = OnceLock::new();
        self.meta.generate_time = Some(elapsed);

        #[cfg(feature = "instrument")]
        tracing::info!(target: "generation", dataset = %self.meta.name(), generate_time = elapsed);

        Ok(true)
    }

    /// Splines for every (player, dimension), built on first use.
    pub fn splines(&self) -> Result<&[Vec<CubicSpline>]> {
        if let Some(s) = self.splines.get() {
            return Ok(s);
        }
        let built = sampler::build_splines(self.curves()?)?;
        Ok(self.splines.get_or_init(|| built))
    }

    /// Repaired 1-D slices for every player over the first `ndim` dimensions,
    /// optionally multiplied by the player's full wealth.
    pub fn val_slices(
        &self,
        grid: impl Into<GridShape>,
        ndim: usize,
        factor_wealth: bool,
    ) -> Result<Vec<Vec<Array1<f64>>>> {
        let shape = grid.into().resolve(ndim, self.ndim())?;
        let repair = self.meta.valuation.repair();
        let splines = self.splines()?;
        let mut slices = (0..self.n())
            .map(|p| -> Result<Vec<Array1<f64>>> {
                Ok(sampler::sample_player(player_splines(splines, p, ndim)?, &shape, repair))
            })
            .collect::<Result<Vec<_>>>()?;

        if factor_wealth {
            let wealth = (0..slices.len())
                .map(|p| self.wealth_of(p))
                .collect::<Result<Vec<_>>>()?;
            sampler::scale_slices(&mut slices, |p| wealth[p]);
        }
        Ok(slices)
    }

    /// Joint valuations for the optimizer.
    ///
    /// `players` defaults to everyone, `resource_dependency` to `multiply`.
    /// With `factor_wealth`, each surface is scaled by the player's wealth
    /// and each slice by `wealth / ndim`.
    pub fn get_vals(
        &self,
        grid: impl Into<GridShape>,
        ndim: usize,
        factor_wealth: bool,
        players: Option<&[usize]>,
        resource_dependency: Option<&str>,
    ) -> Result<Valuations> {
        let shape = grid.into().resolve(ndim, self.ndim())?;
        let players: Vec<usize> = match players {
            Some(p) => p.to_vec(),
            None => (0..self.n()).collect(),
        };
        if let Some(&player) = players.iter().find(|&&p| p >= self.n()) {
            return Err(ValuationError::UnknownPlayer { player, n: self.n() });
        }

        let dependency = resource_dependency
            .map(ResourceDependency::parse)
            .unwrap_or_default();
        let trees = match &dependency {
            ResourceDependency::Elementwise(_) => None,
            ResourceDependency::Named(name) => Some(self.dependency_trees(name)?),
        };

        let splines = self.splines()?;
        let repair = self.meta.valuation.repair();

        let mut slices = Vec::with_capacity(players.len());
        let mut surfaces = Vec::with_capacity(players.len());
        for &p in &players {
            let player_slices = sampler::sample_player(player_splines(splines, p, ndim)?, &shape, repair);
            let surface = match (&dependency, trees) {
                (ResourceDependency::Elementwise(op), _) => compose_elementwise(*op, &player_slices)?,
                (ResourceDependency::Named(name), Some(trees)) => trees
                    .get(p)
                    .ok_or_else(|| {
                        ValuationError::MalformedDependencyTree(format!(
                            "{name} has no tree for player {p}"
                        ))
                    })?
                    .compose(&player_slices)?,
                (ResourceDependency::Named(name), None) => {
                    return Err(ValuationError::UnknownResourceDependency(name.clone()));
                }
            };
            slices.push(player_slices);
            surfaces.push(surface);
        }

        if factor_wealth {
            let wealth = players
                .iter()
                .map(|&p| self.wealth_of(p))
                .collect::<Result<Vec<_>>>()?;
            for (surface, &w) in surfaces.iter_mut().zip(&wealth) {
                surface.mapv_inplace(|v| v * w);
            }
            let parts = ndim as f64;
            sampler::scale_slices(&mut slices, |i| wealth[i] / parts);
        }

        #[cfg(feature = "instrument")]
        tracing::info!(
            target: "valuation",
            dataset = %self.meta.name(),
            players = players.len() as u64,
            ndim = ndim as u64,
            gridpoints = shape.iter().product::<usize>() as u64,
            resource_dependency = dependency.label(),
            factor_wealth = factor_wealth,
        );

        Ok(Valuations { slices, surfaces })
    }

    /// Write the dataset (without the spline cache) as JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Read a dataset written by [`Dataset::save`]. Distributions, dependency
    /// trees and tier sizes are re-validated while parsing.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    fn wealth_of(&self, player: usize) -> Result<f64> {
        self.wealth()?.get(player).copied().ok_or_else(|| {
            ValuationError::DimensionMismatch(format!("no wealth stored for player {player}"))
        })
    }

    fn check_consistency(&self) -> Result<()> {
        self.meta.validate()?;
        let (n, ndim) = (self.n(), self.ndim());

        if let Some(dist) = &self.dist {
            let lengths = [
                dist.wealth.len(),
                dist.wealth_uniform.len(),
                dist.cores.len(),
                dist.azure_players.len(),
                dist.val_freq.len(),
                dist.val_local_maximum.len(),
            ];
            if lengths.iter().any(|&len| len != n) {
                return Err(ValuationError::DimensionMismatch(format!(
                    "distributions do not cover exactly {n} players: {lengths:?}"
                )));
            }
        }
        let curve_tiers = [
            self.init.as_ref().map(|i| &i.val),
            self.data.val_xy.as_ref(),
        ];
        for curves in curve_tiers.into_iter().flatten() {
            if curves.len() != n || curves.iter().any(|cs| cs.len() != ndim) {
                return Err(ValuationError::DimensionMismatch(format!(
                    "curves do not match {n} players × {ndim} dimensions"
                )));
            }
        }
        for (key, trees) in &self.data.resource_dependency {
            if trees.len() != n || trees.iter().any(|t| t.ndim() != ndim) {
                return Err(ValuationError::MalformedDependencyTree(format!(
                    "{key} does not hold one {ndim}-dimensional tree per player"
                )));
            }
        }
        Ok(())
    }
}

impl TryFrom<StoredDataset> for Dataset {
    type Error = ValuationError;

    fn try_from(stored: StoredDataset) -> Result<Self> {
        let ds = Self {
            meta: stored.meta,
            dist: stored.dist,
            init: stored.init,
            data: stored.data,
            splines: OnceLock::new(),
        };
        ds.check_consistency()?;
        Ok(ds)
    }
}

/// The first `ndim` splines of one player.
fn player_splines(splines: &[Vec<CubicSpline>], player: usize, ndim: usize) -> Result<&[CubicSpline]> {
    splines
        .get(player)
        .and_then(|s| s.get(..ndim))
        .ok_or_else(|| {
            ValuationError::DimensionMismatch(format!(
                "player {player} has no curves for {ndim} dimensions"
            ))
        })
}
