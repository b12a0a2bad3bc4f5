//! Synthetic player valuations for multi-resource VCG allocation experiments.
//!
//! A [`Dataset`] draws per-player wealth from a reference VM fleet, builds
//! randomized per-dimension valuation curves, and samples them on arbitrary
//! grids, composing dimensions into joint surfaces through resource
//! dependency rules or stored dependency trees.

pub mod config;
pub mod curve;
pub mod dataset;
pub mod dependency;
pub mod distribution;
pub mod error;
pub mod reference;
pub mod repair;
pub mod sampler;
pub mod spline;
pub mod wealth;

pub use config::{DatasetMeta, ValuationConfig};
pub use curve::{Curve, CurveMode};
pub use dataset::{Dataset, Valuations};
pub use dependency::{Combine, DependencyStep, DependencyTree, ResourceDependency};
pub use distribution::{Family, WealthDist};
pub use error::{Result, ValuationError};
pub use reference::{ReferenceFleet, VmRecord};
pub use repair::Repair;
pub use sampler::{GridShape, shape_for_gridpoints};
pub use spline::CubicSpline;
pub use wealth::Distributions;

#[cfg(feature = "instrument")]
pub use instrument;
