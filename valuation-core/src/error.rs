use thiserror::Error;

/// Everything that can go wrong while generating, loading or sampling valuations.
///
/// Nothing here is transient: every variant is either a configuration mistake
/// made by the caller or corrupted persisted data, so callers never retry.
#[derive(Error, Debug)]
pub enum ValuationError {
    #[error("unknown distribution family: {0}")]
    UnknownDistribution(String),

    #[error("invalid parameters for distribution {family}: {reason}")]
    InvalidDistribution { family: String, reason: String },

    #[error("no such resource dependency: {0}")]
    UnknownResourceDependency(String),

    #[error("grid dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("player {player} out of range (dataset has {n} players)")]
    UnknownPlayer { player: usize, n: usize },

    #[error("malformed dependency tree: {0}")]
    MalformedDependencyTree(String),

    #[error("invalid curve: {0}")]
    InvalidCurve(String),

    #[error("dataset has not generated {0} yet")]
    NotGenerated(&'static str),

    #[error("reference dataset has {eligible} eligible rows, {requested} players requested")]
    InsufficientReferenceRows { eligible: usize, requested: usize },

    #[error("reference row {row} out of range for {rows} rows")]
    UnknownReferenceRow { row: usize, rows: usize },

    #[error("reference dataset error: {0}")]
    Reference(#[from] polars::prelude::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ValuationError>;
