//! External VM reference dataset used to floor player wealth.
//!
//! Each row is a VM with its creation/deletion timestamps and virtual core
//! count. Rows with a missing cell are dropped on load. Only VMs that lived
//! longer than [`MIN_LIFETIME`] are eligible.

use std::path::Path;

use polars::prelude::*;
use rand::Rng;

use crate::error::{Result, ValuationError};

pub const COL_CREATED: &str = "timestamp vm created";
pub const COL_DELETED: &str = "timestamp vm deleted";
pub const COL_CORES: &str = "vm virtual core count";

/// VMs must run strictly longer than this to be used as wealth-floor sources.
pub const MIN_LIFETIME: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VmRecord {
    pub created: f64,
    pub deleted: f64,
    pub cores: f64,
}

impl VmRecord {
    pub fn lifetime(&self) -> f64 {
        self.deleted - self.created
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceFleet {
    records: Vec<VmRecord>,
}

impl ReferenceFleet {
    pub fn from_records(records: Vec<VmRecord>) -> Self {
        Self { records }
    }

    /// Load the reference table from a CSV file with a header row.
    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self> {
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.as_ref().to_path_buf()))?
            .finish()?;
        Self::from_dataframe(&df)
    }

    pub fn from_dataframe(df: &DataFrame) -> Result<Self> {
        let created = float_column(df, COL_CREATED)?;
        let deleted = float_column(df, COL_DELETED)?;
        let cores = float_column(df, COL_CORES)?;

        let records = created
            .into_iter()
            .zip(deleted)
            .zip(cores)
            .filter_map(|((created, deleted), cores)| {
                Some(VmRecord {
                    created: created?,
                    deleted: deleted?,
                    cores: cores?,
                })
            })
            .collect();
        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&VmRecord> {
        self.records.get(index)
    }

    /// Row indices of VMs that lived longer than [`MIN_LIFETIME`].
    pub fn eligible(&self) -> Vec<usize> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.lifetime() > MIN_LIFETIME)
            .map(|(i, _)| i)
            .collect()
    }

    /// Sample `n` distinct eligible rows. Returns the row indices and their core counts.
    pub fn sample_players<R: Rng>(&self, rng: &mut R, n: usize) -> Result<(Vec<usize>, Vec<f64>)> {
        let eligible = self.eligible();
        if eligible.len() < n {
            return Err(ValuationError::InsufficientReferenceRows {
                eligible: eligible.len(),
                requested: n,
            });
        }

        let rows: Vec<usize> = rand::seq::index::sample(rng, eligible.len(), n)
            .into_iter()
            .map(|i| eligible[i])
            .collect();
        self.cores_of(rows)
    }

    /// Core counts for previously sampled rows.
    pub fn cores_of(&self, rows: Vec<usize>) -> Result<(Vec<usize>, Vec<f64>)> {
        let cores = rows
            .iter()
            .map(|&row| {
                self.records
                    .get(row)
                    .map(|r| r.cores)
                    .ok_or(ValuationError::UnknownReferenceRow {
                        row,
                        rows: self.records.len(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok((rows, cores))
    }
}

/// Read a column as `f64`, keeping nulls.
fn float_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let series = df
        .column(name)?
        .as_materialized_series()
        .cast(&DataType::Float64)?;
    Ok(series.f64()?.into_iter().collect())
}
