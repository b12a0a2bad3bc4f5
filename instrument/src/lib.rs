//! Column capture of `tracing` events for analysing valuation runs.
//!
//! Every info-level event becomes one row in the table named after its
//! target. Columns are created the first time a field shows up, so the
//! schema follows whatever the generator emits.
//!
//! ```ignore
//! let (ds, log) = instrument::capture(|| generate_dataset());
//! let wealth = log.table("wealth").unwrap();
//! assert_eq!(wealth.rows(), ds.n());
//! ```

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Record};
use tracing::{Event, Id, Level, Metadata, Subscriber};

/// One field value as seen by the visitor.
#[derive(Debug, Clone, PartialEq)]
enum FieldValue {
    U64(u64),
    I64(i64),
    F64(f64),
    Bool(bool),
    Str(String),
}

impl FieldValue {
    fn render(&self) -> String {
        match self {
            FieldValue::U64(v) => v.to_string(),
            FieldValue::I64(v) => v.to_string(),
            FieldValue::F64(v) => v.to_string(),
            FieldValue::Bool(v) => v.to_string(),
            FieldValue::Str(v) => v.clone(),
        }
    }
}

/// Typed storage for one column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    U64(Vec<u64>),
    I64(Vec<i64>),
    F64(Vec<f64>),
    Bool(Vec<bool>),
    Str(Vec<String>),
}

impl ColumnData {
    fn empty_like(value: &FieldValue, rows: usize) -> Self {
        match value {
            FieldValue::U64(_) => ColumnData::U64(vec![0; rows]),
            FieldValue::I64(_) => ColumnData::I64(vec![0; rows]),
            FieldValue::F64(_) => ColumnData::F64(vec![f64::NAN; rows]),
            FieldValue::Bool(_) => ColumnData::Bool(vec![false; rows]),
            FieldValue::Str(_) => ColumnData::Str(vec![String::new(); rows]),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnData::U64(v) => v.len(),
            ColumnData::I64(v) => v.len(),
            ColumnData::F64(v) => v.len(),
            ColumnData::Bool(v) => v.len(),
            ColumnData::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fill missing rows with the column's blank value.
    fn pad_to(&mut self, rows: usize) {
        let missing = rows.saturating_sub(self.len());
        match self {
            ColumnData::U64(v) => v.extend(std::iter::repeat_n(0, missing)),
            ColumnData::I64(v) => v.extend(std::iter::repeat_n(0, missing)),
            ColumnData::F64(v) => v.extend(std::iter::repeat_n(f64::NAN, missing)),
            ColumnData::Bool(v) => v.extend(std::iter::repeat_n(false, missing)),
            ColumnData::Str(v) => v.extend(std::iter::repeat_n(String::new(), missing)),
        }
    }

    /// Rewrite every cell as text.
    fn into_strings(self) -> Vec<String> {
        match self {
            ColumnData::U64(v) => v.iter().map(u64::to_string).collect(),
            ColumnData::I64(v) => v.iter().map(i64::to_string).collect(),
            ColumnData::F64(v) => v.iter().map(f64::to_string).collect(),
            ColumnData::Bool(v) => v.iter().map(bool::to_string).collect(),
            ColumnData::Str(v) => v,
        }
    }

    /// Append `value`; a value of another type turns the column into text.
    fn push(&mut self, value: FieldValue) {
        let value = match (&mut *self, value) {
            (ColumnData::U64(v), FieldValue::U64(x)) => return v.push(x),
            (ColumnData::I64(v), FieldValue::I64(x)) => return v.push(x),
            (ColumnData::F64(v), FieldValue::F64(x)) => return v.push(x),
            (ColumnData::Bool(v), FieldValue::Bool(x)) => return v.push(x),
            (ColumnData::Str(v), other) => return v.push(other.render()),
            (_, other) => other,
        };
        let mut text = std::mem::replace(self, ColumnData::Str(Vec::new())).into_strings();
        text.push(value.render());
        *self = ColumnData::Str(text);
    }

    fn to_column(&self, name: &str) -> Column {
        match self {
            ColumnData::U64(v) => Column::new(name.into(), v),
            ColumnData::I64(v) => Column::new(name.into(), v),
            ColumnData::F64(v) => Column::new(name.into(), v),
            ColumnData::Bool(v) => Column::new(name.into(), v),
            ColumnData::Str(v) => Column::new(name.into(), v),
        }
    }
}

/// Rows recorded under one tracing target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventTable {
    columns: BTreeMap<String, ColumnData>,
    rows: usize,
}

impl EventTable {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnData> {
        self.columns.get(name)
    }

    pub fn u64s(&self, name: &str) -> Option<&[u64]> {
        match self.columns.get(name)? {
            ColumnData::U64(v) => Some(v),
            _ => None,
        }
    }

    pub fn f64s(&self, name: &str) -> Option<&[f64]> {
        match self.columns.get(name)? {
            ColumnData::F64(v) => Some(v),
            _ => None,
        }
    }

    pub fn strs(&self, name: &str) -> Option<&[String]> {
        match self.columns.get(name)? {
            ColumnData::Str(v) => Some(v),
            _ => None,
        }
    }

    /// Append one row. Columns absent from `fields` get a blank cell.
    fn push_row(&mut self, fields: Vec<(&'static str, FieldValue)>) {
        for (name, value) in fields {
            let rows = self.rows;
            let col = self
                .columns
                .entry(name.to_string())
                .or_insert_with(|| ColumnData::empty_like(&value, rows));
            col.pad_to(rows);
            col.push(value);
        }
        self.rows += 1;
        let rows = self.rows;
        self.columns.values_mut().for_each(|c| c.pad_to(rows));
    }

    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let columns = self
            .columns
            .iter()
            .map(|(name, data)| data.to_column(name))
            .collect();
        DataFrame::new(columns)
    }
}

/// Everything captured, keyed by tracing target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventLog {
    pub tables: BTreeMap<String, EventTable>,
}

impl EventLog {
    pub fn table(&self, target: &str) -> Option<&EventTable> {
        self.tables.get(target)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn to_dataframes(&self) -> PolarsResult<BTreeMap<String, DataFrame>> {
        self.tables
            .iter()
            .map(|(target, table)| Ok((target.clone(), table.to_dataframe()?)))
            .collect()
    }
}

thread_local! {
    static LOG: RefCell<EventLog> = RefCell::default();
}

#[derive(Default)]
struct RowVisitor {
    fields: Vec<(&'static str, FieldValue)>,
}

impl Visit for RowVisitor {
    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.push((field.name(), FieldValue::U64(value)));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.push((field.name(), FieldValue::I64(value)));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.push((field.name(), FieldValue::F64(value)));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.push((field.name(), FieldValue::Bool(value)));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields.push((field.name(), FieldValue::Str(value.to_string())));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.fields.push((field.name(), FieldValue::Str(format!("{value:?}"))));
    }
}

/// Subscriber that appends info-level events to the thread-local [`EventLog`].
///
/// Spans are ignored. With [`TableSubscriber::only`], events from other
/// targets are ignored too.
#[derive(Debug, Clone, Default)]
pub struct TableSubscriber {
    targets: Option<Vec<String>>,
}

impl TableSubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record only the listed targets.
    pub fn only<I, S>(targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            targets: Some(targets.into_iter().map(Into::into).collect()),
        }
    }
}

impl Subscriber for TableSubscriber {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.is_event()
            && *metadata.level() <= Level::INFO
            && self
                .targets
                .as_ref()
                .is_none_or(|ts| ts.iter().any(|t| t == metadata.target()))
    }

    fn new_span(&self, _span: &Attributes<'_>) -> Id {
        Id::from_u64(1)
    }

    fn record(&self, _span: &Id, _values: &Record<'_>) {}

    fn record_follows_from(&self, _span: &Id, _follows: &Id) {}

    fn event(&self, event: &Event<'_>) {
        let mut visitor = RowVisitor::default();
        event.record(&mut visitor);
        let target = event.metadata().target();
        LOG.with(|log| {
            log.borrow_mut()
                .tables
                .entry(target.to_string())
                .or_default()
                .push_row(visitor.fields);
        });
    }

    fn enter(&self, _span: &Id) {}

    fn exit(&self, _span: &Id) {}
}

/// Install a [`TableSubscriber`] as the process-wide default. Later calls are no-ops.
pub fn install_global() {
    let _ = tracing::subscriber::set_global_default(TableSubscriber::new());
}

/// Take everything recorded on this thread so far.
pub fn drain() -> EventLog {
    LOG.with(|log| std::mem::take(&mut *log.borrow_mut()))
}

pub fn clear() {
    drain();
}

/// Run `f` under a scoped [`TableSubscriber`] and return what it emitted.
///
/// Events recorded on this thread before the call are left in place.
pub fn capture<T>(f: impl FnOnce() -> T) -> (T, EventLog) {
    let before = drain();
    let out = tracing::subscriber::with_default(TableSubscriber::new(), f);
    let captured = drain();
    LOG.with(|log| *log.borrow_mut() = before);
    (out, captured)
}

/// Write each frame to `{dir}/{target}.parquet`.
pub fn save_parquet(dfs: &mut BTreeMap<String, DataFrame>, dir: &Path) -> PolarsResult<()> {
    let io_err = |e: std::io::Error| PolarsError::IO {
        error: e.into(),
        msg: None,
    };
    std::fs::create_dir_all(dir).map_err(io_err)?;
    for (target, df) in dfs.iter_mut() {
        let file = std::fs::File::create(dir.join(format!("{target}.parquet"))).map_err(io_err)?;
        ParquetWriter::new(file).finish(df)?;
    }
    Ok(())
}

/// Directory-safe form of a run name.
fn sanitize(name: &str) -> String {
    name.chars()
        .take(60)
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

/// Captures a whole run and archives it as parquet when dropped.
///
/// Creation clears this thread's log and installs the global subscriber.
/// On drop the tables land in `{parent}/{name}/` followed by a `_ready` marker.
///
/// ```ignore
/// let mut archive = instrument::RunArchive::new("runs", "vcg-nonconcave-6d-256p");
/// ds.generate(&fleet)?;
/// let dfs = archive.get()?;
/// ```
pub struct RunArchive {
    run_dir: PathBuf,
    dfs: Option<BTreeMap<String, DataFrame>>,
}

impl RunArchive {
    pub fn new(parent: impl Into<PathBuf>, name: &str) -> Self {
        clear();
        install_global();
        Self {
            run_dir: parent.into().join(sanitize(name)),
            dfs: None,
        }
    }

    /// Drain the log into frames on first call; later calls return the same frames.
    pub fn get(&mut self) -> PolarsResult<&BTreeMap<String, DataFrame>> {
        if self.dfs.is_none() {
            self.dfs = Some(drain().to_dataframes()?);
        }
        Ok(self.dfs.get_or_insert_with(BTreeMap::new))
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    fn write(&mut self) -> PolarsResult<usize> {
        let mut dfs = match self.dfs.take() {
            Some(dfs) => dfs,
            None => drain().to_dataframes()?,
        };
        if dfs.is_empty() {
            return Ok(0);
        }
        save_parquet(&mut dfs, &self.run_dir)?;
        std::fs::File::create(self.run_dir.join("_ready")).map_err(|e| PolarsError::IO {
            error: e.into(),
            msg: None,
        })?;
        Ok(dfs.len())
    }
}

impl Drop for RunArchive {
    fn drop(&mut self) {
        match self.write() {
            Ok(0) => {}
            Ok(n) => eprintln!("RunArchive: wrote {n} tables to {}", self.run_dir.display()),
            Err(e) => eprintln!("RunArchive({}): {e}", self.run_dir.display()),
        }
    }
}
