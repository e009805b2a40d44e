//! Structured telemetry for optimizer runs.
//!
//! The twin core emits `tracing` events under the targets `cycle`,
//! `intervention` and `anomaly`. [`TableSubscriber`] turns every event into a
//! row of a per-target table whose columns appear as fields are first seen.
//! Tables convert to polars DataFrames for analysis and can be written to
//! parquet by a [`RunRecorder`].
//!
//! ```ignore
//! let mut rec = instrument::RunRecorder::new("data/runs", "demo_block");
//! // ... tick the agent until it halts ...
//! let trajectory = instrument::carbon_trajectory(rec.frames())?;
//! // rec drops -> data/runs/<secs>_demo_block/{cycle,intervention}.parquet + _ready
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Record};
use tracing::{Event, Id, Level, Metadata, Subscriber};

pub const CYCLE_TARGET: &str = "cycle";
pub const INTERVENTION_TARGET: &str = "intervention";
pub const ANOMALY_TARGET: &str = "anomaly";

// ============================================================================
// Tables
// ============================================================================

/// One recorded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    F64(f64),
    I64(i64),
    U64(u64),
    Bool(bool),
    Text(String),
}

/// A typed column. The type is fixed by the first value seen; later values of
/// another type are stored as their text form in a text column.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    F64(Vec<f64>),
    I64(Vec<i64>),
    U64(Vec<u64>),
    Bool(Vec<bool>),
    Text(Vec<String>),
}

impl Column {
    fn empty_like(cell: &Cell, rows: usize) -> Self {
        match cell {
            Cell::F64(_) => Column::F64(vec![0.0; rows]),
            Cell::I64(_) => Column::I64(vec![0; rows]),
            Cell::U64(_) => Column::U64(vec![0; rows]),
            Cell::Bool(_) => Column::Bool(vec![false; rows]),
            Cell::Text(_) => Column::Text(vec![String::new(); rows]),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Column::F64(v) => v.len(),
            Column::I64(v) => v.len(),
            Column::U64(v) => v.len(),
            Column::Bool(v) => v.len(),
            Column::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&mut self, cell: Cell) {
        match (self, cell) {
            (Column::F64(v), Cell::F64(x)) => v.push(x),
            (Column::I64(v), Cell::I64(x)) => v.push(x),
            (Column::U64(v), Cell::U64(x)) => v.push(x),
            (Column::Bool(v), Cell::Bool(x)) => v.push(x),
            (Column::Text(v), Cell::Text(x)) => v.push(x),
            (Column::Text(v), other) => v.push(cell_text(&other)),
            (col, _) => col.push_default(),
        }
    }

    fn push_default(&mut self) {
        match self {
            Column::F64(v) => v.push(0.0),
            Column::I64(v) => v.push(0),
            Column::U64(v) => v.push(0),
            Column::Bool(v) => v.push(false),
            Column::Text(v) => v.push(String::new()),
        }
    }

    pub fn as_f64(&self) -> Option<&[f64]> {
        match self {
            Column::F64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&[String]> {
        match self {
            Column::Text(v) => Some(v),
            _ => None,
        }
    }
}

fn cell_text(cell: &Cell) -> String {
    match cell {
        Cell::F64(x) => x.to_string(),
        Cell::I64(x) => x.to_string(),
        Cell::U64(x) => x.to_string(),
        Cell::Bool(x) => x.to_string(),
        Cell::Text(x) => x.clone(),
    }
}

/// Rows of events sharing a target. Every column always has `rows` entries.
#[derive(Debug, Clone, Default)]
pub struct EventTable {
    pub columns: HashMap<String, Column>,
    pub rows: usize,
}

impl EventTable {
    /// Append one row. Fields absent from the row get a default value;
    /// fields new to the table get a column back-filled with defaults.
    pub fn append(&mut self, row: Vec<(String, Cell)>) {
        let rows = self.rows;
        for (name, cell) in row {
            let column = self
                .columns
                .entry(name)
                .or_insert_with(|| Column::empty_like(&cell, rows));
            if column.len() == rows {
                column.push(cell);
            }
        }
        self.rows += 1;
        for column in self.columns.values_mut() {
            while column.len() < self.rows {
                column.push_default();
            }
        }
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }
}

/// All tables recorded on this thread, keyed by event target.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    pub tables: HashMap<String, EventTable>,
}

impl Recorder {
    pub fn table(&self, target: &str) -> Option<&EventTable> {
        self.tables.get(target)
    }
}

thread_local! {
    static RECORDER: RefCell<Recorder> = RefCell::default();
}

// ============================================================================
// Subscriber
// ============================================================================

/// Collects one event's fields, in order.
#[derive(Default)]
struct RowVisitor {
    row: Vec<(String, Cell)>,
}

impl RowVisitor {
    fn put(&mut self, field: &Field, cell: Cell) {
        self.row.push((field.name().to_string(), cell));
    }
}

impl Visit for RowVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.put(field, Cell::F64(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, Cell::I64(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, Cell::U64(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, Cell::Bool(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, Cell::Text(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        // `message` and `%display` fields arrive here
        self.put(field, Cell::Text(format!("{:?}", value)));
    }
}

/// Subscriber that appends INFO, WARN and ERROR events to the thread-local
/// recorder. Spans are ignored.
pub struct TableSubscriber;

impl Subscriber for TableSubscriber {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.is_event() && *metadata.level() <= Level::INFO
    }

    fn new_span(&self, _span: &Attributes<'_>) -> Id {
        Id::from_u64(1)
    }

    fn record(&self, _span: &Id, _values: &Record<'_>) {}

    fn record_follows_from(&self, _span: &Id, _follows: &Id) {}

    fn event(&self, event: &Event<'_>) {
        let mut visitor = RowVisitor::default();
        event.record(&mut visitor);
        let target = event.metadata().target().to_string();

        RECORDER.with(|r| {
            r.borrow_mut()
                .tables
                .entry(target)
                .or_default()
                .append(visitor.row);
        });
    }

    fn enter(&self, _span: &Id) {}

    fn exit(&self, _span: &Id) {}
}

/// Install the table subscriber process-wide. Later calls are ignored.
pub fn install_subscriber() {
    let _ = tracing::subscriber::set_global_default(TableSubscriber);
}

/// Take everything recorded on this thread so far.
pub fn drain() -> Recorder {
    RECORDER.with(|r| std::mem::take(&mut *r.borrow_mut()))
}

pub fn clear() {
    RECORDER.with(|r| *r.borrow_mut() = Recorder::default());
}

/// Run `f` with the table subscriber active on this thread only, returning
/// its result and exactly the events it emitted.
pub fn capture<R>(f: impl FnOnce() -> R) -> (R, Recorder) {
    let saved = drain();
    let result = tracing::subscriber::with_default(TableSubscriber, f);
    let recorded = drain();
    RECORDER.with(|r| *r.borrow_mut() = saved);
    (result, recorded)
}

// ============================================================================
// Polars
// ============================================================================

use polars::prelude::*;

impl EventTable {
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let mut names: Vec<&String> = self.columns.keys().collect();
        names.sort();

        let columns = names
            .into_iter()
            .map(|name| {
                let name = PlSmallStr::from(name.as_str());
                match &self.columns[name.as_str()] {
                    Column::F64(v) => polars::prelude::Column::new(name, v),
                    Column::I64(v) => polars::prelude::Column::new(name, v),
                    Column::U64(v) => polars::prelude::Column::new(name, v),
                    Column::Bool(v) => polars::prelude::Column::new(name, v),
                    Column::Text(v) => polars::prelude::Column::new(name, v),
                }
            })
            .collect();

        DataFrame::new(columns)
    }
}

impl Recorder {
    pub fn to_dataframes(&self) -> HashMap<String, DataFrame> {
        self.tables
            .iter()
            .filter_map(|(name, table)| table.to_dataframe().ok().map(|df| (name.clone(), df)))
            .collect()
    }
}

pub fn drain_to_dataframes() -> HashMap<String, DataFrame> {
    drain().to_dataframes()
}

/// Total carbon and budget after each cycle, numbered from 1.
pub fn carbon_trajectory(frames: &HashMap<String, DataFrame>) -> PolarsResult<DataFrame> {
    let cycles = frames
        .get(CYCLE_TARGET)
        .ok_or_else(|| PolarsError::ColumnNotFound("no cycle table recorded".into()))?;

    cycles
        .select(["outcome", "total_carbon", "budget"])?
        .with_row_index("cycle".into(), Some(1))
}

/// Number of committed interventions and total reduction per action.
pub fn interventions_by_action(frames: &HashMap<String, DataFrame>) -> PolarsResult<DataFrame> {
    let Some(applied) = frames.get(INTERVENTION_TARGET) else {
        return Ok(DataFrame::empty());
    };

    applied
        .clone()
        .lazy()
        .group_by([col("action")])
        .agg([len().alias("count"), col("reduction").sum()])
        .sort(["action"], SortMultipleOptions::default())
        .collect()
}

/// Write each frame to `{dir}/{name}.parquet`.
pub fn save_parquet(frames: &mut HashMap<String, DataFrame>, dir: &Path) -> PolarsResult<()> {
    std::fs::create_dir_all(dir)?;
    for (name, df) in frames.iter_mut() {
        let file = std::fs::File::create(dir.join(format!("{name}.parquet")))?;
        ParquetWriter::new(file).finish(df)?;
    }
    Ok(())
}

// ============================================================================
// Run recorder
// ============================================================================

/// Keep ASCII alphanumerics, map everything else to `_`, cap at 48 chars.
fn run_slug(name: &str) -> String {
    name.chars()
        .take(48)
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Records one optimizer run and writes it to parquet when dropped.
///
/// Creating a recorder clears anything recorded earlier on this thread and
/// installs the subscriber. Output lands in `{parent}/{unix_secs}_{name}/`
/// followed by an empty `_ready` marker.
pub struct RunRecorder {
    run_dir: PathBuf,
    frames: Option<HashMap<String, DataFrame>>,
}

impl RunRecorder {
    pub fn new(parent: impl Into<PathBuf>, name: &str) -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let run_dir = parent.into().join(format!("{secs}_{}", run_slug(name)));

        clear();
        install_subscriber();
        Self {
            run_dir,
            frames: None,
        }
    }

    /// Frames recorded so far. The first call drains the recorder.
    pub fn frames(&mut self) -> &HashMap<String, DataFrame> {
        self.frames.get_or_insert_with(drain_to_dataframes)
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }
}

impl Drop for RunRecorder {
    fn drop(&mut self) {
        let mut frames = self.frames.take().unwrap_or_else(drain_to_dataframes);
        if frames.is_empty() {
            return;
        }
        if let Err(e) = save_parquet(&mut frames, &self.run_dir) {
            eprintln!("RunRecorder: failed to write {}: {}", self.run_dir.display(), e);
            return;
        }
        if let Err(e) = std::fs::File::create(self.run_dir.join("_ready")) {
            eprintln!("RunRecorder: failed to write _ready marker: {}", e);
        }
    }
}
