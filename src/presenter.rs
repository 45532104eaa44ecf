//! Output side of the collector.
//!
//! Everything that reaches the console or the disk goes through a
//! `Presenter`. The engine only hands over records, series and round
//! snapshots; layout, field filtering for display and persistence are
//! decided here.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::Ordering;

use log::{info, warn};
use serde::Deserialize;

use crate::{
    collector::aggregator::{Column, Snapshot},
    error::Result,
    metrics::METRICS,
    schema::FlatRecord,
    util,
};

const COLUMN_WIDTH: usize = 15;
const TIMESTAMP_WIDTH: usize = 25;

/// Tabular (fixed width) or delimited (comma separated) output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    #[default]
    Table,
    Csv,
}

/// Formatting hints shared by every render call of one presenter.
#[derive(Debug, Clone)]
pub struct RenderHints {
    /// Fields to show, in this order. Empty means all.
    pub fields: Vec<String>,

    /// Field holding the Unix-seconds timestamp.
    pub timestamp_field: String,

    pub layout: Layout,

    /// When set, snapshots render as one matrix of this field per asset.
    pub matrix_field: Option<String>,

    /// When set, snapshot columns are also written as CSV files here.
    pub csv_dir: Option<PathBuf>,
}

impl Default for RenderHints {
    fn default() -> Self {
        Self {
            fields: Vec::new(),
            timestamp_field: "timestamp".to_string(),
            layout: Layout::Table,
            matrix_field: None,
            csv_dir: None,
        }
    }
}

/// Consumer of everything the engine produces.
///
/// THREAD SAFETY:
/// - Called concurrently from every streaming worker
/// - Implementations serialize their own output
pub trait Presenter: Send + Sync {
    /// Latest record of one asset (streaming mode).
    fn present_record(&self, label: &str, record: &FlatRecord);

    /// Series of one asset (streaming mode).
    fn present_series(&self, label: &str, records: &[FlatRecord]);

    /// One complete synchronized round.
    fn present_snapshot(&self, snapshot: &Snapshot) -> Result<()>;

    /// Single-line user notice.
    fn notice(&self, message: &str);
}

/// Console presenter with optional CSV persistence.
///
/// All writes share one lock so lines of concurrent workers never
/// interleave.
pub struct ConsolePresenter {
    hints: RenderHints,
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsolePresenter {
    pub fn new(hints: RenderHints) -> Self {
        Self::with_writer(hints, Box::new(std::io::stdout()))
    }

    pub fn with_writer(hints: RenderHints, out: Box<dyn Write + Send>) -> Self {
        Self {
            hints,
            out: Mutex::new(out),
        }
    }

    fn emit(&self, text: &str) {
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = writeln!(out, "{}", text).and_then(|_| out.flush()) {
            warn!("console write failed: {}", e);
        }
    }

    fn write_csv(&self, dir: &Path, column: &Column) -> Result<Option<PathBuf>> {
        let Some(last) = column.records.last() else {
            return Ok(None);
        };

        let stamp = last
            .get(&self.hints.timestamp_field)
            .map(util::timestamp_to_file_stamp)
            .unwrap_or_else(|| util::now_ms().to_string());
        let path = dir.join(format!("{}_{}.csv", column.label.replace('/', "_"), stamp));

        let body = format_table(
            &column.records,
            &format!("{}_", column.label),
            &self.hints.timestamp_field,
            &self.hints.fields,
            Layout::Csv,
        );

        fs::create_dir_all(dir)?;
        fs::write(&path, body)?;
        Ok(Some(path))
    }
}

impl Presenter for ConsolePresenter {
    fn present_record(&self, label: &str, record: &FlatRecord) {
        let line = format_record_line(label, record, &self.hints.fields);
        self.emit(&format!("{}\n{}", line, "-".repeat(50)));
    }

    fn present_series(&self, label: &str, records: &[FlatRecord]) {
        let table = format_table(
            records,
            &format!("{}-", label),
            &self.hints.timestamp_field,
            &self.hints.fields,
            self.hints.layout,
        );
        self.emit(&table);
    }

    fn present_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        METRICS.snapshots_presented.fetch_add(1, Ordering::Relaxed);

        if let Some(field) = &self.hints.matrix_field {
            self.emit(&format_matrix(snapshot, field, &self.hints.timestamp_field));
            return Ok(());
        }

        // a failed file never stops the remaining columns; the first error is returned
        let mut first_error = None;

        for column in &snapshot.columns {
            if column.failed {
                self.emit(&format!("{}: no data this round.", column.label));
                continue;
            }

            self.present_series(&column.label, &column.records);

            if let Some(dir) = &self.hints.csv_dir {
                match self.write_csv(dir, column) {
                    Ok(Some(path)) => {
                        info!("{} written to disk", path.display());
                        self.emit(&format!("{} written to disk.\n", path.display()));
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!("{}: csv not written: {}", column.label, e);
                        first_error.get_or_insert(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn notice(&self, message: &str) {
        self.emit(message);
    }
}

/// `LABEL << k1: v1 << k2: v2`
///
/// With an allow-list, fields follow the allow-list order and missing ones
/// are skipped.
pub fn format_record_line(label: &str, record: &FlatRecord, fields: &[String]) -> String {
    let parts: Vec<String> = if fields.is_empty() {
        record.iter().map(|(k, v)| format!("{k}: {v}")).collect()
    } else {
        fields
            .iter()
            .filter_map(|f| record.get(f).map(|v| format!("{f}: {v}")))
            .collect()
    };

    let mut line = format!("{label} << ");
    line.push_str(&parts.join(" << "));
    line
}

/// Renders a series as a table or as CSV.
///
/// The header comes from the first record's keys (restricted to `fields`
/// when given), each prefixed with `prefix`. Cells of `timestamp_field` are
/// rendered as UTC date-times.
pub fn format_table(
    records: &[FlatRecord],
    prefix: &str,
    timestamp_field: &str,
    fields: &[String],
    layout: Layout,
) -> String {
    let Some(first) = records.first() else {
        return String::new();
    };

    let header: Vec<&str> = if fields.is_empty() {
        first.keys().collect()
    } else {
        fields.iter().map(String::as_str).filter(|f| first.contains_key(f)).collect()
    };

    let cell = |record: &FlatRecord, key: &str| -> String {
        match record.get(key) {
            Some(v) if key == timestamp_field => util::timestamp_to_string(v),
            Some(v) => v.to_string(),
            None => String::new(),
        }
    };

    let mut out = String::new();
    match layout {
        Layout::Csv => {
            let names: Vec<String> = header.iter().map(|h| format!("{prefix}{h}")).collect();
            out.push_str(&names.join(","));
            out.push('\n');
            for record in records {
                let row: Vec<String> = header.iter().map(|h| cell(record, h)).collect();
                out.push_str(&row.join(","));
                out.push('\n');
            }
        }
        Layout::Table => {
            let width = COLUMN_WIDTH + prefix.len();
            let rule = "-".repeat(header.len() * width);

            for h in &header {
                out.push_str(&format!("{:<width$}", format!("{prefix}{h}")));
            }
            out.push('\n');
            out.push_str(&rule);
            out.push('\n');
            for record in records {
                for h in &header {
                    out.push_str(&format!("{:<width$}", cell(record, h)));
                }
                out.push('\n');
            }
            out.push_str(&rule);
            out.push('\n');
        }
    }
    out
}

/// Renders one field of every column side by side, rows aligned by position.
///
/// The timestamp column comes from the first populated column. Shorter
/// columns get empty cells; failed columns are flagged in the header.
pub fn format_matrix(snapshot: &Snapshot, field: &str, timestamp_field: &str) -> String {
    let rule = "-".repeat(TIMESTAMP_WIDTH + COLUMN_WIDTH * snapshot.columns.len());
    let mut out = String::new();

    out.push_str(&format!("{:<w$}", "Timestamp", w = TIMESTAMP_WIDTH));
    for column in &snapshot.columns {
        let name = if column.failed {
            format!("{} (failed)", column.label)
        } else {
            column.label.clone()
        };
        out.push_str(&format!("{:<w$}", name, w = COLUMN_WIDTH));
    }
    out.push('\n');
    out.push_str(&rule);
    out.push('\n');

    let clock = snapshot.populated().next();
    for row in 0..snapshot.row_count() {
        let ts = clock
            .and_then(|c| c.records.get(row))
            .and_then(|r| r.get(timestamp_field))
            .map(util::timestamp_to_string)
            .unwrap_or_default();
        out.push_str(&format!("{:<w$}", ts, w = TIMESTAMP_WIDTH));

        for column in &snapshot.columns {
            let value = column
                .records
                .get(row)
                .and_then(|r| r.get(field))
                .unwrap_or("");
            out.push_str(&format!("{:<w$}", value, w = COLUMN_WIDTH));
        }
        out.push('\n');
    }
    out.push_str(&rule);
    out.push('\n');
    out
}
