//! Folding every worker's interim files into the run's aggregate files.
//!
//! Aggregation runs after the join barrier, on the calling thread, in two
//! independent passes:
//!
//! - [`Aggregator::merge_success`]: `out/<id>.csv` → `out/<source>`. The first
//!   row of the first interim file folded becomes the aggregate's only header;
//!   every later file has its first row dropped.
//! - [`Aggregator::merge_errors`]: `logs/<id>-errors.csv` →
//!   `logs/output-errors.csv`. The header is the configured error columns; the
//!   interim rows are copied verbatim.
//!
//! Interim files are visited in ascending worker id, which restores the source
//! order the concurrent phase gave up. Each one is deleted as soon as it has
//! been folded. A missing interim file is an empty contribution, never an
//! error. A malformed row is recorded in the pass's [`RowErrorCollector`] and
//! skipped; the rest of the file and every later file are still merged.

use crate::config::ProcessLayout;
use crate::error::{RowError, RunError, RunResult};
use crate::io::csv::{interim_reader, open_for_write, row_writer};
use crate::worker::WorkerId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Collects recoverable merge problems for reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowErrorCollector {
    errors: Vec<RowError>,
}

impl RowErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, error: RowError) {
        self.errors.push(error);
    }

    /// Total number of recorded problems.
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[RowError] {
        &self.errors
    }

    /// The most recently recorded problem.
    pub fn last_error(&self) -> Option<&RowError> {
        self.errors.last()
    }

    /// Print all errors to stderr.
    pub fn print_errors(&self) {
        for err in &self.errors {
            eprintln!("{err}");
        }
    }

    /// Export errors to JSON format.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.errors)
    }

    /// Write errors to a file in JSON format.
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let json = self.to_json().map_err(io::Error::other)?;
        fs::write(path, json)
    }
}

impl fmt::Display for RowErrorCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RowErrorCollector({} errors)", self.error_count())
    }
}

/// Outcome of one aggregation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    /// Aggregate file this pass wrote.
    pub path: PathBuf,
    /// Interim files found and folded.
    pub files_merged: usize,
    /// Rows appended after the header.
    pub rows_written: usize,
    /// Whether the aggregate received a header row.
    pub header_written: bool,
    /// Workers whose interim success file held no row beyond its first.
    ///
    /// Such a file contributes nothing, exactly like a missing file; it is
    /// listed here so callers can tell the two apart.
    pub header_only: Vec<usize>,
    pub errors: RowErrorCollector,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Pass {
    Success,
    Errors,
}

impl Pass {
    fn interim(self, layout: &ProcessLayout, id: WorkerId) -> PathBuf {
        match self {
            Pass::Success => layout.interim_success(id),
            Pass::Errors => layout.interim_errors(id),
        }
    }

    fn has_header(self) -> bool {
        self == Pass::Success
    }

    /// Only the success pass reports to the console.
    fn warns(self) -> bool {
        self == Pass::Success
    }
}

/// Sequential fan-in over the interim files of one run.
pub struct Aggregator<'a> {
    layout: &'a ProcessLayout,
}

impl<'a> Aggregator<'a> {
    pub fn new(layout: &'a ProcessLayout) -> Self {
        Self { layout }
    }

    /// Truncate `out/<source>` and fold `out/1.csv ..= out/<workers>.csv` into it.
    ///
    /// # Errors
    /// [`RunError::Io`] or [`RunError::Csv`] if the aggregate file cannot be
    /// created or written. Problems with interim files are never fatal.
    pub fn merge_success(&self, workers: usize) -> RunResult<MergeReport> {
        let path = self.layout.aggregate_success();
        let mut wtr = create_aggregate(&path)?;
        let mut report = MergeReport {
            path,
            ..Default::default()
        };
        self.fold(Pass::Success, workers, &mut wtr, &mut report)?;
        wtr.flush().map_err(|e| RunError::io(&report.path, e))?;
        Ok(report)
    }

    /// Truncate `logs/output-errors.csv`, write `error_header`, and fold
    /// `logs/1-errors.csv ..= logs/<workers>-errors.csv` into it.
    ///
    /// # Errors
    /// [`RunError::Io`] or [`RunError::Csv`] if the aggregate file cannot be
    /// created or written. Problems with interim files are never fatal.
    pub fn merge_errors<S: AsRef<str>>(
        &self,
        workers: usize,
        error_header: &[S],
    ) -> RunResult<MergeReport> {
        let path = self.layout.aggregate_errors();
        let mut wtr = create_aggregate(&path)?;
        wtr.write_record(error_header.iter().map(|c| AsRef::<str>::as_ref(c)))
            .map_err(|e| RunError::csv(&path, e))?;
        let mut report = MergeReport {
            path,
            header_written: true,
            ..Default::default()
        };
        self.fold(Pass::Errors, workers, &mut wtr, &mut report)?;
        wtr.flush().map_err(|e| RunError::io(&report.path, e))?;
        Ok(report)
    }

    fn fold<W: Write>(
        &self,
        pass: Pass,
        workers: usize,
        wtr: &mut csv::Writer<W>,
        report: &mut MergeReport,
    ) -> RunResult<()> {
        for id in WorkerId::range(workers) {
            let interim = pass.interim(self.layout, id);
            let file = match File::open(&interim) {
                Ok(f) => f,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    note(pass, report, RowError::file(id, format!("open {}: {e}", interim.display())));
                    continue;
                }
            };

            let mut rdr = interim_reader(file);
            let mut records: u64 = 0;
            for rec in rdr.records() {
                records += 1;
                let first = records == 1;
                match rec {
                    Ok(rec) => {
                        if first && pass.has_header() {
                            if report.header_written {
                                continue;
                            }
                            report.header_written = true;
                        } else {
                            report.rows_written += 1;
                        }
                        wtr.write_record(&rec)
                            .map_err(|e| RunError::csv(&report.path, e))?;
                    }
                    Err(e) => {
                        let line = e.position().map_or(records, |p| p.line());
                        let stop = e.is_io_error();
                        note(pass, report, RowError::row(id, line, e.to_string()));
                        if stop {
                            break;
                        }
                    }
                }
            }
            drop(rdr);

            if pass.has_header() && records <= 1 {
                report.header_only.push(id.raw());
            }
            report.files_merged += 1;

            if let Err(e) = fs::remove_file(&interim) {
                note(pass, report, RowError::file(id, format!("remove {}: {e}", interim.display())));
            }
        }
        Ok(())
    }
}

fn create_aggregate(path: &Path) -> RunResult<csv::Writer<BufWriter<File>>> {
    let f = open_for_write(path, false).map_err(|e| RunError::io(path, e))?;
    Ok(row_writer(BufWriter::new(f)))
}

fn note(pass: Pass, report: &mut MergeReport, error: RowError) {
    if pass.warns() {
        tracing::warn!(file = %report.path.display(), "skipped while merging: {error}");
    }
    report.errors.add(error);
}
