//! Per-worker output: free-text logs, interim success rows, interim error rows.
//!
//! Transforms write through a [`Sink`] (or a [`WorkerSink`] bound to one id).
//! Every file is keyed by worker id, so concurrent workers never share a file:
//!
//! | method                | file                    |
//! |-----------------------|-------------------------|
//! | [`Sink::write_log`]         | `logs/<id>-log.txt`     |
//! | [`Sink::write_success_row`] | `out/<id>.csv`          |
//! | [`Sink::write_error_row`]   | `logs/<id>-errors.csv`  |
//!
//! `append == false` truncates the file first. Interim success files are
//! expected to start with a header row; interim error files carry none.

use crate::config::ProcessLayout;
use crate::header::Header;
use crate::io::csv::{open_for_write, write_rows};
use crate::worker::WorkerId;
use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

/// Writer for every worker's interim files. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Sink {
    layout: Arc<ProcessLayout>,
}

impl Sink {
    pub fn new(layout: ProcessLayout) -> Self {
        Self {
            layout: Arc::new(layout),
        }
    }

    pub fn layout(&self) -> &ProcessLayout {
        &self.layout
    }

    /// Bind this sink to one worker.
    pub fn worker(&self, id: WorkerId) -> WorkerSink {
        WorkerSink {
            sink: self.clone(),
            id,
        }
    }

    /// Write free text to `logs/<id>-log.txt`.
    ///
    /// # Errors
    /// Returns an error if the log file cannot be opened or written.
    pub fn write_log(&self, id: WorkerId, text: &str, append: bool) -> Result<()> {
        let path = self.layout.worker_log(id);
        let mut f = open_for_write(&path, append).with_context(|| format!("open {}", path.display()))?;
        f.write_all(text.as_bytes())
            .with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    /// Write one row to the interim success file `out/<id>.csv`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or the row not written.
    pub fn write_success_row(&self, id: WorkerId, row: &[String], append: bool) -> Result<()> {
        write_row(&self.layout.interim_success(id), row, append)
    }

    /// Write one row to the interim error file `logs/<id>-errors.csv`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or the row not written.
    pub fn write_error_row(&self, id: WorkerId, row: &[String], append: bool) -> Result<()> {
        write_row(&self.layout.interim_errors(id), row, append)
    }
}

fn write_row(path: &Path, row: &[String], append: bool) -> Result<()> {
    let f = open_for_write(path, append).with_context(|| format!("open {}", path.display()))?;
    write_rows(f, [row]).with_context(|| format!("write CSV row to {}", path.display()))?;
    Ok(())
}

/// A [`Sink`] bound to one worker id.
#[derive(Clone, Debug)]
pub struct WorkerSink {
    sink: Sink,
    id: WorkerId,
}

impl WorkerSink {
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Truncate the worker log and write `text`.
    pub fn start_log(&self, text: &str) -> Result<()> {
        self.sink.write_log(self.id, text, false)
    }

    /// Append `text` to the worker log.
    pub fn log(&self, text: &str) -> Result<()> {
        self.sink.write_log(self.id, text, true)
    }

    /// Truncate the interim success file and write `header` as its first row.
    pub fn start_success(&self, header: &Header) -> Result<()> {
        self.sink.write_success_row(self.id, header.columns(), false)
    }

    /// Append a row to the interim success file.
    pub fn success(&self, row: &[String]) -> Result<()> {
        self.sink.write_success_row(self.id, row, true)
    }

    /// Append a row to the interim error file.
    pub fn error(&self, row: &[String]) -> Result<()> {
        self.sink.write_error_row(self.id, row, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::csv::read_rows;

    fn sink(dir: &Path) -> Result<Sink> {
        std::fs::create_dir_all(dir.join("out"))?;
        std::fs::create_dir_all(dir.join("logs"))?;
        Ok(Sink::new(ProcessLayout::new(dir, "data.csv")))
    }

    fn row(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn success_rows_append_after_header() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let sink = sink(tmp.path())?;
        let w = sink.worker(WorkerId::new(2));
        let header: Header = ["id", "name"].into_iter().collect();
        w.start_success(&header)?;
        w.success(&row(&["1", "a"]))?;
        w.success(&row(&["2", "b, c"]))?;

        let rows = read_rows(tmp.path().join("out/2.csv"))?;
        assert_eq!(rows, vec![row(&["id", "name"]), row(&["1", "a"]), row(&["2", "b, c"])]);
        Ok(())
    }

    #[test]
    fn truncating_write_replaces_contents() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let sink = sink(tmp.path())?;
        let id = WorkerId::new(1);
        sink.write_error_row(id, &row(&["1", "old"]), true)?;
        sink.write_error_row(id, &row(&["2", "new"]), false)?;
        assert_eq!(read_rows(tmp.path().join("logs/1-errors.csv"))?, vec![row(&["2", "new"])]);
        Ok(())
    }

    #[test]
    fn log_appends_and_truncates() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let sink = sink(tmp.path())?;
        let w = sink.worker(WorkerId::RUN);
        w.start_log("first\n")?;
        w.log("second\n")?;
        let path = tmp.path().join("logs/0-log.txt");
        assert_eq!(std::fs::read_to_string(&path)?, "first\nsecond\n");
        w.start_log("again\n")?;
        assert_eq!(std::fs::read_to_string(&path)?, "again\n");
        Ok(())
    }

    #[test]
    fn missing_directory_is_an_error() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let sink = Sink::new(ProcessLayout::new(tmp.path().join("nope"), "data.csv"));
        let err = sink.worker(WorkerId::FIRST).error(&row(&["x"])).unwrap_err();
        assert!(format!("{err:?}").contains("errors.csv"));
        Ok(())
    }
}
