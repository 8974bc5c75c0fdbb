//! Throwaway run directories backed by [`tempfile`].

use crate::config::{ProcessLayout, RunConfig};
use crate::header::Row;
use crate::io::csv::{read_rows, write_rows};
use crate::worker::WorkerId;
use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A base directory with an `in/` subdirectory, deleted when dropped.
///
/// `out/` and `logs/` are left for the run to create, the same as in
/// production.
///
/// # Example
///
/// ```
/// use csvfan::testing::ProcessDirFixture;
///
/// # fn main() -> anyhow::Result<()> {
/// let dir = ProcessDirFixture::new("orders.csv")?;
/// dir.write_source(&["id", "amount"], &[vec!["1".to_string(), "3".to_string()]])?;
/// assert!(dir.layout().source().exists());
/// # Ok(())
/// # }
/// ```
pub struct ProcessDirFixture {
    temp_dir: TempDir,
    layout: ProcessLayout,
}

impl ProcessDirFixture {
    /// Create a fresh base directory for a source named `source_filename`.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary directory cannot be created.
    pub fn new(source_filename: &str) -> io::Result<Self> {
        let temp_dir = TempDir::new()?;
        let layout = ProcessLayout::new(temp_dir.path(), source_filename);
        fs::create_dir_all(layout.in_dir())?;
        Ok(Self { temp_dir, layout })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    #[must_use]
    pub fn layout(&self) -> &ProcessLayout {
        &self.layout
    }

    /// A one-worker configuration pointing at this directory that requires an
    /// `id` column and heads the error file with `id,error`.
    #[must_use]
    pub fn config(&self) -> RunConfig {
        RunConfig::new(self.layout.base_dir(), self.layout.source_filename())
            .with_required_columns(["id"])
            .with_error_columns(["id", "error"])
    }

    /// Write `header` followed by `rows` as the source dataset.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be written.
    pub fn write_source<S: AsRef<str>>(&self, header: &[S], rows: &[Row]) -> Result<()> {
        let path = self.layout.source();
        let f = File::create(&path).with_context(|| format!("create {}", path.display()))?;
        let header: Row = header.iter().map(|c| c.as_ref().to_string()).collect();
        write_rows(f, std::iter::once(&header).chain(rows))
            .with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    /// Write `contents` verbatim as the source dataset.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be written.
    pub fn write_source_raw(&self, contents: &str) -> io::Result<()> {
        fs::write(self.layout.source(), contents)
    }

    /// Write `contents` verbatim as worker `id`'s interim success file,
    /// creating `out/` if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_interim_success(&self, id: WorkerId, contents: &str) -> io::Result<()> {
        fs::create_dir_all(self.layout.out_dir())?;
        fs::write(self.layout.interim_success(id), contents)
    }

    /// Write `contents` verbatim as worker `id`'s interim error file,
    /// creating `logs/` if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_interim_errors(&self, id: WorkerId, contents: &str) -> io::Result<()> {
        fs::create_dir_all(self.layout.logs_dir())?;
        fs::write(self.layout.interim_errors(id), contents)
    }

    /// Every row of the aggregate success file, header included.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or malformed.
    pub fn read_success(&self) -> Result<Vec<Row>> {
        read_rows(self.layout.aggregate_success())
    }

    /// Every row of the aggregate error file, header included.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or malformed.
    pub fn read_errors(&self) -> Result<Vec<Row>> {
        read_rows(self.layout.aggregate_errors())
    }

    /// Contents of `logs/<id>-log.txt`.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read.
    pub fn read_log(&self, id: WorkerId) -> io::Result<String> {
        fs::read_to_string(self.layout.worker_log(id))
    }

    /// Files currently in `out/` and `logs/`, sorted, as paths relative to
    /// the base directory.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory exists but cannot be listed.
    pub fn output_files(&self) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for dir in [self.layout.out_dir(), self.layout.logs_dir()] {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };
            for entry in entries {
                let path = entry?.path();
                if let Ok(rel) = path.strip_prefix(self.path()) {
                    files.push(rel.to_path_buf());
                }
            }
        }
        files.sort();
        Ok(files)
    }
}
