//! Run configuration and the on-disk layout derived from it.
//!
//! A [`RunConfig`] is an explicit value handed to [`Job::new`](crate::Job::new).
//! It is validated atomically: [`RunConfig::validate`] returns a single
//! [`ConfigError`] naming every problem, so a caller fixes its configuration in
//! one pass instead of discovering the missing fields one failure at a time.
//!
//! # Usage
//!
//! ```no_run
//! use csvfan::config::{Concurrency, RunConfig};
//!
//! let config = RunConfig::new("/data/run-42", "orders.csv")
//!     .with_required_columns(["id", "amount"])
//!     .with_error_columns(["id", "error"])
//!     .with_workers(8)
//!     .with_concurrency(Concurrency::Bounded(4));
//! config.validate()?;
//! # Ok::<(), csvfan::error::ConfigError>(())
//! ```
//!
//! Configurations can also be loaded from JSON:
//!
//! ```json
//! {
//!   "base_dir": "/data/run-42",
//!   "source_filename": "orders.csv",
//!   "required_columns": ["id", "amount"],
//!   "error_columns": ["id", "error"],
//!   "workers": 8,
//!   "concurrency": { "bounded": 4 }
//! }
//! ```

use crate::error::ConfigError;
use crate::worker::WorkerId;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// How many partitions may be processed at the same time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Concurrency {
    /// One thread per partition; every partition runs simultaneously.
    ///
    /// The pool gets a dedicated OS thread for each partition, so a run with
    /// thousands of workers spawns thousands of threads. Use
    /// [`Concurrency::Bounded`] or [`Concurrency::Auto`] to cap large fan-outs.
    #[default]
    Unbounded,
    /// At most `n` partitions in flight.
    Bounded(usize),
    /// At most one partition per logical CPU.
    Auto,
}

impl Concurrency {
    /// Number of pool threads for a run with `partitions` partitions.
    ///
    /// Always at least 1 so the pool can be built even for empty runs.
    pub fn threads_for(&self, partitions: usize) -> usize {
        let cap = match *self {
            Concurrency::Unbounded => partitions,
            Concurrency::Bounded(n) => n,
            Concurrency::Auto => num_cpus::get(),
        };
        cap.min(partitions).max(1)
    }
}

/// Everything a run needs to know up front.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Directory holding the `in/`, `out/` and `logs/` subdirectories.
    pub base_dir: PathBuf,
    /// File name of the source dataset inside `in/`; also the name of the
    /// aggregate success file inside `out/`.
    pub source_filename: String,
    /// Columns that must be present in the source header.
    pub required_columns: Vec<String>,
    /// Header row of the aggregate error file.
    pub error_columns: Vec<String>,
    /// Requested worker count; clamped to the number of data rows.
    pub workers: usize,
    /// Cap on simultaneous partitions.
    pub concurrency: Concurrency,
}

impl RunConfig {
    pub fn new(base_dir: impl Into<PathBuf>, source_filename: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            source_filename: source_filename.into(),
            workers: 1,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_required_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_error_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.error_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: Concurrency) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Load a configuration from a JSON file.
    ///
    /// Missing keys fall back to their defaults; call [`validate`](Self::validate)
    /// (or hand the value to [`Job::new`](crate::Job::new)) to check it.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or is not valid JSON.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
        let config = serde_json::from_reader(BufReader::new(f))
            .with_context(|| format!("parse run configuration {}", path.display()))?;
        Ok(config)
    }

    /// Check every precondition at once.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] listing every missing or invalid setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();
        if self.base_dir.as_os_str().is_empty() {
            problems.push("base_dir must be set".to_string());
        }
        if self.source_filename.is_empty() {
            problems.push("source_filename must be set".to_string());
        }
        if self.required_columns.is_empty() {
            problems.push("required_columns must list at least one column".to_string());
        }
        if self.error_columns.is_empty() {
            problems.push("error_columns must list at least one column".to_string());
        }
        if self.workers == 0 {
            problems.push("workers must be at least 1".to_string());
        }
        if self.concurrency == Concurrency::Bounded(0) {
            problems.push("bounded concurrency must allow at least 1 partition".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError { problems })
        }
    }

    /// The directory layout this configuration describes.
    pub fn layout(&self) -> ProcessLayout {
        ProcessLayout::new(&self.base_dir, &self.source_filename)
    }
}

/// Paths of every file a run reads or writes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessLayout {
    base_dir: PathBuf,
    source_filename: String,
}

impl ProcessLayout {
    pub fn new(base_dir: impl Into<PathBuf>, source_filename: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            source_filename: source_filename.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn source_filename(&self) -> &str {
        &self.source_filename
    }

    pub fn in_dir(&self) -> PathBuf {
        self.base_dir.join("in")
    }

    pub fn out_dir(&self) -> PathBuf {
        self.base_dir.join("out")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// `in/<source>`
    pub fn source(&self) -> PathBuf {
        self.in_dir().join(&self.source_filename)
    }

    /// `out/<id>.csv`
    pub fn interim_success(&self, id: WorkerId) -> PathBuf {
        self.out_dir().join(format!("{id}.csv"))
    }

    /// `out/<source>`
    pub fn aggregate_success(&self) -> PathBuf {
        self.out_dir().join(&self.source_filename)
    }

    /// `logs/<id>-log.txt`
    pub fn worker_log(&self, id: WorkerId) -> PathBuf {
        self.logs_dir().join(format!("{id}-log.txt"))
    }

    /// `logs/<id>-errors.csv`
    pub fn interim_errors(&self, id: WorkerId) -> PathBuf {
        self.logs_dir().join(format!("{id}-errors.csv"))
    }

    /// `logs/output-errors.csv`
    pub fn aggregate_errors(&self) -> PathBuf {
        self.logs_dir().join("output-errors.csv")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> RunConfig {
        RunConfig::new("/tmp/run", "data.csv")
            .with_required_columns(["id"])
            .with_error_columns(["id", "error"])
            .with_workers(4)
    }

    #[test]
    fn valid_config_passes() {
        assert_eq!(valid().validate(), Ok(()));
    }

    #[test]
    fn default_config_reports_every_missing_field() {
        let err = RunConfig::default().validate().unwrap_err();
        assert_eq!(err.problems.len(), 5);
        let msg = err.to_string();
        for field in ["base_dir", "source_filename", "required_columns", "error_columns", "workers"] {
            assert!(msg.contains(field), "missing {field} in {msg}");
        }
    }

    #[test]
    fn bounded_zero_is_rejected() {
        let err = valid()
            .with_concurrency(Concurrency::Bounded(0))
            .validate()
            .unwrap_err();
        assert_eq!(err.problems.len(), 1);
    }

    #[test]
    fn threads_are_clamped_to_partitions() {
        assert_eq!(Concurrency::Unbounded.threads_for(7), 7);
        assert_eq!(Concurrency::Bounded(3).threads_for(7), 3);
        assert_eq!(Concurrency::Bounded(30).threads_for(7), 7);
        assert_eq!(Concurrency::Unbounded.threads_for(0), 1);
        assert!(Concurrency::Auto.threads_for(1) == 1);
    }

    #[test]
    fn layout_paths() {
        let layout = valid().layout();
        let id = WorkerId::new(3);
        assert_eq!(layout.source(), PathBuf::from("/tmp/run/in/data.csv"));
        assert_eq!(layout.interim_success(id), PathBuf::from("/tmp/run/out/3.csv"));
        assert_eq!(layout.aggregate_success(), PathBuf::from("/tmp/run/out/data.csv"));
        assert_eq!(layout.worker_log(id), PathBuf::from("/tmp/run/logs/3-log.txt"));
        assert_eq!(layout.interim_errors(id), PathBuf::from("/tmp/run/logs/3-errors.csv"));
        assert_eq!(layout.aggregate_errors(), PathBuf::from("/tmp/run/logs/output-errors.csv"));
    }

    #[test]
    fn loads_from_json() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("run.json");
        std::fs::write(
            &path,
            r#"{
                "base_dir": "/data",
                "source_filename": "orders.csv",
                "required_columns": ["id"],
                "error_columns": ["id", "error"],
                "workers": 3,
                "concurrency": { "bounded": 2 }
            }"#,
        )?;
        let config = RunConfig::from_json_file(&path)?;
        assert_eq!(config.workers, 3);
        assert_eq!(config.concurrency, Concurrency::Bounded(2));
        assert_eq!(config.layout().source(), PathBuf::from("/data/in/orders.csv"));
        Ok(())
    }

    #[test]
    fn only_unbounded_follows_a_large_fan_out() {
        assert_eq!(Concurrency::Unbounded.threads_for(5000), 5000);
        assert_eq!(Concurrency::Bounded(16).threads_for(5000), 16);
        assert!(Concurrency::Auto.threads_for(5000) <= num_cpus::get());
    }

    #[test]
    fn json_defaults_to_unbounded() -> Result<()> {
        let config: RunConfig = serde_json::from_str(r#"{ "source_filename": "a.csv" }"#)?;
        assert_eq!(config.concurrency, Concurrency::Unbounded);
        assert!(config.validate().is_err());
        Ok(())
    }
}
