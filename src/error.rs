//! Error types for a partitioned CSV run.
//!
//! - [`ConfigError`] - every precondition the run configuration violates
//! - [`RunError`] - fatal conditions returned by [`crate::Job`]
//! - [`RowError`] - a recoverable problem met while merging interim files
//!
//! Fatal errors stop the run and are returned to the caller. Row errors never
//! propagate; they are accumulated in a
//! [`RowErrorCollector`](crate::aggregate::RowErrorCollector) and handed back
//! inside the [`MergeReport`](crate::aggregate::MergeReport).

use crate::worker::WorkerId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

// =============================================================================
// Configuration Errors
// =============================================================================

/// One or more required run settings are missing or invalid.
///
/// Validation is atomic: `problems` lists everything wrong with the
/// configuration rather than only the first issue found.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid run configuration: {}", .problems.join("; "))]
pub struct ConfigError {
    pub problems: Vec<String>,
}

// =============================================================================
// Run Errors (top-level)
// =============================================================================

/// Fatal conditions that abort a run.
#[derive(Debug, Error)]
pub enum RunError {
    /// Run configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A required column is absent from the source header.
    #[error("\"{0}\" column header missing from csv")]
    MissingColumn(String),

    /// The source or an aggregate file could not be opened, created or written.
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A CSV read or write failed while counting, partitioning or aggregating.
    #[error("{}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// The worker pool could not be built.
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl RunError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RunError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        RunError::Csv {
            path: path.into(),
            source,
        }
    }
}

/// Result type for run operations.
pub type RunResult<T> = Result<T, RunError>;

// =============================================================================
// Row Errors (recoverable)
// =============================================================================

/// A recoverable problem met while folding one worker's interim file.
///
/// `line` is the 1-based line within the interim file when the problem is tied
/// to a row, `None` for file-level problems (open or delete failures).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("worker {worker_id}{}: {message}", line_suffix(.line))]
pub struct RowError {
    pub worker_id: usize,
    pub line: Option<u64>,
    pub message: String,
}

impl RowError {
    pub fn row(worker_id: WorkerId, line: u64, message: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.raw(),
            line: Some(line),
            message: message.into(),
        }
    }

    pub fn file(worker_id: WorkerId, message: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.raw(),
            line: None,
            message: message.into(),
        }
    }
}

fn line_suffix(line: &Option<u64>) -> String {
    line.map(|l| format!(" line {l}")).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_lists_every_problem() {
        let err = ConfigError {
            problems: vec!["base_dir must be set".into(), "source_filename must be set".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("base_dir"));
        assert!(msg.contains("source_filename"));
    }

    #[test]
    fn missing_column_names_the_column() {
        let err = RunError::MissingColumn("amount".into());
        assert_eq!(err.to_string(), "\"amount\" column header missing from csv");
    }

    #[test]
    fn config_error_converts_into_run_error() {
        let err: RunError = ConfigError { problems: vec!["workers must be at least 1".into()] }.into();
        assert!(matches!(err, RunError::Config(_)));
        assert!(err.to_string().contains("workers"));
    }

    #[test]
    fn row_error_display() {
        let row = RowError::row(WorkerId::new(3), 7, "bad field count");
        assert_eq!(row.to_string(), "worker 3 line 7: bad field count");
        let file = RowError::file(WorkerId::new(2), "permission denied");
        assert_eq!(file.to_string(), "worker 2: permission denied");
    }
}
