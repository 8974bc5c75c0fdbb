//! # csvfan
//!
//! Split one CSV dataset into contiguous partitions, run a caller-supplied
//! transform on every partition concurrently, wait for all of them, then fold
//! the per-worker outputs back into one success file and one error file.
//!
//! ## Key Features
//!
//! - **Order-preserving fan-out** - partition *k* holds the rows right after
//!   partition *k-1*, and aggregation concatenates worker outputs in id order
//! - **Join barrier** - [`Job::run`] returns only after every transform has finished
//! - **Bounded or unbounded concurrency** - pick a pool size with [`Concurrency`]
//! - **Failure isolation** - a transform that errors or panics is reported, the run continues
//! - **Tolerant merging** - malformed interim rows are skipped and reported, not fatal
//!
//! ## Directory layout
//!
//! Every run works under one base directory:
//!
//! ```text
//! <base>/in/<source>.csv        input, read only
//! <base>/out/<id>.csv           interim success rows per worker, deleted after merge
//! <base>/out/<source>.csv       aggregate success file
//! <base>/logs/<id>-log.txt      free-text log per worker (0 is the run itself)
//! <base>/logs/<id>-errors.csv   interim error rows per worker, deleted after merge
//! <base>/logs/output-errors.csv aggregate error file
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use csvfan::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let job = Job::new(
//!     RunConfig::new("/data/run-42", "orders.csv")
//!         .with_required_columns(["id"])
//!         .with_error_columns(["id", "error"])
//!         .with_workers(4)
//!         .with_concurrency(Concurrency::Auto),
//! )?;
//! let sink = job.sink();
//!
//! let report = job.run(&|id: WorkerId, header: &Header, rows: Vec<Row>, _: &HeaderIndex| -> anyhow::Result<()> {
//!     let out = sink.worker(id);
//!     out.start_success(header)?;
//!     for row in &rows {
//!         out.success(row)?;
//!     }
//!     Ok(())
//! })?;
//! assert!(report.is_clean());
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - run configuration and the on-disk layout
//! - [`partition`] - row counting plan and the streaming partitioner
//! - [`dispatch`] - the worker pool and the transform trait
//! - [`aggregate`] - folding interim files into the aggregate outputs
//! - [`sink`] - per-worker log, success and error writers
//! - [`job`] - the end-to-end entry operation
//! - [`metrics`] - counters and timings collected for each run
//! - [`testing`] - fixtures for exercising transforms against a temp directory

pub mod aggregate;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod header;
pub mod io;
pub mod job;
pub mod metrics;
pub mod partition;
pub mod sink;
pub mod testing;
pub mod worker;

pub use aggregate::{Aggregator, MergeReport, RowErrorCollector};
pub use config::{Concurrency, ProcessLayout, RunConfig};
pub use dispatch::{DispatchOutcome, Dispatcher, PartitionTransform, WorkerFailure};
pub use error::{ConfigError, RowError, RunError, RunResult};
pub use header::{Header, HeaderIndex, Row};
pub use io::csv::count_data_rows;
pub use job::{Job, RunReport};
pub use metrics::MetricsCollector;
pub use partition::{Partition, PartitionPlan, Partitioner};
pub use sink::{Sink, WorkerSink};
pub use worker::WorkerId;
