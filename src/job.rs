//! The entry operation: count, partition, dispatch, join, aggregate.

use crate::aggregate::{Aggregator, MergeReport};
use crate::config::{ProcessLayout, RunConfig};
use crate::dispatch::{Dispatcher, PartitionTransform, WorkerFailure};
use crate::error::{RunError, RunResult};
use crate::header::Header;
use crate::io::csv::count_data_rows;
use crate::metrics::MetricsCollector;
use crate::partition::{PartitionPlan, Partitioner};
use crate::sink::{Sink, WorkerSink};
use crate::worker::WorkerId;
use std::fs::{self, File};
use std::io::{BufReader, ErrorKind};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A validated run configuration, ready to process its source.
///
/// ```no_run
/// use csvfan::{Job, RunConfig, WorkerId, Header, HeaderIndex, Row};
///
/// # fn main() -> anyhow::Result<()> {
/// let config = RunConfig::new("/data/run-42", "orders.csv")
///     .with_required_columns(["id", "amount"])
///     .with_error_columns(["id", "error"])
///     .with_workers(8);
/// let job = Job::new(config)?;
/// let sink = job.sink();
///
/// let report = job.run(&|id: WorkerId, header: &Header, rows: Vec<Row>, index: &HeaderIndex| -> anyhow::Result<()> {
///     let out = sink.worker(id);
///     out.start_success(header)?;
///     let amount = index.get("amount").expect("validated");
///     for row in rows {
///         if row[amount].parse::<f64>().is_ok() {
///             out.success(&row)?;
///         } else {
///             out.error(&[row[0].clone(), "amount is not a number".into()])?;
///         }
///     }
///     Ok(())
/// })?;
/// println!("{} rows merged", report.success_rows());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Job {
    config: RunConfig,
    sink: Sink,
}

impl Job {
    /// Validate `config` and bind a job to it.
    ///
    /// # Errors
    /// [`RunError::Config`] listing every problem with `config`.
    pub fn new(config: RunConfig) -> RunResult<Self> {
        config.validate()?;
        let sink = Sink::new(config.layout());
        Ok(Self { config, sink })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn layout(&self) -> &ProcessLayout {
        self.sink.layout()
    }

    /// The sink transforms should write their interim files through.
    pub fn sink(&self) -> Sink {
        self.sink.clone()
    }

    /// Process the source end to end.
    ///
    /// Returns only after every partition's transform has finished and both
    /// aggregation passes are done. A transform failure does not abort the run;
    /// it is listed in [`RunReport::failures`].
    ///
    /// # Errors
    /// Fatal conditions only: the source cannot be opened or read, a required
    /// column is missing from its header, the worker pool cannot be built, or an
    /// aggregate file cannot be written. Nothing is cleaned up on failure.
    pub fn run<T>(&self, transform: &T) -> RunResult<RunReport>
    where
        T: PartitionTransform + ?Sized,
    {
        let started = Instant::now();
        let metrics = MetricsCollector::new();
        metrics.record_start();

        let layout = self.layout();
        let source_path = layout.source();
        let mut source = File::open(&source_path).map_err(|e| RunError::io(&source_path, e))?;
        let total_rows = count_data_rows(&mut source).map_err(|e| RunError::csv(&source_path, e))?;
        let plan = PartitionPlan::new(total_rows, self.config.workers);
        metrics.set_counter("rows_counted", total_rows);
        metrics.set_gauge("effective_workers", plan.effective as f64);

        let partitioner = Partitioner::new(
            BufReader::new(source),
            &source_path,
            plan,
            &self.config.required_columns,
        )?;
        let header = Arc::clone(partitioner.header());
        let index = Arc::clone(partitioner.index());

        for dir in [layout.out_dir(), layout.logs_dir()] {
            fs::create_dir_all(&dir).map_err(|e| RunError::io(&dir, e))?;
        }
        let run_log = self.sink.worker(WorkerId::RUN);
        write_run_log(&run_log, "Start All Records: \n\n", false);
        tracing::info!(
            source = %source_path.display(),
            rows = total_rows,
            requested = plan.requested,
            workers = plan.effective,
            partition_size = plan.partition_size,
            "starting run"
        );

        let outcome = Dispatcher::new(self.config.concurrency)
            .with_sink(self.sink.clone())
            .run(partitioner, plan.effective, Arc::clone(&header), index, transform)?;
        let dispatched = outcome.dispatched();
        metrics.set_counter("partitions_dispatched", dispatched as u64);
        metrics.set_counter("worker_failures", outcome.failures.len() as u64);
        for rows in &outcome.partition_rows {
            metrics.record_value("partition_rows", *rows as f64);
        }

        let aggregator = Aggregator::new(layout);
        let success = if dispatched > 0 {
            Some(aggregator.merge_success(dispatched)?)
        } else {
            remove_stale_aggregate(&layout.aggregate_success())?;
            None
        };
        let errors = aggregator.merge_errors(dispatched, &self.config.error_columns)?;

        let success_rows = success.as_ref().map_or(0, |s| s.rows_written);
        let row_errors = success.as_ref().map_or(0, |s| s.errors.error_count()) + errors.errors.error_count();
        metrics.set_counter("success_rows_merged", success_rows as u64);
        metrics.set_counter("error_rows_merged", errors.rows_written as u64);
        metrics.set_counter("row_errors", row_errors as u64);
        metrics.record_end();

        let elapsed = started.elapsed();
        write_run_log(
            &run_log,
            &format!(
                "Finished All Concurrent Records \nTotal Execution Time: {} second(s) \n\n\n\n",
                elapsed.as_secs()
            ),
            true,
        );
        tracing::info!(
            workers = dispatched,
            success_rows,
            error_rows = errors.rows_written,
            row_errors,
            failures = outcome.failures.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "run finished"
        );

        Ok(RunReport {
            plan,
            header: Header::clone(&header),
            partition_rows: outcome.partition_rows,
            failures: outcome.failures,
            success,
            errors,
            metrics,
            elapsed,
        })
    }
}

/// A zero-row run has no success aggregate; one left by an earlier run must go.
fn remove_stale_aggregate(path: &Path) -> RunResult<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "removed stale success aggregate");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(RunError::io(path, e)),
    }
}

fn write_run_log(log: &WorkerSink, text: &str, append: bool) {
    let result = if append { log.log(text) } else { log.start_log(text) };
    if let Err(e) = result {
        tracing::warn!("could not write run log: {e:#}");
    }
}

/// Everything a finished run has to say about itself.
#[derive(Clone, Debug)]
pub struct RunReport {
    pub plan: PartitionPlan,
    pub header: Header,
    /// Rows handed to each worker, in worker-id order.
    pub partition_rows: Vec<usize>,
    /// Workers whose transform returned an error or panicked.
    pub failures: Vec<WorkerFailure>,
    /// `None` when the source had no data rows and nothing was dispatched.
    pub success: Option<MergeReport>,
    pub errors: MergeReport,
    pub metrics: MetricsCollector,
    pub elapsed: Duration,
}

impl RunReport {
    /// Number of workers that ran.
    pub fn workers(&self) -> usize {
        self.partition_rows.len()
    }

    /// Rows in the aggregate success file, header excluded.
    pub fn success_rows(&self) -> usize {
        self.success.as_ref().map_or(0, |s| s.rows_written)
    }

    /// Rows in the aggregate error file, header excluded.
    pub fn error_rows(&self) -> usize {
        self.errors.rows_written
    }

    /// Recoverable problems met across both aggregation passes.
    pub fn row_errors(&self) -> usize {
        self.success.as_ref().map_or(0, |s| s.errors.error_count()) + self.errors.errors.error_count()
    }

    /// No worker failed and nothing was skipped while merging.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.row_errors() == 0
    }
}
