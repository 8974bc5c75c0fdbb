//! Fan-out of partitions to workers, and the join barrier behind it.
//!
//! Every partition runs its transform as one task on a rayon pool built for
//! the run and sized by [`Concurrency`]. The pool's `scope` is the barrier:
//! [`Dispatcher::run`] returns only after every spawned task has finished,
//! whether it succeeded, returned an error or panicked.

use crate::config::Concurrency;
use crate::error::RunResult;
use crate::header::{Header, HeaderIndex, Row};
use crate::partition::Partition;
use crate::sink::Sink;
use crate::worker::WorkerId;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError};

/// Caller-supplied work run once per partition.
///
/// Implemented for every `Fn(WorkerId, &Header, Vec<Row>, &HeaderIndex) -> anyhow::Result<()>`
/// that is `Send + Sync`, so a closure is usually all that is needed. The
/// transform owns its partition's rows; the header and index are shared
/// read-only with every other worker.
pub trait PartitionTransform: Send + Sync {
    fn transform(
        &self,
        worker_id: WorkerId,
        header: &Header,
        rows: Vec<Row>,
        index: &HeaderIndex,
    ) -> Result<()>;
}

impl<F> PartitionTransform for F
where
    F: Fn(WorkerId, &Header, Vec<Row>, &HeaderIndex) -> Result<()> + Send + Sync,
{
    fn transform(
        &self,
        worker_id: WorkerId,
        header: &Header,
        rows: Vec<Row>,
        index: &HeaderIndex,
    ) -> Result<()> {
        self(worker_id, header, rows, index)
    }
}

/// A worker whose transform returned an error or panicked.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerFailure {
    pub worker_id: usize,
    pub rows: usize,
    pub message: String,
    pub panicked: bool,
}

/// What the dispatcher did once every task has joined.
#[derive(Clone, Debug, Default)]
pub struct DispatchOutcome {
    /// Rows handed to each worker, in worker-id order.
    pub partition_rows: Vec<usize>,
    pub failures: Vec<WorkerFailure>,
}

impl DispatchOutcome {
    /// Number of partitions dispatched; also the highest worker id used.
    pub fn dispatched(&self) -> usize {
        self.partition_rows.len()
    }
}

/// Fans partitions out to a dedicated rayon pool and waits for all of them.
pub struct Dispatcher {
    pub concurrency: Concurrency,
    /// Receives a failure note for each failed worker.
    pub sink: Option<Sink>,
}

impl Dispatcher {
    pub fn new(concurrency: Concurrency) -> Self {
        Self {
            concurrency,
            sink: None,
        }
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Sink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Run `transform` on every partition `partitions` yields.
    ///
    /// Each partition is spawned as soon as the iterator produces it; `expected`
    /// sizes the pool. The call returns only after every spawned task has
    /// finished, even when the iterator fails part-way; that failure is then
    /// returned.
    ///
    /// # Errors
    /// The first error the iterator yields, or
    /// [`RunError::ThreadPool`](crate::error::RunError::ThreadPool).
    pub fn run<I, T>(
        &self,
        partitions: I,
        expected: usize,
        header: Arc<Header>,
        index: Arc<HeaderIndex>,
        transform: &T,
    ) -> RunResult<DispatchOutcome>
    where
        I: Iterator<Item = RunResult<Partition>> + Send,
        T: PartitionTransform + ?Sized,
    {
        let threads = self.concurrency.threads_for(expected);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("csvfan-worker-{i}"))
            .build()?;

        let failures: Mutex<Vec<WorkerFailure>> = Mutex::new(Vec::new());
        let mut partition_rows = Vec::with_capacity(expected);

        // scope() is the join barrier: it returns once every spawned task is done.
        let scanned: RunResult<()> = pool.scope(|s| {
            for part in partitions {
                let part = part?;
                let Partition { worker_id, rows } = part;
                partition_rows.push(rows.len());
                tracing::debug!(worker = %worker_id, rows = rows.len(), "dispatching partition");

                let header = Arc::clone(&header);
                let index = Arc::clone(&index);
                let failures = &failures;
                let sink = self.sink.as_ref();
                s.spawn(move |_| {
                    let n = rows.len();
                    let result = catch_unwind(AssertUnwindSafe(|| {
                        transform.transform(worker_id, &header, rows, &index)
                    }));
                    let failure = match result {
                        Ok(Ok(())) => None,
                        Ok(Err(e)) => Some((format!("{e:#}"), false)),
                        Err(payload) => Some((panic_message(payload.as_ref()), true)),
                    };
                    if let Some((message, panicked)) = failure {
                        record_failure(failures, sink, worker_id, n, message, panicked);
                    }
                });
            }
            Ok(())
        });
        scanned?;

        let mut failures = failures.into_inner().unwrap_or_else(PoisonError::into_inner);
        failures.sort_by_key(|f| f.worker_id);
        Ok(DispatchOutcome {
            partition_rows,
            failures,
        })
    }
}

fn record_failure(
    failures: &Mutex<Vec<WorkerFailure>>,
    sink: Option<&Sink>,
    worker_id: WorkerId,
    rows: usize,
    message: String,
    panicked: bool,
) {
    tracing::error!(worker = %worker_id, rows, panicked, "transform failed: {message}");
    if let Some(sink) = sink {
        let note = format!("\n\n\nTransform failed: {message}\n\n\n");
        if let Err(e) = sink.write_log(worker_id, &note, true) {
            tracing::warn!(worker = %worker_id, "could not write failure to worker log: {e:#}");
        }
    }
    failures
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(WorkerFailure {
            worker_id: worker_id.raw(),
            rows,
            message,
            panicked,
        });
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
