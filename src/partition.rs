//! Slicing a CSV source into contiguous, ordered partitions.
//!
//! Partitioning is **row-count based** (header excluded) and happens in two
//! passes over the same handle:
//!
//! 1. [`count_data_rows`](crate::io::csv::count_data_rows) counts the data rows
//!    and rewinds the source.
//! 2. A [`Partitioner`] reads the source again, captures the header, and yields
//!    [`Partition`]s one at a time, so the caller can dispatch each one the
//!    moment it is cut.
//!
//! The sizes follow [`PartitionPlan`]: with `E` effective workers and `H` data
//! rows, the first `E - 1` partitions hold `floor(H / E)` rows each and the last
//! one absorbs the remainder.

use crate::error::{RunError, RunResult};
use crate::header::{Header, HeaderIndex, Row};
use crate::io::csv::source_reader;
use crate::worker::WorkerId;
use csv::StringRecord;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

/// Partition math for one run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PartitionPlan {
    /// Data rows in the source (header excluded).
    pub total_rows: u64,
    /// Worker count the caller asked for.
    pub requested: usize,
    /// `min(requested, total_rows)`; the number of partitions.
    pub effective: usize,
    /// Rows in every partition but the last; `0` only when `effective == 0`.
    pub partition_size: u64,
}

impl PartitionPlan {
    pub fn new(total_rows: u64, requested: usize) -> Self {
        let effective = usize::try_from(total_rows).map_or(requested, |t| t.min(requested));
        let partition_size = if effective == 0 {
            0
        } else {
            total_rows / effective as u64
        };
        Self {
            total_rows,
            requested,
            effective,
            partition_size,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.effective == 0
    }

    /// Expected row count of every partition, in worker-id order.
    pub fn sizes(&self) -> Vec<u64> {
        if self.is_empty() {
            return Vec::new();
        }
        let mut sizes = vec![self.partition_size; self.effective];
        let head = self.partition_size * (self.effective as u64 - 1);
        sizes[self.effective - 1] = self.total_rows - head;
        sizes
    }
}

/// Ordered data rows assigned to one worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Partition {
    pub worker_id: WorkerId,
    pub rows: Vec<Row>,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Second-pass reader that yields partitions as soon as they are complete.
///
/// Construction reads the header row, builds the [`HeaderIndex`] and checks the
/// required columns; a missing column fails here, before any partition exists.
pub struct Partitioner<R: Read> {
    reader: csv::Reader<R>,
    path: PathBuf,
    header: Arc<Header>,
    index: Arc<HeaderIndex>,
    plan: PartitionPlan,
    buffer: Vec<Row>,
    rows_seen: u64,
    worker_id: WorkerId,
    done: bool,
}

impl<R: Read> Partitioner<R> {
    /// Read the header from `source` and validate `required` against it.
    ///
    /// `path` is only used to label errors.
    ///
    /// # Errors
    /// [`RunError::Csv`] if the header cannot be read,
    /// [`RunError::MissingColumn`] if a required column is absent.
    pub fn new<S: AsRef<str>>(
        source: R,
        path: impl Into<PathBuf>,
        plan: PartitionPlan,
        required: &[S],
    ) -> RunResult<Self> {
        let path = path.into();
        let mut reader = source_reader(source);
        let mut record = StringRecord::new();
        let header: Header = if reader
            .read_record(&mut record)
            .map_err(|e| RunError::csv(&path, e))?
        {
            record.iter().collect()
        } else {
            Header::default()
        };
        let index = header.index();
        index.require(required)?;

        Ok(Self {
            reader,
            path,
            header: Arc::new(header),
            index: Arc::new(index),
            plan,
            buffer: Vec::with_capacity(usize::try_from(plan.partition_size).unwrap_or(0)),
            rows_seen: 0,
            worker_id: WorkerId::FIRST,
            done: false,
        })
    }

    pub fn header(&self) -> &Arc<Header> {
        &self.header
    }

    pub fn index(&self) -> &Arc<HeaderIndex> {
        &self.index
    }

    pub fn plan(&self) -> &PartitionPlan {
        &self.plan
    }

    fn cut(&mut self) -> Partition {
        let rows = std::mem::take(&mut self.buffer);
        let part = Partition {
            worker_id: self.worker_id,
            rows,
        };
        self.worker_id = self.worker_id.next();
        part
    }

    fn should_cut(&self) -> bool {
        let size = self.plan.partition_size;
        size > 0 && self.rows_seen % size == 0 && self.worker_id.raw() < self.plan.effective
    }
}

impl<R: Read> Iterator for Partitioner<R> {
    type Item = RunResult<Partition>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut record = StringRecord::new();
        loop {
            match self.reader.read_record(&mut record) {
                Ok(true) => {
                    self.buffer.push(record.iter().map(str::to_string).collect());
                    self.rows_seen += 1;
                    if self.should_cut() {
                        return Some(Ok(self.cut()));
                    }
                }
                Ok(false) => {
                    // Remainder goes to the last worker.
                    self.done = true;
                    if self.buffer.is_empty() {
                        return None;
                    }
                    return Some(Ok(self.cut()));
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(RunError::csv(&self.path, e)));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::csv::count_data_rows;
    use std::io::Cursor;

    fn source(rows: usize) -> Cursor<Vec<u8>> {
        let mut s = String::from("id,name,amount\n");
        for i in 1..=rows {
            s.push_str(&format!("{i},n{i},{}\n", i * 10));
        }
        Cursor::new(s.into_bytes())
    }

    fn partitions(rows: usize, workers: usize) -> anyhow::Result<(PartitionPlan, Vec<Partition>)> {
        let mut src = source(rows);
        let plan = PartitionPlan::new(count_data_rows(&mut src)?, workers);
        let parts = Partitioner::new(src, "test.csv", plan, &["id"])?
            .collect::<RunResult<Vec<_>>>()?;
        Ok((plan, parts))
    }

    #[test]
    fn plan_clamps_to_rows() {
        let plan = PartitionPlan::new(3, 10);
        assert_eq!(plan.effective, 3);
        assert_eq!(plan.partition_size, 1);
        assert_eq!(plan.sizes(), vec![1, 1, 1]);
    }

    #[test]
    fn plan_last_partition_takes_remainder() {
        let plan = PartitionPlan::new(10, 3);
        assert_eq!(plan.sizes(), vec![3, 3, 4]);
        assert_eq!(PartitionPlan::new(0, 4).sizes(), Vec::<u64>::new());
        assert!(PartitionPlan::new(0, 4).is_empty());
    }

    #[test]
    fn even_split() -> anyhow::Result<()> {
        let (plan, parts) = partitions(9, 3)?;
        assert_eq!(plan.effective, 3);
        let sizes: Vec<usize> = parts.iter().map(Partition::len).collect();
        assert_eq!(sizes, vec![3, 3, 3]);
        let ids: Vec<usize> = parts.iter().map(|p| p.worker_id.raw()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        Ok(())
    }

    #[test]
    fn uneven_split_matches_plan_and_keeps_order() -> anyhow::Result<()> {
        for (rows, workers) in [(10, 3), (7, 2), (5, 5), (11, 4), (1, 1), (100, 7)] {
            let (plan, parts) = partitions(rows, workers)?;
            let sizes: Vec<u64> = parts.iter().map(|p| p.len() as u64).collect();
            assert_eq!(sizes, plan.sizes(), "rows={rows} workers={workers}");
            assert!(parts.iter().all(|p| !p.is_empty()));

            let ids: Vec<String> = parts
                .iter()
                .flat_map(|p| p.rows.iter().map(|r| r[0].clone()))
                .collect();
            let expected: Vec<String> = (1..=rows).map(|i| i.to_string()).collect();
            assert_eq!(ids, expected);
        }
        Ok(())
    }

    #[test]
    fn more_workers_than_rows() -> anyhow::Result<()> {
        let (plan, parts) = partitions(3, 10)?;
        assert_eq!(plan.effective, 3);
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|p| p.len() == 1));
        Ok(())
    }

    #[test]
    fn header_only_source_yields_nothing() -> anyhow::Result<()> {
        let (plan, parts) = partitions(0, 4)?;
        assert!(plan.is_empty());
        assert!(parts.is_empty());
        Ok(())
    }

    #[test]
    fn header_and_index_are_captured() -> anyhow::Result<()> {
        let src = source(2);
        let p = Partitioner::new(src, "test.csv", PartitionPlan::new(2, 1), &["amount"])?;
        assert_eq!(p.header().columns(), ["id", "name", "amount"]);
        assert_eq!(p.index().get("amount"), Some(2));
        Ok(())
    }

    #[test]
    fn missing_required_column_fails_construction() {
        let err = Partitioner::new(source(2), "test.csv", PartitionPlan::new(2, 1), &["id", "email"])
            .err()
            .expect("construction should fail");
        assert!(matches!(err, RunError::MissingColumn(ref c) if c == "email"));
    }

    #[test]
    fn empty_source_has_empty_header() {
        let err = Partitioner::new(Cursor::new(Vec::new()), "empty.csv", PartitionPlan::new(0, 1), &["id"])
            .err()
            .expect("construction should fail");
        assert!(matches!(err, RunError::MissingColumn(_)));
    }
}
