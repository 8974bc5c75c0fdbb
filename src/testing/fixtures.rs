//! Pre-built datasets and transforms for common testing scenarios.

use crate::header::{Header, HeaderIndex, Row};
use crate::sink::Sink;
use crate::worker::WorkerId;
use anyhow::Result;

/// Header of [`sample_rows`].
pub const SAMPLE_HEADER: [&str; 3] = ["id", "name", "amount"];

/// Nine order rows: seven with a numeric `amount`, two without.
///
/// # Example
///
/// ```
/// use csvfan::testing::{SAMPLE_HEADER, sample_rows};
///
/// let rows = sample_rows();
/// assert_eq!(rows.len(), 9);
/// assert!(rows.iter().all(|r| r.len() == SAMPLE_HEADER.len()));
/// ```
#[must_use]
pub fn sample_rows() -> Vec<Row> {
    [
        ["1", "Alice", "12.50"],
        ["2", "Bob", "7"],
        ["3", "Carol", "n/a"],
        ["4", "Dave", "30.25"],
        ["5", "Eve, Jr.", "3"],
        ["6", "Frank", ""],
        ["7", "Grace", "19.99"],
        ["8", "Heidi", "1"],
        ["9", "Ivan", "42"],
    ]
    .into_iter()
    .map(|r| r.into_iter().map(str::to_string).collect())
    .collect()
}

/// `count` single-column rows `["1"], ["2"], ...`, for partition arithmetic.
#[must_use]
pub fn numbered_rows(count: usize) -> Vec<Row> {
    (1..=count).map(|i| vec![i.to_string()]).collect()
}

/// Transform that copies every row of its partition to the interim success
/// file, header first.
pub fn copy_transform(
    sink: Sink,
) -> impl Fn(WorkerId, &Header, Vec<Row>, &HeaderIndex) -> Result<()> + Send + Sync {
    move |id: WorkerId, header: &Header, rows: Vec<Row>, _: &HeaderIndex| -> Result<()> {
        let out = sink.worker(id);
        out.start_log(&format!("worker {id}: {} rows\n", rows.len()))?;
        out.start_success(header)?;
        for row in &rows {
            out.success(row)?;
        }
        Ok(())
    }
}

/// Transform that keeps rows whose `column` parses as a number and sends the
/// rest to the interim error file as `[first field, reason]`.
pub fn numeric_column_transform(
    sink: Sink,
    column: &'static str,
) -> impl Fn(WorkerId, &Header, Vec<Row>, &HeaderIndex) -> Result<()> + Send + Sync {
    move |id: WorkerId, header: &Header, rows: Vec<Row>, index: &HeaderIndex| -> Result<()> {
        let out = sink.worker(id);
        out.start_success(header)?;
        for row in &rows {
            let value = index.field(row, column).unwrap_or_default();
            if value.parse::<f64>().is_ok() {
                out.success(row)?;
            } else {
                let key = row.first().cloned().unwrap_or_default();
                out.error(&[key, format!("{column} is not a number: {value:?}")])?;
            }
        }
        Ok(())
    }
}
