//! CSV primitives shared by the counter, the partitioner, the sink and the
//! aggregator.
//!
//! This module provides:
//! - **Row counting** that rewinds the handle for reuse: [`count_data_rows`]
//! - **Reader setup** for sources and interim files: [`source_reader`], [`interim_reader`]
//! - **Row writing** with append/truncate semantics: [`open_for_write`], [`write_rows`]
//! - **Whole-file reads** of untyped rows: [`read_rows`]
//!
//! # Design notes
//! - Every file is read without header handling (`has_headers(false)`); the
//!   caller decides what the first row means.
//! - Sources and interim files are both read strictly: a row whose field count
//!   differs from the file's first row is an error. For a source that error is
//!   fatal to the run; for an interim file it is a per-row error the merge skips.

use crate::header::Row;
use anyhow::{Context, Result};
use csv::{ReaderBuilder, Writer, WriterBuilder};
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Count the data rows of a CSV source (everything after the first row), then
/// rewind `source` to its start so it can be read again.
///
/// Rows are read as raw bytes, so invalid UTF-8 is left for the partition pass
/// to reject. A row whose field count differs from the header's aborts the count.
///
/// # Errors
/// Returns the first read, field-count or seek error.
pub fn count_data_rows<R: Read + Seek>(source: &mut R) -> csv::Result<u64> {
    let total = {
        let mut rdr = ReaderBuilder::new()
            .has_headers(false)
            .flexible(false)
            .from_reader(&mut *source);
        let mut record = csv::ByteRecord::new();
        let mut rows: u64 = 0;
        while rdr.read_byte_record(&mut record)? {
            rows += 1;
        }
        rows.saturating_sub(1)
    };
    source.seek(SeekFrom::Start(0))?;
    Ok(total)
}

/// Reader over a source dataset: no header handling, field counts enforced.
pub fn source_reader<R: Read>(source: R) -> csv::Reader<R> {
    ReaderBuilder::new()
        .has_headers(false)
        .flexible(false)
        .from_reader(source)
}

/// Reader over an interim file: no header handling, field counts enforced.
pub fn interim_reader(file: File) -> csv::Reader<BufReader<File>> {
    ReaderBuilder::new()
        .has_headers(false)
        .flexible(false)
        .from_reader(BufReader::new(file))
}

/// Open `path` for writing, appending to it or truncating it.
///
/// The file is created if it does not exist.
///
/// # Errors
/// Returns the underlying I/O error.
pub fn open_for_write(path: &Path, append: bool) -> io::Result<File> {
    let mut opts = OpenOptions::new();
    opts.create(true);
    if append {
        opts.append(true);
    } else {
        opts.write(true).truncate(true);
    }
    opts.open(path)
}

/// CSV writer over any sink. Rows of differing length are allowed.
pub fn row_writer<W: Write>(w: W) -> Writer<W> {
    WriterBuilder::new().flexible(true).from_writer(w)
}

/// Write every row to `w` and flush.
///
/// # Errors
/// Returns the first write or flush error.
pub fn write_rows<W, I, R>(w: W, rows: I) -> csv::Result<()>
where
    W: Write,
    I: IntoIterator<Item = R>,
    R: AsRef<[String]>,
{
    let mut wtr = row_writer(w);
    for row in rows {
        wtr.write_record(row.as_ref())?;
    }
    wtr.flush()?;
    Ok(())
}

/// Read every row of a CSV file, including its first row.
///
/// # Errors
/// Returns an error if the file cannot be opened or any row fails to parse.
pub fn read_rows(path: impl AsRef<Path>) -> Result<Vec<Row>> {
    let path = path.as_ref();
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(BufReader::new(f));
    let mut out = Vec::new();
    for (i, rec) in rdr.records().enumerate() {
        let rec = rec.with_context(|| format!("parse CSV record #{}", i + 1))?;
        out.push(rec.iter().map(str::to_string).collect());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn counts_rows_after_header_and_rewinds() -> Result<()> {
        let mut src = Cursor::new(b"id,name\n1,a\n2,b\n3,c\n".to_vec());
        assert_eq!(count_data_rows(&mut src)?, 3);
        assert_eq!(src.position(), 0);

        // The handle is reusable after counting.
        let rows: Vec<_> = source_reader(&mut src).records().collect::<Result<_, _>>()?;
        assert_eq!(rows.len(), 4);
        Ok(())
    }

    #[test]
    fn header_only_and_empty_sources_count_zero() -> Result<()> {
        assert_eq!(count_data_rows(&mut Cursor::new(b"id,name\n".to_vec()))?, 0);
        assert_eq!(count_data_rows(&mut Cursor::new(Vec::new()))?, 0);
        Ok(())
    }

    #[test]
    fn ragged_row_aborts_the_count() {
        let mut src = Cursor::new(b"a,b\n1,2\n1\n3,4\n".to_vec());
        let err = count_data_rows(&mut src).unwrap_err();
        assert!(matches!(err.kind(), csv::ErrorKind::UnequalLengths { .. }));
        assert_eq!(err.position().map(csv::Position::line), Some(3));
    }

    #[test]
    fn non_utf8_rows_are_counted() -> Result<()> {
        let mut src = Cursor::new(b"a,b\n1,\xff\n2,x\n".to_vec());
        assert_eq!(count_data_rows(&mut src)?, 2);
        let results: Vec<_> = source_reader(&mut src).records().collect();
        assert!(results[1].is_err());
        Ok(())
    }

    #[test]
    fn quoted_newlines_are_one_row() -> Result<()> {
        let mut src = Cursor::new(b"id,note\n1,\"two\nlines\"\n2,x\n".to_vec());
        assert_eq!(count_data_rows(&mut src)?, 2);
        Ok(())
    }

    #[test]
    fn write_then_append() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("rows.csv");
        write_rows(open_for_write(&path, false)?, [vec!["a".to_string(), "b".to_string()]])?;
        write_rows(open_for_write(&path, true)?, [vec!["c, d".to_string(), "e".to_string()]])?;
        assert_eq!(std::fs::read_to_string(&path)?, "a,b\n\"c, d\",e\n");

        write_rows(open_for_write(&path, false)?, [vec!["z".to_string()]])?;
        assert_eq!(read_rows(&path)?, vec![vec!["z".to_string()]]);
        Ok(())
    }

    #[test]
    fn interim_reader_rejects_ragged_rows() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("interim.csv");
        std::fs::write(&path, "a,b\n1,2\n3\n4,5\n")?;
        let mut rdr = interim_reader(File::open(&path)?);
        let results: Vec<_> = rdr.records().collect();
        assert_eq!(results.len(), 4);
        assert!(results[0].is_ok());
        assert!(results[1].is_ok());
        assert!(results[2].is_err());
        assert!(results[3].is_ok());
        Ok(())
    }
}
