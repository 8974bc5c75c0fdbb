//! Testing utilities for transforms and runs.
//!
//! This module gives end-users what they need to exercise a transform against a
//! real run directory without hand-building one:
//!
//! - **Process directories**: a throwaway `<base>/in`, `out`, `logs` tree
//! - **Fixtures**: small datasets and ready-made transforms
//! - **Assertions**: row comparisons with readable failure output
//!
//! # Quick Start
//!
//! ```no_run
//! use csvfan::Job;
//! use csvfan::testing::*;
//!
//! #[test]
//! fn copies_every_row() -> anyhow::Result<()> {
//!     let dir = ProcessDirFixture::new("orders.csv")?;
//!     dir.write_source(&SAMPLE_HEADER, &sample_rows())?;
//!
//!     let job = Job::new(dir.config().with_workers(3))?;
//!     job.run(&copy_transform(job.sink()))?;
//!
//!     let mut expected = vec![SAMPLE_HEADER.iter().map(|c| c.to_string()).collect()];
//!     expected.extend(sample_rows());
//!     assert_rows_equal(&dir.read_success()?, &expected);
//!     Ok(())
//! }
//! ```

pub mod assertions;
pub mod fixtures;
pub mod process_dir;

pub use assertions::*;
pub use fixtures::*;
pub use process_dir::*;
