//! Source header and the column-name lookup built from it.

use crate::error::RunError;
use std::collections::HashMap;
use std::ops::Deref;

/// One row of field values, aligned with the [`Header`].
pub type Row = Vec<String>;

/// Ordered column names captured from the first row of the source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Header(Vec<String>);

impl Header {
    pub fn new(columns: Vec<String>) -> Self {
        Self(columns)
    }

    pub fn columns(&self) -> &[String] {
        &self.0
    }

    /// Build the name → position lookup for this header.
    pub fn index(&self) -> HeaderIndex {
        HeaderIndex::from_header(self)
    }
}

impl Deref for Header {
    type Target = [String];

    fn deref(&self) -> &[String] {
        &self.0
    }
}

impl<S: Into<String>> FromIterator<S> for Header {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Column name → zero-based position.
///
/// Built once per run and shared read-only by every worker. A name repeated in
/// the header maps to its last position.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeaderIndex {
    positions: HashMap<String, usize>,
}

impl HeaderIndex {
    pub fn from_header(header: &Header) -> Self {
        let mut positions = HashMap::with_capacity(header.len());
        for (i, name) in header.iter().enumerate() {
            positions.insert(name.clone(), i);
        }
        Self { positions }
    }

    /// Position of `column`, if the header has it.
    pub fn get(&self, column: &str) -> Option<usize> {
        self.positions.get(column).copied()
    }

    pub fn contains(&self, column: &str) -> bool {
        self.positions.contains_key(column)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// The value of `column` in `row`, if both the column and the field exist.
    pub fn field<'r>(&self, row: &'r [String], column: &str) -> Option<&'r str> {
        self.get(column)
            .and_then(|i| row.get(i))
            .map(String::as_str)
    }

    /// Fail on the first required column (in the given order) that is absent.
    ///
    /// # Errors
    /// Returns [`RunError::MissingColumn`] naming the missing column.
    pub fn require<S: AsRef<str>>(&self, required: &[S]) -> Result<(), RunError> {
        match required.iter().find(|c| !self.contains(c.as_ref())) {
            Some(missing) => Err(RunError::MissingColumn(missing.as_ref().to_string())),
            None => Ok(()),
        }
    }
}
