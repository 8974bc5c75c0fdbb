//! Assertion functions for comparing rows read back from run outputs.

use crate::config::ProcessLayout;
use crate::worker::WorkerId;
use std::collections::HashMap;

/// Assert that two row lists are equal in order and content.
///
/// # Panics
///
/// Panics if the lists differ in length or in any row.
///
/// # Example
///
/// ```
/// use csvfan::testing::assert_rows_equal;
///
/// let actual = vec![vec!["1".to_string(), "a".to_string()]];
/// assert_rows_equal(&actual, &actual.clone());
/// ```
pub fn assert_rows_equal(actual: &[Vec<String>], expected: &[Vec<String>]) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "Row count mismatch:\n  Expected rows: {}\n  Actual rows: {}\n  Expected: {expected:?}\n  Actual: {actual:?}",
        expected.len(),
        actual.len()
    );

    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert_eq!(
            a, e,
            "Row mismatch at index {i}:\n  Expected: {e:?}\n  Actual: {a:?}"
        );
    }
}

/// Assert that two row lists hold the same rows, ignoring order but not
/// multiplicity.
///
/// # Panics
///
/// Panics if any row occurs a different number of times in each list.
pub fn assert_rows_unordered_equal(actual: &[Vec<String>], expected: &[Vec<String>]) {
    let mut counts: HashMap<&[String], i64> = HashMap::new();
    for row in actual {
        *counts.entry(row.as_slice()).or_default() += 1;
    }
    for row in expected {
        *counts.entry(row.as_slice()).or_default() -= 1;
    }

    let extra: Vec<_> = counts.iter().filter(|(_, n)| **n > 0).map(|(r, _)| r).collect();
    let missing: Vec<_> = counts.iter().filter(|(_, n)| **n < 0).map(|(r, _)| r).collect();
    assert!(
        extra.is_empty() && missing.is_empty(),
        "Row content mismatch:\n  Missing rows: {missing:?}\n  Extra rows: {extra:?}"
    );
}

/// Assert that no interim success or error file is left for workers
/// `1..=workers`.
///
/// # Panics
///
/// Panics naming the first interim file that still exists.
pub fn assert_no_interim_files(layout: &ProcessLayout, workers: usize) {
    for id in WorkerId::range(workers) {
        for path in [layout.interim_success(id), layout.interim_errors(id)] {
            assert!(!path.exists(), "interim file left behind: {}", path.display());
        }
    }
}
