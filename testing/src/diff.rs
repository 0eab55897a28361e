//! Line diffs of pretty-printed values, used in assertion failures.

use std::fmt::{Debug, Write};

/// Diff the pretty `Debug` output of `expected` against `actual`.
///
/// Lines only in `expected` are prefixed with `-`, lines only in `actual`
/// with `+`, shared lines with two spaces.
///
/// # Example
///
/// ```
/// use statecraft_testing::debug_diff;
///
/// #[derive(Debug)]
/// struct State {
///     count: i32,
///     label: &'static str,
/// }
///
/// let diff = debug_diff(
///     &State { count: 1, label: "a" },
///     &State { count: 2, label: "a" },
/// );
/// assert!(diff.contains("-     count: 1,"));
/// assert!(diff.contains("+     count: 2,"));
/// assert!(diff.contains("      label: \"a\","));
/// ```
#[must_use]
pub fn debug_diff<T: Debug + ?Sized>(expected: &T, actual: &T) -> String {
    let expected = format!("{expected:#?}");
    let actual = format!("{actual:#?}");
    let expected: Vec<&str> = expected.lines().collect();
    let actual: Vec<&str> = actual.lines().collect();

    // Longest common subsequence table, filled from the end
    let mut lcs = vec![vec![0usize; actual.len() + 1]; expected.len() + 1];
    for i in (0..expected.len()).rev() {
        for j in (0..actual.len()).rev() {
            lcs[i][j] = if expected[i] == actual[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut out = String::new();
    let (mut i, mut j) = (0, 0);
    while i < expected.len() && j < actual.len() {
        if expected[i] == actual[j] {
            let _ = writeln!(out, "  {}", expected[i]);
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            let _ = writeln!(out, "- {}", expected[i]);
            i += 1;
        } else {
            let _ = writeln!(out, "+ {}", actual[j]);
            j += 1;
        }
    }
    for line in &expected[i..] {
        let _ = writeln!(out, "- {line}");
    }
    for line in &actual[j..] {
        let _ = writeln!(out, "+ {line}");
    }
    out
}
