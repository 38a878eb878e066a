//! Ordinal version comparison.
//!
//! Versions are compared by the runs of decimal digits they contain, in
//! order of appearance. `"1.0.7-rc3.3"` becomes `[1, 0, 7, 3, 3]`. This is a
//! heuristic: epochs, `~` and alphabetic parts carry no special meaning.

use std::cmp::Ordering;

/// Split a version string into its numeric runs.
///
/// Runs too large for a `u64` saturate at `u64::MAX`.
pub fn to_ordinals(version: &str) -> Vec<u64> {
    version
        .split(|c: char| !c.is_ascii_digit())
        .filter(|run| !run.is_empty())
        .map(|run| run.parse().unwrap_or(u64::MAX))
        .collect()
}

/// Compare two versions ordinal by ordinal. The shorter sequence is padded
/// with zeros; when the padded sequences are equal, the one with more
/// ordinals is the greater, so `"1.2.0"` sorts after `"1.2"`.
pub fn compare_versions(v1: &str, v2: &str) -> Ordering {
    let a = to_ordinals(v1);
    let b = to_ordinals(v2);
    let len = a.len().max(b.len());

    (0..len)
        .map(|i| {
            let x = a.get(i).copied().unwrap_or(0);
            let y = b.get(i).copied().unwrap_or(0);
            x.cmp(&y)
        })
        .find(|ord| ord.is_ne())
        .unwrap_or_else(|| a.len().cmp(&b.len()))
}
