//! Dot-separated version comparison.
//!
//! Registry versions are plain `MAJOR.MINOR.PATCH[.BUILD...]` strings written
//! by the release tooling, not full semver. Comparison rules:
//!
//! - an optional leading `v` and surrounding whitespace are ignored
//! - each `.`-separated segment is parsed as an unsigned integer
//! - a segment that is not a plain number counts as `0`
//! - missing trailing segments count as `0`, so `1.0 == 1.0.0`
//! - the first differing segment decides

use std::cmp::Ordering;

fn segments(version: &str) -> Vec<u64> {
    let trimmed = version.trim();
    let trimmed = trimmed.strip_prefix(['v', 'V']).unwrap_or(trimmed);
    if trimmed.is_empty() {
        return Vec::new();
    }
    trimmed.split('.').map(|segment| segment.trim().parse::<u64>().unwrap_or(0)).collect()
}

/// Compare two version strings numerically, segment by segment.
#[must_use]
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left = segments(a);
    let right = segments(b);
    let len = left.len().max(right.len());

    (0..len)
        .map(|i| {
            let l = left.get(i).copied().unwrap_or(0);
            let r = right.get(i).copied().unwrap_or(0);
            l.cmp(&r)
        })
        .find(|ord| *ord != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

/// Whether `candidate` is strictly newer than `current`.
#[must_use]
pub fn is_newer(candidate: &str, current: &str) -> bool {
    compare_versions(candidate, current) == Ordering::Greater
}
