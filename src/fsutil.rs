//! Path and size helpers shared by the storage manager and orchestrator.

use std::path::{Path, MAIN_SEPARATOR};

use byte_unit::{Byte, UnitType};

/// True iff `child` equals `parent` or is strictly beneath it. Both paths
/// must already be absolute and normalized (see `std::fs::canonicalize`).
pub fn is_subpath(child: &Path, parent: &Path) -> bool {
    let mut child = child.to_string_lossy().into_owned();
    let mut parent = parent.to_string_lossy().into_owned();
    if !child.ends_with(MAIN_SEPARATOR) {
        child.push(MAIN_SEPARATOR);
    }
    if !parent.ends_with(MAIN_SEPARATOR) {
        parent.push(MAIN_SEPARATOR);
    }
    child.starts_with(&parent)
}

/// Convert bytes to a human-readable IEC size, e.g. "1.50 GiB".
pub fn humansize(size: i64) -> String {
    let sign = if size < 0 { "-" } else { "" };
    let magnitude = Byte::from_u64(size.unsigned_abs());
    let adjusted = magnitude.get_appropriate_unit(UnitType::Binary);
    format!("{sign}{adjusted:.2}")
}

/// Lowercase, with underscores turned into hyphens; the sole normalization
/// applied before a pattern test.
pub fn normalize(s: &str) -> String {
    s.to_lowercase().replace('_', "-")
}
