//! Numeric id and SID allocation in the secondary directory.

use std::collections::HashSet;

use tracing::{debug, instrument, warn};

use dirsync_directory::{Directory, DirectorySearch, Filter};

use crate::error::EngineResult;

/// Smallest id at or above `minimum` that is not in `used`.
///
/// Gaps below `minimum` are never filled.
#[must_use]
pub fn next_free_id<I>(used: I, minimum: i64) -> i64
where
    I: IntoIterator<Item = i64>,
{
    let used: HashSet<i64> = used.into_iter().collect();
    let mut candidate = minimum;
    while used.contains(&candidate) {
        candidate += 1;
    }
    candidate
}

/// `prefix` followed by one more than the largest numeric suffix in use.
///
/// Append-only: gaps are never reused. Values whose suffix is not numeric are
/// ignored with a warning.
#[must_use]
pub fn next_sid<'s, I>(prefix: &str, existing: I) -> String
where
    I: IntoIterator<Item = &'s str>,
{
    let mut highest: u64 = 0;
    for sid in existing {
        let suffix = sid.strip_prefix(prefix).unwrap_or(sid);
        match suffix.parse::<u64>() {
            Ok(value) if suffix.bytes().all(|b| b.is_ascii_digit()) => highest = highest.max(value),
            _ => warn!(sid = %sid, "Unexpected SID, ignoring"),
        }
    }
    format!("{prefix}{}", highest + 1)
}

/// Allocate the next free `attribute` value under `base`.
#[instrument(skip(directory))]
pub fn allocate_id(
    directory: &mut dyn Directory,
    base: &str,
    attribute: &str,
    minimum: i64,
) -> EngineResult<i64> {
    let results = directory.search(base, &Filter::present(attribute), &[attribute])?;

    let mut used = vec![0];
    for entry in results {
        match entry.get_i64(attribute) {
            Some(id) => used.push(id),
            None => warn!(dn = %entry.dn, attribute = %attribute, "Unexpected id value, ignoring"),
        }
    }

    let id = next_free_id(used, minimum);
    debug!(id, "Allocated id");
    Ok(id)
}

/// Allocate the next SID with `prefix` under `base`.
#[instrument(skip(directory))]
pub fn allocate_sid(
    directory: &mut dyn Directory,
    base: &str,
    attribute: &str,
    prefix: &str,
) -> EngineResult<String> {
    let results = directory.search(base, &Filter::starts_with(attribute, prefix), &[attribute])?;

    let values: Vec<String> = results
        .filter_map(|entry| entry.get_string(attribute).map(str::to_string))
        .collect();
    let sid = next_sid(prefix, values.iter().map(String::as_str));
    debug!(sid = %sid, "Allocated SID");
    Ok(sid)
}
