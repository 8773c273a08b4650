//! Date-range filtering and preview truncation.
//!
//! Dates are the naive calendar-date component of each row's timestamp;
//! no timezone is inferred.

use chrono::NaiveDate;
use std::collections::BTreeSet;

use crate::models::{DateRange, Table};

/// Rows whose date lies in `[range.start, range.end]`, ascending by
/// timestamp. Rows with equal timestamps keep their input order.
pub fn filter_by_date(table: &Table, range: &DateRange) -> Table {
    let mut rows: Vec<_> = table
        .rows
        .iter()
        .filter(|r| range.contains(r.date()))
        .cloned()
        .collect();
    rows.sort_by_key(|r| r.timestamp);
    table.with_rows(rows)
}

/// Keep only rows from the `n` most recent distinct dates.
///
/// Returns the table unchanged when it spans `n` dates or fewer.
pub fn truncate_to_recent_days(table: &Table, n: usize) -> Table {
    let dates = unique_dates(table);
    if dates.len() <= n {
        return table.clone();
    }
    let keep: BTreeSet<NaiveDate> = dates[dates.len() - n..].iter().copied().collect();
    let rows = table
        .rows
        .iter()
        .filter(|r| keep.contains(&r.date()))
        .cloned()
        .collect();
    table.with_rows(rows)
}

/// Distinct dates present in the table, ascending.
pub fn unique_dates(table: &Table) -> Vec<NaiveDate> {
    table
        .rows
        .iter()
        .map(|r| r.date())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
