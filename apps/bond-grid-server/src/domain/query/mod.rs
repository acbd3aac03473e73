//! Query Engine
//!
//! Generic filter, sort and distinct-value extraction over any record type
//! that publishes a column [`Schema`]. Nothing here knows about bonds.
//!
//! Bad input never fails a query: malformed clauses are logged and
//! ignored, unknown columns are skipped, and rows whose field cannot be
//! coerced for a numeric filter are excluded.

mod column;
mod filter;
mod sort;

use std::collections::BTreeSet;

pub use column::{Column, ColumnKind, FieldValue, Record, Schema};
pub use filter::{
    ColumnFilter, FilterModel, FilterParseError, FilterSpec, NumberOperator, TextOperator,
};
pub use sort::{SortDirection, SortModel, apply_sort};

/// Distinct, non-empty text values of a column, in lexicographic order.
///
/// Returns an empty list when the column cannot be resolved.
#[must_use]
pub fn distinct_values<T: Record>(rows: &[T], column: &str) -> Vec<String> {
    let Some(column) = T::schema().resolve(column) else {
        return Vec::new();
    };

    rows.iter()
        .map(|row| column.text(row))
        .filter(|value| !value.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
