//! Multi-key Sorting
//!
//! Stable, multi-column sort over any [`Record`] type. Keys are read once
//! per row before sorting; rows that tie on every key keep the order in
//! which they were encountered.

use std::cmp::Ordering;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::column::{Column, FieldValue, Record};

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

impl SortDirection {
    /// `"asc"` (any case) ascends; anything else descends.
    #[must_use]
    pub fn parse(sort: &str) -> Self {
        if sort.eq_ignore_ascii_case("asc") {
            Self::Ascending
        } else {
            Self::Descending
        }
    }

    const fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Self::Ascending => ordering,
            Self::Descending => ordering.reverse(),
        }
    }
}

/// One entry of a grid sort model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortModel {
    /// Column id as sent by the client.
    pub col_id: String,
    /// `"asc"` or `"desc"`.
    #[serde(default)]
    pub sort: String,
}

impl SortModel {
    /// Ascending sort on a column.
    #[must_use]
    pub fn asc(col_id: impl Into<String>) -> Self {
        Self {
            col_id: col_id.into(),
            sort: "asc".to_string(),
        }
    }

    /// Descending sort on a column.
    #[must_use]
    pub fn desc(col_id: impl Into<String>) -> Self {
        Self {
            col_id: col_id.into(),
            sort: "desc".to_string(),
        }
    }

    /// Parsed direction.
    #[must_use]
    pub fn direction(&self) -> SortDirection {
        SortDirection::parse(&self.sort)
    }

    /// Parse a raw sort model, dropping (and logging) malformed entries.
    #[must_use]
    pub fn from_json(raw: &Value) -> Vec<Self> {
        match raw {
            Value::Null => Vec::new(),
            Value::Array(entries) => entries
                .iter()
                .filter_map(|entry| match Self::deserialize(entry) {
                    Ok(model) => Some(model),
                    Err(err) => {
                        tracing::warn!(entry = %entry, error = %err, "Ignoring malformed sort clause");
                        None
                    }
                })
                .collect(),
            other => {
                tracing::warn!(model = %other, "Ignoring sort model that is not a list");
                Vec::new()
            }
        }
    }

    /// Deserialize a sort model leniently (see [`SortModel::from_json`]).
    ///
    /// # Errors
    ///
    /// Only fails if the input is not valid JSON at all.
    pub fn deserialize_lenient<'de, D>(deserializer: D) -> Result<Vec<Self>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<Value>::deserialize(deserializer)?;
        Ok(raw.as_ref().map(Self::from_json).unwrap_or_default())
    }
}

/// Sort rows by the given model.
///
/// Entries naming unknown columns are skipped. With no usable entries the
/// rows are returned untouched.
#[must_use]
pub fn apply_sort<T: Record>(rows: Vec<T>, sort_model: &[SortModel]) -> Vec<T> {
    let schema = T::schema();
    let keys: Vec<(&Column<T>, SortDirection)> = sort_model
        .iter()
        .filter_map(|entry| {
            let column = schema.resolve(&entry.col_id);
            if column.is_none() {
                tracing::debug!(column = %entry.col_id, "Skipping sort on unknown column");
            }
            column.map(|column| (column, entry.direction()))
        })
        .collect();

    if keys.is_empty() {
        return rows;
    }

    let mut decorated: Vec<(Vec<FieldValue>, T)> = rows
        .into_iter()
        .map(|row| {
            let values = keys.iter().map(|(column, _)| column.value(&row)).collect();
            (values, row)
        })
        .collect();

    // `sort_by` is stable, so full ties keep encounter order.
    decorated.sort_by(|(a, _), (b, _)| {
        keys.iter()
            .zip(a.iter().zip(b.iter()))
            .map(|((_, direction), (left, right))| direction.apply(left.compare(right)))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    });

    decorated.into_iter().map(|(_, row)| row).collect()
}

// =============================================================================
// Tests
// =============================================================================
