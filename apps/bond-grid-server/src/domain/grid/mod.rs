//! Grid Protocol Types
//!
//! Request and response shapes exchanged with a server-side row model
//! grid client. All field names are `camelCase` on the wire.

use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::query::{FilterModel, Record, SortModel};

// =============================================================================
// Tiered Records
// =============================================================================

/// A record that belongs to a parent entity with one canonical tier.
///
/// Canonical records are the expandable top-level rows of a grid; the other
/// tiers of the same parent are its children.
pub trait TieredRecord: Record {
    /// Serialisable client projection.
    type Row: Serialize;

    /// Key shared by every tier of the same parent.
    fn parent_key(&self) -> &str;

    /// Whether this is the parent's canonical tier.
    fn is_canonical(&self) -> bool;

    /// Project into the client row shape.
    fn to_row(&self) -> Self::Row;
}

// =============================================================================
// Request
// =============================================================================

/// A block request from the grid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GridRequest {
    /// First row of the page (inclusive).
    pub start_row: i64,
    /// End of the page (exclusive).
    pub end_row: i64,
    /// Ordered sort keys.
    #[serde(deserialize_with = "SortModel::deserialize_lenient")]
    pub sort_model: Vec<SortModel>,
    /// Per-column filters.
    #[serde(deserialize_with = "FilterModel::deserialize_lenient")]
    pub filter_model: FilterModel,
    /// Drill path: one chosen value per grouping level, then an instrument id.
    #[serde(deserialize_with = "null_as_empty")]
    pub group_keys: Vec<String>,
    /// Active grouping columns, outermost first.
    #[serde(deserialize_with = "null_as_empty")]
    pub grouping_cols: Vec<String>,
}

impl GridRequest {
    /// Request the half-open row range `[start_row, end_row)`.
    #[must_use]
    pub fn page(start_row: i64, end_row: i64) -> Self {
        Self {
            start_row,
            end_row,
            ..Self::default()
        }
    }

    /// Set the sort model.
    #[must_use]
    pub fn with_sort(mut self, sort_model: Vec<SortModel>) -> Self {
        self.sort_model = sort_model;
        self
    }

    /// Set the filter model.
    #[must_use]
    pub fn with_filter(mut self, filter_model: FilterModel) -> Self {
        self.filter_model = filter_model;
        self
    }

    /// Set the grouping columns.
    #[must_use]
    pub fn grouped_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.grouping_cols = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Set the drill path.
    #[must_use]
    pub fn drilled_into<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Page bounds with negative values clamped to zero.
    #[must_use]
    pub fn bounds(&self) -> (usize, usize) {
        let clamp = |value: i64| usize::try_from(value.max(0)).unwrap_or(usize::MAX);
        (clamp(self.start_row), clamp(self.end_row))
    }

    /// Number of drill levels already chosen.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.group_keys.len()
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

// =============================================================================
// Response
// =============================================================================

/// Summary row for one distinct value of a grouping column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRow {
    /// The group value.
    pub key: String,
    /// Always `true`.
    pub is_group: bool,
    /// Number of records in the group.
    pub child_count: usize,
}

impl GroupRow {
    /// Summary row for `key` covering `child_count` records.
    #[must_use]
    pub fn new(key: impl Into<String>, child_count: usize) -> Self {
        Self {
            key: key.into(),
            is_group: true,
            child_count,
        }
    }
}

/// A record projection plus its expandability flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordRow<R> {
    /// The record's fields.
    #[serde(flatten)]
    pub row: R,
    /// Whether the grid may drill into this row.
    pub is_group: bool,
}

/// One row of a grid response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum GridRow<R> {
    /// Group summary.
    Group(GroupRow),
    /// Record, expandable or leaf.
    Record(RecordRow<R>),
}

impl<R> GridRow<R> {
    /// Expandability flag carried by every row.
    #[must_use]
    pub const fn is_group(&self) -> bool {
        match self {
            Self::Group(group) => group.is_group,
            Self::Record(record) => record.is_group,
        }
    }

    /// The group summary, if this is one.
    #[must_use]
    pub const fn as_group(&self) -> Option<&GroupRow> {
        match self {
            Self::Group(group) => Some(group),
            Self::Record(_) => None,
        }
    }

    /// The record projection, if this is one.
    #[must_use]
    pub const fn as_record(&self) -> Option<&R> {
        match self {
            Self::Group(_) => None,
            Self::Record(record) => Some(&record.row),
        }
    }
}

/// A page of rows plus the size of the whole scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridResponse<R> {
    /// Rows of the requested page.
    pub rows: Vec<GridRow<R>>,
    /// Total rows in scope before paging.
    pub last_row: usize,
}
