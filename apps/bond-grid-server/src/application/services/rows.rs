//! Row Serving
//!
//! Turns a grid block request into one page of rows. The pipeline is always
//! filter → sort → scope → page; the scope depends on the grouping columns
//! and how deep the client has drilled:
//!
//! | grouping cols | drill depth          | scope                                  |
//! |---------------|----------------------|----------------------------------------|
//! | none          | 0                    | canonical records (expandable)         |
//! | none          | ≥ 1                  | child tiers of the last key (leaves)   |
//! | n             | < n                  | group summaries for the next column    |
//! | n             | = n                  | canonical records in the chosen groups |
//! | n             | > n                  | child tiers of the last key (leaves)   |
//!
//! `lastRow` is always the size of the scope before paging.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::bond::{Bond, BondRow};
use crate::domain::grid::{GridRequest, GridResponse, GridRow, GroupRow, RecordRow, TieredRecord};
use crate::domain::query::{Record, apply_sort, distinct_values};
use crate::infrastructure::store::BondStore;

// =============================================================================
// Generic Pipeline
// =============================================================================

/// Serve one page of rows from `records` for `request`.
#[must_use]
pub fn serve_rows<T: TieredRecord>(records: Vec<T>, request: &GridRequest) -> GridResponse<T::Row> {
    let filtered = request.filter_model.apply(records);
    let sorted = apply_sort(filtered, &request.sort_model);

    let grouping = request.grouping_cols.as_slice();
    let path = request.group_keys.as_slice();

    if grouping.is_empty() || path.len() > grouping.len() {
        return match path.last() {
            Some(parent) => child_tiers(sorted, parent, request),
            None => canonical_rows(sorted, request),
        };
    }

    let in_path: Vec<T> = sorted
        .into_iter()
        .filter(|record| record.is_canonical() && matches_path(record, path, grouping))
        .collect();

    match grouping.get(path.len()) {
        Some(next_column) => group_summaries(&in_path, next_column, request),
        None => canonical_rows(in_path, request),
    }
}

fn canonical_rows<T: TieredRecord>(records: Vec<T>, request: &GridRequest) -> GridResponse<T::Row> {
    let scope: Vec<T> = records.into_iter().filter(TieredRecord::is_canonical).collect();
    paged_records(&scope, request, true)
}

fn child_tiers<T: TieredRecord>(
    records: Vec<T>,
    parent: &str,
    request: &GridRequest,
) -> GridResponse<T::Row> {
    let scope: Vec<T> = records
        .into_iter()
        .filter(|record| record.parent_key() == parent && !record.is_canonical())
        .collect();
    paged_records(&scope, request, false)
}

fn group_summaries<T: TieredRecord>(
    records: &[T],
    column: &str,
    request: &GridRequest,
) -> GridResponse<T::Row> {
    let mut groups: Vec<GroupRow> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for record in records {
        let key = group_value(record, column);
        match positions.get(&key) {
            Some(&position) => groups[position].child_count += 1,
            None => {
                positions.insert(key.clone(), groups.len());
                groups.push(GroupRow::new(key, 1));
            }
        }
    }

    let last_row = groups.len();
    let rows = page(groups, request).into_iter().map(GridRow::Group).collect();
    GridResponse { rows, last_row }
}

fn paged_records<T: TieredRecord>(
    scope: &[T],
    request: &GridRequest,
    is_group: bool,
) -> GridResponse<T::Row> {
    let rows = page(scope.iter(), request)
        .into_iter()
        .map(|record| {
            GridRow::Record(RecordRow {
                row: record.to_row(),
                is_group,
            })
        })
        .collect();

    GridResponse {
        rows,
        last_row: scope.len(),
    }
}

/// Slice `[start_row, end_row)` out of `items`; empty when the window is
/// empty or starts past the end.
fn page<I: IntoIterator>(items: I, request: &GridRequest) -> Vec<I::Item> {
    let (start, end) = request.bounds();
    if end <= start {
        return Vec::new();
    }
    items.into_iter().skip(start).take(end - start).collect()
}

/// Grouping value of a record for a column. Unknown columns fall back to
/// the record's parent key.
fn group_value<T: TieredRecord>(record: &T, column: &str) -> String {
    T::schema().resolve(column).map_or_else(
        || record.parent_key().to_string(),
        |column| column.text(record),
    )
}

fn matches_path<T: TieredRecord>(record: &T, path: &[String], grouping: &[String]) -> bool {
    path.iter()
        .zip(grouping)
        .all(|(expected, column)| group_value(record, column) == *expected)
}

// =============================================================================
// Bond Row Service
// =============================================================================

/// Row serving over the bond store.
#[derive(Debug, Clone)]
pub struct BondRowService {
    store: Arc<BondStore>,
}

impl BondRowService {
    /// Create a service over a store.
    #[must_use]
    pub const fn new(store: Arc<BondStore>) -> Self {
        Self { store }
    }

    /// One page of grid rows.
    #[must_use]
    pub fn get_rows(&self, request: &GridRequest) -> GridResponse<BondRow> {
        let response = serve_rows(self.store.snapshot(), request);
        tracing::debug!(
            start_row = request.start_row,
            end_row = request.end_row,
            depth = request.depth(),
            grouping = ?request.grouping_cols,
            rows = response.rows.len(),
            last_row = response.last_row,
            "Served grid rows"
        );
        response
    }

    /// Non-canonical tiers of one instrument, unfiltered.
    #[must_use]
    pub fn tiers_for_bond(&self, instrument_id: &str) -> Vec<BondRow> {
        self.store
            .tiers(instrument_id)
            .iter()
            .filter(|bond| !bond.is_canonical())
            .map(Bond::to_row)
            .collect()
    }

    /// Distinct values of a column across canonical records.
    #[must_use]
    pub fn distinct_values(&self, column: &str) -> Vec<String> {
        let canonical: Vec<Bond> = self
            .store
            .snapshot()
            .into_iter()
            .filter(Bond::is_canonical)
            .collect();
        distinct_values(&canonical, column)
    }

    /// One record.
    #[must_use]
    pub fn bond(&self, instrument_id: &str, tier_id: &str) -> Option<Bond> {
        self.store.get(instrument_id, tier_id)
    }

    /// Every record of every tier.
    #[must_use]
    pub fn all_bonds(&self) -> Vec<Bond> {
        self.store.snapshot()
    }

    /// Whether a column name resolves against the bond schema.
    #[must_use]
    pub fn has_column(column: &str) -> bool {
        Bond::schema().resolve(column).is_some()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::bond::CANONICAL_TIER;
    use crate::domain::bond::tests::sample_bond;
    use crate::domain::query::{FilterModel, SortModel};

    fn bond(id: &str, tier: &str, currency: &str, sector: &str) -> Bond {
        let mut bond = sample_bond(id, tier);
        bond.currency = currency.to_string();
        bond.sector = sector.to_string();
        bond
    }

    /// Three instruments, each with a canonical tier and two children.
    fn dataset() -> Vec<Bond> {
        [("B1", "USD", "Government"), ("B2", "EUR", "Corporate"), ("B3", "USD", "Corporate")]
            .into_iter()
            .flat_map(|(id, currency, sector)| {
                [CANONICAL_TIER, "Tier2", "Tier3"]
                    .map(|tier| bond(id, tier, currency, sector))
            })
            .collect()
    }

    fn record_ids(response: &GridResponse<BondRow>) -> Vec<(&str, &str, bool)> {
        response
            .rows
            .iter()
            .map(|row| {
                let record = row.as_record().unwrap();
                (record.instrument_id.as_str(), record.tier_id.as_str(), row.is_group())
            })
            .collect()
    }

    fn group_keys(response: &GridResponse<BondRow>) -> Vec<(&str, usize)> {
        response
            .rows
            .iter()
            .map(|row| {
                let group = row.as_group().unwrap();
                (group.key.as_str(), group.child_count)
            })
            .collect()
    }

    #[test]
    fn top_level_serves_canonical_rows_as_expandable() {
        let response = serve_rows(dataset(), &GridRequest::page(0, 100));
        assert_eq!(response.last_row, 3);
        assert_eq!(
            record_ids(&response),
            [
                ("B1", "Tier1", true),
                ("B2", "Tier1", true),
                ("B3", "Tier1", true),
            ]
        );
    }

    #[test]
    fn drilling_into_instrument_serves_child_tiers() {
        let request = GridRequest::page(0, 100).drilled_into(["B2"]);
        let response = serve_rows(dataset(), &request);
        assert_eq!(response.last_row, 2);
        assert_eq!(
            record_ids(&response),
            [("B2", "Tier2", false), ("B2", "Tier3", false)]
        );
    }

    #[test]
    fn group_summaries_keep_first_encounter_order() {
        let request = GridRequest::page(0, 100).grouped_by(["currency"]);
        let response = serve_rows(dataset(), &request);
        assert_eq!(response.last_row, 2);
        assert_eq!(group_keys(&response), [("USD", 2), ("EUR", 1)]);
    }

    #[test]
    fn group_summaries_follow_sort_order() {
        let request = GridRequest::page(0, 100)
            .grouped_by(["currency"])
            .with_sort(vec![SortModel::asc("currency")]);
        let response = serve_rows(dataset(), &request);
        assert_eq!(group_keys(&response), [("EUR", 1), ("USD", 2)]);
    }

    #[test]
    fn second_grouping_level_is_restricted_to_chosen_value() {
        let request = GridRequest::page(0, 100)
            .grouped_by(["currency", "sector"])
            .drilled_into(["USD"]);
        let response = serve_rows(dataset(), &request);
        assert_eq!(group_keys(&response), [("Government", 1), ("Corporate", 1)]);
    }

    #[test]
    fn full_depth_serves_matching_canonical_rows() {
        let request = GridRequest::page(0, 100)
            .grouped_by(["sector"])
            .drilled_into(["Corporate"]);
        let response = serve_rows(dataset(), &request);
        assert_eq!(response.last_row, 2);
        assert_eq!(
            record_ids(&response),
            [("B2", "Tier1", true), ("B3", "Tier1", true)]
        );
    }

    #[test]
    fn past_full_depth_serves_child_tiers() {
        let request = GridRequest::page(0, 100)
            .grouped_by(["sector"])
            .drilled_into(["Corporate", "B3"]);
        let response = serve_rows(dataset(), &request);
        assert_eq!(response.last_row, 2);
        assert!(response.rows.iter().all(|row| !row.is_group()));
        assert!(
            response
                .rows
                .iter()
                .all(|row| row.as_record().unwrap().instrument_id == "B3")
        );
    }

    #[test]
    fn unknown_grouping_column_groups_by_instrument() {
        let request = GridRequest::page(0, 100).grouped_by(["desk"]);
        let response = serve_rows(dataset(), &request);
        assert_eq!(
            group_keys(&response),
            [("B1", 1), ("B2", 1), ("B3", 1)]
        );
    }

    #[test]
    fn paging_reports_full_scope() {
        let response = serve_rows(dataset(), &GridRequest::page(1, 2));
        assert_eq!(response.last_row, 3);
        assert_eq!(record_ids(&response), [("B2", "Tier1", true)]);
    }

    #[test]
    fn empty_or_out_of_range_windows_are_empty() {
        let inverted = serve_rows(dataset(), &GridRequest::page(5, 2));
        assert!(inverted.rows.is_empty());
        assert_eq!(inverted.last_row, 3);

        let past_end = serve_rows(dataset(), &GridRequest::page(10, 20));
        assert!(past_end.rows.is_empty());
        assert_eq!(past_end.last_row, 3);

        let negative = serve_rows(dataset(), &GridRequest::page(-3, 1));
        assert_eq!(negative.rows.len(), 1);
    }

    #[test]
    fn filter_applies_before_scoping() {
        let filter = FilterModel::from_json(&json!({"currency": {"values": ["EUR"]}}));
        let request = GridRequest::page(0, 100).with_filter(filter.clone());
        assert_eq!(serve_rows(dataset(), &request).last_row, 1);

        let drill = GridRequest::page(0, 100).with_filter(filter).drilled_into(["B1"]);
        assert_eq!(serve_rows(dataset(), &drill).last_row, 0);
    }

    #[test]
    fn bond_service_wraps_store() {
        let store = Arc::new(BondStore::from_bonds(dataset()));
        let service = BondRowService::new(store);

        assert_eq!(service.get_rows(&GridRequest::page(0, 10)).last_row, 3);
        assert_eq!(service.tiers_for_bond("B1").len(), 2);
        assert!(service.tiers_for_bond("missing").is_empty());
        assert_eq!(service.distinct_values("currency"), ["EUR", "USD"]);
        assert!(service.distinct_values("nope").is_empty());
        assert_eq!(service.all_bonds().len(), 9);
        assert_eq!(service.bond("B3", "Tier2").unwrap().sector, "Corporate");
        assert!(BondRowService::has_column("maturityDate"));
        assert!(!BondRowService::has_column("desk"));
    }
}
