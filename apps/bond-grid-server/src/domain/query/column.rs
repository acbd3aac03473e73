//! Column Schemas
//!
//! Explicit per-record-type column tables. Each column maps a canonical
//! name to a typed accessor, so filtering and sorting can address fields
//! by the loosely formatted names a grid client sends (`maturityDate`,
//! `maturity_date`, `Maturity Date`).

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;

// =============================================================================
// Field Values
// =============================================================================

/// A single field value read from a record through its column accessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Free text.
    Text(String),
    /// Exact decimal number.
    Number(Decimal),
    /// Integral number.
    Integer(i64),
    /// Point in time.
    Timestamp(DateTime<Utc>),
    /// Flag.
    Boolean(bool),
}

impl FieldValue {
    /// Coerce the value to a decimal.
    ///
    /// Text is parsed; timestamps and flags never coerce.
    #[must_use]
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Integer(value) => Some(Decimal::from(*value)),
            Self::Text(text) => text.trim().parse().ok(),
            Self::Timestamp(_) | Self::Boolean(_) => None,
        }
    }

    /// Compare two values using the native ordering of their type.
    ///
    /// Strings compare ordinally (case-sensitive). Values of mismatched
    /// types fall back to comparing their text form.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Number(a), Self::Number(b)) => a.cmp(b),
            (Self::Integer(a), Self::Integer(b)) => a.cmp(b),
            (Self::Number(a), Self::Integer(b)) => a.cmp(&Decimal::from(*b)),
            (Self::Integer(a), Self::Number(b)) => Decimal::from(*a).cmp(b),
            (Self::Timestamp(a), Self::Timestamp(b)) => a.cmp(b),
            (Self::Boolean(a), Self::Boolean(b)) => a.cmp(b),
            (a, b) => a.to_string().cmp(&b.to_string()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Number(value) => write!(f, "{value}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Timestamp(value) => {
                f.write_str(&value.to_rfc3339_opts(SecondsFormat::Secs, true))
            }
            Self::Boolean(value) => write!(f, "{value}"),
        }
    }
}

/// Broad type of a column, used by clients to pick a filter UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Text column.
    Text,
    /// Numeric column.
    Number,
    /// Date/time column.
    Temporal,
    /// Boolean column.
    Boolean,
}

// =============================================================================
// Columns
// =============================================================================

/// A named, typed accessor into a record of type `T`.
pub struct Column<T> {
    name: &'static str,
    kind: ColumnKind,
    accessor: fn(&T) -> FieldValue,
}

impl<T> Column<T> {
    /// Create a column.
    #[must_use]
    pub const fn new(name: &'static str, kind: ColumnKind, accessor: fn(&T) -> FieldValue) -> Self {
        Self {
            name,
            kind,
            accessor,
        }
    }

    /// Canonical column name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Column type.
    #[must_use]
    pub const fn kind(&self) -> ColumnKind {
        self.kind
    }

    /// Read this column from a record.
    #[must_use]
    pub fn value(&self, record: &T) -> FieldValue {
        (self.accessor)(record)
    }

    /// Read this column as text.
    #[must_use]
    pub fn text(&self, record: &T) -> String {
        self.value(record).to_string()
    }
}

impl<T> fmt::Debug for Column<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Schema
// =============================================================================

/// Column table for a record type, indexed by lower-cased canonical name.
pub struct Schema<T> {
    columns: Vec<Column<T>>,
    by_name: HashMap<String, usize>,
}

impl<T> Schema<T> {
    /// Build a schema from its columns.
    ///
    /// Later columns with a duplicate name shadow earlier ones.
    #[must_use]
    pub fn new(columns: Vec<Column<T>>) -> Self {
        let by_name = columns
            .iter()
            .enumerate()
            .map(|(index, column)| (column.name.to_lowercase(), index))
            .collect();
        Self { columns, by_name }
    }

    /// All columns in declaration order.
    #[must_use]
    pub fn columns(&self) -> &[Column<T>] {
        &self.columns
    }

    /// Resolve a client-supplied column name.
    ///
    /// Tries, in order: an exact case-insensitive match, the name with its
    /// first character upper-cased, and the name with spaces, dashes and
    /// underscores removed.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<&Column<T>> {
        self.lookup(name)
            .or_else(|| self.lookup(&capitalize_first(name)))
            .or_else(|| self.lookup(&strip_separators(name)))
    }

    fn lookup(&self, candidate: &str) -> Option<&Column<T>> {
        self.by_name
            .get(&candidate.to_lowercase())
            .and_then(|&index| self.columns.get(index))
    }
}

impl<T> fmt::Debug for Schema<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.columns.iter().map(Column::name))
            .finish()
    }
}

/// A record type that exposes its fields through a column schema.
pub trait Record: Sized + 'static {
    /// The shared column table for this type.
    fn schema() -> &'static Schema<Self>;
}

fn capitalize_first(name: &str) -> String {
    let mut chars = name.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

fn strip_separators(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::TimeZone;

    use super::*;

    struct Widget {
        part_number: String,
        price: Decimal,
    }

    fn widget_schema() -> Schema<Widget> {
        Schema::new(vec![
            Column::new("PartNumber", ColumnKind::Text, |w: &Widget| {
                FieldValue::Text(w.part_number.clone())
            }),
            Column::new("Price", ColumnKind::Number, |w: &Widget| {
                FieldValue::Number(w.price)
            }),
        ])
    }

    #[test]
    fn resolves_exact_name_ignoring_case() {
        let schema = widget_schema();
        assert_eq!(schema.resolve("partnumber").unwrap().name(), "PartNumber");
        assert_eq!(schema.resolve("PRICE").unwrap().name(), "Price");
    }

    #[test]
    fn resolves_camel_case_name() {
        let schema = widget_schema();
        assert_eq!(schema.resolve("partNumber").unwrap().name(), "PartNumber");
    }

    #[test]
    fn resolves_separated_names() {
        let schema = widget_schema();
        assert_eq!(schema.resolve("part_number").unwrap().name(), "PartNumber");
        assert_eq!(schema.resolve("part-number").unwrap().name(), "PartNumber");
        assert_eq!(schema.resolve("Part Number").unwrap().name(), "PartNumber");
    }

    #[test]
    fn unknown_name_is_unresolved() {
        let schema = widget_schema();
        assert!(schema.resolve("weight").is_none());
        assert!(schema.resolve("").is_none());
    }

    #[test]
    fn column_reads_record() {
        let schema = widget_schema();
        let widget = Widget {
            part_number: "W-1".to_string(),
            price: Decimal::from_str("12.50").unwrap(),
        };
        let price = schema.resolve("price").unwrap();
        assert_eq!(price.kind(), ColumnKind::Number);
        assert_eq!(price.text(&widget), "12.50");
    }

    #[test]
    fn decimal_coercion() {
        assert_eq!(
            FieldValue::Text(" 4.5 ".to_string()).as_decimal(),
            Some(Decimal::from_str("4.5").unwrap())
        );
        assert_eq!(FieldValue::Integer(7).as_decimal(), Some(Decimal::from(7)));
        assert_eq!(FieldValue::Text("n/a".to_string()).as_decimal(), None);
        assert_eq!(FieldValue::Boolean(true).as_decimal(), None);
        let ts = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(FieldValue::Timestamp(ts).as_decimal(), None);
    }

    #[test]
    fn native_ordering() {
        let ten = FieldValue::Number(Decimal::from(10));
        let nine = FieldValue::Integer(9);
        assert_eq!(ten.compare(&nine), Ordering::Greater);

        // Ordinal string ordering is case-sensitive: 'Z' < 'a'.
        let upper = FieldValue::Text("Zeta".to_string());
        let lower = FieldValue::Text("alpha".to_string());
        assert_eq!(upper.compare(&lower), Ordering::Less);

        let earlier = FieldValue::Timestamp(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap());
        let later = FieldValue::Timestamp(Utc.with_ymd_and_hms(2031, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(earlier.compare(&later), Ordering::Less);
    }

    #[test]
    fn timestamp_text_is_rfc3339() {
        let ts = Utc.with_ymd_and_hms(2030, 6, 15, 12, 30, 0).unwrap();
        assert_eq!(FieldValue::Timestamp(ts).to_string(), "2030-06-15T12:30:00Z");
    }
}
