//! Column Filters
//!
//! Parses a grid client's filter model (column id → filter spec) into typed
//! clauses and applies them to any [`Record`] type.
//!
//! Three spec shapes are understood:
//! - **Set**: `{"values": ["EUR", "USD"]}`
//! - **Text**: `{"filter": "gov", "type": "startsWith"}`
//! - **Number**: `{"filter": 4.5, "type": "greaterThan"}`
//!
//! A clause that cannot be parsed is logged and ignored; the remaining
//! clauses still apply. Clauses naming an unknown column are skipped.

use std::collections::HashSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use super::column::Record;

// =============================================================================
// Operators
// =============================================================================

/// Text comparison operator. Comparisons are case-insensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextOperator {
    /// Whole value equals the needle.
    Equals,
    /// Whole value differs from the needle.
    NotEqual,
    /// Value contains the needle.
    #[default]
    Contains,
    /// Value does not contain the needle.
    NotContains,
    /// Value starts with the needle.
    StartsWith,
    /// Value ends with the needle.
    EndsWith,
}

impl TextOperator {
    /// Parse an operator name; unknown or missing names mean `contains`.
    #[must_use]
    pub fn parse(name: Option<&str>) -> Self {
        match name {
            Some("equals") => Self::Equals,
            Some("notEqual") => Self::NotEqual,
            Some("notContains") => Self::NotContains,
            Some("startsWith") => Self::StartsWith,
            Some("endsWith") => Self::EndsWith,
            _ => Self::Contains,
        }
    }

    /// Test a value against a needle that is already lower-cased.
    #[must_use]
    pub fn matches(self, value: &str, needle: &str) -> bool {
        let value = value.to_lowercase();
        match self {
            Self::Equals => value == needle,
            Self::NotEqual => value != needle,
            Self::Contains => value.contains(needle),
            Self::NotContains => !value.contains(needle),
            Self::StartsWith => value.starts_with(needle),
            Self::EndsWith => value.ends_with(needle),
        }
    }
}

/// Numeric comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NumberOperator {
    /// `field == value`
    #[default]
    Equals,
    /// `field != value`
    NotEqual,
    /// `field < value`
    LessThan,
    /// `field <= value`
    LessThanOrEqual,
    /// `field > value`
    GreaterThan,
    /// `field >= value`
    GreaterThanOrEqual,
}

impl NumberOperator {
    /// Parse an operator name; unknown or missing names mean `equals`.
    #[must_use]
    pub fn parse(name: Option<&str>) -> Self {
        match name {
            Some("notEqual") => Self::NotEqual,
            Some("lessThan") => Self::LessThan,
            Some("lessThanOrEqual") => Self::LessThanOrEqual,
            Some("greaterThan") => Self::GreaterThan,
            Some("greaterThanOrEqual") => Self::GreaterThanOrEqual,
            _ => Self::Equals,
        }
    }

    /// Compare a field value against the filter operand.
    #[must_use]
    pub fn matches(self, field: Decimal, operand: Decimal) -> bool {
        match self {
            Self::Equals => field == operand,
            Self::NotEqual => field != operand,
            Self::LessThan => field < operand,
            Self::LessThanOrEqual => field <= operand,
            Self::GreaterThan => field > operand,
            Self::GreaterThanOrEqual => field >= operand,
        }
    }
}

// =============================================================================
// Filter Specs
// =============================================================================

/// A parsed filter clause for one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterSpec {
    /// Keep rows whose text value is one of `values`. Empty keeps nothing.
    Set(Vec<String>),
    /// Case-insensitive text match.
    Text {
        /// Operator to apply.
        operator: TextOperator,
        /// Lower-cased needle.
        needle: String,
    },
    /// Numeric comparison; rows whose field cannot be coerced are dropped.
    Number {
        /// Operator to apply.
        operator: NumberOperator,
        /// Right-hand operand.
        operand: Decimal,
    },
}

impl FilterSpec {
    /// Parse one filter-model entry.
    ///
    /// Returns `Ok(None)` for entries that carry no usable condition (for
    /// example an empty text box).
    ///
    /// # Errors
    ///
    /// Returns `FilterParseError` when the entry is not an object or its
    /// `values` list is not a list of strings.
    pub fn parse(column: &str, raw: &Value) -> Result<Option<Self>, FilterParseError> {
        let Value::Object(spec) = raw else {
            return Err(FilterParseError::NotAnObject {
                column: column.to_string(),
            });
        };

        match spec.get("values") {
            None | Some(Value::Null) => {}
            Some(Value::Array(items)) => {
                // `null` is the grid's "(Blanks)" entry and never matches.
                let values = items
                    .iter()
                    .filter(|item| !item.is_null())
                    .map(|item| {
                        item.as_str()
                            .map(str::to_string)
                            .ok_or_else(|| FilterParseError::InvalidSetValue {
                                column: column.to_string(),
                                value: item.to_string(),
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                return Ok(Some(Self::Set(values)));
            }
            Some(other) => {
                return Err(FilterParseError::InvalidSetValue {
                    column: column.to_string(),
                    value: other.to_string(),
                });
            }
        }

        let operator_name = spec.get("type").and_then(Value::as_str);

        match spec.get("filter") {
            Some(Value::String(text)) if !text.is_empty() => Ok(Some(Self::Text {
                operator: TextOperator::parse(operator_name),
                needle: text.to_lowercase(),
            })),
            Some(Value::Number(number)) => Ok(decimal_from_json(number).map(|operand| {
                Self::Number {
                    operator: NumberOperator::parse(operator_name),
                    operand,
                }
            })),
            _ => Ok(None),
        }
    }
}

fn decimal_from_json(number: &serde_json::Number) -> Option<Decimal> {
    number
        .as_i64()
        .map(Decimal::from)
        .or_else(|| number.to_string().parse().ok())
        .or_else(|| number.as_f64().and_then(Decimal::from_f64_retain))
}

/// A filter clause that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterParseError {
    /// The model itself is not a column → spec object.
    #[error("filter model must be an object, got {0}")]
    InvalidModel(String),
    /// The spec for a column is not an object.
    #[error("filter for column '{column}' is not an object")]
    NotAnObject {
        /// Column id as sent by the client.
        column: String,
    },
    /// A set filter contains something other than strings.
    #[error("set filter for column '{column}' has invalid value {value}")]
    InvalidSetValue {
        /// Column id as sent by the client.
        column: String,
        /// Offending JSON value.
        value: String,
    },
}

// =============================================================================
// Filter Model
// =============================================================================

/// A filter clause bound to the column id it was sent for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnFilter {
    /// Column id as sent by the client (resolved at apply time).
    pub column: String,
    /// The parsed condition.
    pub spec: FilterSpec,
}

/// All filter clauses of a request. Clauses combine with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterModel {
    clauses: Vec<ColumnFilter>,
}

impl FilterModel {
    /// Create a model from already parsed clauses.
    #[must_use]
    pub const fn new(clauses: Vec<ColumnFilter>) -> Self {
        Self { clauses }
    }

    /// Parse a raw filter model, dropping (and logging) malformed clauses.
    #[must_use]
    pub fn from_json(raw: &Value) -> Self {
        match raw {
            Value::Null => Self::default(),
            Value::Object(entries) => Self::from_entries(entries),
            other => {
                let err = FilterParseError::InvalidModel(other.to_string());
                tracing::warn!(error = %err, "Ignoring filter model");
                Self::default()
            }
        }
    }

    fn from_entries(entries: &Map<String, Value>) -> Self {
        let clauses = entries
            .iter()
            .filter_map(|(column, raw)| match FilterSpec::parse(column, raw) {
                Ok(spec) => spec.map(|spec| ColumnFilter {
                    column: column.clone(),
                    spec,
                }),
                Err(err) => {
                    tracing::warn!(column = %column, error = %err, "Ignoring malformed filter clause");
                    None
                }
            })
            .collect();
        Self { clauses }
    }

    /// Deserialize leniently: anything malformed becomes "no clause".
    ///
    /// # Errors
    ///
    /// Only fails if the input is not valid JSON at all.
    pub fn deserialize_lenient<'de, D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<Value>::deserialize(deserializer)?;
        Ok(raw.as_ref().map(Self::from_json).unwrap_or_default())
    }

    /// Parsed clauses.
    #[must_use]
    pub fn clauses(&self) -> &[ColumnFilter] {
        &self.clauses
    }

    /// Whether the model has no clauses.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Apply every clause in turn.
    #[must_use]
    pub fn apply<T: Record>(&self, rows: Vec<T>) -> Vec<T> {
        self.clauses
            .iter()
            .fold(rows, |rows, clause| apply_clause(rows, clause))
    }
}

fn apply_clause<T: Record>(mut rows: Vec<T>, clause: &ColumnFilter) -> Vec<T> {
    let Some(column) = T::schema().resolve(&clause.column) else {
        tracing::debug!(column = %clause.column, "Skipping filter on unknown column");
        return rows;
    };

    match &clause.spec {
        FilterSpec::Set(values) if values.is_empty() => Vec::new(),
        FilterSpec::Set(values) => {
            let allowed: HashSet<&str> = values.iter().map(String::as_str).collect();
            rows.retain(|row| allowed.contains(column.text(row).as_str()));
            rows
        }
        FilterSpec::Text { operator, needle } => {
            rows.retain(|row| operator.matches(&column.text(row), needle));
            rows
        }
        FilterSpec::Number { operator, operand } => {
            rows.retain(|row| {
                column
                    .value(row)
                    .as_decimal()
                    .is_some_and(|field| operator.matches(field, *operand))
            });
            rows
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
