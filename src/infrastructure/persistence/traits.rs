//! # Data Store Port
//!
//! Row-level persistence abstraction over the hosted backend.
//!
//! All deal and message persistence reduces to four operations against two
//! tables (see [`Table`]):
//!
//! - [`DataStore::get`] one row by id
//! - [`DataStore::query`] rows matching a [`Filter`]
//! - [`DataStore::insert`] a new row; the store assigns a monotonic `seq`
//! - [`DataStore::update`] merge a patch into a row, optionally guarded by
//!   the row's `version` (compare-and-swap)
//!
//! Rows are JSON objects ([`Row`]). Adapters live in sibling modules:
//! in-memory, PostgreSQL, REST, and a retrying decorator.
//!
//! # Examples
//!
//! ```
//! use dealdesk::infrastructure::persistence::traits::{Filter, SortOrder};
//!
//! let filter = Filter::new()
//!     .eq("artist_id", "artist-1")
//!     .in_values("status", ["proposed", "negotiating"])
//!     .order_by("created_at", SortOrder::Desc)
//!     .limit(20);
//!
//! assert_eq!(filter.conditions().len(), 2);
//! ```

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::domain::value_objects::timestamp::Timestamp;

/// A stored row.
pub type Row = serde_json::Map<String, Value>;

/// Column holding the row identifier.
pub const ID_FIELD: &str = "id";

/// Column holding the store-assigned insertion sequence.
pub const SEQ_FIELD: &str = "seq";

/// Column holding the optimistic-concurrency version.
pub const VERSION_FIELD: &str = "version";

/// Error type for repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Entity not found.
    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound {
        /// Type of entity.
        entity_type: &'static str,
        /// Entity identifier.
        id: String,
    },

    /// Duplicate entity.
    #[error("Duplicate entity: {entity_type} with id {id} already exists")]
    Duplicate {
        /// Type of entity.
        entity_type: &'static str,
        /// Entity identifier.
        id: String,
    },

    /// Optimistic locking conflict.
    #[error("Version conflict: {entity_type} with id {id} has been modified")]
    VersionConflict {
        /// Type of entity.
        entity_type: &'static str,
        /// Entity identifier.
        id: String,
        /// Expected version.
        expected: u64,
        /// Actual version.
        actual: u64,
    },

    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The backend did not answer in time.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Query error.
    #[error("Query error: {0}")]
    Query(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RepositoryError {
    /// Creates a not found error.
    #[must_use]
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates a duplicate error.
    #[must_use]
    pub fn duplicate(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::Duplicate {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates a version conflict error.
    #[must_use]
    pub fn version_conflict(
        entity_type: &'static str,
        id: impl Into<String>,
        expected: u64,
        actual: u64,
    ) -> Self {
        Self::VersionConflict {
            entity_type,
            id: id.into(),
            expected,
            actual,
        }
    }

    /// Creates a connection error.
    #[must_use]
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Creates a query error.
    #[must_use]
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates a serialization error.
    #[must_use]
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true if this is a not found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if this is a duplicate error.
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }

    /// Returns true if this is a version conflict error.
    #[must_use]
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }

    /// Returns true if retrying the same call may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout(_))
    }
}

/// Result type for repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Tables of the hosted backend used by the negotiation core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    /// One row per deal.
    DealNegotiations,
    /// One row per message.
    DealMessages,
}

impl Table {
    /// Returns the table name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DealNegotiations => "deal_negotiations",
            Self::DealMessages => "deal_messages",
        }
    }

    /// Returns the entity name used in errors.
    #[must_use]
    pub const fn entity_type(&self) -> &'static str {
        match self {
            Self::DealNegotiations => "DealRecord",
            Self::DealMessages => "DealMessage",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed value a filter compares a column against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    /// Compared as text.
    Text(String),
    /// Compared numerically.
    Number(Decimal),
    /// Compared as an instant.
    Timestamp(Timestamp),
    /// Compared as a boolean.
    Bool(bool),
}

impl FilterValue {
    /// Compares a stored JSON value against this filter value.
    ///
    /// Returns `None` if the stored value is missing or of another kind.
    #[must_use]
    pub fn compare_stored(&self, stored: &Value) -> Option<Ordering> {
        match self {
            Self::Text(expected) => stored.as_str().map(|s| s.cmp(expected.as_str())),
            Self::Number(expected) => json_decimal(stored).map(|d| d.cmp(expected)),
            Self::Timestamp(expected) => stored
                .as_str()
                .and_then(Timestamp::parse_rfc3339)
                .map(|t| t.cmp(expected)),
            Self::Bool(expected) => stored.as_bool().map(|b| b.cmp(expected)),
        }
    }

    /// Renders the value the way a query string expects it.
    #[must_use]
    pub fn to_query_string(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Number(d) => d.to_string(),
            Self::Timestamp(t) => t.to_rfc3339(),
            Self::Bool(b) => b.to_string(),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Decimal> for FilterValue {
    fn from(d: Decimal) -> Self {
        Self::Number(d)
    }
}

impl From<Timestamp> for FilterValue {
    fn from(t: Timestamp) -> Self {
        Self::Timestamp(t)
    }
}

impl From<bool> for FilterValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// One condition of a [`Filter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// Column equals value.
    Eq {
        /// Column name.
        field: String,
        /// Expected value.
        value: FilterValue,
    },
    /// Column equals any of the values.
    In {
        /// Column name.
        field: String,
        /// Accepted values.
        values: Vec<FilterValue>,
    },
    /// Column is greater than or equal to value.
    Gte {
        /// Column name.
        field: String,
        /// Lower bound.
        value: FilterValue,
    },
    /// Column is less than or equal to value.
    Lte {
        /// Column name.
        field: String,
        /// Upper bound.
        value: FilterValue,
    },
    /// Any of the columns contains the term, ignoring case.
    Search {
        /// Column names.
        fields: Vec<String>,
        /// Search term.
        term: String,
    },
}

impl Condition {
    /// Returns true if `row` satisfies the condition.
    #[must_use]
    pub fn matches(&self, row: &Row) -> bool {
        let compare = |field: &str, value: &FilterValue| {
            row.get(field).and_then(|stored| value.compare_stored(stored))
        };
        match self {
            Self::Eq { field, value } => compare(field, value) == Some(Ordering::Equal),
            Self::In { field, values } => values
                .iter()
                .any(|value| compare(field, value) == Some(Ordering::Equal)),
            Self::Gte { field, value } => {
                matches!(compare(field, value), Some(Ordering::Greater | Ordering::Equal))
            }
            Self::Lte { field, value } => {
                matches!(compare(field, value), Some(Ordering::Less | Ordering::Equal))
            }
            Self::Search { fields, term } => {
                let needle = term.to_lowercase();
                fields.iter().any(|field| {
                    row.get(field)
                        .and_then(Value::as_str)
                        .is_some_and(|text| text.to_lowercase().contains(&needle))
                })
            }
        }
    }

    /// Returns the column names the condition reads.
    #[must_use]
    pub fn fields(&self) -> Vec<&str> {
        match self {
            Self::Eq { field, .. }
            | Self::In { field, .. }
            | Self::Gte { field, .. }
            | Self::Lte { field, .. } => vec![field.as_str()],
            Self::Search { fields, .. } => fields.iter().map(String::as_str).collect(),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Smallest first.
    #[default]
    Asc,
    /// Largest first.
    Desc,
}

impl SortOrder {
    /// Returns the keyword used in query strings and SQL.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// Conditions, ordering and paging for [`DataStore::query`].
///
/// Conditions are combined with AND. Rows without an explicit ordering come
/// back in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    conditions: Vec<Condition>,
    order: Vec<(String, SortOrder)>,
    limit: Option<usize>,
    offset: Option<usize>,
}

impl Filter {
    /// Creates an empty filter matching every row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an equality condition.
    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.conditions.push(Condition::Eq {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Adds a membership condition.
    #[must_use]
    pub fn in_values<I, V>(mut self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FilterValue>,
    {
        self.conditions.push(Condition::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Adds a lower bound.
    #[must_use]
    pub fn gte(mut self, field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.conditions.push(Condition::Gte {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Adds an upper bound.
    #[must_use]
    pub fn lte(mut self, field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.conditions.push(Condition::Lte {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Adds a case-insensitive substring search over several columns.
    #[must_use]
    pub fn search<I, S>(mut self, fields: I, term: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.conditions.push(Condition::Search {
            fields: fields.into_iter().map(Into::into).collect(),
            term: term.into(),
        });
        self
    }

    /// Appends a sort key.
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.order.push((field.into(), order));
        self
    }

    /// Caps the number of rows returned.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips rows before returning.
    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Returns the conditions.
    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Returns the sort keys.
    #[must_use]
    pub fn ordering(&self) -> &[(String, SortOrder)] {
        &self.order
    }

    /// Returns the row limit.
    #[must_use]
    pub fn limit_value(&self) -> Option<usize> {
        self.limit
    }

    /// Returns the row offset.
    #[must_use]
    pub fn offset_value(&self) -> Option<usize> {
        self.offset
    }

    /// Returns true if `row` satisfies every condition.
    #[must_use]
    pub fn matches(&self, row: &Row) -> bool {
        self.conditions.iter().all(|c| c.matches(row))
    }

    /// Orders rows by the sort keys, falling back to `seq`.
    pub fn sort(&self, rows: &mut [Row]) {
        rows.sort_by(|a, b| {
            for (field, order) in &self.order {
                let ordering = compare_json(a.get(field), b.get(field));
                let ordering = match order {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            compare_json(a.get(SEQ_FIELD), b.get(SEQ_FIELD))
        });
    }

    /// Applies matching, ordering and paging to an in-memory row set.
    #[must_use]
    pub fn apply<I>(&self, rows: I) -> Vec<Row>
    where
        I: IntoIterator<Item = Row>,
    {
        let mut matched: Vec<Row> = rows.into_iter().filter(|r| self.matches(r)).collect();
        self.sort(&mut matched);
        matched
            .into_iter()
            .skip(self.offset.unwrap_or(0))
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}

/// Reads a JSON number or numeric string as a decimal.
#[must_use]
pub fn json_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        Value::String(s) => Decimal::from_str(s).ok(),
        _ => None,
    }
}

/// Orders two optional JSON values: missing first, then numbers, instants
/// and plain text compared by kind.
fn compare_json(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        (Some(a), Some(b)) => {
            if let (Some(x), Some(y)) = (json_decimal(a), json_decimal(b)) {
                return x.cmp(&y);
            }
            if let (Some(x), Some(y)) = (
                a.as_str().and_then(Timestamp::parse_rfc3339),
                b.as_str().and_then(Timestamp::parse_rfc3339),
            ) {
                return x.cmp(&y);
            }
            match (a.as_str(), b.as_str()) {
                (Some(x), Some(y)) => x.cmp(y),
                _ => a.to_string().cmp(&b.to_string()),
            }
        }
    }
}

/// Reads the `version` column of a row, zero when absent.
#[must_use]
pub fn row_version(row: &Row) -> u64 {
    row.get(VERSION_FIELD).and_then(Value::as_u64).unwrap_or(0)
}

/// Row-level persistence port.
///
/// Implementations must be safe to share across tasks. `update` with an
/// `expected_version` must be atomic with respect to other updates of the
/// same row.
#[async_trait]
pub trait DataStore: Send + Sync + fmt::Debug {
    /// Fetches one row.
    ///
    /// # Errors
    ///
    /// Returns a connection, timeout or query error from the backend.
    async fn get(&self, table: Table, id: &str) -> RepositoryResult<Option<Row>>;

    /// Fetches rows matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns a connection, timeout or query error from the backend.
    async fn query(&self, table: Table, filter: &Filter) -> RepositoryResult<Vec<Row>>;

    /// Inserts a row and returns it as stored, including its `seq`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Duplicate` if the id exists, or a backend error.
    async fn insert(&self, table: Table, row: Row) -> RepositoryResult<Row>;

    /// Merges `patch` into a row and returns the stored result.
    ///
    /// With `expected_version`, the write only happens if the row's current
    /// `version` equals it.
    ///
    /// # Errors
    ///
    /// - `RepositoryError::NotFound` if the row does not exist
    /// - `RepositoryError::VersionConflict` if the version moved
    /// - a backend error
    async fn update(
        &self,
        table: Table,
        id: &str,
        patch: Row,
        expected_version: Option<u64>,
    ) -> RepositoryResult<Row>;
}
