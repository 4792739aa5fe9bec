//! # PostgreSQL Data Store
//!
//! PostgreSQL implementation of [`DataStore`] using sqlx.
//!
//! Every table has the same shape: the row id, a store-assigned `seq`, and
//! the row body as JSONB.
//!
//! ```sql
//! CREATE TABLE deal_negotiations (
//!     id   TEXT PRIMARY KEY,
//!     seq  BIGSERIAL NOT NULL,
//!     data JSONB NOT NULL
//! );
//! ```
//!
//! Updates merge the patch into `data` with `||`. The compare-and-swap check
//! reads `data->>'version'` in the same statement, so it is atomic.

use crate::infrastructure::persistence::traits::{
    Condition, DataStore, Filter, FilterValue, ID_FIELD, RepositoryError, RepositoryResult, Row,
    SEQ_FIELD, SortOrder, Table, row_version,
};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder};

/// PostgreSQL implementation of [`DataStore`].
///
/// # Examples
///
/// ```ignore
/// use sqlx::PgPool;
/// use dealdesk::infrastructure::persistence::postgres::PostgresDataStore;
///
/// let pool = PgPool::connect("postgres://...").await?;
/// let store = PostgresDataStore::new(pool);
/// store.migrate().await?;
/// ```
#[derive(Debug, Clone)]
pub struct PostgresDataStore {
    pool: PgPool,
}

impl PostgresDataStore {
    /// Creates a new PostgreSQL data store.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects lazily to `url` with at most `max_connections` connections.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Connection` if the URL is invalid.
    pub fn connect_lazy(url: &str, max_connections: u32) -> RepositoryResult<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_lazy(url)
            .map_err(|e| RepositoryError::connection(e.to_string()))?;
        Ok(Self::new(pool))
    }

    /// Returns a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the tables if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns a query error if the DDL fails.
    pub async fn migrate(&self) -> RepositoryResult<()> {
        for table in [Table::DealNegotiations, Table::DealMessages] {
            let ddl = format!(
                "CREATE TABLE IF NOT EXISTS {table} (\
                 id TEXT PRIMARY KEY, \
                 seq BIGSERIAL NOT NULL, \
                 data JSONB NOT NULL)"
            );
            sqlx::query(&ddl)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        }
        Ok(())
    }
}

#[async_trait]
impl DataStore for PostgresDataStore {
    async fn get(&self, table: Table, id: &str) -> RepositoryResult<Option<Row>> {
        let sql = format!("SELECT data, seq FROM {table} WHERE id = $1");
        let row: Option<DataRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(DataRow::try_into_row).transpose()
    }

    async fn query(&self, table: Table, filter: &Filter) -> RepositoryResult<Vec<Row>> {
        let mut builder = select_builder(table, filter)?;
        let rows: Vec<DataRow> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        rows.into_iter().map(DataRow::try_into_row).collect()
    }

    async fn insert(&self, table: Table, mut row: Row) -> RepositoryResult<Row> {
        let id = row
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| RepositoryError::query(format!("{table} row has no id")))?;
        row.remove(SEQ_FIELD);

        let sql = format!(
            "INSERT INTO {table} (id, data) VALUES ($1, $2) \
             ON CONFLICT (id) DO NOTHING \
             RETURNING data, seq"
        );
        let inserted: Option<DataRow> = sqlx::query_as(&sql)
            .bind(&id)
            .bind(Value::Object(row))
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        match inserted {
            Some(r) => r.try_into_row(),
            None => Err(RepositoryError::duplicate(table.entity_type(), id)),
        }
    }

    async fn update(
        &self,
        table: Table,
        id: &str,
        mut patch: Row,
        expected_version: Option<u64>,
    ) -> RepositoryResult<Row> {
        patch.remove(ID_FIELD);
        patch.remove(SEQ_FIELD);
        let expected = expected_version.map(to_i64).transpose()?;

        let sql = format!(
            "UPDATE {table} SET data = data || $2 \
             WHERE id = $1 \
             AND ($3::BIGINT IS NULL OR COALESCE((data->>'version')::BIGINT, 0) = $3) \
             RETURNING data, seq"
        );
        let updated: Option<DataRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(Value::Object(patch))
            .bind(expected)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        if let Some(row) = updated {
            return row.try_into_row();
        }

        match (self.get(table, id).await?, expected_version) {
            (None, _) => Err(RepositoryError::not_found(table.entity_type(), id)),
            (Some(current), Some(expected)) => Err(RepositoryError::version_conflict(
                table.entity_type(),
                id,
                expected,
                row_version(&current),
            )),
            (Some(_), None) => Err(RepositoryError::internal(format!(
                "update of {table}/{id} matched no row"
            ))),
        }
    }
}

/// Builds the SELECT for a filter.
fn select_builder(table: Table, filter: &Filter) -> RepositoryResult<QueryBuilder<'_, Postgres>> {
    let mut builder: QueryBuilder<'_, Postgres> =
        QueryBuilder::new(format!("SELECT data, seq FROM {table} WHERE TRUE"));

    for condition in filter.conditions() {
        for field in condition.fields() {
            ensure_field_name(field)?;
        }
        builder.push(" AND ");
        match condition {
            Condition::Eq { field, value } => {
                push_typed(&mut builder, field, value);
                builder.push(" = ");
                push_value(&mut builder, value);
            }
            Condition::In { field, values } => {
                if values.is_empty() {
                    builder.push("FALSE");
                    continue;
                }
                builder.push("(");
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        builder.push(" OR ");
                    }
                    push_typed(&mut builder, field, value);
                    builder.push(" = ");
                    push_value(&mut builder, value);
                }
                builder.push(")");
            }
            Condition::Gte { field, value } => {
                push_typed(&mut builder, field, value);
                builder.push(" >= ");
                push_value(&mut builder, value);
            }
            Condition::Lte { field, value } => {
                push_typed(&mut builder, field, value);
                builder.push(" <= ");
                push_value(&mut builder, value);
            }
            Condition::Search { fields, term } => {
                let pattern = format!("%{}%", escape_like(term));
                builder.push("(");
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        builder.push(" OR ");
                    }
                    builder.push(format!("data->>'{field}' ILIKE "));
                    builder.push_bind(pattern.clone());
                }
                if fields.is_empty() {
                    builder.push("FALSE");
                }
                builder.push(")");
            }
        }
    }

    builder.push(" ORDER BY ");
    for (field, order) in filter.ordering() {
        ensure_field_name(field)?;
        builder.push(format!("{} {}, ", sort_expr(field), order_keyword(*order)));
    }
    builder.push("seq ASC");

    if let Some(limit) = filter.limit_value() {
        builder.push(" LIMIT ");
        builder.push_bind(to_i64(limit as u64)?);
    }
    if let Some(offset) = filter.offset_value() {
        builder.push(" OFFSET ");
        builder.push_bind(to_i64(offset as u64)?);
    }
    Ok(builder)
}

fn push_typed(builder: &mut QueryBuilder<'_, Postgres>, field: &str, value: &FilterValue) {
    let expr = match value {
        FilterValue::Text(_) => format!("data->>'{field}'"),
        FilterValue::Number(_) => format!("(data->>'{field}')::NUMERIC"),
        FilterValue::Timestamp(_) => format!("(data->>'{field}')::TIMESTAMPTZ"),
        FilterValue::Bool(_) => format!("(data->>'{field}')::BOOLEAN"),
    };
    builder.push(expr);
}

fn push_value(builder: &mut QueryBuilder<'_, Postgres>, value: &FilterValue) {
    match value {
        FilterValue::Text(s) => builder.push_bind(s.clone()),
        FilterValue::Number(d) => builder.push_bind(*d),
        FilterValue::Timestamp(t) => builder.push_bind(*t.as_datetime()),
        FilterValue::Bool(b) => builder.push_bind(*b),
    };
}

/// Sort expression for a field, cast by naming convention.
fn sort_expr(field: &str) -> String {
    if field == SEQ_FIELD {
        return SEQ_FIELD.to_string();
    }
    if field.ends_with("_at") || field == "deadline" || field == "performance_date" {
        format!("(data->>'{field}')::TIMESTAMPTZ")
    } else if field.ends_with("_fee")
        || field.ends_with("_amount")
        || field.ends_with("_count")
        || field.ends_with("_threshold")
    {
        format!("(data->>'{field}')::NUMERIC")
    } else {
        format!("data->>'{field}'")
    }
}

fn order_keyword(order: SortOrder) -> &'static str {
    match order {
        SortOrder::Asc => "ASC NULLS FIRST",
        SortOrder::Desc => "DESC NULLS LAST",
    }
}

/// Field names are spliced into SQL, so only `[a-z0-9_]` is allowed.
fn ensure_field_name(field: &str) -> RepositoryResult<()> {
    let valid = !field.is_empty()
        && field
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(RepositoryError::query(format!("invalid field name: {field:?}")))
    }
}

fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn to_i64(value: u64) -> RepositoryResult<i64> {
    i64::try_from(value).map_err(|_| RepositoryError::query(format!("{value} out of range")))
}

fn map_sqlx_error(error: sqlx::Error) -> RepositoryError {
    match error {
        sqlx::Error::PoolTimedOut => RepositoryError::timeout(error.to_string()),
        sqlx::Error::Io(_) | sqlx::Error::PoolClosed | sqlx::Error::Tls(_) => {
            RepositoryError::connection(error.to_string())
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            RepositoryError::serialization(error.to_string())
        }
        other => RepositoryError::query(other.to_string()),
    }
}

/// Row type for data queries.
#[derive(Debug, sqlx::FromRow)]
struct DataRow {
    data: Value,
    seq: i64,
}

impl DataRow {
    fn try_into_row(self) -> RepositoryResult<Row> {
        let Value::Object(mut row) = self.data else {
            return Err(RepositoryError::serialization("row body is not an object"));
        };
        row.insert(SEQ_FIELD.to_string(), Value::from(self.seq));
        Ok(row)
    }
}
