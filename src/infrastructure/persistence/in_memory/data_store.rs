//! # In-Memory Data Store
//!
//! In-memory implementation of [`DataStore`] for tests and the simulator.
//!
//! Each table is a `HashMap` of rows plus its own sequence counter, behind a
//! single `tokio::sync::RwLock`. Version checks happen under the write lock,
//! so compare-and-swap updates are atomic.

use crate::infrastructure::persistence::traits::{
    DataStore, Filter, ID_FIELD, RepositoryError, RepositoryResult, Row, SEQ_FIELD, Table,
    row_version,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct TableData {
    rows: HashMap<String, Row>,
    next_seq: u64,
}

/// In-memory implementation of [`DataStore`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryDataStore {
    tables: Arc<RwLock<HashMap<Table, TableData>>>,
    pending_failures: Arc<AtomicUsize>,
}

impl InMemoryDataStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` calls fail with a connection error.
    pub fn fail_next(&self, count: usize) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Returns the number of rows in `table`.
    pub async fn len(&self, table: Table) -> usize {
        let tables = self.tables.read().await;
        tables.get(&table).map_or(0, |t| t.rows.len())
    }

    /// Returns true if `table` has no rows.
    pub async fn is_empty(&self, table: Table) -> bool {
        self.len(table).await == 0
    }

    /// Removes every row from every table.
    pub async fn clear(&self) {
        let mut tables = self.tables.write().await;
        tables.clear();
    }

    fn check_injected_failure(&self) -> RepositoryResult<()> {
        let taken = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match taken {
            Ok(_) => Err(RepositoryError::connection("injected failure")),
            Err(_) => Ok(()),
        }
    }
}

#[async_trait]
impl DataStore for InMemoryDataStore {
    async fn get(&self, table: Table, id: &str) -> RepositoryResult<Option<Row>> {
        self.check_injected_failure()?;
        let tables = self.tables.read().await;
        Ok(tables.get(&table).and_then(|t| t.rows.get(id)).cloned())
    }

    async fn query(&self, table: Table, filter: &Filter) -> RepositoryResult<Vec<Row>> {
        self.check_injected_failure()?;
        let tables = self.tables.read().await;
        let rows = tables
            .get(&table)
            .map(|t| t.rows.values().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        Ok(filter.apply(rows))
    }

    async fn insert(&self, table: Table, mut row: Row) -> RepositoryResult<Row> {
        self.check_injected_failure()?;
        let id = row
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| RepositoryError::query(format!("{table} row has no id")))?;

        let mut tables = self.tables.write().await;
        let data = tables.entry(table).or_default();
        if data.rows.contains_key(&id) {
            return Err(RepositoryError::duplicate(table.entity_type(), id));
        }
        data.next_seq += 1;
        row.insert(SEQ_FIELD.to_string(), Value::from(data.next_seq));
        data.rows.insert(id, row.clone());
        Ok(row)
    }

    async fn update(
        &self,
        table: Table,
        id: &str,
        patch: Row,
        expected_version: Option<u64>,
    ) -> RepositoryResult<Row> {
        self.check_injected_failure()?;
        let mut tables = self.tables.write().await;
        let row = tables
            .get_mut(&table)
            .and_then(|t| t.rows.get_mut(id))
            .ok_or_else(|| RepositoryError::not_found(table.entity_type(), id))?;

        if let Some(expected) = expected_version {
            let actual = row_version(row);
            if actual != expected {
                return Err(RepositoryError::version_conflict(
                    table.entity_type(),
                    id,
                    expected,
                    actual,
                ));
            }
        }

        for (key, value) in patch {
            if key == ID_FIELD || key == SEQ_FIELD {
                continue;
            }
            row.insert(key, value);
        }
        Ok(row.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::traits::SortOrder;
    use serde_json::json;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => Row::new(),
        }
    }

    #[tokio::test]
    async fn new_store_is_empty() {
        let store = InMemoryDataStore::new();
        assert!(store.is_empty(Table::DealNegotiations).await);
        assert!(
            store
                .get(Table::DealNegotiations, "missing")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn insert_assigns_increasing_seq() {
        let store = InMemoryDataStore::new();
        let a = store
            .insert(Table::DealMessages, row(json!({"id": "a"})))
            .await
            .unwrap();
        let b = store
            .insert(Table::DealMessages, row(json!({"id": "b"})))
            .await
            .unwrap();
        assert_eq!(a["seq"], 1);
        assert_eq!(b["seq"], 2);
    }

    #[test]
    fn duplicate_insert_fails() {
        let store = InMemoryDataStore::new();
        tokio_test::block_on(async {
            tokio_test::assert_ok!(
                store
                    .insert(Table::DealMessages, row(json!({"id": "a"})))
                    .await
            );
            let err = tokio_test::assert_err!(
                store
                    .insert(Table::DealMessages, row(json!({"id": "a"})))
                    .await
            );
            assert!(err.is_duplicate());
        });
    }

    #[tokio::test]
    async fn update_merges_patch() {
        let store = InMemoryDataStore::new();
        store
            .insert(
                Table::DealNegotiations,
                row(json!({"id": "d", "status": "draft", "title": "x", "version": 0})),
            )
            .await
            .unwrap();
        let updated = store
            .update(
                Table::DealNegotiations,
                "d",
                row(json!({"status": "proposed", "version": 1})),
                Some(0),
            )
            .await
            .unwrap();
        assert_eq!(updated["status"], "proposed");
        assert_eq!(updated["title"], "x");
        assert_eq!(updated["seq"], 1);
    }

    #[tokio::test]
    async fn stale_version_conflicts() {
        let store = InMemoryDataStore::new();
        store
            .insert(Table::DealNegotiations, row(json!({"id": "d", "version": 2})))
            .await
            .unwrap();
        let err = store
            .update(Table::DealNegotiations, "d", row(json!({"version": 2})), Some(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::VersionConflict {
                expected: 1,
                actual: 2,
                ..
            }
        ));
    }

    #[test]
    fn update_missing_row_is_not_found() {
        let store = InMemoryDataStore::new();
        let err = tokio_test::block_on(store.update(
            Table::DealNegotiations,
            "nope",
            Row::new(),
            None,
        ))
        .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn query_filters_and_orders() {
        let store = InMemoryDataStore::new();
        for (id, deal, at) in [
            ("m1", "d1", "2024-01-01T00:00:02Z"),
            ("m2", "d2", "2024-01-01T00:00:01Z"),
            ("m3", "d1", "2024-01-01T00:00:01Z"),
        ] {
            store
                .insert(
                    Table::DealMessages,
                    row(json!({"id": id, "deal_id": deal, "created_at": at})),
                )
                .await
                .unwrap();
        }
        let filter = Filter::new()
            .eq("deal_id", "d1")
            .order_by("created_at", SortOrder::Asc);
        let rows = store.query(Table::DealMessages, &filter).await.unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, ["m3", "m1"]);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let store = InMemoryDataStore::new();
        store.fail_next(2);
        assert!(store.get(Table::DealMessages, "x").await.is_err());
        assert!(store.get(Table::DealMessages, "x").await.unwrap_err().is_retryable());
        assert!(store.get(Table::DealMessages, "x").await.is_ok());
    }
}
