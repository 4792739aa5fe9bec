//! # Retrying Data Store
//!
//! Decorator that retries transient backend failures with exponential
//! backoff.
//!
//! Only errors for which [`RepositoryError::is_retryable`] holds are
//! retried. Version conflicts, duplicates and missing rows go straight back
//! to the caller, which owns the compare-and-swap loop.

use crate::infrastructure::persistence::traits::{
    DataStore, Filter, RepositoryError, RepositoryResult, Row, SEQ_FIELD, Table,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Backoff schedule for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_backoff_ms: u64,
    /// Upper bound for any single delay.
    pub max_backoff_ms: u64,
    /// Growth factor between consecutive delays.
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 2_000,
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            multiplier: 1,
        }
    }

    /// Delay before retry number `retry` (1-based), growing by `multiplier`.
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = u64::from(self.multiplier.max(1)).saturating_pow(retry.saturating_sub(1));
        let millis = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }

    /// Checks that the schedule can make progress.
    ///
    /// # Errors
    ///
    /// Returns a message naming the offending field.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("retry.max_attempts must be at least 1".to_string());
        }
        if self.multiplier == 0 {
            return Err("retry.multiplier must be at least 1".to_string());
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err("retry.initial_backoff_ms exceeds retry.max_backoff_ms".to_string());
        }
        Ok(())
    }

    /// Runs `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// # Errors
    ///
    /// Returns the last error from `op`.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> RepositoryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RepositoryResult<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Err(e) if e.is_retryable() && attempt < attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        operation = label,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient store failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

/// [`DataStore`] decorator applying a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryingDataStore {
    inner: Arc<dyn DataStore>,
    policy: RetryPolicy,
}

impl RetryingDataStore {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn DataStore>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// Returns the retry policy.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl DataStore for RetryingDataStore {
    async fn get(&self, table: Table, id: &str) -> RepositoryResult<Option<Row>> {
        self.policy
            .run("get", || self.inner.get(table, id))
            .await
    }

    async fn query(&self, table: Table, filter: &Filter) -> RepositoryResult<Vec<Row>> {
        self.policy
            .run("query", || self.inner.query(table, filter))
            .await
    }

    async fn insert(&self, table: Table, row: Row) -> RepositoryResult<Row> {
        let result = self
            .policy
            .run("insert", || self.inner.insert(table, row.clone()))
            .await;
        // A retried insert may have landed before the connection dropped.
        match result {
            Err(RepositoryError::Duplicate { .. }) => {
                let id = row.get("id").and_then(|v| v.as_str()).unwrap_or_default();
                match self.inner.get(table, id).await? {
                    Some(stored) if same_body(&stored, &row) => Ok(stored),
                    _ => result,
                }
            }
            other => other,
        }
    }

    async fn update(
        &self,
        table: Table,
        id: &str,
        patch: Row,
        expected_version: Option<u64>,
    ) -> RepositoryResult<Row> {
        self.policy
            .run("update", || {
                self.inner.update(table, id, patch.clone(), expected_version)
            })
            .await
    }
}

/// True if every column of `written` has the same value in `stored`.
fn same_body(stored: &Row, written: &Row) -> bool {
    written
        .iter()
        .filter(|(k, _)| k.as_str() != SEQ_FIELD)
        .all(|(k, v)| stored.get(k) == Some(v))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::in_memory::InMemoryDataStore;
    use serde_json::{Value, json};

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
            multiplier: 2,
        }
    }

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => Row::new(),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff_ms: 100,
            max_backoff_ms: 1_000,
            multiplier: 2,
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(4), Duration::from_millis(800));
        assert_eq!(policy.backoff(5), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(200), Duration::from_millis(1_000));
    }

    #[test]
    fn validate_rejects_zero_attempts() {
        let policy = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };
        assert!(policy.validate().is_err());
        assert!(RetryPolicy::default().validate().is_ok());
        assert!(RetryPolicy::none().validate().is_ok());
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let inner = InMemoryDataStore::new();
        let store = RetryingDataStore::new(Arc::new(inner.clone()), fast());
        inner.fail_next(2);
        assert!(store.get(Table::DealNegotiations, "x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let inner = InMemoryDataStore::new();
        let store = RetryingDataStore::new(Arc::new(inner.clone()), fast());
        inner.fail_next(3);
        let err = store.get(Table::DealNegotiations, "x").await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn conflicts_are_not_retried() {
        let inner = InMemoryDataStore::new();
        let store = RetryingDataStore::new(Arc::new(inner.clone()), fast());
        store
            .insert(Table::DealNegotiations, row(json!({"id": "d", "version": 1})))
            .await
            .unwrap();
        let err = store
            .update(Table::DealNegotiations, "d", Row::new(), Some(0))
            .await
            .unwrap_err();
        assert!(err.is_version_conflict());
    }

    #[tokio::test]
    async fn replayed_insert_returns_stored_row() {
        let inner = InMemoryDataStore::new();
        let store = RetryingDataStore::new(Arc::new(inner.clone()), fast());
        let body = row(json!({"id": "m", "content": "hi"}));
        inner.insert(Table::DealMessages, body.clone()).await.unwrap();

        let stored = store.insert(Table::DealMessages, body).await.unwrap();
        assert_eq!(stored["seq"], 1);

        let other = row(json!({"id": "m", "content": "different"}));
        assert!(store.insert(Table::DealMessages, other).await.unwrap_err().is_duplicate());
    }
}
