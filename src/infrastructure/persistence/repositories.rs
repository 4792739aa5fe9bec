//! # Typed Repositories
//!
//! Deal and message persistence on top of a [`DataStore`].
//!
//! - [`DealRepository`] maps [`DealRecord`] to `deal_negotiations` rows and
//!   writes them with compare-and-swap on `version`
//! - [`DealMessageRepository`] maps [`DealMessage`] to `deal_messages` rows,
//!   which are append-only apart from the read flag

use crate::domain::entities::deal::DealRecord;
use crate::domain::entities::deal_message::DealMessage;
use crate::domain::value_objects::timestamp::Timestamp;
use crate::domain::value_objects::{DealId, DealStatus, MessageId, PartyId};
use crate::infrastructure::persistence::traits::{
    DataStore, Filter, RepositoryError, RepositoryResult, Row, SortOrder, Table,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

fn to_row<T: Serialize>(value: &T) -> RepositoryResult<Row> {
    match serde_json::to_value(value) {
        Ok(Value::Object(row)) => Ok(row),
        Ok(_) => Err(RepositoryError::serialization("entity is not a JSON object")),
        Err(e) => Err(RepositoryError::serialization(e.to_string())),
    }
}

fn from_row<T: DeserializeOwned>(row: Row) -> RepositoryResult<T> {
    serde_json::from_value(Value::Object(row))
        .map_err(|e| RepositoryError::serialization(e.to_string()))
}

/// Persistence for deal records.
#[derive(Debug, Clone)]
pub struct DealRepository {
    store: Arc<dyn DataStore>,
}

impl DealRepository {
    /// Creates a repository over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }

    /// Stores a new deal.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Duplicate` if the id exists, or a store error.
    pub async fn insert(&self, deal: &DealRecord) -> RepositoryResult<DealRecord> {
        let row = self
            .store
            .insert(Table::DealNegotiations, to_row(deal)?)
            .await?;
        from_row(row)
    }

    /// Loads a deal.
    ///
    /// # Errors
    ///
    /// Returns a store or serialization error.
    pub async fn get(&self, id: DealId) -> RepositoryResult<Option<DealRecord>> {
        self.store
            .get(Table::DealNegotiations, &id.to_string())
            .await?
            .map(from_row)
            .transpose()
    }

    /// Writes `deal` if nobody else wrote it since it was read.
    ///
    /// Returns the stored record with its version advanced by one. A conflict
    /// where the stored row already equals the write (an earlier attempt that
    /// committed but reported failure) counts as success.
    ///
    /// # Errors
    ///
    /// - `RepositoryError::VersionConflict` if the stored version moved
    /// - `RepositoryError::NotFound` if the deal is gone
    /// - a store or serialization error
    pub async fn save(&self, deal: &DealRecord) -> RepositoryResult<DealRecord> {
        let mut next = deal.clone();
        let expected = next.bump_version();
        self.write(next, expected).await
    }

    /// Puts `previous` back over `written`, undoing a save.
    ///
    /// Only succeeds if `written` is still the stored version.
    ///
    /// # Errors
    ///
    /// See [`DealRepository::save`].
    pub async fn restore(
        &self,
        previous: &DealRecord,
        written: &DealRecord,
    ) -> RepositoryResult<DealRecord> {
        let expected = written.version();
        let restored = previous.rebased_on(expected.saturating_add(1));
        self.write(restored, expected).await
    }

    async fn write(&self, next: DealRecord, expected: u64) -> RepositoryResult<DealRecord> {
        let result = self
            .store
            .update(
                Table::DealNegotiations,
                &next.id().to_string(),
                to_row(&next)?,
                Some(expected),
            )
            .await;
        match result {
            Ok(row) => from_row(row),
            Err(e) if e.is_version_conflict() => match self.get(next.id()).await? {
                Some(stored) if stored == next => Ok(stored),
                _ => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    /// Lists deals matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns a store or serialization error.
    pub async fn list(&self, filter: &Filter) -> RepositoryResult<Vec<DealRecord>> {
        self.store
            .query(Table::DealNegotiations, filter)
            .await?
            .into_iter()
            .map(from_row)
            .collect()
    }

    /// Lists open deals whose deadline is at or before `now`.
    ///
    /// # Errors
    ///
    /// Returns a store or serialization error.
    pub async fn find_due_for_expiry(&self, now: Timestamp) -> RepositoryResult<Vec<DealRecord>> {
        let active: Vec<&str> = DealStatus::ALL
            .iter()
            .filter(|s| s.is_active())
            .map(DealStatus::as_str)
            .collect();
        let filter = Filter::new()
            .in_values("status", active)
            .lte("deadline", now)
            .order_by("deadline", SortOrder::Asc);
        let deals = self.list(&filter).await?;
        Ok(deals
            .into_iter()
            .filter(|d| d.is_due_for_expiry(now))
            .collect())
    }
}

/// Persistence for deal messages.
#[derive(Debug, Clone)]
pub struct DealMessageRepository {
    store: Arc<dyn DataStore>,
}

impl DealMessageRepository {
    /// Creates a repository over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }

    /// Appends a message and returns it with its store sequence.
    ///
    /// # Errors
    ///
    /// Returns a store or serialization error.
    pub async fn insert(&self, message: &DealMessage) -> RepositoryResult<DealMessage> {
        let row = self
            .store
            .insert(Table::DealMessages, to_row(message)?)
            .await?;
        from_row(row)
    }

    /// Loads a message.
    ///
    /// # Errors
    ///
    /// Returns a store or serialization error.
    pub async fn get(&self, id: MessageId) -> RepositoryResult<Option<DealMessage>> {
        self.store
            .get(Table::DealMessages, &id.to_string())
            .await?
            .map(from_row)
            .transpose()
    }

    /// Lists a deal's messages oldest first, ties broken by sequence.
    ///
    /// # Errors
    ///
    /// Returns a store or serialization error.
    pub async fn list_for_deal(
        &self,
        deal_id: DealId,
        include_internal: bool,
    ) -> RepositoryResult<Vec<DealMessage>> {
        let mut filter = Filter::new().eq("deal_id", deal_id.to_string());
        if !include_internal {
            filter = filter.eq("is_internal", false);
        }
        self.list(&filter).await
    }

    /// Lists messages created strictly after `after`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a store or serialization error.
    pub async fn list_since(
        &self,
        deal_id: DealId,
        after: Option<(Timestamp, u64)>,
    ) -> RepositoryResult<Vec<DealMessage>> {
        let mut filter = Filter::new().eq("deal_id", deal_id.to_string());
        if let Some((created_at, _)) = after {
            filter = filter.gte("created_at", created_at);
        }
        let messages = self.list(&filter).await?;
        Ok(match after {
            Some(cursor) => messages
                .into_iter()
                .filter(|m| m.order_key() > cursor)
                .collect(),
            None => messages,
        })
    }

    /// Finds the message a deal recorded under `key`.
    ///
    /// # Errors
    ///
    /// Returns a store or serialization error.
    pub async fn find_by_idempotency_key(
        &self,
        deal_id: DealId,
        key: &str,
    ) -> RepositoryResult<Option<DealMessage>> {
        let filter = Filter::new()
            .eq("deal_id", deal_id.to_string())
            .eq("idempotency_key", key)
            .limit(1);
        Ok(self.list(&filter).await?.into_iter().next())
    }

    /// Marks a message read. Returns the message and whether it changed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the message does not exist.
    pub async fn mark_read(
        &self,
        id: MessageId,
        now: Timestamp,
    ) -> RepositoryResult<(DealMessage, bool)> {
        let mut message = self
            .get(id)
            .await?
            .ok_or_else(|| RepositoryError::not_found(Table::DealMessages.entity_type(), id.to_string()))?;
        if !message.mark_read(now) {
            return Ok((message, false));
        }

        let mut patch = Row::new();
        patch.insert("is_read".to_string(), Value::Bool(true));
        patch.insert(
            "read_at".to_string(),
            serde_json::to_value(message.read_at())
                .map_err(|e| RepositoryError::serialization(e.to_string()))?,
        );
        let row = self
            .store
            .update(Table::DealMessages, &id.to_string(), patch, None)
            .await?;
        Ok((from_row(row)?, true))
    }

    /// Counts unread messages on a deal not sent by `reader`.
    ///
    /// # Errors
    ///
    /// Returns a store or serialization error.
    pub async fn count_unread(&self, deal_id: DealId, reader: &PartyId) -> RepositoryResult<usize> {
        let filter = Filter::new()
            .eq("deal_id", deal_id.to_string())
            .eq("is_read", false);
        let unread = self.list(&filter).await?;
        Ok(unread.iter().filter(|m| m.sender_id() != reader).count())
    }

    async fn list(&self, filter: &Filter) -> RepositoryResult<Vec<DealMessage>> {
        let filter = filter
            .clone()
            .order_by("created_at", SortOrder::Asc)
            .order_by("seq", SortOrder::Asc);
        let mut messages: Vec<DealMessage> = self
            .store
            .query(Table::DealMessages, &filter)
            .await?
            .into_iter()
            .map(from_row)
            .collect::<RepositoryResult<_>>()?;
        messages.sort_by_key(DealMessage::order_key);
        Ok(messages)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::entities::deal::tests::sample_new_deal;
    use crate::domain::entities::deal_message::NewDealMessage;
    use crate::domain::services::state_machine::DealEvent;
    use crate::domain::value_objects::MessageType;
    use crate::infrastructure::persistence::in_memory::InMemoryDataStore;
    use crate::infrastructure::persistence::retrying::{RetryPolicy, RetryingDataStore};
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn repos() -> (DealRepository, DealMessageRepository) {
        let store: Arc<dyn DataStore> = Arc::new(InMemoryDataStore::new());
        (
            DealRepository::new(Arc::clone(&store)),
            DealMessageRepository::new(store),
        )
    }

    fn message(deal_id: DealId, sender: &str, at: Timestamp) -> DealMessage {
        let draft = NewDealMessage::new(deal_id, PartyId::new(sender), MessageType::Text, "hello");
        DealMessage::from_draft(draft, at).unwrap()
    }

    mod deals {
        use super::*;

        #[tokio::test]
        async fn insert_and_get_round_trip() {
            let (deals, _) = repos();
            let deal = DealRecord::create(sample_new_deal(), Timestamp::now()).unwrap();
            deals.insert(&deal).await.unwrap();
            let loaded = deals.get(deal.id()).await.unwrap().unwrap();
            assert_eq!(loaded, deal);
        }

        #[tokio::test]
        async fn save_advances_version() {
            let (deals, _) = repos();
            let mut deal = DealRecord::create(sample_new_deal(), Timestamp::now()).unwrap();
            deals.insert(&deal).await.unwrap();
            deal.apply(&DealEvent::Propose, Timestamp::now()).unwrap();
            let saved = deals.save(&deal).await.unwrap();
            assert_eq!(saved.version(), 1);
            assert_eq!(saved.status(), DealStatus::Proposed);
        }

        #[tokio::test]
        async fn stale_save_conflicts() {
            let (deals, _) = repos();
            let deal = DealRecord::create(sample_new_deal(), Timestamp::now()).unwrap();
            deals.insert(&deal).await.unwrap();

            let mut first = deal.clone();
            first.apply(&DealEvent::Propose, Timestamp::now()).unwrap();
            deals.save(&first).await.unwrap();

            let mut second = deal;
            second
                .apply(&DealEvent::Decline { amount: None }, Timestamp::now())
                .unwrap();
            let err = deals.save(&second).await.unwrap_err();
            assert!(err.is_version_conflict());
        }

        /// Commits updates, but can report the next one as timed out.
        #[derive(Debug, Default)]
        struct LostAckStore {
            inner: InMemoryDataStore,
            lose_next_ack: AtomicBool,
        }

        #[async_trait]
        impl DataStore for LostAckStore {
            async fn get(&self, table: Table, id: &str) -> RepositoryResult<Option<Row>> {
                self.inner.get(table, id).await
            }

            async fn query(&self, table: Table, filter: &Filter) -> RepositoryResult<Vec<Row>> {
                self.inner.query(table, filter).await
            }

            async fn insert(&self, table: Table, row: Row) -> RepositoryResult<Row> {
                self.inner.insert(table, row).await
            }

            async fn update(
                &self,
                table: Table,
                id: &str,
                patch: Row,
                expected_version: Option<u64>,
            ) -> RepositoryResult<Row> {
                let row = self.inner.update(table, id, patch, expected_version).await?;
                if self.lose_next_ack.swap(false, Ordering::SeqCst) {
                    return Err(RepositoryError::timeout("response lost"));
                }
                Ok(row)
            }
        }

        #[tokio::test]
        async fn retried_save_that_already_committed_succeeds() {
            let lossy = Arc::new(LostAckStore::default());
            let policy = RetryPolicy {
                max_attempts: 3,
                initial_backoff_ms: 1,
                max_backoff_ms: 5,
                multiplier: 2,
            };
            let store: Arc<dyn DataStore> =
                Arc::new(RetryingDataStore::new(lossy.clone(), policy));
            let deals = DealRepository::new(store);

            let mut deal = DealRecord::create(sample_new_deal(), Timestamp::now()).unwrap();
            deals.insert(&deal).await.unwrap();
            lossy.lose_next_ack.store(true, Ordering::SeqCst);
            deal.apply(&DealEvent::Propose, Timestamp::now()).unwrap();

            let saved = deals.save(&deal).await.unwrap();
            assert_eq!(saved.version(), 1);
            assert_eq!(saved.status(), DealStatus::Proposed);
            assert_eq!(deals.get(deal.id()).await.unwrap().unwrap(), saved);
        }

        #[tokio::test]
        async fn restore_puts_previous_state_back() {
            let (deals, _) = repos();
            let deal = DealRecord::create(sample_new_deal(), Timestamp::now()).unwrap();
            deals.insert(&deal).await.unwrap();
            let mut next = deal.clone();
            next.apply(&DealEvent::Propose, Timestamp::now()).unwrap();
            let saved = deals.save(&next).await.unwrap();

            let restored = deals.restore(&deal, &saved).await.unwrap();
            assert_eq!(restored.status(), DealStatus::Draft);
            assert_eq!(restored.version(), 2);
            assert_eq!(deals.get(deal.id()).await.unwrap().unwrap(), restored);
        }

        #[tokio::test]
        async fn restore_after_another_write_conflicts() {
            let (deals, _) = repos();
            let deal = DealRecord::create(sample_new_deal(), Timestamp::now()).unwrap();
            deals.insert(&deal).await.unwrap();
            let mut next = deal.clone();
            next.apply(&DealEvent::Propose, Timestamp::now()).unwrap();
            let saved = deals.save(&next).await.unwrap();
            let mut later = saved.clone();
            later
                .apply(&DealEvent::Decline { amount: None }, Timestamp::now())
                .unwrap();
            deals.save(&later).await.unwrap();

            let err = deals.restore(&deal, &saved).await.unwrap_err();
            assert!(err.is_version_conflict());
            assert_eq!(
                deals.get(deal.id()).await.unwrap().unwrap().status(),
                DealStatus::Declined
            );
        }

        #[tokio::test]
        async fn due_for_expiry_skips_closed_and_future() {
            let (deals, _) = repos();
            let now = Timestamp::now();
            let due = DealRecord::create(sample_new_deal().with_deadline(now.sub_secs(10)), now).unwrap();
            let later = DealRecord::create(sample_new_deal().with_deadline(now.add_secs(3600)), now).unwrap();
            let mut closed = DealRecord::create(sample_new_deal().with_deadline(now.sub_secs(10)), now).unwrap();
            closed.apply(&DealEvent::Decline { amount: None }, now).unwrap();
            for deal in [&due, &later, &closed] {
                deals.insert(deal).await.unwrap();
            }

            let found = deals.find_due_for_expiry(now).await.unwrap();
            assert_eq!(found.len(), 1);
            assert_eq!(found[0].id(), due.id());
        }

        #[tokio::test]
        async fn list_filters_by_fee() {
            let (deals, _) = repos();
            let now = Timestamp::now();
            let deal = DealRecord::create(sample_new_deal(), now).unwrap();
            deals.insert(&deal).await.unwrap();
            let above = Filter::new().gte("proposed_fee", Decimal::new(900, 0));
            let below = Filter::new().lte("proposed_fee", Decimal::new(900, 0));
            assert!(deals.list(&above).await.unwrap().is_empty());
            assert_eq!(deals.list(&below).await.unwrap().len(), 1);
        }
    }

    mod messages {
        use super::*;

        #[tokio::test]
        async fn ties_break_by_sequence() {
            let (_, messages) = repos();
            let deal_id = DealId::new_v4();
            let at = Timestamp::now();
            let first = messages.insert(&message(deal_id, "a", at)).await.unwrap();
            let second = messages.insert(&message(deal_id, "b", at)).await.unwrap();
            messages
                .insert(&message(DealId::new_v4(), "c", at))
                .await
                .unwrap();

            let log = messages.list_for_deal(deal_id, true).await.unwrap();
            let ids: Vec<_> = log.iter().map(DealMessage::id).collect();
            assert_eq!(ids, [first.id(), second.id()]);
            assert!(first.sequence() < second.sequence());
        }

        #[tokio::test]
        async fn internal_notes_are_hidden_on_request() {
            let (_, messages) = repos();
            let deal_id = DealId::new_v4();
            let draft = NewDealMessage::new(deal_id, PartyId::new("agency-1"), MessageType::Text, "note")
                .internal();
            messages
                .insert(&DealMessage::from_draft(draft, Timestamp::now()).unwrap())
                .await
                .unwrap();
            assert_eq!(messages.list_for_deal(deal_id, true).await.unwrap().len(), 1);
            assert!(messages.list_for_deal(deal_id, false).await.unwrap().is_empty());
        }

        #[tokio::test]
        async fn mark_read_is_idempotent() {
            let (_, messages) = repos();
            let deal_id = DealId::new_v4();
            let stored = messages
                .insert(&message(deal_id, "promoter-1", Timestamp::now()))
                .await
                .unwrap();
            let reader = PartyId::new("agency-1");
            assert_eq!(messages.count_unread(deal_id, &reader).await.unwrap(), 1);

            let first_read = Timestamp::now();
            let (read, changed) = messages.mark_read(stored.id(), first_read).await.unwrap();
            assert!(changed);
            assert_eq!(read.read_at(), Some(first_read));

            let (again, changed) = messages
                .mark_read(stored.id(), first_read.add_secs(60))
                .await
                .unwrap();
            assert!(!changed);
            assert_eq!(again.read_at(), Some(first_read));
            assert_eq!(messages.count_unread(deal_id, &reader).await.unwrap(), 0);
        }

        #[tokio::test]
        async fn own_messages_are_not_unread() {
            let (_, messages) = repos();
            let deal_id = DealId::new_v4();
            messages
                .insert(&message(deal_id, "agency-1", Timestamp::now()))
                .await
                .unwrap();
            let reader = PartyId::new("agency-1");
            assert_eq!(messages.count_unread(deal_id, &reader).await.unwrap(), 0);
        }

        #[tokio::test]
        async fn finds_by_idempotency_key() {
            let (_, messages) = repos();
            let deal_id = DealId::new_v4();
            let draft = NewDealMessage::new(deal_id, PartyId::new("system"), MessageType::Acceptance, "ok")
                .with_offer_amount(Decimal::new(1300, 0))
                .with_idempotency_key("offer-1");
            messages
                .insert(&DealMessage::from_draft(draft, Timestamp::now()).unwrap())
                .await
                .unwrap();
            assert!(
                messages
                    .find_by_idempotency_key(deal_id, "offer-1")
                    .await
                    .unwrap()
                    .is_some()
            );
            assert!(
                messages
                    .find_by_idempotency_key(deal_id, "offer-2")
                    .await
                    .unwrap()
                    .is_none()
            );
        }

        #[tokio::test]
        async fn list_since_skips_seen_messages() {
            let (_, messages) = repos();
            let deal_id = DealId::new_v4();
            let at = Timestamp::now();
            let first = messages.insert(&message(deal_id, "a", at)).await.unwrap();
            let second = messages.insert(&message(deal_id, "b", at)).await.unwrap();

            let newer = messages
                .list_since(deal_id, Some(first.order_key()))
                .await
                .unwrap();
            assert_eq!(newer.len(), 1);
            assert_eq!(newer[0].id(), second.id());
        }
    }
}
