//! # Deal Message Log
//!
//! Append-only, per-deal log of messages, offers and counter-offers.
//!
//! Messages are listed oldest first; messages created in the same instant
//! keep their append order through the store-assigned sequence. The only
//! mutation after append is marking a message read.
//!
//! There is no push channel. [`DealMessageLog::poll`] re-reads the full list
//! on a fixed interval, and each tick is a complete, restartable snapshot.

use crate::application::error::{ApplicationError, ApplicationResult};
use crate::domain::entities::deal_message::{DealMessage, NewDealMessage};
use crate::domain::value_objects::timestamp::Timestamp;
use crate::domain::value_objects::{DealId, MessageId, PartyId};
use crate::infrastructure::persistence::DealMessageRepository;
use futures::stream::{BoxStream, StreamExt};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::IntervalStream;
use tracing::debug;

/// Default refresh interval for [`DealMessageLog::poll`].
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// The message log service.
#[derive(Debug, Clone)]
pub struct DealMessageLog {
    messages: DealMessageRepository,
}

impl DealMessageLog {
    /// Creates a log over `messages`.
    #[must_use]
    pub fn new(messages: DealMessageRepository) -> Self {
        Self { messages }
    }

    /// Stores a message, assigning its id, timestamp and sequence.
    ///
    /// A draft carrying an idempotency key that the deal already recorded
    /// returns the recorded message instead of appending a second one.
    ///
    /// # Errors
    ///
    /// - `DomainError::Validation` if the draft is invalid
    /// - an infrastructure error from the store
    pub async fn append(&self, draft: NewDealMessage) -> ApplicationResult<DealMessage> {
        if let Some(key) = draft.idempotency_key.as_deref()
            && let Some(existing) = self
                .messages
                .find_by_idempotency_key(draft.deal_id, key)
                .await?
        {
            debug!(deal_id = %draft.deal_id, key, "message already recorded");
            return Ok(existing);
        }

        let message = DealMessage::from_draft(draft, Timestamp::now())?;
        let stored = self.messages.insert(&message).await?;
        debug!(
            deal_id = %stored.deal_id(),
            message_id = %stored.id(),
            message_type = %stored.message_type(),
            seq = stored.sequence(),
            "message appended"
        );
        Ok(stored)
    }

    /// Returns every message on the deal, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an infrastructure error from the store.
    pub async fn list(&self, deal_id: DealId) -> ApplicationResult<Vec<DealMessage>> {
        Ok(self.messages.list_for_deal(deal_id, true).await?)
    }

    /// Returns the deal's messages without internal notes.
    ///
    /// # Errors
    ///
    /// Returns an infrastructure error from the store.
    pub async fn list_shared(&self, deal_id: DealId) -> ApplicationResult<Vec<DealMessage>> {
        Ok(self.messages.list_for_deal(deal_id, false).await?)
    }

    /// Returns the deal's messages that come after `cursor`.
    ///
    /// # Errors
    ///
    /// Returns an infrastructure error from the store.
    pub async fn list_since(
        &self,
        deal_id: DealId,
        cursor: Option<&DealMessage>,
    ) -> ApplicationResult<Vec<DealMessage>> {
        Ok(self
            .messages
            .list_since(deal_id, cursor.map(DealMessage::order_key))
            .await?)
    }

    /// Returns the message the deal recorded under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an infrastructure error from the store.
    pub async fn find_by_idempotency_key(
        &self,
        deal_id: DealId,
        key: &str,
    ) -> ApplicationResult<Option<DealMessage>> {
        Ok(self.messages.find_by_idempotency_key(deal_id, key).await?)
    }

    /// Marks a message read; the first read time is kept.
    ///
    /// # Errors
    ///
    /// - `ApplicationError::NotFound` if the message does not exist
    /// - an infrastructure error from the store
    pub async fn mark_read(&self, message_id: MessageId) -> ApplicationResult<DealMessage> {
        match self.messages.mark_read(message_id, Timestamp::now()).await {
            Ok((message, _)) => Ok(message),
            Err(e) if e.is_not_found() => {
                Err(ApplicationError::not_found("message", message_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Counts the deal's unread messages sent by someone other than `reader`.
    ///
    /// # Errors
    ///
    /// Returns an infrastructure error from the store.
    pub async fn unread_count(&self, deal_id: DealId, reader: &PartyId) -> ApplicationResult<usize> {
        Ok(self.messages.count_unread(deal_id, reader).await?)
    }

    /// Re-reads the deal's full message list every `interval`.
    ///
    /// The first snapshot is yielded immediately. The stream never ends on
    /// its own; drop it to stop polling. Must be called inside a Tokio
    /// runtime.
    #[must_use]
    pub fn poll(
        &self,
        deal_id: DealId,
        interval: Duration,
    ) -> BoxStream<'static, ApplicationResult<Vec<DealMessage>>> {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let log = self.clone();
        IntervalStream::new(ticker)
            .then(move |_| {
                let log = log.clone();
                async move { log.list(deal_id).await }
            })
            .boxed()
    }
}
