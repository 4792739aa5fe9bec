//! # Deal Message
//!
//! Entries of a deal's append-only message log.
//!
//! A [`NewDealMessage`] is a draft written by a party (or the automation
//! engine). The message log turns it into a [`DealMessage`] by assigning an
//! id, a creation time and a store sequence number. After that only the read
//! marker can change.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::value_objects::enums::MessageType;
use crate::domain::value_objects::ids::{DealId, MessageId, PartyId};
use crate::domain::value_objects::timestamp::Timestamp;

/// A message waiting to be appended to a deal's log.
///
/// # Examples
///
/// ```
/// use dealdesk::domain::entities::deal_message::NewDealMessage;
/// use dealdesk::domain::value_objects::{DealId, MessageType, PartyId};
/// use rust_decimal::Decimal;
///
/// let draft = NewDealMessage::new(
///     DealId::new_v4(),
///     PartyId::new("promoter-1"),
///     MessageType::Offer,
///     "How about this?",
/// )
/// .with_offer_amount(Decimal::new(900, 0));
///
/// assert!(draft.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDealMessage {
    /// Deal the message belongs to.
    pub deal_id: DealId,
    /// Author.
    pub sender_id: PartyId,
    /// Kind of message.
    pub message_type: MessageType,
    /// Optional subject line.
    pub subject: Option<String>,
    /// Body text.
    pub content: String,
    /// Offered fee, required for offers and counter-offers.
    pub offer_amount: Option<Decimal>,
    /// Written by the automation engine.
    pub is_automated: bool,
    /// Only visible to the sender's side.
    pub is_internal: bool,
    /// Key identifying the incoming offer an automated reply answers.
    pub idempotency_key: Option<String>,
}

impl NewDealMessage {
    /// Creates a draft with no amount, subject or flags.
    #[must_use]
    pub fn new(
        deal_id: DealId,
        sender_id: PartyId,
        message_type: MessageType,
        content: impl Into<String>,
    ) -> Self {
        Self {
            deal_id,
            sender_id,
            message_type,
            subject: None,
            content: content.into(),
            offer_amount: None,
            is_automated: false,
            is_internal: false,
            idempotency_key: None,
        }
    }

    /// Sets the offer amount.
    #[must_use]
    pub fn with_offer_amount(mut self, amount: Decimal) -> Self {
        self.offer_amount = Some(amount);
        self
    }

    /// Sets the subject line.
    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Marks the message as written by the automation engine.
    #[must_use]
    pub fn automated(mut self) -> Self {
        self.is_automated = true;
        self
    }

    /// Marks the message as internal.
    #[must_use]
    pub fn internal(mut self) -> Self {
        self.is_internal = true;
        self
    }

    /// Tags the message with the key of the offer it answers.
    #[must_use]
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Checks the message before it is appended.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the sender is blank, an offer or
    /// counter-offer has no amount, or an amount is not positive.
    pub fn validate(&self) -> DomainResult<()> {
        if self.sender_id.is_blank() {
            return Err(DomainError::validation("message sender is required"));
        }
        match self.offer_amount {
            None if self.message_type.requires_amount() => Err(DomainError::validation(format!(
                "{} message requires an offer amount",
                self.message_type
            ))),
            Some(amount) if amount <= Decimal::ZERO => Err(DomainError::validation(format!(
                "offer amount must be positive, got {amount}"
            ))),
            _ => Ok(()),
        }
    }
}

/// A message stored in a deal's log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealMessage {
    id: MessageId,
    deal_id: DealId,
    sender_id: PartyId,
    message_type: MessageType,
    #[serde(default)]
    subject: Option<String>,
    content: String,
    #[serde(default)]
    offer_amount: Option<Decimal>,
    #[serde(default)]
    is_automated: bool,
    #[serde(default)]
    is_internal: bool,
    #[serde(default)]
    is_read: bool,
    #[serde(default)]
    read_at: Option<Timestamp>,
    #[serde(default)]
    idempotency_key: Option<String>,
    created_at: Timestamp,
    /// Insertion order assigned by the store; breaks `created_at` ties.
    #[serde(default, rename = "seq")]
    sequence: u64,
}

impl DealMessage {
    /// Turns a validated draft into a stored message.
    ///
    /// The sequence is zero until the store assigns one.
    ///
    /// # Errors
    ///
    /// Returns the draft's validation error, if any.
    pub fn from_draft(draft: NewDealMessage, created_at: Timestamp) -> DomainResult<Self> {
        draft.validate()?;
        Ok(Self {
            id: MessageId::new_v4(),
            deal_id: draft.deal_id,
            sender_id: draft.sender_id,
            message_type: draft.message_type,
            subject: draft.subject,
            content: draft.content,
            offer_amount: draft.offer_amount,
            is_automated: draft.is_automated,
            is_internal: draft.is_internal,
            is_read: false,
            read_at: None,
            idempotency_key: draft.idempotency_key,
            created_at,
            sequence: 0,
        })
    }

    /// Returns the message ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> MessageId {
        self.id
    }

    /// Returns the deal ID.
    #[inline]
    #[must_use]
    pub fn deal_id(&self) -> DealId {
        self.deal_id
    }

    /// Returns the sender.
    #[inline]
    #[must_use]
    pub fn sender_id(&self) -> &PartyId {
        &self.sender_id
    }

    /// Returns the message type.
    #[inline]
    #[must_use]
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// Returns the subject line.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// Returns the body text.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Returns the offer amount.
    #[inline]
    #[must_use]
    pub fn offer_amount(&self) -> Option<Decimal> {
        self.offer_amount
    }

    /// Returns true if written by the automation engine.
    #[inline]
    #[must_use]
    pub fn is_automated(&self) -> bool {
        self.is_automated
    }

    /// Returns true if internal to the sender's side.
    #[inline]
    #[must_use]
    pub fn is_internal(&self) -> bool {
        self.is_internal
    }

    /// Returns true if read.
    #[inline]
    #[must_use]
    pub fn is_read(&self) -> bool {
        self.is_read
    }

    /// Returns when the message was first read.
    #[inline]
    #[must_use]
    pub fn read_at(&self) -> Option<Timestamp> {
        self.read_at
    }

    /// Returns the idempotency key.
    #[must_use]
    pub fn idempotency_key(&self) -> Option<&str> {
        self.idempotency_key.as_deref()
    }

    /// Returns the creation time.
    #[inline]
    #[must_use]
    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Returns the store sequence number.
    #[inline]
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Sort key: creation time, then insertion order.
    #[inline]
    #[must_use]
    pub fn order_key(&self) -> (Timestamp, u64) {
        (self.created_at, self.sequence)
    }

    /// Marks the message read. The first read time is kept.
    ///
    /// Returns true if the message was unread.
    pub fn mark_read(&mut self, now: Timestamp) -> bool {
        if self.is_read {
            return false;
        }
        self.is_read = true;
        self.read_at = Some(now);
        true
    }
}

impl fmt::Display for DealMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Message[{}#{}] {} from {}",
            self.deal_id, self.sequence, self.message_type, self.sender_id
        )?;
        if let Some(amount) = self.offer_amount {
            write!(f, " amount={amount}")?;
        }
        Ok(())
    }
}
