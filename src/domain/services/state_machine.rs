//! # Negotiation State Machine
//!
//! Pure transition function over [`DealStatus`].
//!
//! | Event | Allowed from | Result |
//! |---|---|---|
//! | propose | draft | proposed |
//! | send_offer | proposed, negotiating, counter_offered | negotiating |
//! | send_counter_offer | proposed, negotiating, counter_offered | counter_offered |
//! | accept | proposed, negotiating, counter_offered | accepted |
//! | decline | any non-terminal | declined |
//! | expire | any non-terminal | expired |
//!
//! Terminal states reject every event with `DomainError::DealClosed`. Any
//! other disallowed event fails with `DomainError::InvalidTransition`.
//!
//! # Examples
//!
//! ```
//! use dealdesk::domain::services::state_machine::{DealEvent, NegotiationStateMachine};
//! use dealdesk::domain::value_objects::{DealId, DealStatus};
//!
//! let next = NegotiationStateMachine::next_status(
//!     DealId::new_v4(),
//!     DealStatus::Draft,
//!     &DealEvent::Propose,
//! );
//! assert_eq!(next.unwrap(), DealStatus::Proposed);
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::entities::deal::DealRecord;
use crate::domain::entities::deal_message::NewDealMessage;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::value_objects::deal_status::DealStatus;
use crate::domain::value_objects::enums::MessageType;
use crate::domain::value_objects::ids::{DealId, PartyId};

/// An event applied to a deal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DealEvent {
    /// Send a draft deal to the other party.
    Propose,
    /// Put an offer on the table.
    SendOffer {
        /// Offered fee.
        amount: Decimal,
    },
    /// Answer with a counter-offer.
    SendCounterOffer {
        /// Counter-offered fee.
        amount: Decimal,
    },
    /// Agree to the current terms.
    Accept {
        /// Fee being accepted, if different from the last offer.
        amount: Option<Decimal>,
    },
    /// Walk away.
    Decline {
        /// Offer being declined, if any.
        amount: Option<Decimal>,
    },
    /// Deadline passed (system only).
    Expire,
}

impl DealEvent {
    /// Returns the event name used in logs and errors.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Propose => "propose",
            Self::SendOffer { .. } => "send_offer",
            Self::SendCounterOffer { .. } => "send_counter_offer",
            Self::Accept { .. } => "accept",
            Self::Decline { .. } => "decline",
            Self::Expire => "expire",
        }
    }

    /// Returns the status this event leads to.
    #[must_use]
    pub const fn target_status(&self) -> DealStatus {
        match self {
            Self::Propose => DealStatus::Proposed,
            Self::SendOffer { .. } => DealStatus::Negotiating,
            Self::SendCounterOffer { .. } => DealStatus::CounterOffered,
            Self::Accept { .. } => DealStatus::Accepted,
            Self::Decline { .. } => DealStatus::Declined,
            Self::Expire => DealStatus::Expired,
        }
    }

    /// Returns true if the event may be applied from `status`.
    #[must_use]
    pub const fn allowed_from(&self, status: DealStatus) -> bool {
        match self {
            Self::Propose => matches!(status, DealStatus::Draft),
            Self::SendOffer { .. } | Self::SendCounterOffer { .. } | Self::Accept { .. } => {
                matches!(
                    status,
                    DealStatus::Proposed | DealStatus::Negotiating | DealStatus::CounterOffered
                )
            }
            Self::Decline { .. } | Self::Expire => status.is_active(),
        }
    }

    /// Returns the amount the event carries, if any.
    #[must_use]
    pub const fn amount(&self) -> Option<Decimal> {
        match self {
            Self::SendOffer { amount } | Self::SendCounterOffer { amount } => Some(*amount),
            Self::Accept { amount } | Self::Decline { amount } => *amount,
            Self::Propose | Self::Expire => None,
        }
    }

    /// Returns the kind of message that records this event.
    #[must_use]
    pub const fn message_type(&self) -> MessageType {
        match self {
            Self::Propose | Self::SendOffer { .. } => MessageType::Offer,
            Self::SendCounterOffer { .. } => MessageType::CounterOffer,
            Self::Accept { .. } => MessageType::Acceptance,
            Self::Decline { .. } => MessageType::Rejection,
            Self::Expire => MessageType::Text,
        }
    }
}

impl fmt::Display for DealEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.amount() {
            Some(amount) => write!(f, "{}({amount})", self.name()),
            None => f.write_str(self.name()),
        }
    }
}

/// A status change produced by applying an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    /// Status before the event.
    pub from: DealStatus,
    /// Status after the event.
    pub to: DealStatus,
}

/// Transition rules for deals.
#[derive(Debug, Clone, Copy, Default)]
pub struct NegotiationStateMachine;

impl NegotiationStateMachine {
    /// Computes the status reached by applying `event` in `current`.
    ///
    /// # Errors
    ///
    /// - `DomainError::DealClosed` if `current` is terminal
    /// - `DomainError::InvalidTransition` if the event is not allowed from `current`
    pub fn next_status(
        deal_id: DealId,
        current: DealStatus,
        event: &DealEvent,
    ) -> DomainResult<DealStatus> {
        if current.is_terminal() {
            return Err(DomainError::deal_closed(deal_id, current));
        }
        if !event.allowed_from(current) {
            return Err(DomainError::InvalidTransition {
                from: current,
                event: event.name(),
            });
        }
        Ok(event.target_status())
    }

    /// Drafts the message that records `event` on `deal`.
    ///
    /// A proposal is logged as an offer of the deal's proposed fee. Expiry is
    /// logged as an automated text message.
    #[must_use]
    pub fn message_for(deal: &DealRecord, event: &DealEvent, sender: PartyId) -> NewDealMessage {
        let currency = deal.financials().currency.as_str();
        let amount = match event {
            DealEvent::Propose => Some(deal.financials().proposed_fee),
            other => other.amount(),
        };
        let content = match (event, amount) {
            (DealEvent::Propose, Some(fee)) => {
                format!("Proposed \"{}\" at {fee} {currency}", deal.title())
            }
            (DealEvent::SendOffer { amount }, _) => format!("Offer of {amount} {currency}"),
            (DealEvent::SendCounterOffer { amount }, _) => {
                format!("Counter-offer of {amount} {currency}")
            }
            (DealEvent::Accept { .. }, Some(fee)) => format!("Accepted at {fee} {currency}"),
            (DealEvent::Accept { .. }, None) => "Accepted".to_string(),
            (DealEvent::Decline { .. }, Some(fee)) => {
                format!("Declined offer of {fee} {currency}")
            }
            (DealEvent::Decline { .. }, None) => "Declined".to_string(),
            (DealEvent::Expire, _) => "Deal expired: deadline passed".to_string(),
            (DealEvent::Propose, None) => "Proposed".to_string(),
        };

        let mut message = NewDealMessage::new(deal.id(), sender, event.message_type(), content);
        if let Some(amount) = amount {
            message = message.with_offer_amount(amount);
        }
        if matches!(event, DealEvent::Expire) {
            message = message.automated();
        }
        message
    }
}
