//! # Deal Events
//!
//! Notifications emitted as deals move through negotiation.
//!
//! # Event Flow
//!
//! ```text
//! StrategyCalculated (any time before close)
//! DealTransitioned   (every status change, one per appended message)
//! OfferEscalated     (automation could not decide, no status change)
//! ```
//!
//! [`DealNotification`] wraps all of them for sinks that take one type.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::entities::negotiation_strategy::NegotiationStrategy;
use crate::domain::events::domain_event::{DomainEvent, EventMetadata, EventType};
use crate::domain::services::state_machine::StatusChange;
use crate::domain::value_objects::timestamp::Timestamp;
use crate::domain::value_objects::{
    DealId, DealStatus, MessageId, NegotiationApproach, NotificationId, PartyId,
};

/// Emitted whenever a deal changes status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealTransitioned {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Status before.
    pub from: DealStatus,
    /// Status after.
    pub to: DealStatus,
    /// Name of the applied event.
    pub event: String,
    /// Who caused it.
    pub actor: PartyId,
    /// Decided by the automation engine.
    pub automated: bool,
    /// Amount carried by the event.
    pub amount: Option<Decimal>,
    /// The message recording the transition.
    pub message_id: MessageId,
}

impl DealTransitioned {
    /// Creates a new DealTransitioned event.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        deal_id: DealId,
        change: StatusChange,
        event: &str,
        actor: PartyId,
        automated: bool,
        amount: Option<Decimal>,
        message_id: MessageId,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            metadata: EventMetadata::for_deal(deal_id, timestamp),
            from: change.from,
            to: change.to,
            event: event.to_string(),
            actor,
            automated,
            amount,
            message_id,
        }
    }

    /// Returns true if the deal reached a terminal state.
    #[must_use]
    pub fn is_closing(&self) -> bool {
        self.to.is_terminal()
    }
}

impl DomainEvent for DealTransitioned {
    fn event_id(&self) -> NotificationId {
        self.metadata.event_id
    }

    fn deal_id(&self) -> DealId {
        self.metadata.deal_id
    }

    fn timestamp(&self) -> Timestamp {
        self.metadata.timestamp
    }

    fn event_type(&self) -> EventType {
        EventType::Deal
    }

    fn event_name(&self) -> &'static str {
        "DealTransitioned"
    }
}

/// Emitted when an incoming offer falls in the manual-review band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferEscalated {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// The offered amount.
    pub amount: Decimal,
    /// Who made the offer.
    pub responder: PartyId,
    /// Accept threshold in force.
    pub accept_above: Decimal,
    /// Decline threshold in force.
    pub decline_below: Decimal,
    /// Status of the deal, unchanged.
    pub status: DealStatus,
}

impl OfferEscalated {
    /// Creates a new OfferEscalated event.
    #[must_use]
    pub fn new(
        deal_id: DealId,
        amount: Decimal,
        responder: PartyId,
        (accept_above, decline_below): (Decimal, Decimal),
        status: DealStatus,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            metadata: EventMetadata::for_deal(deal_id, timestamp),
            amount,
            responder,
            accept_above,
            decline_below,
            status,
        }
    }
}

impl DomainEvent for OfferEscalated {
    fn event_id(&self) -> NotificationId {
        self.metadata.event_id
    }

    fn deal_id(&self) -> DealId {
        self.metadata.deal_id
    }

    fn timestamp(&self) -> Timestamp {
        self.metadata.timestamp
    }

    fn event_type(&self) -> EventType {
        EventType::Automation
    }

    fn event_name(&self) -> &'static str {
        "OfferEscalated"
    }
}

/// Emitted when a deal's strategy is recomputed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyCalculated {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Recommended posture.
    pub approach: NegotiationApproach,
    /// Recommended minimum.
    pub recommended_minimum: Decimal,
    /// Recommended target.
    pub recommended_target: Decimal,
    /// Recommended maximum.
    pub recommended_maximum: Decimal,
}

impl StrategyCalculated {
    /// Creates a new StrategyCalculated event from the stored strategy.
    #[must_use]
    pub fn new(deal_id: DealId, strategy: &NegotiationStrategy) -> Self {
        Self {
            metadata: EventMetadata::for_deal(deal_id, strategy.calculated_at),
            approach: strategy.negotiation_approach,
            recommended_minimum: strategy.recommended_minimum,
            recommended_target: strategy.recommended_target,
            recommended_maximum: strategy.recommended_maximum,
        }
    }
}

impl DomainEvent for StrategyCalculated {
    fn event_id(&self) -> NotificationId {
        self.metadata.event_id
    }

    fn deal_id(&self) -> DealId {
        self.metadata.deal_id
    }

    fn timestamp(&self) -> Timestamp {
        self.metadata.timestamp
    }

    fn event_type(&self) -> EventType {
        EventType::Strategy
    }

    fn event_name(&self) -> &'static str {
        "StrategyCalculated"
    }
}

/// Any notification the core emits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DealNotification {
    /// A status change.
    Transitioned(DealTransitioned),
    /// An offer needing manual review.
    Escalated(OfferEscalated),
    /// A recomputed strategy.
    StrategyCalculated(StrategyCalculated),
}

impl DealNotification {
    fn inner(&self) -> &dyn DomainEvent {
        match self {
            Self::Transitioned(e) => e,
            Self::Escalated(e) => e,
            Self::StrategyCalculated(e) => e,
        }
    }
}

impl DomainEvent for DealNotification {
    fn event_id(&self) -> NotificationId {
        self.inner().event_id()
    }

    fn deal_id(&self) -> DealId {
        self.inner().deal_id()
    }

    fn timestamp(&self) -> Timestamp {
        self.inner().timestamp()
    }

    fn event_type(&self) -> EventType {
        self.inner().event_type()
    }

    fn event_name(&self) -> &'static str {
        self.inner().event_name()
    }
}

impl From<DealTransitioned> for DealNotification {
    fn from(event: DealTransitioned) -> Self {
        Self::Transitioned(event)
    }
}

impl From<OfferEscalated> for DealNotification {
    fn from(event: OfferEscalated) -> Self {
        Self::Escalated(event)
    }
}

impl From<StrategyCalculated> for DealNotification {
    fn from(event: StrategyCalculated) -> Self {
        Self::StrategyCalculated(event)
    }
}

impl fmt::Display for DealNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transitioned(e) => write!(
                f,
                "{} {} -> {} by {}",
                e.metadata.deal_id, e.from, e.to, e.actor
            ),
            Self::Escalated(e) => write!(
                f,
                "{} offer {} from {} escalated",
                e.metadata.deal_id, e.amount, e.responder
            ),
            Self::StrategyCalculated(e) => write!(
                f,
                "{} strategy {} target {}",
                e.metadata.deal_id, e.approach, e.recommended_target
            ),
        }
    }
}
