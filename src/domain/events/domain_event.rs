//! # Domain Event Trait
//!
//! Base trait for all domain events.
//!
//! Every event carries an [`EventMetadata`] with its own id, the deal it is
//! about and when it happened. Concrete events live in
//! [`deal_events`](super::deal_events).

use crate::domain::value_objects::timestamp::Timestamp;
use crate::domain::value_objects::{DealId, NotificationId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Type of domain event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// Deal status changes.
    Deal,
    /// Automated response outcomes that need a human.
    Automation,
    /// Strategy recalculations.
    Strategy,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deal => write!(f, "DEAL"),
            Self::Automation => write!(f, "AUTOMATION"),
            Self::Strategy => write!(f, "STRATEGY"),
        }
    }
}

/// Trait for all domain events.
///
/// # Required Methods
///
/// - [`event_id`](DomainEvent::event_id) - Unique identifier for this event
/// - [`deal_id`](DomainEvent::deal_id) - The deal this event relates to
/// - [`timestamp`](DomainEvent::timestamp) - When the event occurred
/// - [`event_type`](DomainEvent::event_type) - Category of the event
/// - [`event_name`](DomainEvent::event_name) - Human-readable event name
pub trait DomainEvent: Send + Sync + fmt::Debug {
    /// Returns the unique identifier for this event.
    fn event_id(&self) -> NotificationId;

    /// Returns the deal this event relates to.
    fn deal_id(&self) -> DealId;

    /// Returns when this event occurred.
    fn timestamp(&self) -> Timestamp;

    /// Returns the type/category of this event.
    fn event_type(&self) -> EventType;

    /// Returns the human-readable name of this event.
    fn event_name(&self) -> &'static str;
}

/// Common metadata for all domain events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique identifier for this event.
    pub event_id: NotificationId,
    /// The deal this event relates to.
    pub deal_id: DealId,
    /// When this event occurred.
    pub timestamp: Timestamp,
}

impl EventMetadata {
    /// Creates metadata for a deal with a generated event ID.
    #[must_use]
    pub fn for_deal(deal_id: DealId, timestamp: Timestamp) -> Self {
        Self {
            event_id: NotificationId::new_v4(),
            deal_id,
            timestamp,
        }
    }

    /// Creates event metadata with specific values (for reconstruction).
    #[must_use]
    pub fn from_parts(event_id: NotificationId, deal_id: DealId, timestamp: Timestamp) -> Self {
        Self {
            event_id,
            deal_id,
            timestamp,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn event_type_display() {
        assert_eq!(EventType::Deal.to_string(), "DEAL");
        assert_eq!(EventType::Automation.to_string(), "AUTOMATION");
        assert_eq!(EventType::Strategy.to_string(), "STRATEGY");
    }

    #[test]
    fn metadata_ids_are_unique() {
        let deal = DealId::new_v4();
        let now = Timestamp::now();
        let a = EventMetadata::for_deal(deal, now);
        let b = EventMetadata::for_deal(deal, now);
        assert_ne!(a.event_id, b.event_id);
        assert_eq!(a.deal_id, deal);
    }

    #[test]
    fn metadata_serde_roundtrip() {
        let metadata = EventMetadata::for_deal(DealId::new_v4(), Timestamp::now());
        let json = serde_json::to_string(&metadata).unwrap();
        let parsed: EventMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(metadata, parsed);
    }
}
