//! # Domain Events
//!
//! Notifications emitted during negotiation.
//!
//! - [`DealTransitioned`]: A deal changed status
//! - [`OfferEscalated`]: An offer needs manual review
//! - [`StrategyCalculated`]: A strategy was recomputed
//! - [`DealNotification`]: Union of the above

pub mod deal_events;
pub mod domain_event;

pub use deal_events::{DealNotification, DealTransitioned, OfferEscalated, StrategyCalculated};
pub use domain_event::{DomainEvent, EventMetadata, EventType};
