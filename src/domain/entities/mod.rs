//! # Domain Entities
//!
//! Aggregate roots and entities representing core business concepts.
//!
//! ## Aggregates
//!
//! - [`DealRecord`]: One negotiation between an agency/artist and a promoter
//!
//! ## Entities
//!
//! - [`DealMessage`]: Entry in a deal's append-only message log
//! - [`NegotiationStrategy`]: Last computed fee range and thresholds

pub mod deal;
pub mod deal_message;
pub mod negotiation_strategy;

pub use deal::{DealFinancials, DealParties, DealRecord, DealTermsUpdate, NewDeal};
pub use deal_message::{DealMessage, NewDealMessage};
pub use negotiation_strategy::{
    ArtistAssessment, ArtistMetrics, AutoResponseThresholds, MarketAssessment, MarketData,
    NegotiationStrategy,
};
