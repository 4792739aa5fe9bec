//! # dealdesk
//!
//! Negotiation core for live-event talent booking: deals between an agency
//! representing an artist and a promoter, the offers and counter-offers they
//! exchange, and an engine that answers offers automatically from a computed
//! fee strategy.
//!
//! # Layers
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ application   NegotiationService · AutomatedResponseEngine    │
//! │               DealMessageLog · MarketMetricsProvider · sinks  │
//! ├───────────────────────────────────────────────────────────────┤
//! │ domain        DealRecord · DealMessage · NegotiationStrategy  │
//! │               NegotiationStateMachine · StrategyCalculator    │
//! ├───────────────────────────────────────────────────────────────┤
//! │ infrastructure  DataStore: memory · postgres · rest · retry   │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use dealdesk::app::DealDesk;
//! use dealdesk::application::services::{StaticMarketMetricsProvider, TracingNotificationSink};
//! use dealdesk::domain::entities::{DealParties, NewDeal};
//! use dealdesk::domain::value_objects::{DealType, PartyId};
//! use rust_decimal::Decimal;
//!
//! # async fn run() -> Result<(), dealdesk::application::ApplicationError> {
//! let desk = DealDesk::in_memory(
//!     Arc::new(StaticMarketMetricsProvider::new()),
//!     Arc::new(TracingNotificationSink),
//! );
//! let deal = desk
//!     .service()
//!     .create_deal(NewDeal::new(
//!         DealType::Booking,
//!         "Friday headline set",
//!         DealParties::new("agency-1", "artist-1", "promoter-1", "event-1"),
//!         Decimal::new(2500, 0),
//!     ))
//!     .await?;
//! desk.service().propose(deal.id(), PartyId::new("agency-1")).await?;
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod telemetry;
