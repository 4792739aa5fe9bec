//! # Application Services
//!
//! Services that orchestrate domain logic and infrastructure.
//!
//! This module provides application-level services including:
//! - [`NegotiationService`]: Deal lifecycle use cases with optimistic concurrency
//! - [`AutomatedResponseEngine`]: Threshold-based answers to incoming offers
//! - [`DealMessageLog`]: Append-only per-deal message log with polling refresh
//! - [`MarketMetricsProvider`]: Port for artist history and market averages
//! - [`NotificationSink`]: Fire-and-forget notification delivery

pub mod automated_response;
pub mod market_metrics;
pub mod message_log;
pub mod negotiation;
pub mod notification;

pub use automated_response::{
    AutomatedResponse, AutomatedResponseEngine, DEFAULT_DEDUPE_CAPACITY, ResponseAction,
};
pub use market_metrics::{
    FallbackMarketMetricsProvider, MarketMetricsProvider, StaticMarketMetricsProvider,
};
pub use message_log::{DEFAULT_POLL_INTERVAL, DealMessageLog};
pub use negotiation::{
    DealFilter, DealPipelineSummary, NegotiationService, NegotiationSettings, TransitionOptions,
    TransitionOutcome,
};
pub use notification::{
    BroadcastNotificationSink, FanOutNotificationSink, InMemoryNotificationSink,
    NotificationSink, TracingNotificationSink,
};
