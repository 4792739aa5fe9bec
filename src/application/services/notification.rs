//! # Notifications
//!
//! Fire-and-forget delivery of [`DealNotification`]s.
//!
//! Sinks are called synchronously after the state change is stored and must
//! not block. A sink that cannot deliver drops the notification and logs it;
//! it never fails the operation that produced it.
//!
//! - [`TracingNotificationSink`]: Structured log line per notification
//! - [`BroadcastNotificationSink`]: `tokio::sync::broadcast` fan-out to subscribers
//! - [`InMemoryNotificationSink`]: Collects notifications for inspection
//! - [`FanOutNotificationSink`]: Delivers to several sinks in order

use crate::domain::events::{DealNotification, DomainEvent};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Receives notifications about deals.
pub trait NotificationSink: Send + Sync + fmt::Debug {
    /// Delivers one notification.
    fn notify(&self, notification: &DealNotification);
}

/// Logs every notification through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotificationSink;

impl NotificationSink for TracingNotificationSink {
    fn notify(&self, notification: &DealNotification) {
        match notification {
            DealNotification::Transitioned(e) => info!(
                deal_id = %e.metadata.deal_id,
                from = %e.from,
                to = %e.to,
                event = %e.event,
                actor = %e.actor,
                automated = e.automated,
                "deal transitioned"
            ),
            DealNotification::Escalated(e) => warn!(
                deal_id = %e.metadata.deal_id,
                amount = %e.amount,
                responder = %e.responder,
                accept_above = %e.accept_above,
                decline_below = %e.decline_below,
                "offer escalated for manual review"
            ),
            DealNotification::StrategyCalculated(e) => info!(
                deal_id = %e.metadata.deal_id,
                approach = %e.approach,
                target = %e.recommended_target,
                "strategy calculated"
            ),
        }
    }
}

/// Publishes notifications on a broadcast channel.
///
/// Subscribers that fall behind lose the oldest notifications.
#[derive(Debug, Clone)]
pub struct BroadcastNotificationSink {
    sender: broadcast::Sender<DealNotification>,
}

impl BroadcastNotificationSink {
    /// Creates a channel holding up to `capacity` undelivered notifications.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Returns a new receiver for notifications sent from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DealNotification> {
        self.sender.subscribe()
    }
}

impl NotificationSink for BroadcastNotificationSink {
    fn notify(&self, notification: &DealNotification) {
        if self.sender.send(notification.clone()).is_err() {
            debug!(
                event = notification.event_name(),
                deal_id = %notification.deal_id(),
                "no notification subscribers"
            );
        }
    }
}

/// Keeps every notification in memory.
#[derive(Debug, Default)]
pub struct InMemoryNotificationSink {
    received: Mutex<Vec<DealNotification>>,
}

impl InMemoryNotificationSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything received so far.
    #[must_use]
    pub fn notifications(&self) -> Vec<DealNotification> {
        self.received.lock().clone()
    }

    /// Removes and returns everything received so far.
    pub fn take(&self) -> Vec<DealNotification> {
        std::mem::take(&mut *self.received.lock())
    }

    /// Returns the number of notifications received.
    #[must_use]
    pub fn len(&self) -> usize {
        self.received.lock().len()
    }

    /// Returns true if nothing was received.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NotificationSink for InMemoryNotificationSink {
    fn notify(&self, notification: &DealNotification) {
        self.received.lock().push(notification.clone());
    }
}

/// Delivers each notification to every inner sink.
#[derive(Debug, Default, Clone)]
pub struct FanOutNotificationSink {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl FanOutNotificationSink {
    /// Creates a fan-out over `sinks`.
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn NotificationSink>>) -> Self {
        Self { sinks }
    }

    /// Adds a sink.
    #[must_use]
    pub fn with(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl NotificationSink for FanOutNotificationSink {
    fn notify(&self, notification: &DealNotification) {
        for sink in &self.sinks {
            sink.notify(notification);
        }
    }
}
