//! # Automated Response Engine
//!
//! Answers incoming offers on deals that opted into automation.
//!
//! # Decision
//!
//! First match wins:
//!
//! 1. `amount >= accept threshold`: accept at `amount`
//! 2. `amount <= decline threshold`: decline
//! 3. otherwise: escalate for manual review, no status change, no message
//!
//! Deal overrides take precedence over the strategy thresholds. A missing or
//! stale strategy is recomputed before it is trusted.
//!
//! # Duplicates
//!
//! Evaluations of the same deal run one at a time. A repeated offer, matched
//! by its key or by `(deal, amount, responder)`, returns the first response
//! without deciding again. Recent responses are cached in memory; decisions
//! that changed the deal are also found through the message they recorded.
//! An unkeyed offer that was escalated is judged again once the deal has
//! moved on, since the same amount may then be a new offer.

use crate::application::error::{ApplicationError, ApplicationResult};
use crate::application::services::negotiation::{NegotiationService, TransitionOptions};
use crate::application::services::notification::NotificationSink;
use crate::domain::entities::deal::DealRecord;
use crate::domain::entities::deal_message::DealMessage;
use crate::domain::errors::DomainError;
use crate::domain::events::OfferEscalated;
use crate::domain::services::state_machine::DealEvent;
use crate::domain::value_objects::timestamp::Timestamp;
use crate::domain::value_objects::{DealId, DealStatus, MessageType, PartyId};
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default number of responses remembered for deduplication.
pub const DEFAULT_DEDUPE_CAPACITY: usize = 1024;

/// What the engine did with an offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseAction {
    /// The deal was accepted.
    Accepted,
    /// The deal was declined.
    Declined,
    /// The offer was left for a person to answer.
    Escalated,
}

impl ResponseAction {
    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Declined => "declined",
            Self::Escalated => "escalated",
        }
    }

    fn from_message(message: &DealMessage) -> Option<Self> {
        match message.message_type() {
            MessageType::Acceptance => Some(Self::Accepted),
            MessageType::Rejection => Some(Self::Declined),
            _ => None,
        }
    }
}

impl fmt::Display for ResponseAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The engine's answer to one offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutomatedResponse {
    /// What was done.
    pub action: ResponseAction,
    /// The automated message, absent on escalation.
    pub message: Option<DealMessage>,
    /// The deal after the decision.
    pub deal: DealRecord,
}

/// Thresholds an offer was judged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Thresholds {
    accept_above: Decimal,
    decline_below: Decimal,
}

/// Remembers recent responses, evicting the oldest beyond capacity.
#[derive(Debug)]
struct ResponseCache {
    capacity: usize,
    entries: Mutex<(HashMap<String, AutomatedResponse>, VecDeque<String>)>,
}

impl ResponseCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new((HashMap::new(), VecDeque::new())),
        }
    }

    fn get(&self, key: &str) -> Option<AutomatedResponse> {
        self.entries.lock().0.get(key).cloned()
    }

    fn insert(&self, key: String, response: AutomatedResponse) {
        if self.capacity == 0 {
            return;
        }
        let mut guard = self.entries.lock();
        let (map, order) = &mut *guard;
        if map.insert(key.clone(), response).is_none() {
            order.push_back(key);
        }
        while order.len() > self.capacity {
            if let Some(oldest) = order.pop_front() {
                map.remove(&oldest);
            }
        }
    }

    fn len(&self) -> usize {
        self.entries.lock().0.len()
    }
}

/// Decides automated answers to incoming offers.
#[derive(Debug, Clone)]
pub struct AutomatedResponseEngine {
    service: NegotiationService,
    notifier: Arc<dyn NotificationSink>,
    locks: Arc<DashMap<DealId, Arc<tokio::sync::Mutex<()>>>>,
    recent: Arc<ResponseCache>,
}

impl AutomatedResponseEngine {
    /// Creates an engine remembering up to `dedupe_capacity` responses.
    #[must_use]
    pub fn new(
        service: NegotiationService,
        notifier: Arc<dyn NotificationSink>,
        dedupe_capacity: usize,
    ) -> Self {
        Self {
            service,
            notifier,
            locks: Arc::new(DashMap::new()),
            recent: Arc::new(ResponseCache::new(dedupe_capacity)),
        }
    }

    /// Returns the number of responses currently remembered.
    #[must_use]
    pub fn remembered(&self) -> usize {
        self.recent.len()
    }

    /// Evaluates an offer of `amount` made by `responder` on deal `id`.
    ///
    /// `offer_key` identifies the incoming offer, usually the id of the
    /// message that carried it. Without one, the offer is identified by its
    /// deal, amount and responder.
    ///
    /// # Errors
    ///
    /// - `ApplicationError::NotFound` if the deal does not exist
    /// - `DomainError::AutomationNotApplicable` if automation is off, the deal
    ///   is closed or not yet proposed; nothing is changed
    /// - `DomainError::Validation` if the amount is not positive
    /// - `DomainError::DealClosed` if another writer closed the deal mid-decision
    /// - an infrastructure error from the store
    pub async fn evaluate(
        &self,
        id: DealId,
        amount: Decimal,
        responder: PartyId,
        offer_key: Option<&str>,
    ) -> ApplicationResult<AutomatedResponse> {
        if amount <= Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "offer amount must be positive, got {amount}"
            ))
            .into());
        }
        let key = dedupe_key(id, amount, &responder, offer_key);

        let lock = self.deal_lock(id);
        let result = {
            let _guard = lock.lock().await;
            self.decide(id, amount, responder, offer_key.is_some(), key)
                .await
        };
        self.release_lock(id, &lock);
        result
    }

    async fn decide(
        &self,
        id: DealId,
        amount: Decimal,
        responder: PartyId,
        keyed: bool,
        key: String,
    ) -> ApplicationResult<AutomatedResponse> {
        if let Some(previous) = self.recent.get(&key)
            && let Some(replayed) = self.replay(previous, keyed).await?
        {
            debug!(deal_id = %id, key, "offer already answered");
            return Ok(replayed);
        }
        if let Some(previous) = self.recorded_response(id, &key).await? {
            debug!(deal_id = %id, key, "offer already answered in message log");
            self.recent.insert(key, previous.clone());
            return Ok(previous);
        }

        let deal = self.service.get_deal(id).await?;
        ensure_applicable(&deal)?;
        let (deal, thresholds) = self.thresholds(deal).await?;
        let Some(thresholds) = thresholds else {
            warn!(
                deal_id = %id,
                amount = %amount,
                "no thresholds available, escalating offer"
            );
            let response = self.escalate(deal, amount, responder, None);
            self.recent.insert(key, response.clone());
            return Ok(response);
        };

        let response = if amount >= thresholds.accept_above {
            self.respond(&deal, DealEvent::Accept { amount: Some(amount) }, &key)
                .await?
        } else if amount <= thresholds.decline_below {
            self.respond(&deal, DealEvent::Decline { amount: Some(amount) }, &key)
                .await?
        } else {
            self.escalate(deal, amount, responder, Some(thresholds))
        };
        self.recent.insert(key, response.clone());
        Ok(response)
    }

    /// Replays a remembered response.
    ///
    /// Decisions close the deal and always replay. An escalation replays
    /// while the deal is unchanged; once it has moved, a keyed offer replays
    /// against the current deal and an unkeyed one is judged again.
    async fn replay(
        &self,
        previous: AutomatedResponse,
        keyed: bool,
    ) -> ApplicationResult<Option<AutomatedResponse>> {
        if previous.action != ResponseAction::Escalated {
            return Ok(Some(previous));
        }
        let deal = self.service.get_deal(previous.deal.id()).await?;
        if deal.version() == previous.deal.version() {
            return Ok(Some(previous));
        }
        if keyed {
            return Ok(Some(AutomatedResponse { deal, ..previous }));
        }
        debug!(deal_id = %deal.id(), "deal moved since escalation, judging offer again");
        Ok(None)
    }

    fn deal_lock(&self, id: DealId) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(self.locks.entry(id).or_default().value())
    }

    /// Drops the deal's lock once nobody else holds or waits on it.
    fn release_lock(&self, id: DealId, lock: &Arc<tokio::sync::Mutex<()>>) {
        // One reference lives in the map, the other is `lock`.
        self.locks
            .remove_if(&id, |_, held| Arc::ptr_eq(held, lock) && Arc::strong_count(held) == 2);
    }

    /// Finds a decision already recorded under `key`.
    async fn recorded_response(
        &self,
        id: DealId,
        key: &str,
    ) -> ApplicationResult<Option<AutomatedResponse>> {
        let Some(message) = self
            .service
            .message_log()
            .find_by_idempotency_key(id, &message_key(key))
            .await?
        else {
            return Ok(None);
        };
        let Some(action) = ResponseAction::from_message(&message) else {
            return Ok(None);
        };
        let deal = self.service.get_deal(id).await?;
        Ok(Some(AutomatedResponse {
            action,
            message: Some(message),
            deal,
        }))
    }

    /// Resolves thresholds, refreshing the strategy when an override is missing.
    ///
    /// Returns the deal as it stands afterwards, with `None` thresholds when
    /// the strategy cannot be computed for lack of data.
    async fn thresholds(
        &self,
        deal: DealRecord,
    ) -> ApplicationResult<(DealRecord, Option<Thresholds>)> {
        if let (Some(accept_above), Some(decline_below)) =
            (deal.auto_accept_threshold(), deal.auto_decline_threshold())
        {
            let thresholds = Thresholds {
                accept_above,
                decline_below,
            };
            return Ok((deal, Some(thresholds)));
        }

        let deal = match self.service.ensure_fresh_strategy(deal.id()).await {
            Ok(fresh) => fresh,
            Err(ApplicationError::Domain(e)) if e.is_insufficient_data() => return Ok((deal, None)),
            Err(e) => return Err(e),
        };
        let thresholds = deal.strategy().map(|strategy| {
            let derived = &strategy.auto_response_thresholds;
            Thresholds {
                accept_above: deal
                    .auto_accept_threshold()
                    .unwrap_or(derived.auto_accept_above),
                decline_below: deal
                    .auto_decline_threshold()
                    .unwrap_or(derived.auto_decline_below),
            }
        });
        Ok((deal, thresholds))
    }

    async fn respond(
        &self,
        deal: &DealRecord,
        event: DealEvent,
        key: &str,
    ) -> ApplicationResult<AutomatedResponse> {
        let sender = deal.parties().agency_id.clone();
        let options = TransitionOptions::automated().with_idempotency_key(message_key(key));
        let outcome = self
            .service
            .transition_with(deal.id(), event, sender, options)
            .await?;
        let action = match event {
            DealEvent::Accept { .. } => ResponseAction::Accepted,
            _ => ResponseAction::Declined,
        };
        info!(
            deal_id = %deal.id(),
            action = %action,
            amount = ?event.amount(),
            "offer answered automatically"
        );
        Ok(AutomatedResponse {
            action,
            message: Some(outcome.message),
            deal: outcome.deal,
        })
    }

    fn escalate(
        &self,
        deal: DealRecord,
        amount: Decimal,
        responder: PartyId,
        thresholds: Option<Thresholds>,
    ) -> AutomatedResponse {
        let (accept_above, decline_below) = thresholds
            .map_or((Decimal::ZERO, Decimal::ZERO), |t| (t.accept_above, t.decline_below));
        info!(
            deal_id = %deal.id(),
            amount = %amount,
            responder = %responder,
            accept_above = %accept_above,
            decline_below = %decline_below,
            "offer escalated for manual review"
        );
        self.notifier.notify(
            &OfferEscalated::new(
                deal.id(),
                amount,
                responder,
                (accept_above, decline_below),
                deal.status(),
                Timestamp::now(),
            )
            .into(),
        );
        AutomatedResponse {
            action: ResponseAction::Escalated,
            message: None,
            deal,
        }
    }
}

fn ensure_applicable(deal: &DealRecord) -> ApplicationResult<()> {
    let reason = if !deal.automated_responses() {
        "automated responses are disabled".to_string()
    } else if deal.status().is_terminal() {
        format!("deal is {}", deal.status())
    } else if deal.status() == DealStatus::Draft {
        "deal has not been proposed".to_string()
    } else {
        return Ok(());
    };
    Err(DomainError::automation_not_applicable(deal.id(), reason).into())
}

fn dedupe_key(id: DealId, amount: Decimal, responder: &PartyId, offer_key: Option<&str>) -> String {
    match offer_key {
        Some(key) => format!("{id}:offer:{key}"),
        None => format!("{id}:{}:{responder}", amount.normalize()),
    }
}

fn message_key(key: &str) -> String {
    format!("auto:{key}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::application::services::negotiation::tests::{Harness, harness};
    use crate::domain::entities::deal::NewDeal;
    use crate::domain::entities::deal::tests::sample_new_deal;
    use crate::domain::entities::negotiation_strategy::ArtistMetrics;
    use crate::domain::events::DealNotification;

    fn d(value: i64) -> Decimal {
        Decimal::new(value, 0)
    }

    fn engine(h: &Harness) -> AutomatedResponseEngine {
        AutomatedResponseEngine::new(h.service.clone(), h.sink.clone(), 16)
    }

    async fn proposed(h: &Harness, new: NewDeal) -> DealId {
        let deal = h.service.create_deal(new).await.unwrap();
        h.service
            .propose(deal.id(), PartyId::new("agency-1"))
            .await
            .unwrap();
        deal.id()
    }

    fn promoter() -> PartyId {
        PartyId::new("promoter-1")
    }

    mod decisions {
        use super::*;

        #[tokio::test]
        async fn accepts_at_or_above_override() {
            let h = harness();
            let id = proposed(&h, sample_new_deal().with_automation(Some(d(1000)), Some(d(600)))).await;

            let response = engine(&h).evaluate(id, d(1000), promoter(), None).await.unwrap();
            assert_eq!(response.action, ResponseAction::Accepted);
            assert_eq!(response.deal.status(), DealStatus::Accepted);
            assert_eq!(response.deal.agreed_fee(), Some(d(1000)));
            let message = response.message.unwrap();
            assert_eq!(message.message_type(), MessageType::Acceptance);
            assert!(message.is_automated());
        }

        #[tokio::test]
        async fn declines_at_or_below_override() {
            let h = harness();
            let id = proposed(&h, sample_new_deal().with_automation(Some(d(1000)), Some(d(600)))).await;

            let response = engine(&h).evaluate(id, d(600), promoter(), None).await.unwrap();
            assert_eq!(response.action, ResponseAction::Declined);
            assert_eq!(response.deal.status(), DealStatus::Declined);
            assert_eq!(
                response.message.unwrap().message_type(),
                MessageType::Rejection
            );
        }

        #[tokio::test]
        async fn escalates_between_thresholds() {
            let h = harness();
            let id = proposed(&h, sample_new_deal().with_automation(Some(d(1000)), Some(d(600)))).await;
            let before = h.service.message_log().list(id).await.unwrap().len();

            let response = engine(&h).evaluate(id, d(800), promoter(), None).await.unwrap();
            assert_eq!(response.action, ResponseAction::Escalated);
            assert!(response.message.is_none());
            assert_eq!(response.deal.status(), DealStatus::Proposed);
            assert_eq!(h.service.message_log().list(id).await.unwrap().len(), before);
            assert!(matches!(
                h.sink.notifications().last(),
                Some(DealNotification::Escalated(e)) if e.amount == d(800)
            ));
        }

        #[tokio::test]
        async fn strategy_thresholds_fill_missing_overrides() {
            let h = harness();
            h.metrics
                .set_artist("artist-1", ArtistMetrics::new(10, d(800), d(1100)));
            let id = proposed(&h, sample_new_deal().with_automation(None, None)).await;

            let response = engine(&h).evaluate(id, d(1200), promoter(), None).await.unwrap();
            assert_eq!(response.action, ResponseAction::Accepted);
            assert!(response.deal.strategy().is_some());
        }

        #[tokio::test]
        async fn missing_data_escalates() {
            let h = harness();
            let id = proposed(&h, sample_new_deal().with_automation(None, None)).await;
            let response = engine(&h).evaluate(id, d(5000), promoter(), None).await.unwrap();
            assert_eq!(response.action, ResponseAction::Escalated);
        }
    }

    mod staleness {
        use super::*;
        use crate::domain::entities::negotiation_strategy::MarketData;
        use crate::domain::services::strategy_calculator::StrategyCalculator;
        use crate::domain::value_objects::DealType;
        use crate::infrastructure::persistence::DealRepository;
        use std::time::Duration;

        /// Stores a strategy priced against a 1200 market: decline 840, accept 1200.
        async fn store_strategy(h: &Harness, id: DealId, calculated_at: Timestamp) {
            let deals = DealRepository::new(Arc::new(h.store.clone()));
            let mut deal = deals.get(id).await.unwrap().unwrap();
            let strategy = StrategyCalculator::default()
                .calculate(
                    &deal,
                    &ArtistMetrics::empty(),
                    Some(&MarketData::new(d(1200))),
                    calculated_at,
                )
                .unwrap();
            assert_eq!(strategy.auto_response_thresholds.auto_decline_below, d(840));
            assert_eq!(strategy.auto_response_thresholds.auto_accept_above, d(1200));
            deal.set_strategy(strategy, Timestamp::now()).unwrap();
            deals.save(&deal).await.unwrap();
        }

        #[tokio::test]
        async fn stale_strategy_is_recomputed_before_deciding() {
            let h = harness();
            let id = proposed(&h, sample_new_deal().with_automation(None, None)).await;
            store_strategy(&h, id, Timestamp::now().sub_secs(25 * 60 * 60)).await;
            h.metrics
                .set_market(DealType::Booking, "default", MarketData::new(d(1000)));

            let response = engine(&h).evaluate(id, d(1150), promoter(), None).await.unwrap();
            assert_eq!(response.action, ResponseAction::Accepted);
            let strategy = response.deal.strategy().unwrap();
            assert_eq!(strategy.auto_response_thresholds.auto_accept_above, d(1100));
            assert!(!strategy.is_stale(Timestamp::now(), Duration::from_secs(60 * 60)));
        }

        #[tokio::test]
        async fn fresh_strategy_is_trusted_as_stored() {
            let h = harness();
            let id = proposed(&h, sample_new_deal().with_automation(None, None)).await;
            store_strategy(&h, id, Timestamp::now()).await;
            h.metrics
                .set_market(DealType::Booking, "default", MarketData::new(d(1000)));

            let response = engine(&h).evaluate(id, d(1150), promoter(), None).await.unwrap();
            assert_eq!(response.action, ResponseAction::Escalated);
            assert_eq!(
                response.deal.strategy().unwrap().auto_response_thresholds.auto_accept_above,
                d(1200)
            );
        }
    }

    mod applicability {
        use super::*;

        #[tokio::test]
        async fn disabled_automation_changes_nothing() {
            let h = harness();
            let id = proposed(&h, sample_new_deal()).await;
            let err = engine(&h).evaluate(id, d(5000), promoter(), None).await.unwrap_err();
            assert!(err.is_automation_not_applicable());
            assert_eq!(h.service.get_deal(id).await.unwrap().status(), DealStatus::Proposed);
        }

        #[tokio::test]
        async fn closed_deal_is_not_applicable() {
            let h = harness();
            let id = proposed(&h, sample_new_deal().with_automation(Some(d(1000)), Some(d(600)))).await;
            h.service.decline(id, promoter(), None).await.unwrap();
            let err = engine(&h).evaluate(id, d(900), promoter(), Some("m-2")).await.unwrap_err();
            assert!(err.is_automation_not_applicable());
        }

        #[tokio::test]
        async fn draft_deal_is_not_applicable() {
            let h = harness();
            let deal = h
                .service
                .create_deal(sample_new_deal().with_automation(Some(d(1000)), Some(d(600))))
                .await
                .unwrap();
            let err = engine(&h)
                .evaluate(deal.id(), d(1100), promoter(), None)
                .await
                .unwrap_err();
            assert!(err.is_automation_not_applicable());
        }

        #[tokio::test]
        async fn non_positive_offer_is_rejected() {
            let h = harness();
            let id = proposed(&h, sample_new_deal().with_automation(Some(d(1000)), Some(d(600)))).await;
            let err = engine(&h).evaluate(id, d(0), promoter(), None).await.unwrap_err();
            assert!(err.is_validation());
        }
    }

    mod duplicates {
        use super::*;

        #[tokio::test]
        async fn repeated_offer_returns_first_response() {
            let h = harness();
            let id = proposed(&h, sample_new_deal().with_automation(Some(d(1000)), Some(d(600)))).await;
            let engine = engine(&h);

            let first = engine.evaluate(id, d(1100), promoter(), Some("m-1")).await.unwrap();
            let second = engine.evaluate(id, d(1100), promoter(), Some("m-1")).await.unwrap();
            assert_eq!(first, second);
            assert_eq!(h.service.message_log().list(id).await.unwrap().len(), 2);
        }

        #[tokio::test]
        async fn fresh_engine_finds_recorded_decision() {
            let h = harness();
            let id = proposed(&h, sample_new_deal().with_automation(Some(d(1000)), Some(d(600)))).await;

            let first = engine(&h).evaluate(id, d(500), promoter(), Some("m-1")).await.unwrap();
            let replay = engine(&h).evaluate(id, d(500), promoter(), Some("m-1")).await.unwrap();
            assert_eq!(replay.action, ResponseAction::Declined);
            assert_eq!(replay.message, first.message);
        }

        #[tokio::test]
        async fn concurrent_duplicates_decide_once() {
            let h = harness();
            let id = proposed(&h, sample_new_deal().with_automation(Some(d(1000)), Some(d(600)))).await;
            let engine = engine(&h);

            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let engine = engine.clone();
                    tokio::spawn(async move { engine.evaluate(id, d(1200), promoter(), None).await })
                })
                .collect();
            for handle in handles {
                let response = handle.await.unwrap().unwrap();
                assert_eq!(response.action, ResponseAction::Accepted);
            }
            assert_eq!(h.service.message_log().list(id).await.unwrap().len(), 2);
        }

        #[tokio::test]
        async fn escalations_are_notified_once() {
            let h = harness();
            let id = proposed(&h, sample_new_deal().with_automation(Some(d(1000)), Some(d(600)))).await;
            let engine = engine(&h);
            h.sink.take();

            engine.evaluate(id, d(800), promoter(), None).await.unwrap();
            engine.evaluate(id, d(800), promoter(), None).await.unwrap();
            assert_eq!(h.sink.len(), 1);
        }

        #[tokio::test]
        async fn unkeyed_escalation_is_judged_again_after_deal_moves() {
            let h = harness();
            let id = proposed(&h, sample_new_deal().with_automation(Some(d(1000)), Some(d(600)))).await;
            let engine = engine(&h);
            h.sink.take();

            let first = engine.evaluate(id, d(800), promoter(), None).await.unwrap();
            assert_eq!(first.deal.status(), DealStatus::Proposed);
            h.service
                .send_counter_offer(id, PartyId::new("agency-1"), d(950))
                .await
                .unwrap();
            h.sink.take();

            let again = engine.evaluate(id, d(800), promoter(), None).await.unwrap();
            assert_eq!(again.action, ResponseAction::Escalated);
            assert_eq!(again.deal.status(), DealStatus::CounterOffered);
            assert_eq!(h.sink.len(), 1);
        }

        #[tokio::test]
        async fn keyed_escalation_replays_against_current_deal() {
            let h = harness();
            let id = proposed(&h, sample_new_deal().with_automation(Some(d(1000)), Some(d(600)))).await;
            let engine = engine(&h);

            engine.evaluate(id, d(800), promoter(), Some("m-1")).await.unwrap();
            h.service
                .send_counter_offer(id, PartyId::new("agency-1"), d(950))
                .await
                .unwrap();
            h.sink.take();

            let replay = engine.evaluate(id, d(800), promoter(), Some("m-1")).await.unwrap();
            assert_eq!(replay.action, ResponseAction::Escalated);
            assert_eq!(replay.deal.status(), DealStatus::CounterOffered);
            assert!(h.sink.is_empty());
        }

        #[tokio::test]
        async fn deal_locks_are_released_after_evaluation() {
            let h = harness();
            let first = proposed(&h, sample_new_deal().with_automation(Some(d(1000)), Some(d(600)))).await;
            let second = proposed(&h, sample_new_deal().with_automation(Some(d(1000)), Some(d(600)))).await;
            let engine = engine(&h);

            let handles: Vec<_> = [first, second]
                .into_iter()
                .flat_map(|id| (0..4).map(move |n| (id, n)))
                .map(|(id, n)| {
                    let engine = engine.clone();
                    tokio::spawn(async move { engine.evaluate(id, d(700 + n), promoter(), None).await })
                })
                .collect();
            for handle in handles {
                let response = handle.await.unwrap().unwrap();
                assert_eq!(response.action, ResponseAction::Escalated);
            }
            assert!(engine.locks.is_empty());

            let draft = h
                .service
                .create_deal(sample_new_deal().with_automation(Some(d(1000)), Some(d(600))))
                .await
                .unwrap();
            assert!(engine.evaluate(draft.id(), d(700), promoter(), None).await.is_err());
            assert!(engine.locks.is_empty());
        }

        #[test]
        fn cache_evicts_oldest() {
            let cache = ResponseCache::new(2);
            let deal = DealRecord::create(sample_new_deal(), Timestamp::now()).unwrap();
            let response = AutomatedResponse {
                action: ResponseAction::Escalated,
                message: None,
                deal,
            };
            for key in ["a", "b", "c"] {
                cache.insert(key.to_string(), response.clone());
            }
            assert_eq!(cache.len(), 2);
            assert!(cache.get("a").is_none());
            assert!(cache.get("c").is_some());
        }
    }
}
