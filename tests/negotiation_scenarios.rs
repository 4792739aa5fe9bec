//! End-to-end negotiation scenarios over the in-memory store.

#![allow(clippy::unwrap_used)]

use dealdesk::app::DealDesk;
use dealdesk::application::services::{
    InMemoryNotificationSink, ResponseAction, StaticMarketMetricsProvider,
};
use dealdesk::config::AppConfig;
use dealdesk::domain::entities::{
    ArtistMetrics, DealParties, DealRecord, DealTermsUpdate, MarketData, NewDeal,
};
use dealdesk::domain::errors::DomainError;
use dealdesk::domain::events::DomainEvent;
use dealdesk::domain::services::{DealEvent, FeeMultipliers, StrategyCalculator};
use dealdesk::domain::value_objects::{DealId, DealStatus, DealType, MessageType, PartyId, Timestamp};
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;

fn d(value: i64) -> Decimal {
    Decimal::new(value, 0)
}

fn agency() -> PartyId {
    PartyId::new("agency-1")
}

fn promoter() -> PartyId {
    PartyId::new("promoter-1")
}

fn new_deal() -> NewDeal {
    NewDeal::new(
        DealType::Booking,
        "Warehouse closing set",
        DealParties::new("agency-1", "artist-1", "promoter-1", "event-1"),
        d(800),
    )
    .with_fee_range(d(400), d(1500))
}

/// A desk whose strategy for a new artist in a 1000 market is 500 / 800 / 1200.
async fn desk() -> (DealDesk, Arc<InMemoryNotificationSink>) {
    let mut config = AppConfig::default();
    config.strategy.conservative = FeeMultipliers::from_percent(50, 80, 120);
    let metrics = StaticMarketMetricsProvider::new().with_market(
        DealType::Booking,
        "default",
        MarketData::new(d(1000)),
    );
    let sink = Arc::new(InMemoryNotificationSink::new());
    let desk = DealDesk::build(&config, Arc::new(metrics), sink.clone())
        .await
        .unwrap();
    (desk, sink)
}

/// An automated deal in negotiation with its strategy computed.
async fn negotiating_deal(desk: &DealDesk) -> DealId {
    let service = desk.service();
    let deal = service
        .create_deal(new_deal().with_automation(None, None))
        .await
        .unwrap();
    service.propose(deal.id(), agency()).await.unwrap();
    service
        .send_offer(deal.id(), promoter(), d(700))
        .await
        .unwrap();

    let strategy = service.refresh_strategy(deal.id(), None).await.unwrap();
    assert_eq!(strategy.recommended_minimum, d(500));
    assert_eq!(strategy.recommended_target, d(800));
    assert_eq!(strategy.recommended_maximum, d(1200));
    assert_eq!(strategy.auto_response_thresholds.auto_accept_above, d(1200));
    assert_eq!(strategy.auto_response_thresholds.auto_decline_below, d(500));
    deal.id()
}

#[tokio::test]
async fn offer_above_accept_threshold_is_accepted() {
    let (desk, _) = desk().await;
    let id = negotiating_deal(&desk).await;

    let response = desk
        .engine()
        .evaluate(id, d(1300), promoter(), None)
        .await
        .unwrap();
    assert_eq!(response.action, ResponseAction::Accepted);
    assert_eq!(response.deal.status(), DealStatus::Accepted);
    assert_eq!(response.deal.agreed_fee(), Some(d(1300)));
    assert!(response.deal.accepted_at().is_some());
    assert!(response.message.unwrap().is_automated());
}

#[tokio::test]
async fn offer_below_decline_threshold_is_declined() {
    let (desk, _) = desk().await;
    let id = negotiating_deal(&desk).await;

    let response = desk
        .engine()
        .evaluate(id, d(400), promoter(), None)
        .await
        .unwrap();
    assert_eq!(response.action, ResponseAction::Declined);
    assert_eq!(response.deal.status(), DealStatus::Declined);
    assert_eq!(
        response.message.unwrap().message_type(),
        MessageType::Rejection
    );
}

#[tokio::test]
async fn offer_between_thresholds_is_escalated() {
    let (desk, sink) = desk().await;
    let id = negotiating_deal(&desk).await;
    let messages_before = desk.message_log().list(id).await.unwrap().len();

    let response = desk
        .engine()
        .evaluate(id, d(900), promoter(), None)
        .await
        .unwrap();
    assert_eq!(response.action, ResponseAction::Escalated);
    assert!(response.message.is_none());
    assert_eq!(
        desk.service().get_deal(id).await.unwrap().status(),
        DealStatus::Negotiating
    );
    assert_eq!(
        desk.message_log().list(id).await.unwrap().len(),
        messages_before
    );
    assert!(
        sink.notifications()
            .iter()
            .any(|n| n.event_name() == "OfferEscalated")
    );
}

#[test]
fn no_history_and_no_market_is_insufficient_data() {
    let deal = DealRecord::create(new_deal(), Timestamp::now()).unwrap();
    let err = StrategyCalculator::default()
        .calculate(&deal, &ArtistMetrics::empty(), None, Timestamp::now())
        .unwrap_err();
    assert!(err.is_insufficient_data());
}

#[tokio::test]
async fn accepted_deal_rejects_propose() {
    let (desk, _) = desk().await;
    let service = desk.service();
    let deal = service.create_deal(new_deal()).await.unwrap();
    service.propose(deal.id(), agency()).await.unwrap();
    service.accept(deal.id(), promoter(), None).await.unwrap();

    let err = service.propose(deal.id(), agency()).await.unwrap_err();
    assert!(err.is_deal_closed());
    assert!(matches!(
        err.as_domain(),
        Some(DomainError::DealClosed {
            status: DealStatus::Accepted,
            ..
        })
    ));
}

#[tokio::test]
async fn duplicate_evaluation_is_a_no_op() {
    let (desk, _) = desk().await;
    let id = negotiating_deal(&desk).await;

    let first = desk
        .engine()
        .evaluate(id, d(1300), promoter(), Some("offer-1"))
        .await
        .unwrap();
    let messages = desk.message_log().list(id).await.unwrap();
    let second = desk
        .engine()
        .evaluate(id, d(1300), promoter(), Some("offer-1"))
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(desk.message_log().list(id).await.unwrap(), messages);
}

#[tokio::test]
async fn message_log_keeps_append_order() {
    let (desk, _) = desk().await;
    let service = desk.service();
    let deal = service.create_deal(new_deal()).await.unwrap();
    let id = deal.id();

    service.propose(id, agency()).await.unwrap();
    service.send_offer(id, promoter(), d(600)).await.unwrap();
    service.refresh_strategy(id, None).await.unwrap();
    service.send_counter_offer(id, agency(), d(1000)).await.unwrap();
    service.send_offer(id, promoter(), d(850)).await.unwrap();
    service.accept(id, agency(), None).await.unwrap();

    let amounts: Vec<_> = desk
        .message_log()
        .list(id)
        .await
        .unwrap()
        .iter()
        .map(|m| (m.message_type(), m.offer_amount()))
        .collect();
    assert_eq!(
        amounts,
        vec![
            (MessageType::Offer, Some(d(800))),
            (MessageType::Offer, Some(d(600))),
            (MessageType::CounterOffer, Some(d(1000))),
            (MessageType::Offer, Some(d(850))),
            (MessageType::Acceptance, None),
        ]
    );
    assert_eq!(
        service.get_deal(id).await.unwrap().agreed_fee(),
        Some(d(850))
    );
}

#[derive(Debug, Clone)]
enum Step {
    Event(DealEvent),
    Terms(Option<i64>, Option<i64>, Option<i64>),
}

fn arb_step() -> impl Strategy<Value = Step> {
    let amount = 1i64..3_000;
    prop_oneof![
        Just(Step::Event(DealEvent::Propose)),
        amount.clone().prop_map(|a| Step::Event(DealEvent::SendOffer { amount: d(a) })),
        amount.prop_map(|a| Step::Event(DealEvent::SendCounterOffer { amount: d(a) })),
        Just(Step::Event(DealEvent::Accept { amount: None })),
        Just(Step::Event(DealEvent::Decline { amount: None })),
        Just(Step::Event(DealEvent::Expire)),
        (
            proptest::option::of(1i64..3_000),
            proptest::option::of(1i64..3_000),
            proptest::option::of(1i64..3_000)
        )
            .prop_map(|(min, fee, max)| Step::Terms(min, fee, max)),
    ]
}

fn fees_ordered(deal: &DealRecord) -> bool {
    let f = deal.financials();
    f.minimum_fee.is_none_or(|min| min <= f.proposed_fee)
        && f.maximum_fee.is_none_or(|max| f.proposed_fee <= max)
}

proptest! {
    #[test]
    fn fee_bounds_and_terminal_states_hold(steps in proptest::collection::vec(arb_step(), 1..30)) {
        let now = Timestamp::now();
        let mut deal = DealRecord::create(new_deal(), now).unwrap();
        prop_assert!(fees_ordered(&deal));

        for step in steps {
            let was_terminal = deal.status().is_terminal();
            let before = deal.clone();
            let result = match step {
                Step::Event(event) => deal.apply(&event, now).map(|_| ()),
                Step::Terms(min, fee, max) => deal.update_terms(
                    DealTermsUpdate {
                        minimum_fee: min.map(d),
                        proposed_fee: fee.map(d),
                        maximum_fee: max.map(d),
                        ..DealTermsUpdate::default()
                    },
                    now,
                ),
            };
            if was_terminal {
                prop_assert!(result.as_ref().is_err_and(DomainError::is_deal_closed));
            }
            if result.is_err() {
                prop_assert_eq!(&deal, &before);
            }
            prop_assert!(fees_ordered(&deal));
        }
    }
}
