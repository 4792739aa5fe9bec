//! # Negotiation Service
//!
//! Use cases over deal records: creation, lookup, listing, terms updates,
//! status transitions, expiry, strategy refresh and pipeline analytics.
//!
//! # Transitions
//!
//! ```text
//! load deal ─► overdue? ─yes─► expire, then fail DealClosed
//!     │
//!     ▼
//! apply event (state machine) ─► save with version check ─conflict─► reload, retry
//!     │
//!     ▼
//! append one message ─► notify DealTransitioned
//! ```
//!
//! Domain errors are returned as-is and never retried. Only version conflicts
//! are retried here, up to `max_cas_retries`; transient store failures are
//! retried below, by the store decorator.
//!
//! # Expiry
//!
//! Overdue deals are expired lazily whenever they are read or written, and
//! optionally by a background sweeper ([`NegotiationService::spawn_expiry_sweeper`]).

use crate::application::error::{ApplicationError, ApplicationResult};
use crate::application::services::market_metrics::MarketMetricsProvider;
use crate::application::services::message_log::DealMessageLog;
use crate::application::services::notification::NotificationSink;
use crate::domain::entities::deal::{DealRecord, DealTermsUpdate, NewDeal};
use crate::domain::entities::deal_message::{DealMessage, NewDealMessage};
use crate::domain::entities::negotiation_strategy::{ArtistMetrics, NegotiationStrategy};
use crate::domain::errors::DomainError;
use crate::domain::events::{DealTransitioned, StrategyCalculated};
use crate::domain::services::state_machine::{DealEvent, NegotiationStateMachine, StatusChange};
use crate::domain::services::strategy_calculator::StrategyCalculator;
use crate::domain::value_objects::money::mean;
use crate::domain::value_objects::timestamp::Timestamp;
use crate::domain::value_objects::{
    ArithmeticError, DealId, DealStatus, DealType, MessageType, PartyId, PriorityLevel,
};
use crate::infrastructure::persistence::{DealRepository, Filter, SortOrder};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Default page size for [`DealFilter`].
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Tunables of the negotiation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationSettings {
    /// Attempts per write before giving up on a contended deal.
    pub max_cas_retries: u32,
    /// Sender recorded on system-generated messages.
    pub system_actor: PartyId,
    /// Market region used when a caller does not name one.
    pub default_region: String,
}

impl Default for NegotiationSettings {
    fn default() -> Self {
        Self {
            max_cas_retries: 5,
            system_actor: PartyId::new("system"),
            default_region: "default".to_string(),
        }
    }
}

/// How a transition is recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionOptions {
    /// Mark the recorded message as automated.
    pub automated: bool,
    /// Idempotency key stored on the recorded message.
    pub idempotency_key: Option<String>,
}

impl TransitionOptions {
    /// Options for a system-decided transition.
    #[must_use]
    pub fn automated() -> Self {
        Self {
            automated: true,
            idempotency_key: None,
        }
    }

    /// Sets the idempotency key.
    #[must_use]
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// Result of a successful transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionOutcome {
    /// The deal as stored after the transition.
    pub deal: DealRecord,
    /// The status change.
    pub change: StatusChange,
    /// The message recording it.
    pub message: DealMessage,
}

/// Criteria for listing deals.
///
/// Empty sets and `None` fields do not constrain. Results come newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DealFilter {
    /// Accepted statuses.
    pub statuses: Vec<DealStatus>,
    /// Accepted deal types.
    pub deal_types: Vec<DealType>,
    /// Artist party.
    pub artist_id: Option<PartyId>,
    /// Agency party.
    pub agency_id: Option<PartyId>,
    /// Promoter party.
    pub promoter_id: Option<PartyId>,
    /// Earliest performance date.
    pub performance_from: Option<Timestamp>,
    /// Latest performance date.
    pub performance_to: Option<Timestamp>,
    /// Lowest proposed fee.
    pub fee_min: Option<Decimal>,
    /// Highest proposed fee.
    pub fee_max: Option<Decimal>,
    /// Accepted priorities.
    pub priority_levels: Vec<PriorityLevel>,
    /// Case-insensitive text matched against title and description.
    pub search: Option<String>,
    /// 1-based page number.
    pub page: usize,
    /// Page size.
    pub limit: usize,
}

impl Default for DealFilter {
    fn default() -> Self {
        Self {
            statuses: Vec::new(),
            deal_types: Vec::new(),
            artist_id: None,
            agency_id: None,
            promoter_id: None,
            performance_from: None,
            performance_to: None,
            fee_min: None,
            fee_max: None,
            priority_levels: Vec::new(),
            search: None,
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl DealFilter {
    /// Matches every deal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to the given statuses.
    #[must_use]
    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = DealStatus>) -> Self {
        self.statuses = statuses.into_iter().collect();
        self
    }

    /// Restricts to one artist.
    #[must_use]
    pub fn for_artist(mut self, artist_id: impl Into<PartyId>) -> Self {
        self.artist_id = Some(artist_id.into());
        self
    }

    /// Restricts to one agency.
    #[must_use]
    pub fn for_agency(mut self, agency_id: impl Into<PartyId>) -> Self {
        self.agency_id = Some(agency_id.into());
        self
    }

    /// Restricts to one promoter.
    #[must_use]
    pub fn for_promoter(mut self, promoter_id: impl Into<PartyId>) -> Self {
        self.promoter_id = Some(promoter_id.into());
        self
    }

    /// Restricts the proposed fee to a range.
    #[must_use]
    pub fn with_fee_range(mut self, min: Option<Decimal>, max: Option<Decimal>) -> Self {
        self.fee_min = min;
        self.fee_max = max;
        self
    }

    /// Adds a text search.
    #[must_use]
    pub fn with_search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    /// Selects a page.
    #[must_use]
    pub fn page(mut self, page: usize, limit: usize) -> Self {
        self.page = page;
        self.limit = limit;
        self
    }

    /// Checks paging and ranges.
    ///
    /// # Errors
    ///
    /// Returns `ApplicationError::Validation` on a zero page or limit, or an
    /// inverted range.
    pub fn validate(&self) -> ApplicationResult<()> {
        if self.page == 0 || self.limit == 0 {
            return Err(ApplicationError::validation("page and limit must be positive"));
        }
        if let (Some(min), Some(max)) = (self.fee_min, self.fee_max)
            && min > max
        {
            return Err(ApplicationError::validation("fee_min exceeds fee_max"));
        }
        if let (Some(from), Some(to)) = (self.performance_from, self.performance_to)
            && from.is_after(&to)
        {
            return Err(ApplicationError::validation(
                "performance_from is after performance_to",
            ));
        }
        Ok(())
    }

    /// Builds the store filter, with or without paging.
    #[must_use]
    pub fn to_store_filter(&self, paginate: bool) -> Filter {
        let mut filter = Filter::new();
        if !self.statuses.is_empty() {
            filter = filter.in_values("status", self.statuses.iter().map(DealStatus::as_str));
        }
        if !self.deal_types.is_empty() {
            filter = filter.in_values("deal_type", self.deal_types.iter().map(DealType::as_str));
        }
        if !self.priority_levels.is_empty() {
            filter = filter.in_values(
                "priority_level",
                self.priority_levels.iter().map(PriorityLevel::as_str),
            );
        }
        for (field, party) in [
            ("artist_id", &self.artist_id),
            ("agency_id", &self.agency_id),
            ("promoter_id", &self.promoter_id),
        ] {
            if let Some(party) = party {
                filter = filter.eq(field, party.as_str());
            }
        }
        if let Some(from) = self.performance_from {
            filter = filter.gte("performance_date", from);
        }
        if let Some(to) = self.performance_to {
            filter = filter.lte("performance_date", to);
        }
        if let Some(min) = self.fee_min {
            filter = filter.gte("proposed_fee", min);
        }
        if let Some(max) = self.fee_max {
            filter = filter.lte("proposed_fee", max);
        }
        if let Some(term) = self.search.as_deref().map(str::trim)
            && !term.is_empty()
        {
            filter = filter.search(["title", "description"], term);
        }
        filter = filter.order_by("created_at", SortOrder::Desc);
        if paginate {
            filter = filter
                .offset(self.page.saturating_sub(1).saturating_mul(self.limit))
                .limit(self.limit);
        }
        filter
    }
}

/// Pipeline analytics over a set of deals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealPipelineSummary {
    /// Deals considered.
    pub total: usize,
    /// Count per status, in lifecycle order.
    pub by_status: Vec<(DealStatus, usize)>,
    /// Deals not yet closed.
    pub open: usize,
    /// Deals closed as accepted.
    pub accepted: usize,
    /// Mean agreed fee of accepted deals.
    pub average_agreed_fee: Option<Decimal>,
    /// Sum of agreed fees.
    pub total_agreed_value: Decimal,
}

impl DealPipelineSummary {
    fn from_deals(deals: &[DealRecord]) -> ApplicationResult<Self> {
        let by_status = DealStatus::ALL
            .iter()
            .map(|status| {
                let count = deals.iter().filter(|d| d.status() == *status).count();
                (*status, count)
            })
            .collect();
        let agreed: Vec<Decimal> = deals.iter().filter_map(DealRecord::agreed_fee).collect();
        let total_agreed_value = agreed
            .iter()
            .try_fold(Decimal::ZERO, |sum, fee| sum.checked_add(*fee))
            .ok_or(DomainError::Arithmetic(ArithmeticError::Overflow))?;
        Ok(Self {
            total: deals.len(),
            by_status,
            open: deals.iter().filter(|d| d.status().is_active()).count(),
            accepted: deals
                .iter()
                .filter(|d| d.status() == DealStatus::Accepted)
                .count(),
            average_agreed_fee: mean(&agreed).map_err(DomainError::from)?,
            total_agreed_value,
        })
    }

    /// Returns the count for one status.
    #[must_use]
    pub fn count(&self, status: DealStatus) -> usize {
        self.by_status
            .iter()
            .find(|(s, _)| *s == status)
            .map_or(0, |(_, n)| *n)
    }
}

/// The negotiation use-case service.
#[derive(Debug, Clone)]
pub struct NegotiationService {
    deals: DealRepository,
    log: DealMessageLog,
    calculator: StrategyCalculator,
    metrics: Arc<dyn MarketMetricsProvider>,
    notifier: Arc<dyn NotificationSink>,
    settings: NegotiationSettings,
}

impl NegotiationService {
    /// Creates the service.
    #[must_use]
    pub fn new(
        deals: DealRepository,
        log: DealMessageLog,
        calculator: StrategyCalculator,
        metrics: Arc<dyn MarketMetricsProvider>,
        notifier: Arc<dyn NotificationSink>,
        settings: NegotiationSettings,
    ) -> Self {
        Self {
            deals,
            log,
            calculator,
            metrics,
            notifier,
            settings,
        }
    }

    /// Returns the message log.
    #[must_use]
    pub fn message_log(&self) -> &DealMessageLog {
        &self.log
    }

    /// Returns the strategy calculator.
    #[must_use]
    pub fn calculator(&self) -> &StrategyCalculator {
        &self.calculator
    }

    /// Returns the settings.
    #[must_use]
    pub fn settings(&self) -> &NegotiationSettings {
        &self.settings
    }

    // ========== Deals ==========

    /// Creates a deal in `draft`.
    ///
    /// # Errors
    ///
    /// - `DomainError::Validation` if the deal is inconsistent
    /// - an infrastructure error from the store
    pub async fn create_deal(&self, new: NewDeal) -> ApplicationResult<DealRecord> {
        let deal = DealRecord::create(new, Timestamp::now())?;
        let stored = self.deals.insert(&deal).await?;
        info!(
            deal_id = %stored.id(),
            deal_type = %stored.deal_type(),
            artist_id = %stored.parties().artist_id,
            proposed_fee = %stored.financials().proposed_fee,
            "deal created"
        );
        Ok(stored)
    }

    /// Loads a deal, expiring it first if its deadline has passed.
    ///
    /// # Errors
    ///
    /// - `ApplicationError::NotFound` if the deal does not exist
    /// - an infrastructure error from the store
    pub async fn get_deal(&self, id: DealId) -> ApplicationResult<DealRecord> {
        let deal = self.load(id).await?;
        if !deal.is_due_for_expiry(Timestamp::now()) {
            return Ok(deal);
        }
        match self.expire_if_due(id).await? {
            Some(outcome) => Ok(outcome.deal),
            None => self.load(id).await,
        }
    }

    /// Lists deals matching `filter`, newest first, one page at a time.
    ///
    /// Overdue deals in the page are expired before being returned.
    ///
    /// # Errors
    ///
    /// - `ApplicationError::Validation` if the filter is invalid
    /// - an infrastructure error from the store
    pub async fn list_deals(&self, filter: &DealFilter) -> ApplicationResult<Vec<DealRecord>> {
        filter.validate()?;
        let deals = self.deals.list(&filter.to_store_filter(true)).await?;
        let now = Timestamp::now();
        let mut result = Vec::with_capacity(deals.len());
        for deal in deals {
            if deal.is_due_for_expiry(now) {
                result.push(self.get_deal(deal.id()).await?);
            } else {
                result.push(deal);
            }
        }
        Ok(result)
    }

    /// Changes a deal's terms. Status is never touched.
    ///
    /// # Errors
    ///
    /// - `ApplicationError::NotFound` if the deal does not exist
    /// - `DomainError::DealClosed` if the deal is closed or just expired
    /// - `DomainError::Validation` if the new terms break an invariant
    /// - `ApplicationError::Contention` if concurrent writes never settle
    pub async fn update_terms(
        &self,
        id: DealId,
        update: DealTermsUpdate,
    ) -> ApplicationResult<DealRecord> {
        for attempt in 1..=self.max_attempts() {
            let deal = self.load(id).await?;
            let now = Timestamp::now();
            if self.expire_overdue(&deal, now).await? {
                return Err(DomainError::deal_closed(id, DealStatus::Expired).into());
            }

            let mut next = deal;
            next.update_terms(update.clone(), now)?;
            match self.deals.save(&next).await {
                Ok(saved) => {
                    info!(deal_id = %id, version = saved.version(), "deal terms updated");
                    return Ok(saved);
                }
                Err(e) if e.is_version_conflict() => {
                    warn!(deal_id = %id, attempt, "version conflict updating terms, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(ApplicationError::contention(id.to_string(), self.max_attempts()))
    }

    // ========== Transitions ==========

    /// Sends a draft deal to the other party.
    ///
    /// # Errors
    ///
    /// See [`NegotiationService::transition`].
    pub async fn propose(&self, id: DealId, sender: PartyId) -> ApplicationResult<TransitionOutcome> {
        self.transition(id, DealEvent::Propose, sender).await
    }

    /// Puts an offer on the table.
    ///
    /// # Errors
    ///
    /// See [`NegotiationService::transition`].
    pub async fn send_offer(
        &self,
        id: DealId,
        sender: PartyId,
        amount: Decimal,
    ) -> ApplicationResult<TransitionOutcome> {
        self.transition(id, DealEvent::SendOffer { amount }, sender)
            .await
    }

    /// Answers with a counter-offer.
    ///
    /// # Errors
    ///
    /// See [`NegotiationService::transition`].
    pub async fn send_counter_offer(
        &self,
        id: DealId,
        sender: PartyId,
        amount: Decimal,
    ) -> ApplicationResult<TransitionOutcome> {
        self.transition(id, DealEvent::SendCounterOffer { amount }, sender)
            .await
    }

    /// Accepts the deal.
    ///
    /// # Errors
    ///
    /// See [`NegotiationService::transition`].
    pub async fn accept(
        &self,
        id: DealId,
        sender: PartyId,
        amount: Option<Decimal>,
    ) -> ApplicationResult<TransitionOutcome> {
        self.transition(id, DealEvent::Accept { amount }, sender)
            .await
    }

    /// Declines the deal.
    ///
    /// # Errors
    ///
    /// See [`NegotiationService::transition`].
    pub async fn decline(
        &self,
        id: DealId,
        sender: PartyId,
        amount: Option<Decimal>,
    ) -> ApplicationResult<TransitionOutcome> {
        self.transition(id, DealEvent::Decline { amount }, sender)
            .await
    }

    /// Applies `event` on behalf of `sender` and records it.
    ///
    /// `DealEvent::Expire` is only honoured once the deadline has passed and
    /// is recorded by the system actor.
    ///
    /// # Errors
    ///
    /// - `ApplicationError::NotFound` if the deal does not exist
    /// - `DomainError::DealClosed` if the deal is closed, or was overdue and
    ///   has just been expired
    /// - `DomainError::InvalidTransition` if the event is not allowed now
    /// - `DomainError::Validation` if the sender is blank, an amount is not
    ///   positive, or expiry is requested before the deadline
    /// - `ApplicationError::Contention` if concurrent writes never settle
    pub async fn transition(
        &self,
        id: DealId,
        event: DealEvent,
        sender: PartyId,
    ) -> ApplicationResult<TransitionOutcome> {
        self.transition_with(id, event, sender, TransitionOptions::default())
            .await
    }

    /// Like [`NegotiationService::transition`], with recording options.
    ///
    /// # Errors
    ///
    /// See [`NegotiationService::transition`].
    pub async fn transition_with(
        &self,
        id: DealId,
        event: DealEvent,
        sender: PartyId,
        options: TransitionOptions,
    ) -> ApplicationResult<TransitionOutcome> {
        if sender.is_blank() {
            return Err(DomainError::validation("sender is required").into());
        }
        if event == DealEvent::Expire {
            return self.expire_on_request(id).await;
        }
        for attempt in 1..=self.max_attempts() {
            let deal = self.load(id).await?;
            let now = Timestamp::now();
            if self.expire_overdue(&deal, now).await? {
                return Err(DomainError::deal_closed(id, DealStatus::Expired).into());
            }
            if let Some(outcome) = self.try_commit(&deal, &event, &sender, &options, now).await? {
                return Ok(outcome);
            }
            warn!(deal_id = %id, event = event.name(), attempt, "version conflict, retrying");
        }
        Err(ApplicationError::contention(id.to_string(), self.max_attempts()))
    }

    // ========== Expiry ==========

    /// Expires the deal if its deadline has passed.
    ///
    /// Returns `None` if the deal is not due, including when a concurrent
    /// writer closed it first.
    ///
    /// # Errors
    ///
    /// - `ApplicationError::NotFound` if the deal does not exist
    /// - `ApplicationError::Contention` if concurrent writes never settle
    pub async fn expire_if_due(&self, id: DealId) -> ApplicationResult<Option<TransitionOutcome>> {
        for attempt in 1..=self.max_attempts() {
            let deal = self.load(id).await?;
            let now = Timestamp::now();
            if !deal.is_due_for_expiry(now) {
                return Ok(None);
            }
            let actor = self.settings.system_actor.clone();
            if let Some(outcome) = self
                .try_commit(&deal, &DealEvent::Expire, &actor, &TransitionOptions::automated(), now)
                .await?
            {
                return Ok(Some(outcome));
            }
            debug!(deal_id = %id, attempt, "version conflict while expiring, retrying");
        }
        Err(ApplicationError::contention(id.to_string(), self.max_attempts()))
    }

    /// Expiry asked for through [`NegotiationService::transition`]. The
    /// system actor records it, and only once the deadline has passed.
    async fn expire_on_request(&self, id: DealId) -> ApplicationResult<TransitionOutcome> {
        if let Some(outcome) = self.expire_if_due(id).await? {
            return Ok(outcome);
        }
        let deal = self.load(id).await?;
        deal.ensure_open()?;
        Err(DomainError::validation(format!("deal {id} cannot expire before its deadline")).into())
    }

    /// Expires every overdue deal. Returns the ids expired.
    ///
    /// Failures on single deals are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an infrastructure error if the overdue deals cannot be listed.
    pub async fn sweep_expired(&self) -> ApplicationResult<Vec<DealId>> {
        let due = self.deals.find_due_for_expiry(Timestamp::now()).await?;
        let mut expired = Vec::new();
        for deal in due {
            match self.expire_if_due(deal.id()).await {
                Ok(Some(outcome)) => expired.push(outcome.deal.id()),
                Ok(None) => {}
                Err(e) => error!(deal_id = %deal.id(), error = %e, "failed to expire deal"),
            }
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "expired overdue deals");
        }
        Ok(expired)
    }

    /// Runs [`NegotiationService::sweep_expired`] every `interval` until the
    /// handle is aborted.
    #[must_use]
    pub fn spawn_expiry_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = service.sweep_expired().await {
                    warn!(error = %e, "expiry sweep failed");
                }
            }
        })
    }

    // ========== Strategy ==========

    /// Recomputes and stores the deal's strategy.
    ///
    /// Missing artist history counts as no bookings; a missing market
    /// average is passed on as absent.
    ///
    /// # Errors
    ///
    /// - `ApplicationError::NotFound` if the deal does not exist
    /// - `DomainError::DealClosed` if the deal is closed
    /// - `DomainError::InsufficientData` if neither history nor market data is usable
    /// - `DomainError::InvalidStrategy` if the result breaks its bounds
    pub async fn refresh_strategy(
        &self,
        id: DealId,
        region: Option<&str>,
    ) -> ApplicationResult<NegotiationStrategy> {
        let region = region.unwrap_or(&self.settings.default_region);
        for attempt in 1..=self.max_attempts() {
            let deal = self.load(id).await?;
            let now = Timestamp::now();
            if self.expire_overdue(&deal, now).await? {
                return Err(DomainError::deal_closed(id, DealStatus::Expired).into());
            }
            deal.ensure_open()?;

            let metrics = self
                .metrics
                .artist_metrics(&deal.parties().artist_id)
                .await?
                .unwrap_or_else(ArtistMetrics::empty);
            let market = self.metrics.market_data(deal.deal_type(), region).await?;
            let strategy = self
                .calculator
                .calculate(&deal, &metrics, market.as_ref(), now)?;

            let mut next = deal;
            next.set_strategy(strategy.clone(), now)?;
            match self.deals.save(&next).await {
                Ok(_) => {
                    info!(
                        deal_id = %id,
                        approach = %strategy.negotiation_approach,
                        minimum = %strategy.recommended_minimum,
                        target = %strategy.recommended_target,
                        maximum = %strategy.recommended_maximum,
                        "strategy recalculated"
                    );
                    self.notifier
                        .notify(&StrategyCalculated::new(id, &strategy).into());
                    return Ok(strategy);
                }
                Err(e) if e.is_version_conflict() => {
                    warn!(deal_id = %id, attempt, "version conflict storing strategy, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(ApplicationError::contention(id.to_string(), self.max_attempts()))
    }

    /// Returns the deal with a strategy no older than the policy TTL.
    ///
    /// # Errors
    ///
    /// See [`NegotiationService::refresh_strategy`].
    pub async fn ensure_fresh_strategy(&self, id: DealId) -> ApplicationResult<DealRecord> {
        let deal = self.get_deal(id).await?;
        if !self
            .calculator
            .needs_refresh(deal.strategy(), Timestamp::now())
        {
            return Ok(deal);
        }
        self.refresh_strategy(id, None).await?;
        self.load(id).await
    }

    // ========== Messages ==========

    /// Appends a free-text message to a deal.
    ///
    /// Offers, counter-offers, acceptances and rejections only arise from
    /// transitions and are refused here.
    ///
    /// # Errors
    ///
    /// - `ApplicationError::Validation` if the draft is not a text message
    /// - `ApplicationError::NotFound` if the deal does not exist
    /// - `DomainError::Validation` if the draft is invalid
    pub async fn send_text_message(&self, draft: NewDealMessage) -> ApplicationResult<DealMessage> {
        if draft.message_type != MessageType::Text {
            return Err(ApplicationError::validation(format!(
                "{} messages are recorded by transitions",
                draft.message_type
            )));
        }
        self.load(draft.deal_id).await?;
        self.log.append(draft).await
    }

    // ========== Analytics ==========

    /// Summarises every deal matching `filter`, ignoring paging.
    ///
    /// # Errors
    ///
    /// - `ApplicationError::Validation` if the filter is invalid
    /// - an infrastructure error from the store
    pub async fn summarize(&self, filter: &DealFilter) -> ApplicationResult<DealPipelineSummary> {
        filter.validate()?;
        let deals = self.deals.list(&filter.to_store_filter(false)).await?;
        DealPipelineSummary::from_deals(&deals)
    }

    // ========== Internals ==========

    fn max_attempts(&self) -> u32 {
        self.settings.max_cas_retries.max(1)
    }

    async fn load(&self, id: DealId) -> ApplicationResult<DealRecord> {
        self.deals
            .get(id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("deal", id.to_string()))
    }

    /// Expires `deal` if overdue. Returns true if it is now expired.
    ///
    /// A lost race means someone else wrote the deal; the caller reloads.
    async fn expire_overdue(&self, deal: &DealRecord, now: Timestamp) -> ApplicationResult<bool> {
        if !deal.is_due_for_expiry(now) {
            return Ok(false);
        }
        Ok(self.expire_if_due(deal.id()).await?.is_some()
            || self.load(deal.id()).await?.status() == DealStatus::Expired)
    }

    /// Undoes a stored transition whose message could not be appended.
    async fn roll_back(&self, previous: &DealRecord, saved: &DealRecord, cause: &ApplicationError) {
        match self.deals.restore(previous, saved).await {
            Ok(restored) => warn!(
                deal_id = %saved.id(),
                version = restored.version(),
                error = %cause,
                "message append failed, transition rolled back"
            ),
            Err(e) => error!(
                deal_id = %saved.id(),
                version = saved.version(),
                error = %cause,
                rollback_error = %e,
                "message append failed and transition could not be rolled back"
            ),
        }
    }

    /// Applies and stores one event. `None` means the version moved.
    ///
    /// The deal write and its message land together: if the append fails the
    /// deal is restored before the error is returned.
    async fn try_commit(
        &self,
        current: &DealRecord,
        event: &DealEvent,
        actor: &PartyId,
        options: &TransitionOptions,
        now: Timestamp,
    ) -> ApplicationResult<Option<TransitionOutcome>> {
        let mut next = current.clone();
        let change = next.apply(event, now)?;
        let saved = match self.deals.save(&next).await {
            Ok(saved) => saved,
            Err(e) if e.is_version_conflict() => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut draft = NegotiationStateMachine::message_for(&saved, event, actor.clone());
        if options.automated {
            draft = draft.automated();
        }
        let key = options
            .idempotency_key
            .clone()
            .unwrap_or_else(|| format!("{}:v{}", saved.id(), saved.version()));
        let message = match self.log.append(draft.with_idempotency_key(key)).await {
            Ok(message) => message,
            Err(e) => {
                self.roll_back(current, &saved, &e).await;
                return Err(e);
            }
        };

        info!(
            deal_id = %saved.id(),
            from = %change.from,
            to = %change.to,
            event = event.name(),
            actor = %actor,
            automated = options.automated,
            "deal transitioned"
        );
        self.notifier.notify(
            &DealTransitioned::new(
                saved.id(),
                change,
                event.name(),
                actor.clone(),
                options.automated,
                event.amount(),
                message.id(),
                now,
            )
            .into(),
        );
        Ok(Some(TransitionOutcome {
            deal: saved,
            change,
            message,
        }))
    }
}
