//! # Deal Aggregate
//!
//! One negotiation between an agency/artist and a promoter over an event.
//!
//! [`DealRecord`] is the aggregate root. It owns the status, the fee terms,
//! automation settings and the last computed [`NegotiationStrategy`]. Status
//! only changes through [`DealRecord::apply`], which defers to the
//! [`NegotiationStateMachine`]; [`DealTermsUpdate`] has no status field.
//!
//! # Invariants
//!
//! - `minimum_fee <= proposed_fee <= maximum_fee` whenever the bounds are set
//! - `auto_decline_threshold <= auto_accept_threshold` when both are set
//! - `accepted_at`, `declined_at` and `expired_at` are written once
//! - terminal deals accept no term updates, strategies or events
//!
//! # Examples
//!
//! ```
//! use dealdesk::domain::entities::deal::{DealParties, DealRecord, NewDeal};
//! use dealdesk::domain::services::state_machine::DealEvent;
//! use dealdesk::domain::value_objects::{DealStatus, DealType, Timestamp};
//! use rust_decimal::Decimal;
//!
//! let parties = DealParties::new("agency-1", "artist-1", "promoter-1", "event-1");
//! let new_deal = NewDeal::new(DealType::Booking, "Friday headline", parties, Decimal::new(800, 0));
//!
//! let mut deal = DealRecord::create(new_deal, Timestamp::now()).unwrap();
//! assert_eq!(deal.status(), DealStatus::Draft);
//!
//! deal.apply(&DealEvent::Propose, Timestamp::now()).unwrap();
//! assert_eq!(deal.status(), DealStatus::Proposed);
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::entities::negotiation_strategy::NegotiationStrategy;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::services::state_machine::{DealEvent, NegotiationStateMachine, StatusChange};
use crate::domain::value_objects::deal_status::DealStatus;
use crate::domain::value_objects::enums::{DealType, NegotiationStage, PriorityLevel};
use crate::domain::value_objects::ids::{DealId, EventId, PartyId};
use crate::domain::value_objects::money::Currency;
use crate::domain::value_objects::timestamp::Timestamp;

/// Participants of a deal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealParties {
    /// Agency representing the artist.
    pub agency_id: PartyId,
    /// Artist being booked.
    pub artist_id: PartyId,
    /// Promoter buying the spot.
    pub promoter_id: PartyId,
    /// Artist manager, if any.
    #[serde(default)]
    pub manager_id: Option<PartyId>,
    /// Event the spot is for.
    pub event_id: EventId,
}

impl DealParties {
    /// Creates the party set without a manager.
    #[must_use]
    pub fn new(
        agency_id: impl Into<PartyId>,
        artist_id: impl Into<PartyId>,
        promoter_id: impl Into<PartyId>,
        event_id: impl Into<EventId>,
    ) -> Self {
        Self {
            agency_id: agency_id.into(),
            artist_id: artist_id.into(),
            promoter_id: promoter_id.into(),
            manager_id: None,
            event_id: event_id.into(),
        }
    }

    /// Sets the manager.
    #[must_use]
    pub fn with_manager(mut self, manager_id: impl Into<PartyId>) -> Self {
        self.manager_id = Some(manager_id.into());
        self
    }

    /// Returns true if `party` takes part in the deal.
    #[must_use]
    pub fn includes(&self, party: &PartyId) -> bool {
        &self.agency_id == party
            || &self.artist_id == party
            || &self.promoter_id == party
            || self.manager_id.as_ref() == Some(party)
    }

    fn validate(&self) -> DomainResult<()> {
        let required = [
            ("agency_id", self.agency_id.is_blank()),
            ("artist_id", self.artist_id.is_blank()),
            ("promoter_id", self.promoter_id.is_blank()),
            ("event_id", self.event_id.is_blank()),
        ];
        if let Some((field, _)) = required.iter().find(|(_, blank)| *blank) {
            return Err(DomainError::validation(format!("{field} is required")));
        }
        Ok(())
    }
}

/// Fee terms of a deal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealFinancials {
    /// Fee currently proposed.
    pub proposed_fee: Decimal,
    /// Lowest acceptable fee.
    #[serde(default)]
    pub minimum_fee: Option<Decimal>,
    /// Highest expected fee.
    #[serde(default)]
    pub maximum_fee: Option<Decimal>,
    /// Fee currency.
    #[serde(default)]
    pub currency: Currency,
    /// Agency commission as a fraction in `[0, 1]`.
    #[serde(default)]
    pub commission_rate: Option<Decimal>,
}

impl DealFinancials {
    /// Creates terms with only a proposed fee, in the default currency.
    #[must_use]
    pub fn new(proposed_fee: Decimal) -> Self {
        Self {
            proposed_fee,
            minimum_fee: None,
            maximum_fee: None,
            currency: Currency::default(),
            commission_rate: None,
        }
    }

    /// Checks sign and ordering of the fees and the commission range.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` on the first violated rule.
    pub fn validate(&self) -> DomainResult<()> {
        let fees = [
            ("proposed_fee", Some(self.proposed_fee)),
            ("minimum_fee", self.minimum_fee),
            ("maximum_fee", self.maximum_fee),
        ];
        for (field, fee) in fees {
            if let Some(fee) = fee
                && fee < Decimal::ZERO
            {
                return Err(DomainError::validation(format!(
                    "{field} must not be negative, got {fee}"
                )));
            }
        }
        if let Some(min) = self.minimum_fee
            && min > self.proposed_fee
        {
            return Err(DomainError::validation(format!(
                "minimum fee {min} exceeds proposed fee {}",
                self.proposed_fee
            )));
        }
        if let Some(max) = self.maximum_fee
            && self.proposed_fee > max
        {
            return Err(DomainError::validation(format!(
                "proposed fee {} exceeds maximum fee {max}",
                self.proposed_fee
            )));
        }
        if let Some(rate) = self.commission_rate
            && !(Decimal::ZERO..=Decimal::ONE).contains(&rate)
        {
            return Err(DomainError::validation(format!(
                "commission rate {rate} outside [0, 1]"
            )));
        }
        Ok(())
    }
}

/// Input for creating a deal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDeal {
    /// Kind of deal.
    pub deal_type: DealType,
    /// Short title.
    pub title: String,
    /// Longer description.
    pub description: Option<String>,
    /// Participants.
    pub parties: DealParties,
    /// Fee terms.
    pub financials: DealFinancials,
    /// Consult the automation engine on incoming offers.
    pub automated_responses: bool,
    /// Override for the strategy's auto-accept threshold.
    pub auto_accept_threshold: Option<Decimal>,
    /// Override for the strategy's auto-decline threshold.
    pub auto_decline_threshold: Option<Decimal>,
    /// Deal expires once this passes.
    pub deadline: Option<Timestamp>,
    /// When the performance takes place.
    pub performance_date: Option<Timestamp>,
    /// Length of the spot.
    pub performance_duration_minutes: Option<u32>,
    /// Urgency.
    pub priority_level: PriorityLevel,
    /// Free-form labels.
    pub tags: Vec<String>,
}

impl NewDeal {
    /// Creates the minimal input for a deal.
    #[must_use]
    pub fn new(
        deal_type: DealType,
        title: impl Into<String>,
        parties: DealParties,
        proposed_fee: Decimal,
    ) -> Self {
        Self {
            deal_type,
            title: title.into(),
            description: None,
            parties,
            financials: DealFinancials::new(proposed_fee),
            automated_responses: false,
            auto_accept_threshold: None,
            auto_decline_threshold: None,
            deadline: None,
            performance_date: None,
            performance_duration_minutes: None,
            priority_level: PriorityLevel::default(),
            tags: Vec::new(),
        }
    }

    /// Sets the acceptable fee range.
    #[must_use]
    pub fn with_fee_range(mut self, minimum: Decimal, maximum: Decimal) -> Self {
        self.financials.minimum_fee = Some(minimum);
        self.financials.maximum_fee = Some(maximum);
        self
    }

    /// Sets the currency.
    #[must_use]
    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.financials.currency = currency;
        self
    }

    /// Sets the commission rate.
    #[must_use]
    pub fn with_commission_rate(mut self, rate: Decimal) -> Self {
        self.financials.commission_rate = Some(rate);
        self
    }

    /// Turns on automated responses, optionally overriding thresholds.
    #[must_use]
    pub fn with_automation(mut self, accept_above: Option<Decimal>, decline_below: Option<Decimal>) -> Self {
        self.automated_responses = true;
        self.auto_accept_threshold = accept_above;
        self.auto_decline_threshold = decline_below;
        self
    }

    /// Sets the deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Timestamp) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the performance date and length.
    #[must_use]
    pub fn with_performance(mut self, date: Timestamp, duration_minutes: Option<u32>) -> Self {
        self.performance_date = Some(date);
        self.performance_duration_minutes = duration_minutes;
        self
    }

    /// Sets the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: PriorityLevel) -> Self {
        self.priority_level = priority;
        self
    }

    /// Sets the tags.
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Changes to a deal's terms. Status is not part of it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealTermsUpdate {
    /// New title.
    pub title: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New proposed fee.
    pub proposed_fee: Option<Decimal>,
    /// New minimum fee.
    pub minimum_fee: Option<Decimal>,
    /// New maximum fee.
    pub maximum_fee: Option<Decimal>,
    /// New currency.
    pub currency: Option<Currency>,
    /// New commission rate.
    pub commission_rate: Option<Decimal>,
    /// Toggle automated responses.
    pub automated_responses: Option<bool>,
    /// New auto-accept override.
    pub auto_accept_threshold: Option<Decimal>,
    /// New auto-decline override.
    pub auto_decline_threshold: Option<Decimal>,
    /// New stage.
    pub negotiation_stage: Option<NegotiationStage>,
    /// New deadline.
    pub deadline: Option<Timestamp>,
    /// New performance date.
    pub performance_date: Option<Timestamp>,
    /// New spot length.
    pub performance_duration_minutes: Option<u32>,
    /// New priority.
    pub priority_level: Option<PriorityLevel>,
    /// Replacement tags.
    pub tags: Option<Vec<String>>,
}

impl DealTermsUpdate {
    /// Returns true if nothing would change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Deal negotiation aggregate root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealRecord {
    id: DealId,
    deal_type: DealType,
    status: DealStatus,
    #[serde(default)]
    negotiation_stage: NegotiationStage,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(flatten)]
    parties: DealParties,
    #[serde(flatten)]
    financials: DealFinancials,
    #[serde(default)]
    automated_responses: bool,
    #[serde(default)]
    auto_accept_threshold: Option<Decimal>,
    #[serde(default)]
    auto_decline_threshold: Option<Decimal>,
    #[serde(default)]
    deadline: Option<Timestamp>,
    #[serde(default)]
    strategy: Option<NegotiationStrategy>,
    #[serde(default)]
    performance_date: Option<Timestamp>,
    #[serde(default)]
    performance_duration_minutes: Option<u32>,
    #[serde(default)]
    priority_level: PriorityLevel,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    response_count: u32,
    #[serde(default)]
    revision_count: u32,
    #[serde(default)]
    last_offer_amount: Option<Decimal>,
    #[serde(default)]
    agreed_fee: Option<Decimal>,
    created_at: Timestamp,
    updated_at: Timestamp,
    #[serde(default)]
    accepted_at: Option<Timestamp>,
    #[serde(default)]
    declined_at: Option<Timestamp>,
    #[serde(default)]
    expired_at: Option<Timestamp>,
    #[serde(default)]
    version: u64,
}

impl DealRecord {
    /// Creates a draft deal.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the title or a party is blank, the
    /// fee terms are inconsistent, or the threshold overrides are inverted.
    pub fn create(new: NewDeal, now: Timestamp) -> DomainResult<Self> {
        let deal = Self {
            id: DealId::new_v4(),
            deal_type: new.deal_type,
            status: DealStatus::Draft,
            negotiation_stage: NegotiationStage::Initial,
            title: new.title.trim().to_string(),
            description: new.description,
            parties: new.parties,
            financials: new.financials,
            automated_responses: new.automated_responses,
            auto_accept_threshold: new.auto_accept_threshold,
            auto_decline_threshold: new.auto_decline_threshold,
            deadline: new.deadline,
            strategy: None,
            performance_date: new.performance_date,
            performance_duration_minutes: new.performance_duration_minutes,
            priority_level: new.priority_level,
            tags: new.tags,
            response_count: 0,
            revision_count: 0,
            last_offer_amount: None,
            agreed_fee: None,
            created_at: now,
            updated_at: now,
            accepted_at: None,
            declined_at: None,
            expired_at: None,
            version: 0,
        };
        deal.validate()?;
        Ok(deal)
    }

    /// Checks every invariant of the record.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` on the first violated rule.
    pub fn validate(&self) -> DomainResult<()> {
        if self.title.trim().is_empty() {
            return Err(DomainError::validation("title is required"));
        }
        self.parties.validate()?;
        self.financials.validate()?;
        for (field, threshold) in [
            ("auto_accept_threshold", self.auto_accept_threshold),
            ("auto_decline_threshold", self.auto_decline_threshold),
        ] {
            if let Some(value) = threshold
                && value < Decimal::ZERO
            {
                return Err(DomainError::validation(format!(
                    "{field} must not be negative, got {value}"
                )));
            }
        }
        if let (Some(accept), Some(decline)) =
            (self.auto_accept_threshold, self.auto_decline_threshold)
            && decline > accept
        {
            return Err(DomainError::validation(format!(
                "auto-decline threshold {decline} exceeds auto-accept threshold {accept}"
            )));
        }
        Ok(())
    }

    /// Applies an event through the state machine.
    ///
    /// Offers record the latest amount and bump the response count;
    /// counter-offers also bump the revision count. Acceptance fixes the
    /// agreed fee: the accepted amount, else the last offer, else the
    /// proposed fee.
    ///
    /// # Errors
    ///
    /// - `DomainError::DealClosed` if the deal is terminal
    /// - `DomainError::InvalidTransition` if the event is not allowed now
    /// - `DomainError::Validation` if the event carries a non-positive amount,
    ///   or is an expiry before the deadline has passed
    pub fn apply(&mut self, event: &DealEvent, now: Timestamp) -> DomainResult<StatusChange> {
        let from = self.status;
        let to = NegotiationStateMachine::next_status(self.id, from, event)?;

        if matches!(event, DealEvent::Expire) && !self.is_due_for_expiry(now) {
            return Err(DomainError::validation(format!(
                "deal {} cannot expire before its deadline",
                self.id
            )));
        }

        if let Some(amount) = event.amount()
            && amount <= Decimal::ZERO
        {
            return Err(DomainError::validation(format!(
                "{} amount must be positive, got {amount}",
                event.name()
            )));
        }

        match *event {
            DealEvent::Propose => {}
            DealEvent::SendOffer { amount } => {
                self.last_offer_amount = Some(amount);
                self.response_count = self.response_count.saturating_add(1);
            }
            DealEvent::SendCounterOffer { amount } => {
                self.last_offer_amount = Some(amount);
                self.response_count = self.response_count.saturating_add(1);
                self.revision_count = self.revision_count.saturating_add(1);
            }
            DealEvent::Accept { amount } => {
                self.agreed_fee = Some(
                    amount
                        .or(self.last_offer_amount)
                        .unwrap_or(self.financials.proposed_fee),
                );
                self.accepted_at.get_or_insert(now);
                self.response_count = self.response_count.saturating_add(1);
            }
            DealEvent::Decline { .. } => {
                self.declined_at.get_or_insert(now);
                self.response_count = self.response_count.saturating_add(1);
            }
            DealEvent::Expire => {
                self.expired_at.get_or_insert(now);
            }
        }

        self.status = to;
        self.updated_at = now;
        Ok(StatusChange { from, to })
    }

    /// Applies a terms update.
    ///
    /// # Errors
    ///
    /// - `DomainError::DealClosed` if the deal is terminal
    /// - `DomainError::Validation` if the result breaks an invariant; the
    ///   record is left unchanged
    pub fn update_terms(&mut self, update: DealTermsUpdate, now: Timestamp) -> DomainResult<()> {
        self.ensure_open()?;

        let mut next = self.clone();
        if let Some(title) = update.title {
            next.title = title.trim().to_string();
        }
        if let Some(description) = update.description {
            next.description = Some(description);
        }
        if let Some(fee) = update.proposed_fee {
            next.financials.proposed_fee = fee;
        }
        if let Some(fee) = update.minimum_fee {
            next.financials.minimum_fee = Some(fee);
        }
        if let Some(fee) = update.maximum_fee {
            next.financials.maximum_fee = Some(fee);
        }
        if let Some(currency) = update.currency {
            next.financials.currency = currency;
        }
        if let Some(rate) = update.commission_rate {
            next.financials.commission_rate = Some(rate);
        }
        if let Some(enabled) = update.automated_responses {
            next.automated_responses = enabled;
        }
        if let Some(threshold) = update.auto_accept_threshold {
            next.auto_accept_threshold = Some(threshold);
        }
        if let Some(threshold) = update.auto_decline_threshold {
            next.auto_decline_threshold = Some(threshold);
        }
        if let Some(stage) = update.negotiation_stage {
            next.negotiation_stage = stage;
        }
        if let Some(deadline) = update.deadline {
            next.deadline = Some(deadline);
        }
        if let Some(date) = update.performance_date {
            next.performance_date = Some(date);
        }
        if let Some(minutes) = update.performance_duration_minutes {
            next.performance_duration_minutes = Some(minutes);
        }
        if let Some(priority) = update.priority_level {
            next.priority_level = priority;
        }
        if let Some(tags) = update.tags {
            next.tags = tags;
        }
        next.validate()?;
        next.updated_at = now;

        *self = next;
        Ok(())
    }

    /// Stores a freshly computed strategy.
    ///
    /// # Errors
    ///
    /// - `DomainError::DealClosed` if the deal is terminal
    /// - `DomainError::InvalidStrategy` if the strategy breaks its bounds
    pub fn set_strategy(&mut self, strategy: NegotiationStrategy, now: Timestamp) -> DomainResult<()> {
        self.ensure_open()?;
        strategy.validate()?;
        self.strategy = Some(strategy);
        self.updated_at = now;
        Ok(())
    }

    /// Fails with `DealClosed` if the deal is terminal.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::DealClosed` for accepted, declined or expired deals.
    pub fn ensure_open(&self) -> DomainResult<()> {
        if self.status.is_terminal() {
            return Err(DomainError::deal_closed(self.id, self.status));
        }
        Ok(())
    }

    /// Returns true if the deadline has passed and the deal is still open.
    #[must_use]
    pub fn is_due_for_expiry(&self, now: Timestamp) -> bool {
        self.status.is_active() && self.deadline.is_some_and(|deadline| deadline.has_passed_at(now))
    }

    /// Returns the optimistic-concurrency version.
    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Advances the version before a write and returns the expected one.
    pub(crate) fn bump_version(&mut self) -> u64 {
        let expected = self.version;
        self.version = expected.saturating_add(1);
        expected
    }

    /// Returns a copy carrying `version`.
    pub(crate) fn rebased_on(&self, version: u64) -> Self {
        Self {
            version,
            ..self.clone()
        }
    }

    // ========== Accessors ==========

    /// Returns the deal ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> DealId {
        self.id
    }

    /// Returns the deal type.
    #[inline]
    #[must_use]
    pub fn deal_type(&self) -> DealType {
        self.deal_type
    }

    /// Returns the status.
    #[inline]
    #[must_use]
    pub fn status(&self) -> DealStatus {
        self.status
    }

    /// Returns the negotiation stage.
    #[inline]
    #[must_use]
    pub fn negotiation_stage(&self) -> NegotiationStage {
        self.negotiation_stage
    }

    /// Returns the title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the participants.
    #[inline]
    #[must_use]
    pub fn parties(&self) -> &DealParties {
        &self.parties
    }

    /// Returns the fee terms.
    #[inline]
    #[must_use]
    pub fn financials(&self) -> &DealFinancials {
        &self.financials
    }

    /// Returns true if automated responses are enabled.
    #[inline]
    #[must_use]
    pub fn automated_responses(&self) -> bool {
        self.automated_responses
    }

    /// Returns the auto-accept override.
    #[inline]
    #[must_use]
    pub fn auto_accept_threshold(&self) -> Option<Decimal> {
        self.auto_accept_threshold
    }

    /// Returns the auto-decline override.
    #[inline]
    #[must_use]
    pub fn auto_decline_threshold(&self) -> Option<Decimal> {
        self.auto_decline_threshold
    }

    /// Returns the deadline.
    #[inline]
    #[must_use]
    pub fn deadline(&self) -> Option<Timestamp> {
        self.deadline
    }

    /// Returns the last computed strategy.
    #[inline]
    #[must_use]
    pub fn strategy(&self) -> Option<&NegotiationStrategy> {
        self.strategy.as_ref()
    }

    /// Returns the performance date.
    #[inline]
    #[must_use]
    pub fn performance_date(&self) -> Option<Timestamp> {
        self.performance_date
    }

    /// Returns the spot length.
    #[inline]
    #[must_use]
    pub fn performance_duration_minutes(&self) -> Option<u32> {
        self.performance_duration_minutes
    }

    /// Returns the priority.
    #[inline]
    #[must_use]
    pub fn priority_level(&self) -> PriorityLevel {
        self.priority_level
    }

    /// Returns the tags.
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Returns how many offers, counters and responses were recorded.
    #[inline]
    #[must_use]
    pub fn response_count(&self) -> u32 {
        self.response_count
    }

    /// Returns how many counter-offers were recorded.
    #[inline]
    #[must_use]
    pub fn revision_count(&self) -> u32 {
        self.revision_count
    }

    /// Returns the latest offered amount.
    #[inline]
    #[must_use]
    pub fn last_offer_amount(&self) -> Option<Decimal> {
        self.last_offer_amount
    }

    /// Returns the agreed fee of an accepted deal.
    #[inline]
    #[must_use]
    pub fn agreed_fee(&self) -> Option<Decimal> {
        self.agreed_fee
    }

    /// Returns the creation time.
    #[inline]
    #[must_use]
    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Returns the last update time.
    #[inline]
    #[must_use]
    pub fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    /// Returns when the deal was accepted.
    #[inline]
    #[must_use]
    pub fn accepted_at(&self) -> Option<Timestamp> {
        self.accepted_at
    }

    /// Returns when the deal was declined.
    #[inline]
    #[must_use]
    pub fn declined_at(&self) -> Option<Timestamp> {
        self.declined_at
    }

    /// Returns when the deal expired.
    #[inline]
    #[must_use]
    pub fn expired_at(&self) -> Option<Timestamp> {
        self.expired_at
    }
}

impl fmt::Display for DealRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Deal[{}] {} \"{}\" status={} fee={} {} v{}",
            self.id,
            self.deal_type,
            self.title,
            self.status,
            self.financials.proposed_fee,
            self.financials.currency,
            self.version
        )
    }
}
