//! # Strategy Calculator
//!
//! Pure computation of a [`NegotiationStrategy`] from a deal, the artist's
//! booking history and market pricing.
//!
//! # Algorithm
//!
//! 1. Band the artist by booking count ([`ExperienceLevel`]).
//! 2. Pick a base fee: a blend of the artist's average fee and the market
//!    average weighted by experience, or whichever one exists. With neither,
//!    fail with `InsufficientData`.
//! 3. Place the artist against the market ([`MarketPosition`]) by the ratio
//!    of their average fee to the market average.
//! 4. Choose an approach: experienced premium artists push
//!    ([`NegotiationApproach::Aggressive`]), emerging or budget artists
//!    protect the floor ([`NegotiationApproach::Conservative`]), everyone
//!    else is balanced.
//! 5. Scale the base fee by the approach's multipliers, clamp into the deal's
//!    own fee bounds and round to cents.
//! 6. Auto-accept at the recommended maximum, auto-decline at the
//!    recommended minimum, review in between.
//!
//! All policy numbers live in [`StrategyPolicy`].

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::entities::deal::DealRecord;
use crate::domain::entities::negotiation_strategy::{
    ArtistAssessment, ArtistMetrics, AutoResponseThresholds, MarketAssessment, MarketData,
    NegotiationStrategy,
};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::value_objects::enums::{
    ExperienceLevel, MarketPosition, NegotiationApproach,
};
use crate::domain::value_objects::money::{CheckedArithmetic, round_fee};
use crate::domain::value_objects::timestamp::Timestamp;

/// Fee multipliers applied to the base fee for one approach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeMultipliers {
    /// Multiplier for the recommended minimum.
    pub minimum: Decimal,
    /// Multiplier for the recommended target.
    pub target: Decimal,
    /// Multiplier for the recommended maximum.
    pub maximum: Decimal,
}

impl FeeMultipliers {
    /// Creates multipliers from hundredths, e.g. `(80, 100, 125)`.
    #[must_use]
    pub fn from_percent(minimum: i64, target: i64, maximum: i64) -> Self {
        Self {
            minimum: Decimal::new(minimum, 2),
            target: Decimal::new(target, 2),
            maximum: Decimal::new(maximum, 2),
        }
    }

    fn is_ordered(&self) -> bool {
        Decimal::ZERO < self.minimum && self.minimum <= self.target && self.target <= self.maximum
    }
}

/// Tunable numbers behind strategy computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyPolicy {
    /// Bookings needed to count as intermediate.
    pub intermediate_min_bookings: u32,
    /// Bookings needed to count as experienced.
    pub experienced_min_bookings: u32,
    /// Below this fee/market ratio the artist is budget.
    pub budget_ratio: Decimal,
    /// Above this fee/market ratio the artist is premium.
    pub premium_ratio: Decimal,
    /// Weight of the artist's own average for emerging artists.
    pub emerging_history_weight: Decimal,
    /// Weight of the artist's own average for intermediate artists.
    pub intermediate_history_weight: Decimal,
    /// Weight of the artist's own average for experienced artists.
    pub experienced_history_weight: Decimal,
    /// Multipliers for the aggressive approach.
    pub aggressive: FeeMultipliers,
    /// Multipliers for the balanced approach.
    pub balanced: FeeMultipliers,
    /// Multipliers for the conservative approach.
    pub conservative: FeeMultipliers,
    /// Age after which a stored strategy is recomputed.
    pub ttl_secs: u64,
}

impl Default for StrategyPolicy {
    fn default() -> Self {
        Self {
            intermediate_min_bookings: 5,
            experienced_min_bookings: 21,
            budget_ratio: Decimal::new(85, 2),
            premium_ratio: Decimal::new(115, 2),
            emerging_history_weight: Decimal::new(3, 1),
            intermediate_history_weight: Decimal::new(5, 1),
            experienced_history_weight: Decimal::new(7, 1),
            aggressive: FeeMultipliers::from_percent(90, 110, 135),
            balanced: FeeMultipliers::from_percent(80, 100, 125),
            conservative: FeeMultipliers::from_percent(70, 95, 110),
            ttl_secs: 24 * 60 * 60,
        }
    }
}

impl StrategyPolicy {
    /// Checks that bands and multipliers are consistent.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` describing the first bad value.
    pub fn validate(&self) -> DomainResult<()> {
        if self.intermediate_min_bookings == 0
            || self.experienced_min_bookings <= self.intermediate_min_bookings
        {
            return Err(DomainError::validation(
                "experience bands must satisfy 0 < intermediate < experienced",
            ));
        }
        if !(Decimal::ZERO < self.budget_ratio && self.budget_ratio < self.premium_ratio) {
            return Err(DomainError::validation(
                "market ratios must satisfy 0 < budget < premium",
            ));
        }
        for weight in [
            self.emerging_history_weight,
            self.intermediate_history_weight,
            self.experienced_history_weight,
        ] {
            if !(Decimal::ZERO..=Decimal::ONE).contains(&weight) {
                return Err(DomainError::validation(format!(
                    "history weight {weight} outside [0, 1]"
                )));
            }
        }
        for (name, multipliers) in [
            ("aggressive", &self.aggressive),
            ("balanced", &self.balanced),
            ("conservative", &self.conservative),
        ] {
            if !multipliers.is_ordered() {
                return Err(DomainError::validation(format!(
                    "{name} multipliers must satisfy 0 < minimum <= target <= maximum"
                )));
            }
        }
        if self.ttl_secs == 0 {
            return Err(DomainError::validation("strategy ttl must be positive"));
        }
        Ok(())
    }

    /// Returns the staleness TTL.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Bands an artist by booking count.
    #[must_use]
    pub fn experience_level(&self, total_bookings: u32) -> ExperienceLevel {
        if total_bookings >= self.experienced_min_bookings {
            ExperienceLevel::Experienced
        } else if total_bookings >= self.intermediate_min_bookings {
            ExperienceLevel::Intermediate
        } else {
            ExperienceLevel::Emerging
        }
    }

    /// Places an artist fee against the market average.
    ///
    /// # Errors
    ///
    /// Returns an arithmetic error if `market_average` is zero.
    pub fn market_position(
        &self,
        artist_fee: Decimal,
        market_average: Decimal,
    ) -> DomainResult<MarketPosition> {
        let ratio = artist_fee.safe_div(market_average)?;
        Ok(if ratio < self.budget_ratio {
            MarketPosition::Budget
        } else if ratio > self.premium_ratio {
            MarketPosition::Premium
        } else {
            MarketPosition::MarketRate
        })
    }

    /// Chooses a posture from experience and market position.
    #[must_use]
    pub fn approach(
        &self,
        experience: ExperienceLevel,
        position: MarketPosition,
    ) -> NegotiationApproach {
        match (experience, position) {
            (ExperienceLevel::Experienced, MarketPosition::Premium) => NegotiationApproach::Aggressive,
            (ExperienceLevel::Emerging, _) | (_, MarketPosition::Budget) => {
                NegotiationApproach::Conservative
            }
            _ => NegotiationApproach::Balanced,
        }
    }

    fn history_weight(&self, experience: ExperienceLevel) -> Decimal {
        match experience {
            ExperienceLevel::Emerging => self.emerging_history_weight,
            ExperienceLevel::Intermediate => self.intermediate_history_weight,
            ExperienceLevel::Experienced => self.experienced_history_weight,
        }
    }

    fn multipliers(&self, approach: NegotiationApproach) -> &FeeMultipliers {
        match approach {
            NegotiationApproach::Aggressive => &self.aggressive,
            NegotiationApproach::Balanced => &self.balanced,
            NegotiationApproach::Conservative => &self.conservative,
        }
    }
}

/// Computes negotiation strategies under a [`StrategyPolicy`].
///
/// Stateless apart from the policy, so it can be shared freely across tasks.
///
/// # Examples
///
/// ```
/// use dealdesk::domain::entities::deal::{DealParties, DealRecord, NewDeal};
/// use dealdesk::domain::entities::negotiation_strategy::{ArtistMetrics, MarketData};
/// use dealdesk::domain::services::strategy_calculator::StrategyCalculator;
/// use dealdesk::domain::value_objects::{DealType, NegotiationApproach, Timestamp};
/// use rust_decimal::Decimal;
///
/// let deal = DealRecord::create(
///     NewDeal::new(
///         DealType::Booking,
///         "Club night",
///         DealParties::new("agency-1", "artist-1", "promoter-1", "event-1"),
///         Decimal::new(800, 0),
///     ),
///     Timestamp::now(),
/// )
/// .unwrap();
///
/// let calculator = StrategyCalculator::default();
/// let strategy = calculator
///     .calculate(
///         &deal,
///         &ArtistMetrics::new(10, Decimal::new(800, 0), Decimal::new(1200, 0)),
///         Some(&MarketData::new(Decimal::new(800, 0))),
///         Timestamp::now(),
///     )
///     .unwrap();
///
/// assert_eq!(strategy.negotiation_approach, NegotiationApproach::Balanced);
/// assert_eq!(strategy.recommended_target, Decimal::new(800, 0));
/// ```
#[derive(Debug, Clone, Default)]
pub struct StrategyCalculator {
    policy: StrategyPolicy,
}

impl StrategyCalculator {
    /// Creates a calculator with the given policy.
    #[must_use]
    pub fn new(policy: StrategyPolicy) -> Self {
        Self { policy }
    }

    /// Returns the policy.
    #[inline]
    #[must_use]
    pub fn policy(&self) -> &StrategyPolicy {
        &self.policy
    }

    /// Returns true if `strategy` is missing or older than the policy TTL.
    #[must_use]
    pub fn needs_refresh(&self, strategy: Option<&NegotiationStrategy>, now: Timestamp) -> bool {
        strategy.is_none_or(|s| s.is_stale(now, self.policy.ttl()))
    }

    /// Computes a strategy for `deal`.
    ///
    /// The result depends only on the arguments; `now` becomes
    /// `calculated_at`.
    ///
    /// # Errors
    ///
    /// - `DomainError::InsufficientData` if the artist has no usable history
    ///   and no market average is available
    /// - `DomainError::InvalidStrategy` if the result breaks its bounds
    /// - `DomainError::Arithmetic` on decimal overflow
    pub fn calculate(
        &self,
        deal: &DealRecord,
        metrics: &ArtistMetrics,
        market: Option<&MarketData>,
        now: Timestamp,
    ) -> DomainResult<NegotiationStrategy> {
        let experience = self.policy.experience_level(metrics.total_bookings);
        let artist_fee = metrics.reference_fee();
        let market_average = market.and_then(MarketData::reference_fee);

        let base = match (artist_fee, market_average) {
            (Some(own), Some(market)) => {
                let weight = self.policy.history_weight(experience);
                own.safe_mul(weight)?
                    .safe_add(market.safe_mul(Decimal::ONE.safe_sub(weight)?)?)?
            }
            (Some(own), None) => own,
            (None, Some(market)) => market,
            (None, None) => {
                return Err(DomainError::insufficient_data(format!(
                    "artist {} has {} bookings and no market average is available",
                    deal.parties().artist_id,
                    metrics.total_bookings
                )));
            }
        };

        let position = match (artist_fee, market_average) {
            (Some(own), Some(market)) => self.policy.market_position(own, market)?,
            _ => MarketPosition::MarketRate,
        };
        let approach = self.policy.approach(experience, position);
        let multipliers = self.policy.multipliers(approach);

        let (minimum, target, maximum) = clamp_to_deal(
            deal,
            round_fee(base.safe_mul(multipliers.minimum)?),
            round_fee(base.safe_mul(multipliers.target)?),
            round_fee(base.safe_mul(multipliers.maximum)?),
        );

        let strategy = NegotiationStrategy {
            recommended_minimum: minimum,
            recommended_target: target,
            recommended_maximum: maximum,
            negotiation_approach: approach,
            artist_metrics: ArtistAssessment::new(metrics, experience),
            market_data: MarketAssessment {
                market_average,
                market_position: position,
            },
            auto_response_thresholds: AutoResponseThresholds::new(maximum, minimum),
            calculated_at: now,
        };
        strategy.validate()?;
        Ok(strategy)
    }
}

/// Pulls the recommended range inside the deal's own fee bounds.
fn clamp_to_deal(
    deal: &DealRecord,
    minimum: Decimal,
    target: Decimal,
    maximum: Decimal,
) -> (Decimal, Decimal, Decimal) {
    let floor = deal.financials().minimum_fee;
    let ceiling = deal.financials().maximum_fee;
    let clamp = |value: Decimal| {
        let value = floor.map_or(value, |f| value.max(f));
        ceiling.map_or(value, |c| value.min(c))
    };
    let (minimum, maximum) = (clamp(minimum), clamp(maximum));
    (minimum, clamp(target).clamp(minimum, maximum), maximum)
}
