//! # Negotiation Strategy
//!
//! Recommended fee range and auto-response thresholds for a deal.
//!
//! A [`NegotiationStrategy`] is a derived snapshot: the last one computed is
//! stored on the deal and overwritten on recalculation. It carries the inputs
//! it was computed from ([`ArtistAssessment`], [`MarketAssessment`]) so a
//! reviewer can see why a range was recommended.
//!
//! # Invariants
//!
//! - `recommended_minimum <= recommended_target <= recommended_maximum`
//! - `auto_accept_above >= recommended_target`
//! - `auto_decline_below <= recommended_minimum`
//! - the review band is exactly `[auto_decline_below, auto_accept_above]`

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::value_objects::enums::{
    ExperienceLevel, MarketPosition, NegotiationApproach,
};
use crate::domain::value_objects::timestamp::Timestamp;

/// Booking history of an artist, as reported by a metrics provider.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArtistMetrics {
    /// Number of completed bookings.
    pub total_bookings: u32,
    /// Average fee across those bookings.
    pub average_fee: Decimal,
    /// Highest fee ever paid.
    pub highest_fee: Decimal,
}

impl ArtistMetrics {
    /// Creates a metrics record.
    #[must_use]
    pub fn new(total_bookings: u32, average_fee: Decimal, highest_fee: Decimal) -> Self {
        Self {
            total_bookings,
            average_fee,
            highest_fee,
        }
    }

    /// Metrics for an artist with no booking history.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns the average fee if the history is usable for pricing.
    #[must_use]
    pub fn reference_fee(&self) -> Option<Decimal> {
        (self.total_bookings > 0 && self.average_fee > Decimal::ZERO).then_some(self.average_fee)
    }
}

/// Market pricing for a kind of event in a region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketData {
    /// Average fee paid in the market.
    pub market_average: Decimal,
}

impl MarketData {
    /// Creates market data.
    #[must_use]
    pub fn new(market_average: Decimal) -> Self {
        Self { market_average }
    }

    /// Returns the market average if it is usable for pricing.
    #[must_use]
    pub fn reference_fee(&self) -> Option<Decimal> {
        (self.market_average > Decimal::ZERO).then_some(self.market_average)
    }
}

/// Artist metrics together with the experience band they fall in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistAssessment {
    /// Number of completed bookings.
    pub total_bookings: u32,
    /// Average fee across those bookings.
    pub average_fee: Decimal,
    /// Highest fee ever paid.
    pub highest_fee: Decimal,
    /// Experience band.
    pub experience_level: ExperienceLevel,
}

impl ArtistAssessment {
    /// Attaches an experience band to raw metrics.
    #[must_use]
    pub fn new(metrics: &ArtistMetrics, experience_level: ExperienceLevel) -> Self {
        Self {
            total_bookings: metrics.total_bookings,
            average_fee: metrics.average_fee,
            highest_fee: metrics.highest_fee,
            experience_level,
        }
    }
}

/// Market average together with the artist's position against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketAssessment {
    /// Market average, if one was available.
    pub market_average: Option<Decimal>,
    /// Artist position relative to the market.
    pub market_position: MarketPosition,
}

/// Thresholds driving the automated response engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoResponseThresholds {
    /// Offers at or above this are accepted automatically.
    pub auto_accept_above: Decimal,
    /// Offers at or below this are declined automatically.
    pub auto_decline_below: Decimal,
    /// Offers strictly inside this band go to manual review.
    pub requires_review_between: (Decimal, Decimal),
}

impl AutoResponseThresholds {
    /// Builds thresholds whose review band spans the gap between them.
    #[must_use]
    pub fn new(auto_accept_above: Decimal, auto_decline_below: Decimal) -> Self {
        Self {
            auto_accept_above,
            auto_decline_below,
            requires_review_between: (auto_decline_below, auto_accept_above),
        }
    }
}

/// Recommended range, approach and thresholds for negotiating a deal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationStrategy {
    /// Lowest fee worth agreeing to.
    pub recommended_minimum: Decimal,
    /// Fee to aim for.
    pub recommended_target: Decimal,
    /// Highest fee worth asking for.
    pub recommended_maximum: Decimal,
    /// Recommended posture.
    pub negotiation_approach: NegotiationApproach,
    /// Artist inputs.
    pub artist_metrics: ArtistAssessment,
    /// Market inputs.
    pub market_data: MarketAssessment,
    /// Automation thresholds.
    pub auto_response_thresholds: AutoResponseThresholds,
    /// When this snapshot was computed.
    pub calculated_at: Timestamp,
}

impl NegotiationStrategy {
    /// Checks the range and threshold invariants.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidStrategy` describing the first violated bound.
    pub fn validate(&self) -> DomainResult<()> {
        let min = self.recommended_minimum;
        let target = self.recommended_target;
        let max = self.recommended_maximum;
        let thresholds = &self.auto_response_thresholds;

        if min < Decimal::ZERO {
            return Err(DomainError::invalid_strategy(format!(
                "recommended minimum {min} is negative"
            )));
        }
        if !(min <= target && target <= max) {
            return Err(DomainError::invalid_strategy(format!(
                "recommended target {target} outside [{min}, {max}]"
            )));
        }
        if thresholds.auto_accept_above < target {
            return Err(DomainError::invalid_strategy(format!(
                "auto-accept threshold {} below target {target}",
                thresholds.auto_accept_above
            )));
        }
        if thresholds.auto_decline_below > min {
            return Err(DomainError::invalid_strategy(format!(
                "auto-decline threshold {} above minimum {min}",
                thresholds.auto_decline_below
            )));
        }
        if thresholds.requires_review_between
            != (thresholds.auto_decline_below, thresholds.auto_accept_above)
        {
            return Err(DomainError::invalid_strategy(
                "review band does not span the decline and accept thresholds",
            ));
        }
        Ok(())
    }

    /// Returns true if the snapshot is older than `ttl` at `now`.
    #[must_use]
    pub fn is_stale(&self, now: Timestamp, ttl: Duration) -> bool {
        self.calculated_at.elapsed_until(now) > ttl
    }
}

impl fmt::Display for NegotiationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Strategy[{}] {}..{}..{} accept>={} decline<={}",
            self.negotiation_approach,
            self.recommended_minimum,
            self.recommended_target,
            self.recommended_maximum,
            self.auto_response_thresholds.auto_accept_above,
            self.auto_response_thresholds.auto_decline_below
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;

    /// A strategy of 500 / 800 / 1200 with thresholds 1200 / 500.
    pub(crate) fn sample_strategy(calculated_at: Timestamp) -> NegotiationStrategy {
        NegotiationStrategy {
            recommended_minimum: Decimal::new(500, 0),
            recommended_target: Decimal::new(800, 0),
            recommended_maximum: Decimal::new(1200, 0),
            negotiation_approach: NegotiationApproach::Balanced,
            artist_metrics: ArtistAssessment::new(
                &ArtistMetrics::new(12, Decimal::new(800, 0), Decimal::new(1500, 0)),
                ExperienceLevel::Intermediate,
            ),
            market_data: MarketAssessment {
                market_average: Some(Decimal::new(800, 0)),
                market_position: MarketPosition::MarketRate,
            },
            auto_response_thresholds: AutoResponseThresholds::new(
                Decimal::new(1200, 0),
                Decimal::new(500, 0),
            ),
            calculated_at,
        }
    }

    #[test]
    fn sample_is_valid() {
        assert!(sample_strategy(Timestamp::now()).validate().is_ok());
    }

    #[test]
    fn target_outside_range_rejected() {
        let mut strategy = sample_strategy(Timestamp::now());
        strategy.recommended_target = Decimal::new(1300, 0);
        assert!(strategy.validate().unwrap_err().is_invalid_strategy());
    }

    #[test]
    fn accept_below_target_rejected() {
        let mut strategy = sample_strategy(Timestamp::now());
        strategy.auto_response_thresholds = AutoResponseThresholds::new(
            Decimal::new(700, 0),
            Decimal::new(500, 0),
        );
        assert!(strategy.validate().is_err());
    }

    #[test]
    fn decline_above_minimum_rejected() {
        let mut strategy = sample_strategy(Timestamp::now());
        strategy.auto_response_thresholds = AutoResponseThresholds::new(
            Decimal::new(1200, 0),
            Decimal::new(600, 0),
        );
        assert!(strategy.validate().is_err());
    }

    #[test]
    fn staleness_uses_ttl() {
        let calculated = Timestamp::from_secs(1_000).unwrap();
        let strategy = sample_strategy(calculated);
        let ttl = Duration::from_secs(60);
        assert!(!strategy.is_stale(calculated.add_secs(60), ttl));
        assert!(strategy.is_stale(calculated.add_secs(61), ttl));
    }

    #[test]
    fn reference_fees_ignore_empty_inputs() {
        assert_eq!(ArtistMetrics::empty().reference_fee(), None);
        assert_eq!(MarketData::new(Decimal::ZERO).reference_fee(), None);
        assert_eq!(
            MarketData::new(Decimal::ONE).reference_fee(),
            Some(Decimal::ONE)
        );
    }

    #[test]
    fn review_band_serializes_as_pair() {
        let thresholds = AutoResponseThresholds::new(Decimal::new(10, 0), Decimal::new(5, 0));
        let json = serde_json::to_value(&thresholds).unwrap();
        assert!(json["requires_review_between"].is_array());
    }
}
