//! # Domain Enums
//!
//! Enumerations shared across deals, messages and strategies.
//!
//! - [`DealType`] - What kind of arrangement is being negotiated
//! - [`NegotiationStage`] - Informational progress marker, independent of status
//! - [`PriorityLevel`] - Agency-assigned urgency
//! - [`MessageType`] - Kind of entry in a deal's message log
//! - [`NegotiationApproach`] - Posture recommended by a strategy
//! - [`ExperienceLevel`] - Artist seniority band
//! - [`MarketPosition`] - Artist fee relative to the market
//!
//! All enums use the snake_case wire names of the hosted backend for both
//! serde and `Display`, and parse case-insensitively with `FromStr`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when parsing an enum from a string fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseEnumError {
    /// The string is not a known variant.
    #[error("invalid {0} value: '{1}'")]
    InvalidValue(&'static str, String),
}

fn normalize(s: &str) -> String {
    s.trim().to_ascii_lowercase().replace(['-', ' '], "_")
}

/// Kind of deal being negotiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealType {
    /// A single booking for a spot at an event.
    #[default]
    Booking,
    /// Ongoing management arrangement.
    Management,
    /// Agency representation.
    Representation,
    /// Brand endorsement.
    Endorsement,
    /// Joint production or collaboration.
    Collaboration,
}

impl DealType {
    /// All variants, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::Booking,
        Self::Management,
        Self::Representation,
        Self::Endorsement,
        Self::Collaboration,
    ];

    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Booking => "booking",
            Self::Management => "management",
            Self::Representation => "representation",
            Self::Endorsement => "endorsement",
            Self::Collaboration => "collaboration",
        }
    }
}

impl fmt::Display for DealType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DealType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize(s);
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == normalized)
            .ok_or_else(|| ParseEnumError::InvalidValue("DealType", s.to_string()))
    }
}

/// Progress marker for a negotiation.
///
/// The stage is informational: it never drives [`DealStatus`] changes.
///
/// [`DealStatus`]: crate::domain::value_objects::DealStatus
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationStage {
    /// Nothing discussed yet.
    #[default]
    Initial,
    /// Discussing non-financial terms.
    TermsDiscussion,
    /// Haggling over the fee.
    FinancialNegotiation,
    /// Reviewing the final terms.
    FinalReview,
    /// Contract being drafted.
    ContractPreparation,
}

impl NegotiationStage {
    /// All variants, in progression order.
    pub const ALL: [Self; 5] = [
        Self::Initial,
        Self::TermsDiscussion,
        Self::FinancialNegotiation,
        Self::FinalReview,
        Self::ContractPreparation,
    ];

    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::TermsDiscussion => "terms_discussion",
            Self::FinancialNegotiation => "financial_negotiation",
            Self::FinalReview => "final_review",
            Self::ContractPreparation => "contract_preparation",
        }
    }
}

impl fmt::Display for NegotiationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NegotiationStage {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize(s);
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == normalized)
            .ok_or_else(|| ParseEnumError::InvalidValue("NegotiationStage", s.to_string()))
    }
}

/// Urgency flag set by the agency on a deal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PriorityLevel {
    /// Can wait.
    Low,
    /// Normal handling.
    #[default]
    Medium,
    /// Needs attention soon.
    High,
    /// Needs attention now.
    Urgent,
}

impl PriorityLevel {
    /// All variants, lowest first.
    pub const ALL: [Self; 4] = [Self::Low, Self::Medium, Self::High, Self::Urgent];

    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl fmt::Display for PriorityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriorityLevel {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize(s);
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == normalized)
            .ok_or_else(|| ParseEnumError::InvalidValue("PriorityLevel", s.to_string()))
    }
}

/// Kind of message in a deal's log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Free text.
    Text,
    /// An offer carrying an amount.
    Offer,
    /// A counter-offer carrying an amount.
    CounterOffer,
    /// Acceptance of the current terms.
    Acceptance,
    /// Rejection of the deal.
    Rejection,
}

impl MessageType {
    /// All variants.
    pub const ALL: [Self; 5] = [
        Self::Text,
        Self::Offer,
        Self::CounterOffer,
        Self::Acceptance,
        Self::Rejection,
    ];

    /// Returns true if messages of this type must carry an offer amount.
    #[inline]
    #[must_use]
    pub const fn requires_amount(&self) -> bool {
        matches!(self, Self::Offer | Self::CounterOffer)
    }

    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Offer => "offer",
            Self::CounterOffer => "counter_offer",
            Self::Acceptance => "acceptance",
            Self::Rejection => "rejection",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize(s);
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == normalized)
            .ok_or_else(|| ParseEnumError::InvalidValue("MessageType", s.to_string()))
    }
}

/// Negotiating posture recommended by a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationApproach {
    /// Push for the top of the range.
    Aggressive,
    /// Protect the floor, settle early.
    Conservative,
    /// Aim for the middle of the range.
    Balanced,
}

impl NegotiationApproach {
    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Aggressive => "aggressive",
            Self::Conservative => "conservative",
            Self::Balanced => "balanced",
        }
    }
}

impl fmt::Display for NegotiationApproach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Seniority band derived from an artist's booking count.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceLevel {
    /// Few bookings.
    Emerging,
    /// Established working act.
    Intermediate,
    /// Headliner-level history.
    Experienced,
}

impl ExperienceLevel {
    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Emerging => "emerging",
            Self::Intermediate => "intermediate",
            Self::Experienced => "experienced",
        }
    }
}

impl fmt::Display for ExperienceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an artist's fee sits relative to the market average.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MarketPosition {
    /// Noticeably below the market average.
    Budget,
    /// Around the market average.
    MarketRate,
    /// Noticeably above the market average.
    Premium,
}

impl MarketPosition {
    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Budget => "budget",
            Self::MarketRate => "market_rate",
            Self::Premium => "premium",
        }
    }
}

impl fmt::Display for MarketPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
