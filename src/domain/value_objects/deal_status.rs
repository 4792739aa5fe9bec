//! # Deal Status
//!
//! Lifecycle state of a deal negotiation.
//!
//! # State Machine
//!
//! ```text
//! Draft → Proposed → Negotiating ⇄ CounterOffered
//!            ↓            ↓               ↓
//!            ├────────────┴───────────────┴→ Accepted
//!            ├────────────┴───────────────┴→ Declined
//!            └────────────┴───────────────┴→ Expired
//! ```
//!
//! `Draft` may only move to `Proposed`, `Declined` or `Expired`.
//!
//! # Examples
//!
//! ```
//! use dealdesk::domain::value_objects::deal_status::DealStatus;
//!
//! let status = DealStatus::Proposed;
//! assert!(status.can_transition_to(DealStatus::CounterOffered));
//! assert!(!status.can_transition_to(DealStatus::Draft));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::enums::ParseEnumError;

/// Deal lifecycle state.
///
/// # Terminal States
///
/// - [`Accepted`](DealStatus::Accepted) - both parties agreed on terms
/// - [`Declined`](DealStatus::Declined) - one party walked away
/// - [`Expired`](DealStatus::Expired) - the deadline passed without resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum DealStatus {
    /// Being prepared, not yet visible to the promoter.
    #[default]
    Draft = 0,

    /// Sent to the other party.
    Proposed = 1,

    /// An offer is on the table.
    Negotiating = 2,

    /// A counter-offer is on the table.
    CounterOffered = 3,

    /// Terms agreed (terminal).
    Accepted = 4,

    /// Deal rejected (terminal).
    Declined = 5,

    /// Deadline passed (terminal).
    Expired = 6,
}

impl DealStatus {
    /// All statuses in lifecycle order.
    pub const ALL: [Self; 7] = [
        Self::Draft,
        Self::Proposed,
        Self::Negotiating,
        Self::CounterOffered,
        Self::Accepted,
        Self::Declined,
        Self::Expired,
    ];

    /// Returns true if this is a terminal state.
    ///
    /// Terminal states reject every further event.
    ///
    /// # Examples
    ///
    /// ```
    /// use dealdesk::domain::value_objects::deal_status::DealStatus;
    ///
    /// assert!(!DealStatus::Negotiating.is_terminal());
    /// assert!(DealStatus::Accepted.is_terminal());
    /// assert!(DealStatus::Declined.is_terminal());
    /// assert!(DealStatus::Expired.is_terminal());
    /// ```
    #[inline]
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Accepted | Self::Declined | Self::Expired)
    }

    /// Returns true if this is an active (non-terminal) state.
    #[inline]
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if an offer or counter-offer is awaiting a response.
    #[inline]
    #[must_use]
    pub const fn is_in_negotiation(&self) -> bool {
        matches!(self, Self::Negotiating | Self::CounterOffered)
    }

    /// Returns true if this state can transition to the target state.
    ///
    /// Self-loops are allowed for `Negotiating` and `CounterOffered`, since a
    /// new offer can follow an offer.
    #[must_use]
    pub const fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            // From Draft
            (Self::Draft, Self::Proposed)
                | (Self::Draft, Self::Declined)
                | (Self::Draft, Self::Expired)
                // From Proposed
                | (Self::Proposed, Self::Negotiating)
                | (Self::Proposed, Self::CounterOffered)
                | (Self::Proposed, Self::Accepted)
                | (Self::Proposed, Self::Declined)
                | (Self::Proposed, Self::Expired)
                // From Negotiating / CounterOffered
                | (Self::Negotiating | Self::CounterOffered, Self::Negotiating)
                | (Self::Negotiating | Self::CounterOffered, Self::CounterOffered)
                | (Self::Negotiating | Self::CounterOffered, Self::Accepted)
                | (Self::Negotiating | Self::CounterOffered, Self::Declined)
                | (Self::Negotiating | Self::CounterOffered, Self::Expired)
        )
    }

    /// Returns the valid next states from this state.
    #[must_use]
    pub fn valid_transitions(&self) -> Vec<Self> {
        Self::ALL
            .into_iter()
            .filter(|target| self.can_transition_to(*target))
            .collect()
    }

    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Proposed => "proposed",
            Self::Negotiating => "negotiating",
            Self::CounterOffered => "counter_offered",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
            Self::Expired => "expired",
        }
    }

    /// Returns the numeric value of this state.
    #[inline]
    #[must_use]
    pub const fn as_u8(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for DealStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DealStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == normalized)
            .ok_or_else(|| ParseEnumError::InvalidValue("DealStatus", s.to_string()))
    }
}
