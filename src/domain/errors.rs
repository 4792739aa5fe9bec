//! # Domain Errors
//!
//! Business rule violations raised by deals, strategies and the state machine.
//!
//! # Error Taxonomy
//!
//! ```text
//! DomainError
//! ├── InvalidStrategy          - threshold math violated
//! ├── InsufficientData         - strategy requested with no usable metrics
//! ├── DealClosed               - event applied to a terminal deal
//! ├── AutomationNotApplicable  - automation invoked when disabled or closed
//! ├── Validation               - fee bounds, missing offer amount, bad input
//! ├── InvalidTransition        - event not allowed from the current status
//! └── Arithmetic               - overflow or division by zero in fee math
//! ```
//!
//! None of these are retryable; they describe the request, not the
//! environment.

use thiserror::Error;

use crate::domain::value_objects::deal_status::DealStatus;
use crate::domain::value_objects::ids::DealId;
use crate::domain::value_objects::money::ArithmeticError;

/// Domain layer error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// A computed or supplied strategy breaks its own bounds.
    #[error("invalid strategy: {0}")]
    InvalidStrategy(String),

    /// Not enough metrics to compute a strategy.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// The deal is in a terminal state.
    #[error("deal {deal_id} is closed ({status})")]
    DealClosed {
        /// The deal.
        deal_id: DealId,
        /// Its terminal status.
        status: DealStatus,
    },

    /// Automated responses cannot run for this deal.
    #[error("automation not applicable to deal {deal_id}: {reason}")]
    AutomationNotApplicable {
        /// The deal.
        deal_id: DealId,
        /// Why automation was refused.
        reason: String,
    },

    /// Input or invariant validation failed.
    #[error("validation error: {0}")]
    Validation(String),

    /// The event is not allowed from the current status.
    #[error("invalid transition: cannot {event} a deal in status {from}")]
    InvalidTransition {
        /// Current status.
        from: DealStatus,
        /// Event name.
        event: &'static str,
    },

    /// Fee arithmetic failed.
    #[error("arithmetic error: {0}")]
    Arithmetic(#[from] ArithmeticError),
}

impl DomainError {
    /// Creates an invalid strategy error.
    #[must_use]
    pub fn invalid_strategy(message: impl Into<String>) -> Self {
        Self::InvalidStrategy(message.into())
    }

    /// Creates an insufficient data error.
    #[must_use]
    pub fn insufficient_data(message: impl Into<String>) -> Self {
        Self::InsufficientData(message.into())
    }

    /// Creates a deal closed error.
    #[must_use]
    pub fn deal_closed(deal_id: DealId, status: DealStatus) -> Self {
        Self::DealClosed { deal_id, status }
    }

    /// Creates an automation not applicable error.
    #[must_use]
    pub fn automation_not_applicable(deal_id: DealId, reason: impl Into<String>) -> Self {
        Self::AutomationNotApplicable {
            deal_id,
            reason: reason.into(),
        }
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Returns true if the deal was closed.
    #[must_use]
    pub fn is_deal_closed(&self) -> bool {
        matches!(self, Self::DealClosed { .. })
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if automation was refused.
    #[must_use]
    pub fn is_automation_not_applicable(&self) -> bool {
        matches!(self, Self::AutomationNotApplicable { .. })
    }

    /// Returns true if strategy data was insufficient.
    #[must_use]
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, Self::InsufficientData(_))
    }

    /// Returns true if a strategy violated its bounds.
    #[must_use]
    pub fn is_invalid_strategy(&self) -> bool {
        matches!(self, Self::InvalidStrategy(_))
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deal_closed_mentions_status() {
        let id = DealId::new_v4();
        let err = DomainError::deal_closed(id, DealStatus::Accepted);
        assert!(err.is_deal_closed());
        assert!(err.to_string().contains("accepted"));
        assert!(err.to_string().contains(&id.to_string()));
    }

    #[test]
    fn invalid_transition_display() {
        let err = DomainError::InvalidTransition {
            from: DealStatus::Draft,
            event: "accept",
        };
        assert_eq!(
            err.to_string(),
            "invalid transition: cannot accept a deal in status draft"
        );
    }

    #[test]
    fn arithmetic_converts() {
        let err: DomainError = ArithmeticError::DivisionByZero.into();
        assert!(err.to_string().contains("division by zero"));
    }

    #[test]
    fn predicates() {
        assert!(DomainError::validation("x").is_validation());
        assert!(DomainError::insufficient_data("x").is_insufficient_data());
        assert!(DomainError::invalid_strategy("x").is_invalid_strategy());
        assert!(
            DomainError::automation_not_applicable(DealId::new_v4(), "disabled")
                .is_automation_not_applicable()
        );
    }
}
