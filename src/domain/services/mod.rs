//! # Domain Services
//!
//! Pure business logic that doesn't naturally belong to a single entity.
//!
//! ## Services
//!
//! - [`state_machine::NegotiationStateMachine`]: Deal status transitions
//! - [`strategy_calculator::StrategyCalculator`]: Fee range and thresholds

pub mod state_machine;
pub mod strategy_calculator;

pub use state_machine::{DealEvent, NegotiationStateMachine, StatusChange};
pub use strategy_calculator::{FeeMultipliers, StrategyCalculator, StrategyPolicy};
