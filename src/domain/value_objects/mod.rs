//! # Value Objects
//!
//! Immutable types with validation and domain semantics.
//!
//! ## Identity Types
//!
//! - [`DealId`], [`MessageId`], [`NotificationId`]: UUID-based identifiers
//! - [`PartyId`], [`EventId`]: String-based identifiers
//!
//! ## Money
//!
//! - [`Currency`]: ISO 4217 code, `AUD` by default
//! - [`CheckedArithmetic`]: Trait for safe decimal arithmetic
//! - [`round_fee`]: Rounds to cents
//!
//! ## Domain Enums
//!
//! - [`DealStatus`]: Deal lifecycle states
//! - [`DealType`], [`NegotiationStage`], [`MessageType`], [`PriorityLevel`]
//! - [`NegotiationApproach`], [`ExperienceLevel`], [`MarketPosition`]

pub mod deal_status;
pub mod enums;
pub mod ids;
pub mod money;
pub mod timestamp;

pub use deal_status::DealStatus;
pub use enums::{
    DealType, ExperienceLevel, MarketPosition, MessageType, NegotiationApproach,
    NegotiationStage, ParseEnumError, PriorityLevel,
};
pub use ids::{DealId, EventId, MessageId, NotificationId, PartyId};
pub use money::{
    ArithmeticError, ArithmeticResult, CheckedArithmetic, Currency, InvalidCurrencyError,
    round_fee,
};
pub use timestamp::Timestamp;
