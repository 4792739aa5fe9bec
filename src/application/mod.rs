//! # Application Layer
//!
//! Use cases over the domain: negotiation, automated responses and the
//! message log, wired to the data store, the market metrics source and the
//! notification sinks.

pub mod error;
pub mod services;

pub use error::{ApplicationError, ApplicationResult, InfrastructureError};
