//! # Infrastructure Layer
//!
//! Adapters for the outside world.
//!
//! - [`persistence`]: Data store port, backends and typed repositories

pub mod persistence;
