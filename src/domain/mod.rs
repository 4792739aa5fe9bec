//! # Domain Layer
//!
//! Deals, messages and strategies, with the rules that govern them. Nothing
//! in this layer performs I/O.

pub mod entities;
pub mod errors;
pub mod events;
pub mod services;
pub mod value_objects;
