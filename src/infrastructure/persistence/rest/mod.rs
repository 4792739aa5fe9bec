//! # REST Persistence
//!
//! HTTP implementation of the data store port.

pub mod data_store;

pub use data_store::RestDataStore;
