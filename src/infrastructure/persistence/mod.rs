//! # Persistence Layer
//!
//! The row-level [`DataStore`] port, its adapters, and the typed
//! repositories the application layer uses.
//!
//! ## Port
//!
//! - [`DataStore`]: get, query, insert and version-guarded update of rows
//!
//! ## Implementations
//!
//! - `in_memory`: In-memory store for tests and the simulator
//! - `postgres`: PostgreSQL with JSONB row bodies
//! - `rest`: PostgREST-style HTTP backend
//! - `retrying`: Backoff decorator for transient failures
//!
//! ## Repositories
//!
//! - [`DealRepository`]: Deal records with compare-and-swap saves
//! - [`DealMessageRepository`]: Append-only message log

pub mod in_memory;
pub mod postgres;
pub mod repositories;
pub mod rest;
pub mod retrying;
pub mod traits;

pub use repositories::{DealMessageRepository, DealRepository};
pub use retrying::{RetryPolicy, RetryingDataStore};
pub use traits::{
    DataStore, Filter, FilterValue, RepositoryError, RepositoryResult, Row, SortOrder, Table,
};
