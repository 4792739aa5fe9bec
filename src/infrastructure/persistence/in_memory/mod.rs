//! # In-Memory Persistence
//!
//! In-memory [`DataStore`](crate::infrastructure::persistence::traits::DataStore)
//! for testing without a database.
//!
//! ## Thread Safety
//!
//! The store keeps its tables behind one `Arc<RwLock<HashMap>>`.

pub mod data_store;

pub use data_store::InMemoryDataStore;
