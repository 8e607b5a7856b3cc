//! In-memory adapters.

pub mod store;

pub use store::InMemoryObjectStore;
