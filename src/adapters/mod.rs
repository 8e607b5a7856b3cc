//! Adapters: the in-memory object store and the built-in strategies.

pub mod memory;
pub mod strategies;
