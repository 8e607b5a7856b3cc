//! Domain layer for testplane
//!
//! Objects, errors and the ports the engine depends on.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
