//! Application layer: drives the reconcilers.

pub mod controller_manager;

pub use controller_manager::{ControllerManager, Settlement};
