//! Configuration loading.
//!
//! Hierarchical configuration using figment: built-in defaults, then
//! `.testplane/config.yaml`, `.testplane/local.yaml`, and finally
//! `TESTPLANE_*` environment variables.

pub mod loader;

pub use loader::{ConfigError, ConfigLoader};
