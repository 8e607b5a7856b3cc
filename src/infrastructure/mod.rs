//! Infrastructure layer module
//!
//! - Configuration management
//! - Logging infrastructure
//! - YAML manifests for the CLI

pub mod config;
pub mod logging;
pub mod manifest;
