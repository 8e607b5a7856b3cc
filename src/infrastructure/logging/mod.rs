//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber. Console output
//! goes to stderr so command output on stdout stays machine readable; an
//! optional log directory receives daily-rolled JSON files.

pub mod config;
pub mod logger;

pub use config::{LogConfig, LogFormat};
pub use logger::LoggerImpl;
