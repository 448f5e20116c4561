//! ngxconf Core Library
//!
//! Shared error taxonomy and settings used by the ngxconf parser and CLI.

pub mod config;
pub mod error;

pub use config::{ParseOptions, Settings, SettingsLoader, Style};
pub use error::{Error, ErrorKind, Errors, Result, Severity};

/// ngxconf version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
