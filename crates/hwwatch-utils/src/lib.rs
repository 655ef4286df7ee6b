//! # hwwatch Utilities
//!
//! Shared utilities and logging for hwwatch.
//!
//! This crate provides the logging bootstrap used by the hwwatch binary, built
//! on `tracing`.

pub mod logging;

// Re-export commonly used logging functions for convenience
pub use logging::{init_logging, init_logging_with, LogFormat, LogGuard, LogLevel, LogSettings, LoggingError};
pub use tracing::{debug, error, info, trace, warn};
