//! Utility modules for rpkg

pub mod logging;

pub use logging::{init_from_env, init_logging, LoggingConfig};
