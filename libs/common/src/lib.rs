//! `VoltageEMS` basic library (basic library)
//!
//! Provides basic functions shared by the rule test crates, including:
//! - Redis client with connection pooling
//! - logging initialisation
//! - layered configuration loading

#[cfg(feature = "redis")]
pub mod redis;

pub mod config_loader;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
pub use logging::{init_logging, LoggingConfig};
