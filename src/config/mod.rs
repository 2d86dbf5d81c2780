//! Configuration module for the HLS offline cache.
//!
//! This module handles:
//! - Loading configuration from TOML files
//! - CLI argument parsing and merging
//! - Configuration validation

pub mod loader;
pub mod validation;

pub use loader::{CacheConfig, Config, DownloadConfig, NetworkConfig, RetryConfig};
pub use validation::validate_config;
