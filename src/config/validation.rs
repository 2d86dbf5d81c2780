//! Configuration validation logic.

use crate::config::loader::Config;
use crate::error::{Error, Result};

/// Maximum segment fetches in flight per download.
const MAX_SEGMENT_CONCURRENCY: usize = 32;

/// Minimum length for user agent.
const MIN_USER_AGENT_LENGTH: usize = 3;

/// Validate the entire configuration.
pub fn validate_config(config: &Config) -> Result<()> {
    if config.download.rendition.is_none() {
        return Err(Error::MissingConfig(
            "download.rendition (lowest | highest | max-bandwidth:<bps> | index:<n>)".to_string(),
        ));
    }
    if config.download.retry.max_retries.is_none() {
        return Err(Error::MissingConfig("download.retry.max_retries".to_string()));
    }

    validate_user_agent(&config.network.user_agent)?;
    validate_timeout(config.network.request_timeout_secs)?;
    validate_concurrency(config.download.segment_concurrency)?;
    validate_backoff(
        config.download.retry.base_delay_ms,
        config.download.retry.max_delay_ms,
    )?;

    Ok(())
}

/// Validate the user agent string.
pub fn validate_user_agent(user_agent: &str) -> Result<()> {
    if user_agent.trim().is_empty() {
        return Err(Error::MissingConfig("network.user_agent".to_string()));
    }

    if user_agent.len() < MIN_USER_AGENT_LENGTH {
        return Err(Error::ConfigValidation {
            field: "network.user_agent".to_string(),
            message: format!(
                "User agent must be at least {} characters (got {})",
                MIN_USER_AGENT_LENGTH,
                user_agent.len()
            ),
        });
    }

    Ok(())
}

/// Validate the per-request timeout.
pub fn validate_timeout(seconds: u64) -> Result<()> {
    if seconds == 0 {
        return Err(Error::ConfigValidation {
            field: "network.request_timeout_secs".to_string(),
            message: "Request timeout must be at least 1 second".to_string(),
        });
    }

    Ok(())
}

/// Validate the segment concurrency.
pub fn validate_concurrency(concurrency: usize) -> Result<()> {
    if concurrency == 0 || concurrency > MAX_SEGMENT_CONCURRENCY {
        return Err(Error::ConfigValidation {
            field: "download.segment_concurrency".to_string(),
            message: format!(
                "Segment concurrency must be between 1 and {} (got {})",
                MAX_SEGMENT_CONCURRENCY, concurrency
            ),
        });
    }

    Ok(())
}

/// Validate the retry backoff bounds.
pub fn validate_backoff(base_delay_ms: u64, max_delay_ms: u64) -> Result<()> {
    if base_delay_ms > max_delay_ms {
        return Err(Error::ConfigValidation {
            field: "download.retry.base_delay_ms".to_string(),
            message: format!(
                "Base delay ({} ms) exceeds max delay ({} ms)",
                base_delay_ms, max_delay_ms
            ),
        });
    }

    Ok(())
}
