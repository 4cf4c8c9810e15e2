//! Directory configuration.
//!
//! Limits and timing knobs for the directory engine. Configuration is loaded
//! from environment variables with defaults suitable for local development.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::retry::RetryPolicy;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid configuration value.
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue {
        /// Configuration key.
        key: String,
        /// Error message.
        message: String,
    },
}

/// Directory engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Largest subtree (node included) a move or reattaching delete may rewrite.
    pub max_subtree_size: usize,

    /// How long a structural change waits for its prefix lock, in milliseconds.
    pub lock_timeout_ms: u64,

    /// Attempts for a structural change hitting concurrent modifications.
    pub max_retries: u32,

    /// First backoff delay between attempts, in milliseconds.
    pub retry_base_delay_ms: u64,

    /// Page size used when a caller asks for zero rows.
    pub default_page_size: usize,

    /// Upper bound on any page or search limit.
    pub max_page_size: usize,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            max_subtree_size: 10_000,
            lock_timeout_ms: 2_000,
            max_retries: 3,
            retry_base_delay_ms: 25,
            default_page_size: 25,
            max_page_size: 100,
        }
    }
}

impl DirectoryConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `ORG_DIRECTORY_MAX_SUBTREE_SIZE`: Largest movable subtree (default: 10000)
    /// - `ORG_DIRECTORY_LOCK_TIMEOUT_MS`: Prefix lock wait (default: 2000)
    /// - `ORG_DIRECTORY_MAX_RETRIES`: Attempts on concurrent modification (default: 3)
    /// - `ORG_DIRECTORY_RETRY_BASE_DELAY_MS`: First backoff delay (default: 25)
    /// - `ORG_DIRECTORY_DEFAULT_PAGE_SIZE`: Default page size (default: 25)
    /// - `ORG_DIRECTORY_MAX_PAGE_SIZE`: Maximum page size (default: 100)
    ///
    /// A configuration that fails [`validate`](Self::validate) is replaced by
    /// the defaults.
    pub fn from_env() -> Self {
        let default = Self::default();

        let config = Self {
            max_subtree_size: env_or("ORG_DIRECTORY_MAX_SUBTREE_SIZE", default.max_subtree_size),
            lock_timeout_ms: env_or("ORG_DIRECTORY_LOCK_TIMEOUT_MS", default.lock_timeout_ms),
            max_retries: env_or("ORG_DIRECTORY_MAX_RETRIES", default.max_retries),
            retry_base_delay_ms: env_or(
                "ORG_DIRECTORY_RETRY_BASE_DELAY_MS",
                default.retry_base_delay_ms,
            ),
            default_page_size: env_or("ORG_DIRECTORY_DEFAULT_PAGE_SIZE", default.default_page_size),
            max_page_size: env_or("ORG_DIRECTORY_MAX_PAGE_SIZE", default.max_page_size),
        };

        match config.validate() {
            Ok(()) => config,
            Err(err) => {
                tracing::warn!(error = %err, "Ignoring directory configuration from environment");
                default
            }
        }
    }

    /// Get the lock wait as a Duration.
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Backoff policy for structural changes.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.retry_base_delay_ms),
        )
    }

    /// Clamp a requested page size into `1..=max_page_size`.
    pub fn page_size(&self, requested: usize) -> usize {
        let size = if requested == 0 {
            self.default_page_size.min(self.max_page_size)
        } else {
            requested.min(self.max_page_size)
        };
        size.max(1)
    }

    /// Reject limits that would make the directory unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("ORG_DIRECTORY_MAX_SUBTREE_SIZE", self.max_subtree_size == 0),
            ("ORG_DIRECTORY_MAX_RETRIES", self.max_retries == 0),
            ("ORG_DIRECTORY_DEFAULT_PAGE_SIZE", self.default_page_size == 0),
            ("ORG_DIRECTORY_MAX_PAGE_SIZE", self.max_page_size == 0),
        ];
        for (key, is_zero) in checks {
            if is_zero {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DirectoryConfig::default();
        assert_eq!(config.max_subtree_size, 10_000);
        assert_eq!(config.lock_timeout(), Duration::from_secs(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_page_size_clamping() {
        let config = DirectoryConfig::default();
        assert_eq!(config.page_size(0), 25);
        assert_eq!(config.page_size(10), 10);
        assert_eq!(config.page_size(1_000), 100);
    }

    #[test]
    fn test_page_size_never_zero() {
        let config = DirectoryConfig {
            default_page_size: 0,
            max_page_size: 0,
            ..DirectoryConfig::default()
        };
        assert_eq!(config.page_size(0), 1);
        assert_eq!(config.page_size(50), 1);
    }

    #[test]
    fn test_from_env_falls_back_on_zero_limit() {
        std::env::set_var("ORG_DIRECTORY_MAX_PAGE_SIZE", "0");
        let config = DirectoryConfig::from_env();
        std::env::remove_var("ORG_DIRECTORY_MAX_PAGE_SIZE");

        assert_eq!(config.max_page_size, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let config = DirectoryConfig {
            max_subtree_size: 0,
            ..DirectoryConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { key, .. }) if key == "ORG_DIRECTORY_MAX_SUBTREE_SIZE"
        ));
    }
}
