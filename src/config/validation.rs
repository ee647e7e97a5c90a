//! Configuration validation logic

use thiserror::Error;
use url::Url;

use super::VoiceConfig;

/// Errors produced by configuration validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid provider URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("cache directory must not be empty")]
    EmptyCacheDir,

    #[error("HTTP pool size must be greater than zero")]
    ZeroPoolSize,

    #[error("circuit breaker failure threshold must be greater than zero")]
    ZeroFailureThreshold,
}

pub(super) fn validate(config: &VoiceConfig) -> Result<(), ConfigError> {
    if config.cache_dir.as_os_str().is_empty() {
        return Err(ConfigError::EmptyCacheDir);
    }

    if config.http.pool_size == 0 {
        return Err(ConfigError::ZeroPoolSize);
    }

    if let Some(coqui) = &config.coqui {
        Url::parse(&coqui.api_url).map_err(|e| ConfigError::InvalidUrl {
            url: coqui.api_url.clone(),
            reason: e.to_string(),
        })?;

        if coqui.breaker.failure_threshold == 0 {
            return Err(ConfigError::ZeroFailureThreshold);
        }
    }

    Ok(())
}
