//! Configuration module for the speech engine
//!
//! Configuration is loaded from environment variables and validated before
//! use. A provider is only configured when its credentials (or endpoint) are
//! present, so an unset key simply leaves that tier out of the cascade.
//!
//! # Modules
//! - `env`: environment variable loading
//! - `validation`: configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use kasya::config::VoiceConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = VoiceConfig::from_env()?;
//! println!("cache dir: {:?}", config.cache_dir);
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

mod env;
mod validation;

pub use validation::ConfigError;

use crate::core::tts::{CoquiConfig, ElevenLabsConfig, GoogleConfig};

/// Settings for the shared outbound HTTP pool.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub pool_size: usize,
    pub connect_timeout: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            pool_size: 4,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Configuration for the speech engine
///
/// Contains everything needed to build the provider cascade:
/// - Cache root directory (each provider gets a namespace below it)
/// - Per-provider settings, present only when that provider is configured
/// - Shared HTTP pool settings
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    pub cache_dir: PathBuf,
    pub coqui: Option<CoquiConfig>,
    pub elevenlabs: Option<ElevenLabsConfig>,
    pub google: Option<GoogleConfig>,
    pub http: HttpSettings,
}

impl VoiceConfig {
    /// Load and validate configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = env::load();
        validation::validate(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env as std_env;

    fn clear_vars() {
        for key in [
            "COQUI_API_URL",
            "ELEVENLABS_API_KEY",
            "ELEVENLABS_VOICE_ID",
            "GOOGLE_TTS_API_KEY",
            "TTS_CACHE_DIR",
            "TTS_TEMP_DIR",
            "TTS_HTTP_POOL_SIZE",
        ] {
            std_env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_without_vendor_keys() {
        clear_vars();
        let config = VoiceConfig::from_env().unwrap();

        // The self-hosted tier has a default endpoint; paid vendors need keys
        assert!(config.coqui.is_some());
        assert!(config.elevenlabs.is_none());
        assert!(config.google.is_none());
        assert_eq!(config.cache_dir, PathBuf::from("cache"));
        assert_eq!(config.http.pool_size, 4);
    }

    #[test]
    #[serial]
    fn test_vendor_keys_enable_providers() {
        clear_vars();
        std_env::set_var("ELEVENLABS_API_KEY", "sk_live");
        std_env::set_var("ELEVENLABS_VOICE_ID", "custom-voice");
        std_env::set_var("GOOGLE_TTS_API_KEY", "gk_live");

        let config = VoiceConfig::from_env().unwrap();
        let elevenlabs = config.elevenlabs.unwrap();
        assert_eq!(elevenlabs.api_key, "sk_live");
        assert_eq!(elevenlabs.voice_id, "custom-voice");
        assert_eq!(config.google.unwrap().api_key, "gk_live");
        clear_vars();
    }

    #[test]
    #[serial]
    fn test_custom_coqui_url_and_dirs() {
        clear_vars();
        std_env::set_var("COQUI_API_URL", "http://tts.internal:5002/");
        std_env::set_var("TTS_CACHE_DIR", "/var/lib/kasya/cache");
        std_env::set_var("TTS_TEMP_DIR", "/var/lib/kasya/temp");

        let config = VoiceConfig::from_env().unwrap();
        let coqui = config.coqui.unwrap();
        assert_eq!(coqui.api_url, "http://tts.internal:5002");
        assert_eq!(coqui.temp_dir, PathBuf::from("/var/lib/kasya/temp"));
        assert_eq!(config.cache_dir, PathBuf::from("/var/lib/kasya/cache"));
        clear_vars();
    }

    #[test]
    #[serial]
    fn test_invalid_coqui_url_is_rejected() {
        clear_vars();
        std_env::set_var("COQUI_API_URL", "not a url");

        let result = VoiceConfig::from_env();
        assert!(matches!(result, Err(ConfigError::InvalidUrl { .. })));
        clear_vars();
    }

    #[test]
    #[serial]
    fn test_pool_size_override() {
        clear_vars();
        std_env::set_var("TTS_HTTP_POOL_SIZE", "16");

        let config = VoiceConfig::from_env().unwrap();
        assert_eq!(config.http.pool_size, 16);
        clear_vars();
    }
}
