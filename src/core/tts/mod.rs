pub mod base;
pub mod cascade;
pub mod circuit;
pub mod coqui;
pub mod elevenlabs;
pub mod google;

pub use base::{fingerprint, AudioRef, SpeechProvider, SynthesisError, SynthesisResult};
pub use cascade::SpeechCascade;
pub use circuit::{BreakerConfig, CircuitBreaker, CircuitState, StatsSnapshot, UsageStats};
pub use coqui::{CoquiConfig, CoquiSpeech, DEFAULT_COQUI_URL};
pub use elevenlabs::{ElevenLabsConfig, ElevenLabsSpeech, ELEVENLABS_TTS_URL};
pub use google::{GoogleConfig, GoogleSpeech, GOOGLE_TTS_URL};

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::config::VoiceConfig;
use crate::core::cache::{AudioStore, CacheError};
use crate::utils::http_pool::HttpPool;

/// Errors building the cascade from configuration.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Build the provider cascade from configuration.
///
/// Only configured providers are constructed; each gets its own cache
/// namespace under the cache root so identical text synthesized by different
/// vendors never collides. The Coqui client's background probes are started
/// here and stop when the cascade is dropped.
///
/// # Example
///
/// ```rust,no_run
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// use kasya::config::VoiceConfig;
/// use kasya::core::tts::build_cascade;
///
/// let config = VoiceConfig::from_env()?;
/// let cascade = build_cascade(&config).await?;
///
/// if let Some(audio) = cascade.synthesize("Bună ziua!").await {
///     println!("play {}", audio.url);
/// }
/// # Ok(())
/// # }
/// ```
pub async fn build_cascade(config: &VoiceConfig) -> Result<SpeechCascade, BuildError> {
    let pool = Arc::new(HttpPool::new(
        config.http.pool_size,
        config.http.connect_timeout,
    )?);

    let mut providers: Vec<Arc<dyn SpeechProvider>> = Vec::new();

    if let Some(elevenlabs) = &config.elevenlabs {
        let store = AudioStore::open(config.cache_dir.join("elevenlabs"), "/cache").await?;
        providers.push(Arc::new(ElevenLabsSpeech::new(
            elevenlabs.clone(),
            pool.clone(),
            Arc::new(store),
        )));
    }

    if let Some(google) = &config.google {
        let store = AudioStore::open(config.cache_dir.join("google"), "/cache").await?;
        providers.push(Arc::new(GoogleSpeech::new(
            google.clone(),
            pool.clone(),
            Arc::new(store),
        )));
    }

    if let Some(coqui) = &config.coqui {
        let store = AudioStore::open(config.cache_dir.join("coqui"), "/audio").await?;
        let client = CoquiSpeech::new(coqui.clone(), pool.clone(), Arc::new(store));
        client.start();
        providers.push(client);
    }

    let cascade = SpeechCascade::new(providers);
    info!(
        "speech cascade ready with {} providers: {:?}",
        cascade.len(),
        cascade.provider_names()
    );
    Ok(cascade)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpSettings;
    use tempfile::TempDir;

    fn empty_config(cache_dir: std::path::PathBuf) -> VoiceConfig {
        VoiceConfig {
            cache_dir,
            coqui: None,
            elevenlabs: None,
            google: None,
            http: HttpSettings::default(),
        }
    }

    #[tokio::test]
    async fn test_build_empty_cascade() {
        let dir = TempDir::new().unwrap();
        let config = empty_config(dir.path().to_path_buf());

        let cascade = build_cascade(&config).await.unwrap();
        assert!(cascade.is_empty());
    }

    #[tokio::test]
    async fn test_build_orders_vendors_by_cost_tier() {
        let dir = TempDir::new().unwrap();
        let mut config = empty_config(dir.path().to_path_buf());
        config.coqui = Some(CoquiConfig::new(
            "http://localhost:5002",
            dir.path().join("temp"),
        ));
        config.elevenlabs = Some(ElevenLabsConfig::new("sk_test"));
        config.google = Some(GoogleConfig::new("gk_test"));

        let cascade = build_cascade(&config).await.unwrap();
        assert_eq!(
            cascade.provider_names(),
            vec!["elevenlabs", "google", "coqui"]
        );
    }

    #[tokio::test]
    async fn test_build_creates_cache_namespaces() {
        let dir = TempDir::new().unwrap();
        let mut config = empty_config(dir.path().to_path_buf());
        config.elevenlabs = Some(ElevenLabsConfig::new("sk_test"));

        let _cascade = build_cascade(&config).await.unwrap();
        assert!(dir.path().join("elevenlabs").is_dir());
    }
}
