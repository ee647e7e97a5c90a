//! ElevenLabs TTS integration.
//!
//! Premium tier of the cascade. Availability only means an API key is
//! configured; failures are absorbed and surfaced as `None` like every other
//! provider.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, error, info};

use super::base::{fingerprint, AudioRef, SpeechProvider, SynthesisError, SynthesisResult};
use crate::core::cache::AudioStore;
use crate::utils::http_pool::HttpPool;

pub const ELEVENLABS_TTS_URL: &str = "https://api.elevenlabs.io/v1/text-to-speech";

/// Configuration for the ElevenLabs provider.
#[derive(Debug, Clone)]
pub struct ElevenLabsConfig {
    pub api_key: String,
    pub voice_id: String,
    pub model_id: String,
    /// Endpoint base, overridable for tests
    pub endpoint: String,
    /// Cascade rank
    pub priority: u8,
    pub request_timeout: Duration,
}

impl ElevenLabsConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            voice_id: "QtObtrglHRaER8xlDZsr".to_string(),
            model_id: "eleven_multilingual_v2".to_string(),
            endpoint: ELEVENLABS_TTS_URL.to_string(),
            priority: 100,
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct VoiceSettings {
    stability: f64,
    similarity_boost: f64,
    style: f64,
    use_speaker_boost: bool,
    speaking_rate: f64,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.7,
            similarity_boost: 0.75,
            style: 0.5,
            use_speaker_boost: true,
            speaking_rate: 1.0,
        }
    }
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

/// ElevenLabs speech provider.
pub struct ElevenLabsSpeech {
    config: ElevenLabsConfig,
    pool: Arc<HttpPool>,
    store: Arc<AudioStore>,
}

impl ElevenLabsSpeech {
    pub fn new(config: ElevenLabsConfig, pool: Arc<HttpPool>, store: Arc<AudioStore>) -> Self {
        Self {
            config,
            pool,
            store,
        }
    }

    async fn request_speech(&self, text: &str) -> SynthesisResult<Bytes> {
        let guard = self
            .pool
            .acquire()
            .await
            .map_err(|e| SynthesisError::Unavailable(e.to_string()))?;

        let response = guard
            .client()
            .post(format!("{}/{}", self.config.endpoint, self.config.voice_id))
            .header("xi-api-key", &self.config.api_key)
            .header(reqwest::header::ACCEPT, "audio/mpeg")
            .timeout(self.config.request_timeout)
            .json(&SpeechRequest {
                text,
                model_id: &self.config.model_id,
                voice_settings: VoiceSettings::default(),
            })
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                self.pool.metrics().record(true);
                resp.bytes()
                    .await
                    .map_err(|e| SynthesisError::Transport(e.to_string()))
            }
            Ok(resp) => {
                self.pool.metrics().record(false);
                let status = resp.status().as_u16();
                let body = resp
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                Err(SynthesisError::Upstream { status, body })
            }
            Err(e) => {
                self.pool.metrics().record(false);
                Err(SynthesisError::Transport(e.to_string()))
            }
        }
    }

    fn audio_ref(&self, file_name: &str) -> AudioRef {
        AudioRef {
            file_name: file_name.to_string(),
            path: self.store.path_for(file_name),
            url: self.store.url_for(file_name),
        }
    }
}

#[async_trait]
impl SpeechProvider for ElevenLabsSpeech {
    fn name(&self) -> &'static str {
        "elevenlabs"
    }

    fn priority(&self) -> u8 {
        self.config.priority
    }

    fn is_available(&self) -> bool {
        !self.config.api_key.is_empty()
    }

    async fn synthesize(&self, text: &str) -> Option<AudioRef> {
        if !self.is_available() {
            debug!("elevenlabs API key missing");
            return None;
        }

        let file_name = format!("{}.mp3", fingerprint(text));
        match self.store.get(&file_name).await {
            Ok(Some(_)) => {
                debug!("cache hit: {}", file_name);
                return Some(self.audio_ref(&file_name));
            }
            Ok(None) => {}
            Err(e) => debug!("cache read failed, treating as miss: {}", e),
        }

        debug!("generating speech via elevenlabs: {:.50}", text);
        let audio = match self.request_speech(text).await {
            Ok(audio) => audio,
            Err(e) => {
                error!("elevenlabs synthesis failed: {}", e);
                return None;
            }
        };

        match self.store.put(&file_name, audio).await {
            Ok(_path) => {
                info!("elevenlabs speech generated and cached");
                Some(self.audio_ref(&file_name))
            }
            Err(e) => {
                error!("failed to cache elevenlabs audio: {}", e);
                None
            }
        }
    }

    fn stats(&self) -> serde_json::Value {
        let (hits, misses, writes) = self.store.metrics().get_stats();
        serde_json::json!({
            "provider": self.name(),
            "voice_id": self.config.voice_id,
            "model_id": self.config.model_id,
            "cache": { "hits": hits, "misses": misses, "writes": writes },
        })
    }
}
