//! Google Cloud Text-to-Speech integration.
//!
//! Mid tier of the cascade, using the REST `text:synthesize` endpoint with an
//! API key. The response carries base64-encoded audio which is decoded and
//! cached like every other provider's output.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use super::base::{fingerprint, AudioRef, SpeechProvider, SynthesisError, SynthesisResult};
use crate::core::cache::AudioStore;
use crate::utils::http_pool::HttpPool;

pub const GOOGLE_TTS_URL: &str = "https://texttospeech.googleapis.com/v1/text:synthesize";

/// Configuration for the Google TTS provider.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub api_key: String,
    pub language_code: String,
    pub voice_name: String,
    /// Endpoint base, overridable for tests
    pub endpoint: String,
    /// Cascade rank
    pub priority: u8,
    pub request_timeout: Duration,
}

impl GoogleConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            language_code: "ro-RO".to_string(),
            voice_name: "ro-RO-Wavenet-A".to_string(),
            endpoint: GOOGLE_TTS_URL.to_string(),
            priority: 50,
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Serialize)]
struct SynthesisInput<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection<'a> {
    language_code: &'a str,
    name: &'a str,
    ssml_gender: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig<'a> {
    audio_encoding: &'a str,
    speaking_rate: f64,
    pitch: f64,
    effects_profile_id: &'a [&'a str],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechRequest<'a> {
    input: SynthesisInput<'a>,
    voice: VoiceSelection<'a>,
    audio_config: AudioConfig<'a>,
}

impl<'a> SpeechRequest<'a> {
    fn new(text: &'a str, config: &'a GoogleConfig) -> Self {
        Self {
            input: SynthesisInput { text },
            voice: VoiceSelection {
                language_code: &config.language_code,
                name: &config.voice_name,
                ssml_gender: "FEMALE",
            },
            audio_config: AudioConfig {
                audio_encoding: "MP3",
                speaking_rate: 0.95,
                pitch: 2.0,
                effects_profile_id: &["telephony-class-application"],
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpeechResponse {
    audio_content: String,
}

/// Google Cloud speech provider.
pub struct GoogleSpeech {
    config: GoogleConfig,
    pool: Arc<HttpPool>,
    store: Arc<AudioStore>,
}

impl GoogleSpeech {
    pub fn new(config: GoogleConfig, pool: Arc<HttpPool>, store: Arc<AudioStore>) -> Self {
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
            .post(format!("{}?key={}", self.config.endpoint, self.config.api_key))
            .timeout(self.config.request_timeout)
            .json(&SpeechRequest::new(text, &self.config))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                self.pool.metrics().record(true);
                let body: SpeechResponse = resp
                    .json()
                    .await
                    .map_err(|e| SynthesisError::Transport(e.to_string()))?;
                let audio = BASE64
                    .decode(body.audio_content)
                    .map_err(|e| SynthesisError::Transport(format!("invalid audio payload: {e}")))?;
                Ok(Bytes::from(audio))
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
impl SpeechProvider for GoogleSpeech {
    fn name(&self) -> &'static str {
        "google"
    }

    fn priority(&self) -> u8 {
        self.config.priority
    }

    fn is_available(&self) -> bool {
        !self.config.api_key.is_empty()
    }

    async fn synthesize(&self, text: &str) -> Option<AudioRef> {
        if !self.is_available() {
            debug!("google TTS not configured");
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

        debug!("generating speech via google: {:.50}", text);
        let audio = match self.request_speech(text).await {
            Ok(audio) => audio,
            Err(e) => {
                error!("google synthesis failed: {}", e);
                return None;
            }
        };

        match self.store.put(&file_name, audio).await {
            Ok(_path) => {
                info!("google speech generated and cached");
                Some(self.audio_ref(&file_name))
            }
            Err(e) => {
                error!("failed to cache google audio: {}", e);
                None
            }
        }
    }

    fn stats(&self) -> serde_json::Value {
        let (hits, misses, writes) = self.store.metrics().get_stats();
        serde_json::json!({
            "provider": self.name(),
            "voice": self.config.voice_name,
            "language": self.config.language_code,
            "cache": { "hits": hits, "misses": misses, "writes": writes },
        })
    }
}
