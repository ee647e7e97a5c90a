//! Environment variable loading

use std::env;
use std::path::PathBuf;

use super::{HttpSettings, VoiceConfig};
use crate::core::tts::{CoquiConfig, ElevenLabsConfig, GoogleConfig, DEFAULT_COQUI_URL};

/// Read a variable, falling back to `default` when unset or empty.
fn var_or(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => default.to_string(),
    }
}

/// Read a variable, returning `None` when unset or empty.
fn var_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

pub(super) fn load() -> VoiceConfig {
    let cache_dir = PathBuf::from(var_or("TTS_CACHE_DIR", "cache"));
    let temp_dir = PathBuf::from(var_or("TTS_TEMP_DIR", "temp"));

    // The self-hosted tier always has an endpoint; paid vendors join the
    // cascade only when their credentials are present.
    let coqui = Some(CoquiConfig::new(
        var_or("COQUI_API_URL", DEFAULT_COQUI_URL),
        temp_dir,
    ));

    let elevenlabs = var_opt("ELEVENLABS_API_KEY").map(|api_key| {
        let mut config = ElevenLabsConfig::new(api_key);
        if let Some(voice_id) = var_opt("ELEVENLABS_VOICE_ID") {
            config.voice_id = voice_id;
        }
        config
    });

    let google = var_opt("GOOGLE_TTS_API_KEY").map(GoogleConfig::new);

    let mut http = HttpSettings::default();
    if let Some(pool_size) = var_opt("TTS_HTTP_POOL_SIZE").and_then(|v| v.parse().ok()) {
        http.pool_size = pool_size;
    }

    VoiceConfig {
        cache_dir,
        coqui,
        elevenlabs,
        google,
        http,
    }
}
