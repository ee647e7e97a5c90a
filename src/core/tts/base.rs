//! # Speech Provider Abstraction
//!
//! This module defines the minimal capability every text-to-speech vendor
//! integration exposes to the cascade: a cheap availability check and a
//! synthesis operation that degrades to `None` instead of failing.
//!
//! The `None` contract is deliberate. Speech synthesis is a soft dependency
//! of the call flow; the caller always has a baseline voice to fall back to,
//! so providers absorb their own transport, upstream and availability errors
//! and surface nothing but "no audio" upward.

use std::path::PathBuf;

use async_trait::async_trait;
use xxhash_rust::xxh3::xxh3_128;

use crate::core::cache::CacheError;

/// Reference to a synthesized audio artifact persisted in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioRef {
    /// Store file name (`<fingerprint>.<ext>`)
    pub file_name: String,
    /// Absolute path of the cached file
    pub path: PathBuf,
    /// URL path under which the serving layer exposes the file
    pub url: String,
}

/// Synthesis error taxonomy. These never cross the `synthesize` boundary;
/// providers record them and return `None`.
#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    /// Network or timeout failure before a response was obtained
    #[error("transport error: {0}")]
    Transport(String),

    /// The vendor answered with a non-success status
    #[error("upstream error ({status}): {body}")]
    Upstream { status: u16, body: String },

    /// Circuit open, missing credentials, or failed liveness
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// Audio store failure
    #[error("store error: {0}")]
    Store(#[from] CacheError),
}

/// Result type for internal synthesis steps
pub type SynthesisResult<T> = Result<T, SynthesisError>;

/// Deterministic content fingerprint of the text to synthesize, used as the
/// cache key. Leading and trailing whitespace does not change the audio, so
/// it does not change the fingerprint either.
pub fn fingerprint(text: &str) -> String {
    format!("{:032x}", xxh3_128(text.trim().as_bytes()))
}

/// Capability contract for a TTS vendor integration.
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    /// Stable provider identifier used in logs and stats
    fn name(&self) -> &'static str;

    /// Static rank; the cascade tries higher ranks first
    fn priority(&self) -> u8;

    /// Whether the provider is configured and believed reachable.
    /// Must be cheap: no network calls.
    fn is_available(&self) -> bool;

    /// Synthesize `text` into audio. `None` means the provider is
    /// unavailable or failed; the caller falls through to the next one.
    async fn synthesize(&self, text: &str) -> Option<AudioRef>;

    /// Introspection snapshot for dashboards
    fn stats(&self) -> serde_json::Value {
        serde_json::json!({ "provider": self.name() })
    }
}
