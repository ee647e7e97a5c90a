pub mod config;
pub mod core;
pub mod utils;

// Re-export commonly used items for convenience
pub use crate::config::{ConfigError, VoiceConfig};
pub use crate::core::cache::AudioStore;
pub use crate::core::tts::{
    build_cascade, AudioRef, BreakerConfig, CircuitState, CoquiConfig, CoquiSpeech,
    SpeechCascade, SpeechProvider, SynthesisError,
};
