//! # Coqui TTS Client
//!
//! Client for the self-hosted Coqui synthesis service, guarded by a circuit
//! breaker so a failing deployment is not hammered on every conversational
//! turn.
//!
//! The request path is: circuit check, liveness check, fingerprint cache,
//! then one remote call with a bounded timeout. Every remote outcome feeds
//! the breaker and the usage counters; the public surface only ever yields
//! `Some(audio)` or `None`.
//!
//! Three background tasks run while the client is started:
//! - a health probe (`GET /health`) on a fixed interval while the circuit is
//!   closed,
//! - a reset probe that re-checks an open circuit once its cooldown has
//!   passed, closing it when the service answers again,
//! - a janitor that sweeps stale files out of the temp working directory.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::base::{fingerprint, AudioRef, SpeechProvider, SynthesisError, SynthesisResult};
use super::circuit::{BreakerConfig, CircuitBreaker, CircuitState, StatsSnapshot, UsageStats};
use crate::core::cache::AudioStore;
use crate::utils::http_pool::HttpPool;
use crate::utils::tempfiles;

/// Default endpoint of the self-hosted deployment.
pub const DEFAULT_COQUI_URL: &str = "https://web-production-00dca9.up.railway.app";

/// Retention window for the temp working directory.
const TEMP_RETENTION: Duration = Duration::from_secs(60 * 60);
/// Sweep cadence for the temp-dir janitor.
const JANITOR_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Configuration for the Coqui client.
#[derive(Debug, Clone)]
pub struct CoquiConfig {
    /// Base URL of the synthesis service, without a trailing slash
    pub api_url: String,
    /// Working directory swept by the janitor
    pub temp_dir: PathBuf,
    /// Cascade rank
    pub priority: u8,
    /// Circuit breaker tuning
    pub breaker: BreakerConfig,
    /// Timeout for one synthesis request
    pub synthesis_timeout: Duration,
    /// Timeout for one liveness probe
    pub health_timeout: Duration,
    /// Interval of the proactive health probe
    pub health_interval: Duration,
}

impl CoquiConfig {
    pub fn new(api_url: impl Into<String>, temp_dir: impl Into<PathBuf>) -> Self {
        let api_url: String = api_url.into();
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            temp_dir: temp_dir.into(),
            priority: 10,
            breaker: BreakerConfig::default(),
            synthesis_timeout: Duration::from_secs(30),
            health_timeout: Duration::from_secs(5),
            health_interval: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    use_cache: bool,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

/// Circuit-breaker guarded client for the self-hosted Coqui service.
///
/// Owns its breaker, usage counters and background tasks. Construct with
/// [`CoquiSpeech::new`], then call [`CoquiSpeech::start`] to launch the
/// periodic probes; dropping the client (or calling
/// [`CoquiSpeech::shutdown`]) stops them.
pub struct CoquiSpeech {
    config: CoquiConfig,
    pool: Arc<HttpPool>,
    store: Arc<AudioStore>,
    /// Result of the most recent liveness probe
    enabled: AtomicBool,
    breaker: Mutex<CircuitBreaker>,
    stats: UsageStats,
    /// Serializes the cache-miss path so concurrent requests for the same
    /// text issue a single remote call
    synth_gate: AsyncMutex<()>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl CoquiSpeech {
    pub fn new(config: CoquiConfig, pool: Arc<HttpPool>, store: Arc<AudioStore>) -> Arc<Self> {
        let breaker = CircuitBreaker::new(config.breaker.clone());
        Arc::new(Self {
            config,
            pool,
            store,
            enabled: AtomicBool::new(false),
            breaker: Mutex::new(breaker),
            stats: UsageStats::default(),
            synth_gate: AsyncMutex::new(()),
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Launch the health probe, the circuit reset probe and the temp-dir
    /// janitor. Calling `start` twice is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            return;
        }

        // Proactive health probe; the first tick fires immediately so the
        // client learns its initial availability right away.
        let client = Arc::clone(self);
        let token = self.shutdown.clone();
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(client.config.health_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let closed = client.breaker.lock().state() == CircuitState::Closed;
                        if closed {
                            client.check_availability().await;
                        }
                    }
                }
            }
            debug!("coqui health probe task exited");
        }));

        // Reset probe: once an open circuit has cooled down, try to close it
        // without waiting for live traffic.
        let client = Arc::clone(self);
        let token = self.shutdown.clone();
        let period = self.config.breaker.reset_timeout;
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let due = {
                            let breaker = client.breaker.lock();
                            breaker.state() == CircuitState::Open
                                && breaker.should_attempt(Instant::now())
                        };
                        if due {
                            info!("attempting to close coqui circuit");
                            client.check_availability().await;
                        }
                    }
                }
            }
            debug!("coqui reset probe task exited");
        }));

        // Janitor for the temp working directory.
        let client = Arc::clone(self);
        let token = self.shutdown.clone();
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(JANITOR_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        match tempfiles::sweep_stale(&client.config.temp_dir, TEMP_RETENTION).await {
                            Ok(0) => {}
                            Ok(n) => info!("cleaned up {} old temp files", n),
                            Err(e) => warn!("temp sweep failed: {}", e),
                        }
                    }
                }
            }
            debug!("coqui janitor task exited");
        }));

        info!("coqui client started for {}", self.config.api_url);
    }

    /// Stop all background tasks.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
    }

    /// Probe `GET /health` and update the liveness flag. A reachable,
    /// healthy service counts as a success against the circuit, so a probe
    /// alone can close an open circuit after its cooldown.
    pub async fn check_availability(&self) {
        let started = Instant::now();
        match self.probe_health().await {
            Ok(healthy) => {
                let was_disabled = !self.enabled.load(Ordering::Relaxed);
                self.enabled.store(healthy, Ordering::Relaxed);
                if healthy {
                    self.breaker.lock().record_success();
                    self.stats.record_success(started.elapsed());
                    if was_disabled {
                        info!("coqui service is now available");
                    }
                } else {
                    debug!("coqui health endpoint reports an unhealthy status");
                }
            }
            Err(e) => {
                self.enabled.store(false, Ordering::Relaxed);
                self.note_failure();
                warn!("coqui health check failed: {}", e);
            }
        }
    }

    /// Point-in-time statistics including the circuit view.
    pub fn get_stats(&self) -> StatsSnapshot {
        let breaker = self.breaker.lock();
        self.stats
            .snapshot(breaker.state(), breaker.consecutive_failures())
    }

    async fn probe_health(&self) -> SynthesisResult<bool> {
        let guard = self
            .pool
            .acquire()
            .await
            .map_err(|e| SynthesisError::Unavailable(e.to_string()))?;

        let response = guard
            .client()
            .get(format!("{}/health", self.config.api_url))
            .timeout(self.config.health_timeout)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                self.pool.metrics().record(true);
                let health: HealthResponse = resp
                    .json()
                    .await
                    .map_err(|e| SynthesisError::Transport(e.to_string()))?;
                Ok(health.status == "healthy")
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

    async fn post_synthesis(&self, text: &str) -> SynthesisResult<Bytes> {
        let guard = self
            .pool
            .acquire()
            .await
            .map_err(|e| SynthesisError::Unavailable(e.to_string()))?;

        let response = guard
            .client()
            .post(format!("{}/tts", self.config.api_url))
            .timeout(self.config.synthesis_timeout)
            .json(&SynthesisRequest {
                text,
                use_cache: true,
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

    fn note_failure(&self) {
        let (failures, state) = {
            let mut breaker = self.breaker.lock();
            breaker.record_failure(Instant::now());
            (breaker.consecutive_failures(), breaker.state())
        };
        self.stats.record_failure();

        if state == CircuitState::Open {
            error!(
                "coqui circuit open after {} consecutive failures, retrying in {}s",
                failures,
                self.config.breaker.reset_timeout.as_secs()
            );
        } else {
            warn!(
                "coqui failure {}/{}",
                failures, self.config.breaker.failure_threshold
            );
        }
    }

    fn audio_ref(&self, file_name: &str) -> AudioRef {
        AudioRef {
            file_name: file_name.to_string(),
            path: self.store.path_for(file_name),
            url: self.store.url_for(file_name),
        }
    }

    /// Cache-miss path: serialize callers, re-check the cache, win the
    /// half-open probe if one is pending, then make the remote call.
    async fn request_speech(&self, text: &str, file_name: &str) -> SynthesisResult<AudioRef> {
        let _gate = self.synth_gate.lock().await;

        match self.store.get(file_name).await {
            Ok(Some(_)) => {
                debug!("cache hit after wait: {}", file_name);
                self.stats.record_success(Duration::ZERO);
                return Ok(self.audio_ref(file_name));
            }
            Ok(None) => {}
            Err(e) => warn!("cache read failed, treating as miss: {}", e),
        }

        {
            let mut breaker = self.breaker.lock();
            if !breaker.try_acquire(Instant::now()) {
                return Err(SynthesisError::Unavailable("circuit open".to_string()));
            }
        }

        debug!("generating speech: {:.50}", text);
        let started = Instant::now();

        let audio = match self.post_synthesis(text).await {
            Ok(audio) => audio,
            Err(e) => {
                self.note_failure();
                return Err(e);
            }
        };

        match self.store.put(file_name, audio).await {
            Ok(_path) => {
                let elapsed = started.elapsed();
                self.breaker.lock().record_success();
                self.stats.record_success(elapsed);
                info!(
                    "coqui synthesis ok in {} ms, avg {} ms",
                    elapsed.as_millis(),
                    self.stats.average_latency_ms()
                );
                Ok(self.audio_ref(file_name))
            }
            Err(e) => {
                self.note_failure();
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl SpeechProvider for CoquiSpeech {
    fn name(&self) -> &'static str {
        "coqui"
    }

    fn priority(&self) -> u8 {
        self.config.priority
    }

    fn is_available(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
            && self.breaker.lock().should_attempt(Instant::now())
    }

    async fn synthesize(&self, text: &str) -> Option<AudioRef> {
        // Gate order: circuit, liveness, cache, remote call.
        {
            let breaker = self.breaker.lock();
            if !breaker.should_attempt(Instant::now()) {
                warn!("coqui circuit open, skipping request");
                return None;
            }
        }

        if !self.enabled.load(Ordering::Relaxed) {
            warn!("coqui service not available");
            return None;
        }

        let file_name = format!("{}.wav", fingerprint(text));
        match self.store.get(&file_name).await {
            Ok(Some(_)) => {
                debug!("cache hit: {}", file_name);
                self.stats.record_success(Duration::ZERO);
                return Some(self.audio_ref(&file_name));
            }
            Ok(None) => {}
            Err(e) => warn!("cache read failed, treating as miss: {}", e),
        }

        match self.request_speech(text, &file_name).await {
            Ok(audio) => Some(audio),
            Err(e) => {
                debug!("coqui fell through: {}", e);
                None
            }
        }
    }

    fn stats(&self) -> serde_json::Value {
        serde_json::to_value(self.get_stats()).unwrap_or_default()
    }
}

impl Drop for CoquiSpeech {
    fn drop(&mut self) {
        // Best-effort cancel of background tasks without awaiting
        self.shutdown.cancel();
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_trims_trailing_slash() {
        let config = CoquiConfig::new("http://localhost:5002/", "/tmp/kasya");
        assert_eq!(config.api_url, "http://localhost:5002");
    }

    #[test]
    fn test_config_defaults() {
        let config = CoquiConfig::new(DEFAULT_COQUI_URL, "/tmp/kasya");
        assert_eq!(config.breaker.failure_threshold, 3);
        assert_eq!(config.breaker.reset_timeout, Duration::from_secs(60));
        assert_eq!(config.synthesis_timeout, Duration::from_secs(30));
        assert_eq!(config.health_timeout, Duration::from_secs(5));
        assert_eq!(config.health_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_synthesis_request_body() {
        let body = serde_json::to_string(&SynthesisRequest {
            text: "hello",
            use_cache: true,
        })
        .unwrap();
        assert_eq!(body, r#"{"text":"hello","use_cache":true}"#);
    }

    #[tokio::test]
    async fn test_new_client_is_unavailable_until_probed() {
        let pool = Arc::new(HttpPool::new(2, Duration::from_secs(1)).unwrap());
        let dir = tempfile::TempDir::new().unwrap();
        let store = Arc::new(AudioStore::open(dir.path(), "/audio").await.unwrap());
        let client = CoquiSpeech::new(
            CoquiConfig::new("http://localhost:1", dir.path().join("temp")),
            pool,
            store,
        );

        assert!(!client.is_available());
        assert_eq!(client.synthesize("hello").await, None);

        // Short-circuited before any remote call: no stats recorded
        let stats = client.get_stats();
        assert_eq!(stats.requests, 0);
        assert_eq!(stats.circuit_state, CircuitState::Closed);
    }
}
