//! Circuit breaker for the self-hosted synthesis backend.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: backend assumed down, requests fail fast until the reset timeout
//! - HalfOpen: a single probe request is in flight
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures reach the threshold
//! Open → HalfOpen: a request is admitted after the reset timeout
//! HalfOpen → Closed: the probe succeeds
//! HalfOpen → Open: the probe fails
//! ```
//!
//! The checks are split so that `should_attempt` stays a pure function of
//! state and elapsed time, while `try_acquire` performs the one admission
//! transition. Exactly one caller wins the half-open probe; everyone else is
//! rejected until the probe resolves.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use serde::Serialize;

/// The state of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Requests pass through; failures are counted
    Closed,
    /// Requests are rejected without a network call
    Open,
    /// One probe request is testing recovery
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Configuration for the circuit breaker.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// Cooldown before an open circuit admits a probe
    pub reset_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

/// Explicit circuit state machine. Not synchronized by itself; the owning
/// client keeps it behind a single lock so threshold transitions never lose
/// increments.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    config: BreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure: None,
            config,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    fn cooled_down(&self, now: Instant) -> bool {
        match self.last_failure {
            Some(at) => now.saturating_duration_since(at) >= self.config.reset_timeout,
            None => true,
        }
    }

    /// Pure check: would a request be admitted at `now`? No transition
    /// happens here.
    pub fn should_attempt(&self, now: Instant) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => false,
            CircuitState::Open => self.cooled_down(now),
        }
    }

    /// Admit one request at `now`. On an open circuit that has cooled down
    /// this performs the `Open -> HalfOpen` transition, so only the first
    /// caller gets the probe.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => false,
            CircuitState::Open => {
                if self.cooled_down(now) {
                    self.state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// A remote success: close the circuit and reset the failure streak.
    pub fn record_success(&mut self) {
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.last_failure = None;
    }

    /// A remote failure at `now`: bump the streak, open the circuit at the
    /// threshold. A failed half-open probe re-opens immediately.
    pub fn record_failure(&mut self, now: Instant) {
        self.consecutive_failures += 1;
        self.last_failure = Some(now);

        match self.state {
            CircuitState::HalfOpen => self.state = CircuitState::Open,
            CircuitState::Closed
                if self.consecutive_failures >= self.config.failure_threshold =>
            {
                self.state = CircuitState::Open;
            }
            _ => {}
        }
    }
}

/// Cumulative request counters for one provider. Counter updates are atomic
/// so concurrent in-flight requests never lose increments; the request total
/// always equals successes plus failures.
#[derive(Debug, Default)]
pub struct UsageStats {
    total_requests: AtomicU64,
    total_successes: AtomicU64,
    total_failures: AtomicU64,
    total_latency_ms: AtomicU64,
    last_success: RwLock<Option<SystemTime>>,
    last_failure: RwLock<Option<SystemTime>>,
}

impl UsageStats {
    pub fn record_success(&self, latency: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_successes.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms
            .fetch_add(latency.as_millis() as u64, Ordering::Relaxed);
        *self.last_success.write() = Some(SystemTime::now());
    }

    pub fn record_failure(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        *self.last_failure.write() = Some(SystemTime::now());
    }

    pub fn requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn successes(&self) -> u64 {
        self.total_successes.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.total_failures.load(Ordering::Relaxed)
    }

    /// Mean latency over successful requests, 0 when there are none yet.
    pub fn average_latency_ms(&self) -> u64 {
        let successes = self.total_successes.load(Ordering::Relaxed);
        if successes == 0 {
            0
        } else {
            self.total_latency_ms.load(Ordering::Relaxed) / successes
        }
    }

    /// Share of successful requests as a percentage, 0 when idle.
    pub fn uptime_percent(&self) -> f64 {
        let requests = self.total_requests.load(Ordering::Relaxed);
        if requests == 0 {
            0.0
        } else {
            self.total_successes.load(Ordering::Relaxed) as f64 / requests as f64 * 100.0
        }
    }

    /// Build a serializable snapshot, folding in the current circuit view.
    pub fn snapshot(&self, circuit_state: CircuitState, consecutive_failures: u32) -> StatsSnapshot {
        StatsSnapshot {
            requests: self.requests(),
            successes: self.successes(),
            failures: self.failures(),
            average_latency_ms: self.average_latency_ms(),
            uptime_percent: self.uptime_percent(),
            circuit_state,
            consecutive_failures,
            last_success: unix_secs(*self.last_success.read()),
            last_failure: unix_secs(*self.last_failure.read()),
        }
    }
}

fn unix_secs(time: Option<SystemTime>) -> Option<u64> {
    time.and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
}

/// Point-in-time provider statistics for dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub average_latency_ms: u64,
    pub uptime_percent: f64,
    pub circuit_state: CircuitState,
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, reset: Duration) -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig {
            failure_threshold: threshold,
            reset_timeout: reset,
        })
    }

    #[test]
    fn test_initial_state_is_closed() {
        let b = breaker(3, Duration::from_secs(60));
        assert_eq!(b.state(), CircuitState::Closed);
        assert_eq!(b.consecutive_failures(), 0);
        assert!(b.should_attempt(Instant::now()));
    }

    #[test]
    fn test_opens_exactly_at_threshold() {
        let mut b = breaker(3, Duration::from_secs(60));
        let now = Instant::now();

        b.record_failure(now);
        b.record_failure(now);
        assert_eq!(b.state(), CircuitState::Closed);
        assert!(b.should_attempt(now));

        b.record_failure(now);
        assert_eq!(b.state(), CircuitState::Open);
        assert!(!b.should_attempt(now));
        assert!(b.consecutive_failures() >= b.config().failure_threshold);
    }

    #[test]
    fn test_open_rejects_until_reset_timeout() {
        let mut b = breaker(1, Duration::from_secs(60));
        let t0 = Instant::now();
        b.record_failure(t0);

        assert!(!b.should_attempt(t0));
        assert!(!b.should_attempt(t0 + Duration::from_secs(59)));
        assert!(b.should_attempt(t0 + Duration::from_secs(60)));
        assert!(b.should_attempt(t0 + Duration::from_secs(120)));
    }

    #[test]
    fn test_half_open_admits_exactly_one_probe() {
        let mut b = breaker(1, Duration::from_secs(60));
        let t0 = Instant::now();
        b.record_failure(t0);

        let probe_time = t0 + Duration::from_secs(61);
        assert!(b.try_acquire(probe_time));
        assert_eq!(b.state(), CircuitState::HalfOpen);

        // Probe unresolved: everyone else is rejected
        assert!(!b.try_acquire(probe_time));
        assert!(!b.should_attempt(probe_time));
    }

    #[test]
    fn test_probe_success_closes_circuit() {
        let mut b = breaker(1, Duration::from_secs(60));
        let t0 = Instant::now();
        b.record_failure(t0);
        assert!(b.try_acquire(t0 + Duration::from_secs(61)));

        b.record_success();
        assert_eq!(b.state(), CircuitState::Closed);
        assert_eq!(b.consecutive_failures(), 0);
        assert!(b.should_attempt(t0 + Duration::from_secs(61)));
    }

    #[test]
    fn test_probe_failure_reopens_and_refreshes_timestamp() {
        let mut b = breaker(1, Duration::from_secs(60));
        let t0 = Instant::now();
        b.record_failure(t0);
        assert!(b.try_acquire(t0 + Duration::from_secs(61)));

        let t1 = t0 + Duration::from_secs(62);
        b.record_failure(t1);
        assert_eq!(b.state(), CircuitState::Open);

        // Cooldown restarts from the probe failure, not the original one
        assert!(!b.should_attempt(t1 + Duration::from_secs(59)));
        assert!(b.should_attempt(t1 + Duration::from_secs(60)));
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let mut b = breaker(3, Duration::from_secs(60));
        let now = Instant::now();
        b.record_failure(now);
        b.record_failure(now);
        b.record_success();
        assert_eq!(b.consecutive_failures(), 0);

        // A fresh streak is needed to open again
        b.record_failure(now);
        b.record_failure(now);
        assert_eq!(b.state(), CircuitState::Closed);
        b.record_failure(now);
        assert_eq!(b.state(), CircuitState::Open);
    }

    #[test]
    fn test_closed_circuit_ignores_cooldown() {
        let b = breaker(3, Duration::from_secs(60));
        assert!(b.should_attempt(Instant::now()));
        assert!(b.should_attempt(Instant::now() + Duration::from_secs(3600)));
    }

    #[test]
    fn test_stats_totals_balance() {
        let stats = UsageStats::default();
        stats.record_success(Duration::from_millis(120));
        stats.record_success(Duration::from_millis(80));
        stats.record_failure();

        assert_eq!(stats.requests(), 3);
        assert_eq!(stats.successes() + stats.failures(), stats.requests());
        assert_eq!(stats.average_latency_ms(), 100);
    }

    #[test]
    fn test_average_latency_defined_without_successes() {
        let stats = UsageStats::default();
        assert_eq!(stats.average_latency_ms(), 0);
        assert_eq!(stats.uptime_percent(), 0.0);

        stats.record_failure();
        assert_eq!(stats.average_latency_ms(), 0);
        assert_eq!(stats.uptime_percent(), 0.0);
    }

    #[test]
    fn test_snapshot_serializes_circuit_state() {
        let stats = UsageStats::default();
        stats.record_success(Duration::ZERO);

        let snapshot = stats.snapshot(CircuitState::Open, 3);
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["circuit_state"], "open");
        assert_eq!(json["requests"], 1);
        assert_eq!(json["consecutive_failures"], 3);
        assert_eq!(json["uptime_percent"], 100.0);
    }
}
