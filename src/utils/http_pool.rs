use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use reqwest::Client;
use tokio::sync::{AcquireError, Semaphore, SemaphorePermit};

/// Performance metrics for monitoring outbound request behavior
#[derive(Debug, Default)]
pub struct PoolMetrics {
    /// Total number of requests made
    pub total_requests: AtomicU64,
    /// Number of successful requests
    pub successful_requests: AtomicU64,
    /// Number of failed requests
    pub failed_requests: AtomicU64,
    /// Number of currently active requests
    pub active_requests: AtomicUsize,
    /// Peak concurrent requests observed
    pub peak_concurrent: AtomicUsize,
}

impl PoolMetrics {
    /// Record the outcome of a completed request
    pub fn record(&self, success: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get a formatted summary of metrics
    pub fn summary(&self) -> String {
        let total = self.total_requests.load(Ordering::Relaxed);
        let success = self.successful_requests.load(Ordering::Relaxed);
        let failed = self.failed_requests.load(Ordering::Relaxed);
        let active = self.active_requests.load(Ordering::Relaxed);
        let peak = self.peak_concurrent.load(Ordering::Relaxed);

        format!(
            "Requests - Total: {}, Success: {}, Failed: {}, Active: {}, Peak: {}",
            total, success, failed, active, peak
        )
    }
}

/// Bounded HTTP client pool shared by all speech providers.
///
/// A single long-lived client with connection pooling is shared behind a
/// semaphore so concurrent vendor calls stay within a predictable limit.
/// Per-request timeouts are applied by the callers; the pool only owns
/// connection-level settings.
pub struct HttpPool {
    /// A single, long-lived HTTP client with connection reuse
    client: Arc<Client>,

    /// Semaphore to control concurrent access to the client
    semaphore: Arc<Semaphore>,

    /// Performance metrics
    metrics: Arc<PoolMetrics>,
}

/// A guard that holds a pool slot and releases it when dropped.
pub struct PoolGuard<'a> {
    pool: &'a HttpPool,
    client: Arc<Client>,
    _permit: SemaphorePermit<'a>,
}

impl<'a> PoolGuard<'a> {
    /// Get the HTTP client for making requests
    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl<'a> Drop for PoolGuard<'a> {
    fn drop(&mut self) {
        self.pool
            .metrics
            .active_requests
            .fetch_sub(1, Ordering::Relaxed);
    }
}

impl HttpPool {
    /// Create a pool allowing at most `max_concurrent` in-flight requests.
    pub fn new(max_concurrent: usize, connect_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client: Arc::new(client),
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            metrics: Arc::new(PoolMetrics::default()),
        })
    }

    /// Acquire a slot for one outbound request. Waits when the pool is at
    /// its concurrency limit.
    pub async fn acquire(&self) -> Result<PoolGuard<'_>, AcquireError> {
        let permit = self.semaphore.acquire().await?;

        let active = self.metrics.active_requests.fetch_add(1, Ordering::Relaxed) + 1;
        self.metrics
            .peak_concurrent
            .fetch_max(active, Ordering::Relaxed);

        Ok(PoolGuard {
            pool: self,
            client: self.client.clone(),
            _permit: permit,
        })
    }

    /// Access the request metrics
    pub fn metrics(&self) -> &PoolMetrics {
        &self.metrics
    }
}
