//! Batched Secure Egress.

mod batch;
mod health;
mod transport;

pub use batch::Batch;
pub use health::{HealthReporter, HealthSnapshot, HealthStatus};
pub use transport::{backoff_delay, SendOutcome, Transport};

use crate::config::PlatformConfig;
use crate::event::Event;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Duration;

pub struct EgressConfig {
    pub batch_size: usize,
    pub max_batch_wait: Duration,
    pub retry_limit: u32,
}

impl From<&PlatformConfig> for EgressConfig {
    fn from(p: &PlatformConfig) -> Self {
        Self {
            batch_size: p.batch_size,
            max_batch_wait: Duration::from_secs(30),
            retry_limit: p.retry_limit,
        }
    }
}

/// Owns the single in-flight batch buffer (single-writer on submit,
/// single-reader on flush, per §5) and the transport/health stack behind
/// it.
pub struct Egress {
    batch: Mutex<Batch>,
    transport: Transport,
    health: Arc<HealthReporter>,
    retry_limit: u32,
}

impl Egress {
    pub fn new(platform_config: &PlatformConfig, health: Arc<HealthReporter>) -> anyhow::Result<Self> {
        let egress_config: EgressConfig = platform_config.into();
        Ok(Self {
            batch: Mutex::new(Batch::new(egress_config.batch_size, egress_config.max_batch_wait)),
            transport: Transport::new(platform_config.clone())?,
            health,
            retry_limit: egress_config.retry_limit,
        })
    }

    /// Builds an `Egress` around an already-constructed `Transport`,
    /// bypassing the production `Transport::new` (which always dials
    /// `https://host:port`). Used to point the egress stack at a local
    /// mock server in tests.
    #[cfg(any(test, feature = "test-support"))]
    pub fn with_transport(platform_config: &PlatformConfig, transport: Transport, health: Arc<HealthReporter>) -> Self {
        let egress_config: EgressConfig = platform_config.into();
        Self {
            batch: Mutex::new(Batch::new(egress_config.batch_size, egress_config.max_batch_wait)),
            transport,
            health,
            retry_limit: egress_config.retry_limit,
        }
    }

    pub fn health(&self) -> &HealthReporter {
        &self.health
    }

    /// Appends `event` to the current batch, flushing immediately if the
    /// append crosses a flush trigger.
    pub async fn submit(&self, event: Event) {
        self.health.record_admitted(1);
        let should_flush = {
            let mut batch = self.batch.lock().await;
            batch.submit(event)
        };
        if should_flush {
            self.flush().await;
        }
    }

    /// Transmits the current batch with the retry policy in §4.3,
    /// updating health counters on the outcome.
    pub async fn flush(&self) {
        let events = {
            let mut batch = self.batch.lock().await;
            if batch.is_empty() {
                return;
            }
            batch.take()
        };
        self.send_with_retry(events).await;
    }

    /// Flushes only if the current batch has actually crossed a flush
    /// trigger (`Batch::should_flush`) — in particular §4.3's time
    /// trigger, age since the batch's first event ≥ `max_batch_wait`.
    /// Meant to be polled on a tick shorter than `max_batch_wait` itself
    /// so the age trigger fires close to its target time rather than on
    /// a coarse fixed-size tick.
    pub async fn flush_if_due(&self) {
        let events = {
            let mut batch = self.batch.lock().await;
            if !batch.should_flush() {
                return;
            }
            batch.take()
        };
        if !events.is_empty() {
            self.send_with_retry(events).await;
        }
    }

    /// Flushes any pending batch exactly once more with the normal retry
    /// policy, per the shutdown contract in §4.3.
    pub async fn shutdown(&self) {
        self.flush().await;
    }

    async fn send_with_retry(&self, events: Vec<Event>) {
        let count = events.len() as u64;
        let mut attempt = 0;

        loop {
            match self.transport.send_batch(&events).await {
                SendOutcome::Success => {
                    self.health.record_success(count);
                    return;
                }
                SendOutcome::Fatal(err) => {
                    self.health.record_http_error();
                    self.health.record_failure(count, &err);
                    tracing::warn!("batch dropped after fatal transport error: {err}");
                    return;
                }
                SendOutcome::RetryableConnection(err) => {
                    self.health.record_connection_error();
                    if !self.retry_or_give_up(&mut attempt, count, &err).await {
                        return;
                    }
                }
                SendOutcome::RetryableHttp(err) => {
                    self.health.record_http_error();
                    if !self.retry_or_give_up(&mut attempt, count, &err).await {
                        return;
                    }
                }
            }
        }
    }

    /// Shared retry bookkeeping for both retryable outcome kinds: sleeps
    /// with backoff and reports whether another attempt should be made.
    /// Returns `false` once `retry_limit` is exhausted, after recording
    /// the batch as failed.
    async fn retry_or_give_up(
        &self,
        attempt: &mut u32,
        count: u64,
        err: &crate::error::ThreatGuardError,
    ) -> bool {
        *attempt += 1;
        if *attempt >= self.retry_limit {
            self.health.record_failure(count, err);
            tracing::warn!(attempts = *attempt, "batch dropped after exhausting retry_limit: {err}");
            return false;
        }
        let delay = backoff_delay(*attempt - 1);
        tracing::debug!(attempt = *attempt, ?delay, "retrying batch send after transport error: {err}");
        tokio::time::sleep(delay).await;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    #[test]
    fn egress_config_clamps_from_platform_config() {
        let platform = PlatformConfig { batch_size: 10, retry_limit: 5, ..Default::default() };
        let cfg: EgressConfig = (&platform).into();
        assert_eq!(cfg.batch_size, 10);
        assert_eq!(cfg.retry_limit, 5);
    }

    /// Replays a fixed sequence of HTTP statuses, repeating the last one
    /// once exhausted, so a test can script an exact response sequence
    /// rather than relying on mock-priority ordering.
    struct SequenceResponder {
        statuses: Vec<u16>,
        calls: std::sync::atomic::AtomicUsize,
    }

    impl Respond for SequenceResponder {
        fn respond(&self, _request: &Request) -> ResponseTemplate {
            let i = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let status = *self.statuses.get(i).unwrap_or(self.statuses.last().unwrap());
            ResponseTemplate::new(status)
        }
    }

    #[tokio::test]
    async fn transport_retry_scenario_matches_spec() {
        // Concrete scenario 5: [500, 500, 202] with retry_limit=3 -> batch
        // marked sent; events_sent += count, consecutive_failures=0.
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(SequenceResponder {
                statuses: vec![500, 500, 202],
                calls: std::sync::atomic::AtomicUsize::new(0),
            })
            .mount(&server)
            .await;

        let platform = PlatformConfig { retry_limit: 3, compress: false, ..Default::default() };
        let transport = Transport::with_base_url(platform.clone(), server.uri()).unwrap();
        let health = Arc::new(HealthReporter::new());
        let egress = Egress::with_transport(&platform, transport, health.clone());

        egress.submit(Event::new().with_field("a", "b")).await;
        egress.flush().await;

        let snapshot = health.snapshot();
        assert_eq!(snapshot.events_sent, 1);
        assert_eq!(snapshot.consecutive_failures, 0);
        assert_eq!(snapshot.http_errors, 2);
    }

    #[tokio::test]
    async fn unhealthy_after_four_failed_batches_then_healthy_on_success() {
        // Concrete scenario 6: four successive failed batches -> unhealthy;
        // the next successful batch -> healthy. `retry_limit=1` means each
        // flush makes exactly one attempt, so one batch = one failure.
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(SequenceResponder {
                statuses: vec![503, 503, 503, 503, 202],
                calls: std::sync::atomic::AtomicUsize::new(0),
            })
            .mount(&server)
            .await;

        let platform = PlatformConfig { retry_limit: 1, compress: false, ..Default::default() };
        let transport = Transport::with_base_url(platform.clone(), server.uri()).unwrap();
        let health = Arc::new(HealthReporter::new());
        let egress = Egress::with_transport(&platform, transport, health.clone());

        for _ in 0..4 {
            egress.submit(Event::new().with_field("a", "b")).await;
            egress.flush().await;
        }
        assert_eq!(health.snapshot().status, HealthStatus::Unhealthy);

        egress.submit(Event::new().with_field("a", "b")).await;
        egress.flush().await;
        assert_eq!(health.snapshot().status, HealthStatus::Healthy);
    }
}
