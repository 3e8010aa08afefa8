//! TLS Transport: connection lifecycle, hostname verification (delegated
//! to `reqwest`'s rustls backend), send with retry and failure
//! accounting.

use crate::config::PlatformConfig;
use crate::error::ThreatGuardError;
use crate::event::Event;
use flate2::write::GzEncoder;
use flate2::Compression;
use rand::Rng;
use std::io::Write;
use std::time::Duration;

const RETRY_BASE: Duration = Duration::from_secs(1);
const RETRY_CAP: Duration = Duration::from_secs(30);

pub enum SendOutcome {
    Success,
    /// Retryable due to a connection-establishment failure (never reached
    /// the server): attributed to `connection_errors`.
    RetryableConnection(ThreatGuardError),
    /// Retryable due to an HTTP status (429 or 5xx, or a timeout status):
    /// attributed to `http_errors`.
    RetryableHttp(ThreatGuardError),
    Fatal(ThreatGuardError),
}

pub struct Transport {
    client: reqwest::Client,
    config: PlatformConfig,
    /// Overrides the `https://host:port` construction in `url()` with a
    /// literal base URL. Only ever set by the scripted test constructor
    /// below, so tests can point the transport at a local mock server
    /// without a TLS cert.
    base_url_override: Option<String>,
}

impl Transport {
    pub fn new(config: PlatformConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(format!("{}/{}", crate::filter::AGENT_NAME, crate::filter::AGENT_VERSION))
            .use_rustls_tls()
            .build()?;
        Ok(Self { client, config, base_url_override: None })
    }

    #[cfg(any(test, feature = "test-support"))]
    pub fn with_base_url(config: PlatformConfig, base_url: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(format!("{}/{}", crate::filter::AGENT_NAME, crate::filter::AGENT_VERSION))
            .build()?;
        Ok(Self { client, config, base_url_override: Some(base_url.into()) })
    }

    fn url(&self) -> String {
        match &self.base_url_override {
            Some(base) => format!("{base}{}", self.config.uri),
            None => format!("https://{}:{}{}", self.config.host, self.config.port, self.config.uri),
        }
    }

    /// Serializes the batch as MessagePack, optionally gzip-compresses
    /// it (falling back to uncompressed on compression failure — never
    /// fatal, per §4.3), and POSTs it with the headers from §4.3.
    pub async fn send_batch(&self, events: &[Event]) -> SendOutcome {
        let body = match rmp_serde::to_vec(events) {
            Ok(b) => b,
            Err(e) => return SendOutcome::Fatal(ThreatGuardError::Serialization(e.to_string())),
        };

        let (body, content_encoding) = if self.config.compress {
            match gzip(&body) {
                Ok(compressed) => (compressed, Some("gzip")),
                Err(e) => {
                    tracing::warn!("gzip compression failed, sending uncompressed: {e}");
                    (body, None)
                }
            }
        } else {
            (body, None)
        };

        let mut request = self
            .client
            .post(self.url())
            .header("Content-Type", "application/msgpack")
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("X-ThreatGuard-Agent-Version", crate::filter::AGENT_VERSION)
            .header("X-ThreatGuard-Batch-Size", events.len().to_string())
            .body(body);

        if let Some(encoding) = content_encoding {
            request = request.header("Content-Encoding", encoding);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                if status.as_u16() == 200 || status.as_u16() == 202 {
                    SendOutcome::Success
                } else if status.as_u16() == 429 || status.is_server_error() {
                    SendOutcome::RetryableHttp(ThreatGuardError::Transport(format!(
                        "retryable http status {status}"
                    )))
                } else {
                    // 4xx other than 408/429 is fatal for the batch.
                    if status.as_u16() == 408 {
                        SendOutcome::RetryableHttp(ThreatGuardError::Transport(format!(
                            "request timeout status {status}"
                        )))
                    } else {
                        SendOutcome::Fatal(ThreatGuardError::Transport(format!(
                            "non-retryable http status {status}"
                        )))
                    }
                }
            }
            Err(e) => SendOutcome::RetryableConnection(ThreatGuardError::Transport(format!(
                "connection error: {e}"
            ))),
        }
    }
}

fn gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Exponential backoff, base 1s, cap 30s, jitter +/-20% (§4.3).
pub fn backoff_delay(attempt: u32) -> Duration {
    let exp = RETRY_BASE.as_millis() as u64 * 2u64.saturating_pow(attempt);
    let capped = exp.min(RETRY_CAP.as_millis() as u64);
    let jitter_fraction = rand::thread_rng().gen_range(-0.2..=0.2);
    let jittered = (capped as f64 * (1.0 + jitter_fraction)).max(0.0) as u64;
    Duration::from_millis(jittered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_stays_within_jittered_cap() {
        for attempt in 0..10 {
            let delay = backoff_delay(attempt);
            assert!(delay <= RETRY_CAP + RETRY_CAP / 5);
        }
    }

    #[test]
    fn gzip_round_trips_via_decoder() {
        let data = b"threatguard batch payload";
        let compressed = gzip(data).unwrap();
        let mut decoder = flate2::read::GzDecoder::new(&compressed[..]);
        let mut out = Vec::new();
        std::io::Read::read_to_end(&mut decoder, &mut out).unwrap();
        assert_eq!(out, data);
    }

    proptest::proptest! {
        #[test]
        fn backoff_delay_never_exceeds_jittered_cap_for_any_attempt(attempt in 0u32..1000) {
            let delay = backoff_delay(attempt);
            proptest::prop_assert!(delay <= RETRY_CAP + RETRY_CAP / 5);
        }

        #[test]
        fn gzip_round_trips_for_arbitrary_payloads(data in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..4096)) {
            let compressed = gzip(&data).unwrap();
            let mut decoder = flate2::read::GzDecoder::new(&compressed[..]);
            let mut out = Vec::new();
            std::io::Read::read_to_end(&mut decoder, &mut out).unwrap();
            proptest::prop_assert_eq!(out, data);
        }
    }
}
