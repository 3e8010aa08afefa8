//! Health/Stats: counters, consecutive-failure classification, snapshot
//! API.

use crate::error::LastError;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// `healthy` at 0 consecutive failures, `degraded` at 1-2, else
    /// `unhealthy` (§4.3).
    pub fn classify(consecutive_failures: u32) -> Self {
        match consecutive_failures {
            0 => HealthStatus::Healthy,
            1 | 2 => HealthStatus::Degraded,
            _ => HealthStatus::Unhealthy,
        }
    }
}

#[derive(Default)]
pub struct HealthCounters {
    pub events_sent: AtomicU64,
    pub events_failed: AtomicU64,
    pub events_in_flight: AtomicU64,
    pub events_dropped: AtomicU64,
    pub connection_errors: AtomicU64,
    pub http_errors: AtomicU64,
    pub consecutive_failures: AtomicU32,
}

pub struct HealthReporter {
    counters: HealthCounters,
    last_success: parking_lot::Mutex<Option<chrono::DateTime<chrono::Utc>>>,
    last_error: parking_lot::Mutex<Option<LastError>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub status: HealthStatus,
    pub events_sent: u64,
    pub events_failed: u64,
    pub events_in_flight: u64,
    pub events_dropped: u64,
    pub connection_errors: u64,
    pub http_errors: u64,
    pub consecutive_failures: u32,
    pub last_success: Option<chrono::DateTime<chrono::Utc>>,
    pub last_error: Option<LastError>,
}

impl HealthReporter {
    pub fn new() -> Self {
        Self {
            counters: HealthCounters::default(),
            last_success: parking_lot::Mutex::new(None),
            last_error: parking_lot::Mutex::new(None),
        }
    }

    pub fn record_admitted(&self, count: u64) {
        self.counters.events_in_flight.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_success(&self, count: u64) {
        self.counters.events_in_flight.fetch_sub(count, Ordering::Relaxed);
        self.counters.events_sent.fetch_add(count, Ordering::Relaxed);
        self.counters.consecutive_failures.store(0, Ordering::Relaxed);
        *self.last_success.lock() = Some(chrono::Utc::now());
    }

    pub fn record_failure(&self, count: u64, error: &crate::error::ThreatGuardError) {
        self.counters.events_in_flight.fetch_sub(count, Ordering::Relaxed);
        self.counters.events_failed.fetch_add(count, Ordering::Relaxed);
        self.counters.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock() = Some(LastError::from_error(error));
    }

    pub fn record_connection_error(&self) {
        self.counters.connection_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_http_error(&self) {
        self.counters.http_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self, count: u64) {
        self.counters.events_dropped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let consecutive_failures = self.counters.consecutive_failures.load(Ordering::Relaxed);
        HealthSnapshot {
            status: HealthStatus::classify(consecutive_failures),
            events_sent: self.counters.events_sent.load(Ordering::Relaxed),
            events_failed: self.counters.events_failed.load(Ordering::Relaxed),
            events_in_flight: self.counters.events_in_flight.load(Ordering::Relaxed),
            events_dropped: self.counters.events_dropped.load(Ordering::Relaxed),
            connection_errors: self.counters.connection_errors.load(Ordering::Relaxed),
            http_errors: self.counters.http_errors.load(Ordering::Relaxed),
            consecutive_failures,
            last_success: *self.last_success.lock(),
            last_error: self.last_error.lock().clone(),
        }
    }
}

impl Default for HealthReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ThreatGuardError;

    #[test]
    fn healthy_at_zero_consecutive_failures() {
        assert_eq!(HealthStatus::classify(0), HealthStatus::Healthy);
    }

    #[test]
    fn degraded_between_one_and_two() {
        assert_eq!(HealthStatus::classify(1), HealthStatus::Degraded);
        assert_eq!(HealthStatus::classify(2), HealthStatus::Degraded);
    }

    #[test]
    fn unhealthy_at_three_or_more() {
        assert_eq!(HealthStatus::classify(3), HealthStatus::Unhealthy);
        assert_eq!(HealthStatus::classify(4), HealthStatus::Unhealthy);
    }

    #[test]
    fn unhealthy_then_healthy_scenario() {
        // Concrete scenario 6: four successive connection failures ->
        // unhealthy; next success -> healthy.
        let reporter = HealthReporter::new();
        for _ in 0..4 {
            reporter.record_admitted(1);
            reporter.record_failure(1, &ThreatGuardError::Transport("connect failed".into()));
        }
        assert_eq!(reporter.snapshot().status, HealthStatus::Unhealthy);

        reporter.record_admitted(1);
        reporter.record_success(1);
        assert_eq!(reporter.snapshot().status, HealthStatus::Healthy);
    }

    #[test]
    fn admitted_equals_sent_plus_failed_plus_in_flight() {
        let reporter = HealthReporter::new();
        reporter.record_admitted(10);
        reporter.record_success(6);
        reporter.record_admitted(4);
        reporter.record_failure(4, &ThreatGuardError::Transport("timeout".into()));
        let s = reporter.snapshot();
        assert_eq!(s.events_sent + s.events_failed + s.events_in_flight, 10);
    }
}
