//! Discovery Orchestrator: runs the probes on a schedule, composes a
//! `DiscoveryResult`, and exposes the `Idle -> Scanning -> Publishing ->
//! Idle` state machine described in §4.1.

use super::organization::{infer_from_locale, infer_from_name, Compliance};
use super::{DetectionMethod, DiscoveryResult, Organization, Platform};
use crate::event::Event;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{timeout, Duration};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DiscoveryState {
    Idle = 0,
    Scanning = 1,
    Publishing = 2,
}

impl From<u8> for DiscoveryState {
    fn from(v: u8) -> Self {
        match v {
            1 => DiscoveryState::Scanning,
            2 => DiscoveryState::Publishing,
            _ => DiscoveryState::Idle,
        }
    }
}

const SCAN_BUDGET: Duration = Duration::from_secs(15);

pub struct DiscoveryOrchestrator {
    platform: Arc<dyn Platform>,
    state: AtomicU8,
    last_result: RwLock<Option<DiscoveryResult>>,
}

impl DiscoveryOrchestrator {
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self {
            platform,
            state: AtomicU8::new(DiscoveryState::Idle as u8),
            last_result: RwLock::new(None),
        }
    }

    pub fn state(&self) -> DiscoveryState {
        DiscoveryState::from(self.state.load(Ordering::SeqCst))
    }

    pub async fn last_result(&self) -> Option<DiscoveryResult> {
        self.last_result.read().await.clone()
    }

    /// Runs one discovery cycle. If a scan is already in progress (the
    /// timer fired again before the previous cycle finished) this skips
    /// the new start and logs it, per §4.1's no-overlap rule.
    pub async fn run_cycle(&self) -> Option<DiscoveryResult> {
        if self
            .state
            .compare_exchange(
                DiscoveryState::Idle as u8,
                DiscoveryState::Scanning as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            tracing::warn!("discovery cycle skipped: previous scan still in progress");
            return None;
        }

        let result = self.scan().await;

        self.state.store(DiscoveryState::Publishing as u8, Ordering::SeqCst);
        if let Some(ref result) = result {
            *self.last_result.write().await = Some(result.clone());
            tracing::info!(
                hostname = %result.system.hostname,
                confidence = result.overall_confidence,
                "published discovery result"
            );
        }
        self.state.store(DiscoveryState::Idle as u8, Ordering::SeqCst);

        result
    }

    async fn scan(&self) -> Option<DiscoveryResult> {
        let scan_future = async {
            let system = match self.platform.scan_system().await {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!("system scan failed, aborting discovery cycle: {e}");
                    return None;
                }
            };

            let security_tools = self.platform.scan_security_tools().await.unwrap_or_else(|e| {
                tracing::warn!("security tool scan failed, continuing with empty list: {e}");
                Vec::new()
            });

            let organization = detect_organization(self.platform.as_ref(), &system).await;

            let overall_confidence = DiscoveryResult::compute_overall_confidence(
                organization.confidence,
                security_tools.len(),
            );

            Some(DiscoveryResult {
                system,
                organization,
                security_tools,
                discovery_time: chrono::Utc::now(),
                overall_confidence,
            })
        };

        match timeout(SCAN_BUDGET, scan_future).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!("discovery scan exceeded {:?} budget, aborting cycle", SCAN_BUDGET);
                None
            }
        }
    }

    /// The discovery event emitted per §4.1, for submission into the
    /// filter/egress pipeline alongside regular events.
    pub fn to_event(result: &DiscoveryResult) -> Event {
        let tools: Vec<serde_json::Value> = result
            .security_tools
            .iter()
            .map(|t| serde_json::json!({"name": t.name, "active": t.active}))
            .collect();

        Event::new()
            .with_field("timestamp", result.discovery_time.to_rfc3339())
            .with_field("event_type", "threatguard_discovery")
            .with_field("hostname", result.system.hostname.clone())
            .with_field("platform", format!("{:?}", result.system.platform_variant))
            .with_field(
                "organization",
                serde_json::json!({
                    "name": result.organization.name,
                    "id": result.organization.id,
                    "confidence": result.organization.confidence,
                }),
            )
            .with_field("security_tools", serde_json::Value::Array(tools))
            .with_field("compliance", result.organization.compliance.bits())
            .with_field("confidence", result.overall_confidence)
    }
}

/// Evaluates organization-detection methods in order, keeping the
/// highest-confidence result (§4.1).
async fn detect_organization(platform: &dyn Platform, system: &super::SystemInfo) -> Organization {
    let mut best = Organization::unknown();

    if let Some(candidate) = detect_via_domain(system) {
        if candidate.confidence > best.confidence {
            best = candidate;
        }
    }
    // Certificate, DNS, and cloud-metadata detection are not-yet-specified
    // per §4.1 and contribute confidence 0 placeholders.
    let _ = detect_via_certificates();
    let _ = detect_via_dns();
    let _ = detect_via_cloud();

    if best.confidence == 0 {
        tracing::warn!("organization detection failed, using defaults");
        return best;
    }

    let locale_compliance = std::env::var("TZ")
        .map(|tz| infer_from_locale(&tz))
        .unwrap_or_else(|_| Compliance::empty());
    best.compliance =
        platform.detect_compliance(system).await | infer_from_name(&best.name) | locale_compliance;

    tracing::info!(
        name = %best.name,
        method = ?best.detection_method,
        confidence = best.confidence,
        "organization detected"
    );

    best
}

fn detect_via_domain(_system: &super::SystemInfo) -> Option<Organization> {
    if let Ok(content) = std::fs::read_to_string("/etc/krb5.conf") {
        if let Some(realm) = parse_kerberos_realm(&content) {
            return Some(Organization {
                id: format!("krb_{realm}"),
                name: format!("{realm} Organization"),
                domain: Some(realm),
                detection_method: DetectionMethod::Domain,
                confidence: 75,
                compliance: Compliance::empty(),
            });
        }
    }

    // A configured domain hint stands in for the Windows
    // `GetComputerNameEx(ComputerNameDnsDomain)` call, which has no
    // portable equivalent reachable without platform-specific linkage.
    if let Ok(domain) = std::env::var("TG_DOMAIN_HINT") {
        return derive_windows_domain_org(&domain);
    }

    None
}

/// Pure core of the Windows domain-join branch: extracts the leading
/// label of a DNS domain as the organization name. Confidence 85 per
/// §4.1's scenario 1.
fn derive_windows_domain_org(domain: &str) -> Option<Organization> {
    let base = domain.split('.').next()?;
    if base.is_empty() {
        return None;
    }
    Some(Organization {
        id: format!("domain_{base}"),
        name: format!("{base} Organization"),
        domain: Some(domain.to_string()),
        detection_method: DetectionMethod::Domain,
        confidence: 85,
        compliance: Compliance::empty(),
    })
}

fn parse_kerberos_realm(content: &str) -> Option<String> {
    for line in content.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("default_realm") {
            let value = rest.trim_start_matches(['=', ' ', '\t']);
            if !value.is_empty() {
                return Some(value.trim().to_string());
            }
        }
    }
    None
}

fn detect_via_certificates() -> u8 {
    0
}

fn detect_via_dns() -> u8 {
    0
}

fn detect_via_cloud() -> u8 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kerberos_realm_is_parsed() {
        let content = "[libdefaults]\n default_realm = CORP.EXAMPLE\n";
        assert_eq!(parse_kerberos_realm(content), Some("CORP.EXAMPLE".to_string()));
    }

    #[test]
    fn missing_realm_yields_none() {
        assert_eq!(parse_kerberos_realm("[libdefaults]\n"), None);
    }

    #[test]
    fn windows_domain_scenario_matches_spec() {
        // Concrete scenario 1: domain "corp.example" -> name "corp
        // Organization", id "domain_corp", confidence 85.
        let org = derive_windows_domain_org("corp.example").unwrap();
        assert_eq!(org.name, "corp Organization");
        assert_eq!(org.id, "domain_corp");
        assert_eq!(org.detection_method, DetectionMethod::Domain);
        assert_eq!(org.confidence, 85);
    }

    #[test]
    fn overall_confidence_matches_literal_formula() {
        assert_eq!(DiscoveryResult::compute_overall_confidence(85, 3), 82);
        assert_eq!(DiscoveryResult::compute_overall_confidence(0, 0), 25);
    }
}
