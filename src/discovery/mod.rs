//! Discovery Engine: host identity, security tool inventory, organization
//! and compliance inference, and adaptive self-configuration.

mod linux;
mod macos;
mod organization;
mod orchestrator;
mod windows;

pub use organization::{ComplianceFramework, Compliance};
pub use orchestrator::{DiscoveryOrchestrator, DiscoveryState};

use crate::commands::CommandRunner;
use crate::error::{Result, ThreatGuardError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlatformVariant {
    WindowsServer,
    WindowsWorkstation,
    LinuxServer,
    LinuxWorkstation,
    DarwinServer,
    DarwinWorkstation,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkInterface {
    pub name: String,
    pub address: String,
    pub up: bool,
    pub running: bool,
    pub wired: bool,
    pub wireless: bool,
}

impl NetworkInterface {
    /// Per §3: addresses that are `0.0.0.0` or link-local are not valid
    /// `NetworkInterface` members.
    pub fn is_valid_address(address: &str) -> bool {
        if address == "0.0.0.0" {
            return false;
        }
        if address.starts_with("169.254.") || address.starts_with("fe80:") {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub hostname: String,
    pub platform_variant: PlatformVariant,
    pub os_version: String,
    pub architecture: String,
    pub cpu_cores: u32,
    pub total_memory_mb: u64,
    pub free_disk_mb: u64,
    pub boot_time: chrono::DateTime<chrono::Utc>,
    /// Bounded to at most 8 entries, per §3.
    pub interfaces: Vec<NetworkInterface>,
}

bitflags::bitflags! {
    #[derive(Serialize, Deserialize)]
    pub struct SecurityToolType: u32 {
        const ANTIVIRUS    = 0b0000_0001;
        const FIREWALL     = 0b0000_0010;
        const EDR          = 0b0000_0100;
        const ACCESS_CONTROL = 0b0000_1000;
        const INTEGRITY    = 0b0001_0000;
        const INTRUSION_PREVENTION = 0b0010_0000;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityTool {
    pub name: String,
    pub vendor: String,
    pub version: String,
    pub tool_type: SecurityToolType,
    pub active: bool,
    pub config_path: Option<String>,
    pub log_path: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectionMethod {
    Domain,
    Certificate,
    Dns,
    Cloud,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub domain: Option<String>,
    pub detection_method: DetectionMethod,
    pub confidence: u8,
    pub compliance: Compliance,
}

impl Organization {
    pub fn unknown() -> Self {
        Self {
            id: "unknown".to_string(),
            name: "Unknown Organization".to_string(),
            domain: None,
            detection_method: DetectionMethod::None,
            confidence: 0,
            compliance: Compliance::empty(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryResult {
    pub system: SystemInfo,
    pub organization: Organization,
    pub security_tools: Vec<SecurityTool>,
    pub discovery_time: chrono::DateTime<chrono::Utc>,
    pub overall_confidence: u8,
}

impl DiscoveryResult {
    /// `overall_confidence = (org_confidence + (tool_count > 0 ? 80 : 50)) / 2`,
    /// preserved literally from the source even though it biases toward the
    /// 40-90 range regardless of tool diversity (§9 Design Notes).
    pub fn compute_overall_confidence(org_confidence: u8, tool_count: usize) -> u8 {
        let tool_component: u16 = if tool_count > 0 { 80 } else { 50 };
        ((org_confidence as u16 + tool_component) / 2) as u8
    }
}

/// Capability-set implemented once per OS; the orchestrator holds a single
/// boxed instance chosen at startup from the running platform.
#[async_trait]
pub trait Platform: Send + Sync {
    async fn scan_system(&self) -> Result<SystemInfo>;
    async fn scan_security_tools(&self) -> Result<Vec<SecurityTool>>;
    async fn detect_compliance(&self, system: &SystemInfo) -> Compliance;
    async fn check_service_or_process(&self, name: &str) -> bool;
}

/// Selects the concrete `Platform` implementation for the OS this process
/// is actually running on. Kept as a single dispatch point rather than
/// scattering `cfg!` checks through the rest of the crate.
pub fn detect_platform(commands: Arc<dyn CommandRunner>) -> Arc<dyn Platform> {
    if cfg!(target_os = "windows") {
        Arc::new(windows::WindowsPlatform::new(commands))
    } else if cfg!(target_os = "macos") {
        Arc::new(macos::MacosPlatform::new(commands))
    } else {
        Arc::new(linux::LinuxPlatform::new(commands))
    }
}

pub(crate) fn platform_error(msg: impl Into<String>) -> ThreatGuardError {
    ThreatGuardError::Probe(msg.into())
}
