//! Windows `Platform` implementation. Domain join and service presence
//! are read through the command-runner capability trait (`sc query`,
//! `wmic`-equivalent) rather than linking WMI/COM directly, keeping the
//! probe surface testable with a scripted double on any host OS.

use super::organization::Compliance;
use super::{
    platform_error, NetworkInterface, Platform, PlatformVariant, SecurityTool, SecurityToolType,
    SystemInfo,
};
use crate::commands::CommandRunner;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use sysinfo::{DiskExt, System, SystemExt};

pub struct WindowsPlatform {
    commands: Arc<dyn CommandRunner>,
}

impl WindowsPlatform {
    pub fn new(commands: Arc<dyn CommandRunner>) -> Self {
        Self { commands }
    }
}

#[async_trait]
impl Platform for WindowsPlatform {
    async fn scan_system(&self) -> Result<SystemInfo> {
        let mut sys = System::new_all();
        sys.refresh_all();

        let hostname = sys
            .host_name()
            .ok_or_else(|| platform_error("failed to resolve hostname"))?;
        if hostname.is_empty() {
            return Err(platform_error("hostname is empty"));
        }

        let free_disk_mb = sys
            .disks()
            .iter()
            .map(|d| d.available_space() / 1024 / 1024)
            .sum();

        let boot_time = chrono::DateTime::from_timestamp(sys.boot_time() as i64, 0)
            .unwrap_or_else(chrono::Utc::now);

        Ok(SystemInfo {
            hostname,
            platform_variant: detect_variant(&self.commands, &sys).await,
            os_version: sys.long_os_version().unwrap_or_else(|| "unknown".to_string()),
            architecture: std::env::consts::ARCH.to_string(),
            cpu_cores: sys.cpus().len().max(1) as u32,
            total_memory_mb: sys.total_memory() / 1024,
            free_disk_mb,
            boot_time,
            interfaces: gather_interfaces(),
        })
    }

    async fn scan_security_tools(&self) -> Result<Vec<SecurityTool>> {
        let mut tools = Vec::new();

        let defender = self
            .commands
            .command_output(&["sc", "query", "WinDefend"])
            .await;
        if defender.stdout.contains("RUNNING") {
            tools.push(SecurityTool {
                name: "Windows Defender".to_string(),
                vendor: "Microsoft".to_string(),
                version: "Unknown".to_string(),
                tool_type: SecurityToolType::ANTIVIRUS,
                active: true,
                config_path: None,
                log_path: None,
            });
        }

        let firewall = self
            .commands
            .command_output(&["sc", "query", "MpsSvc"])
            .await;
        if firewall.stdout.contains("RUNNING") {
            tools.push(SecurityTool {
                name: "Windows Firewall".to_string(),
                vendor: "Microsoft".to_string(),
                version: "Unknown".to_string(),
                tool_type: SecurityToolType::FIREWALL,
                active: true,
                config_path: None,
                log_path: None,
            });
        }

        Ok(tools)
    }

    async fn detect_compliance(&self, _system: &SystemInfo) -> Compliance {
        Compliance::empty()
    }

    async fn check_service_or_process(&self, name: &str) -> bool {
        self.commands
            .command_output(&["sc", "query", name])
            .await
            .stdout
            .contains("RUNNING")
    }
}

/// Confidence 85 per §4.1: domain-join detection via a queried DNS
/// domain name, also used to classify the platform as a server variant
/// when the host additionally reports a Server SKU.
async fn detect_variant(commands: &Arc<dyn CommandRunner>, sys: &System) -> PlatformVariant {
    let is_server = sys
        .long_os_version()
        .map(|v| v.to_lowercase().contains("server"))
        .unwrap_or(false);
    let _ = commands; // domain detection happens in organization inference
    if is_server {
        PlatformVariant::WindowsServer
    } else {
        PlatformVariant::WindowsWorkstation
    }
}

fn gather_interfaces() -> Vec<NetworkInterface> {
    let mut interfaces = Vec::new();
    if let Ok(addrs) = if_addrs::get_if_addrs() {
        for iface in addrs {
            if iface.is_loopback() {
                continue;
            }
            let address = iface.ip().to_string();
            if !NetworkInterface::is_valid_address(&address) {
                continue;
            }
            interfaces.push(NetworkInterface {
                name: iface.name.clone(),
                address,
                up: true,
                running: true,
                wired: true,
                wireless: false,
            });
            if interfaces.len() >= 8 {
                break;
            }
        }
    }
    interfaces
}
