//! macOS `Platform` implementation. Security posture is read from the
//! built-in `spctl`/`csrutil`/`fdesetup` tools via the command-runner
//! capability trait rather than linking Core Foundation directly.

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

pub struct MacosPlatform {
    commands: Arc<dyn CommandRunner>,
}

impl MacosPlatform {
    pub fn new(commands: Arc<dyn CommandRunner>) -> Self {
        Self { commands }
    }
}

#[async_trait]
impl Platform for MacosPlatform {
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
            platform_variant: detect_variant(&self.commands).await,
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

        let gatekeeper = self.commands.command_output(&["spctl", "--status"]).await;
        if gatekeeper.stdout.contains("enabled") {
            tools.push(SecurityTool {
                name: "Gatekeeper".to_string(),
                vendor: "Apple".to_string(),
                version: "Unknown".to_string(),
                tool_type: SecurityToolType::ACCESS_CONTROL,
                active: true,
                config_path: None,
                log_path: None,
            });
        }

        let sip = self.commands.command_output(&["csrutil", "status"]).await;
        if sip.stdout.contains("enabled") {
            tools.push(SecurityTool {
                name: "System Integrity Protection".to_string(),
                vendor: "Apple".to_string(),
                version: "Unknown".to_string(),
                tool_type: SecurityToolType::INTEGRITY,
                active: true,
                config_path: None,
                log_path: None,
            });
        }

        Ok(tools)
    }

    async fn detect_compliance(&self, _system: &SystemInfo) -> Compliance {
        let mut compliance = Compliance::empty();
        let filevault = self.commands.command_output(&["fdesetup", "status"]).await;
        if filevault.stdout.contains("On") {
            compliance |= Compliance::ISO27001;
        }
        compliance
    }

    async fn check_service_or_process(&self, name: &str) -> bool {
        self.commands
            .command_output(&["pgrep", "-x", name])
            .await
            .exit_code
            == 0
    }
}

async fn detect_variant(commands: &Arc<dyn CommandRunner>) -> PlatformVariant {
    let server = commands
        .command_output(&["defaults", "read", "/Library/Preferences/com.apple.serverd"])
        .await;
    if server.exit_code == 0 {
        PlatformVariant::DarwinServer
    } else {
        PlatformVariant::DarwinWorkstation
    }
}

fn gather_interfaces() -> Vec<NetworkInterface> {
    let mut interfaces = Vec::new();
    if let Ok(addrs) = if_addrs::get_if_addrs() {
        for iface in addrs {
            if iface.name == "lo0" {
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
                wired: iface.name.starts_with("en0"),
                wireless: !iface.name.starts_with("en0"),
            });
            if interfaces.len() >= 8 {
                break;
            }
        }
    }
    interfaces
}
