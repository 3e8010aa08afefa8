//! Linux `Platform` implementation: `/proc`/`/sys` for system info,
//! well-known install paths for the security tool catalog, `/etc/krb5.conf`
//! for domain-join detection.

use super::organization::Compliance;
use super::{
    platform_error, NetworkInterface, Platform, PlatformVariant, SecurityTool, SecurityToolType,
    SystemInfo,
};
use crate::commands::CommandRunner;
use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use sysinfo::{DiskExt, System, SystemExt};

pub struct LinuxPlatform {
    commands: Arc<dyn CommandRunner>,
}

impl LinuxPlatform {
    pub fn new(commands: Arc<dyn CommandRunner>) -> Self {
        Self { commands }
    }
}

/// (binary-present path, name, vendor, config path, log path) — the
/// subset of the reference scanner's catalog kept here; see SPEC_FULL.md
/// §4.1 for the full list this is grounded on.
const CATALOG: &[(&str, &str, &str, SecurityToolType, &str, Option<&str>)] = &[
    ("/etc/clamav", "ClamAV", "Cisco", SecurityToolType::ANTIVIRUS, "/etc/clamav", Some("/var/log/clamav")),
    ("/opt/sophos-av/etc", "Sophos Antivirus", "Sophos", SecurityToolType::ANTIVIRUS, "/opt/sophos-av/etc", Some("/opt/sophos-av/log")),
    ("/etc/opt/eset/esets", "ESET Security", "ESET", SecurityToolType::ANTIVIRUS, "/etc/opt/eset/esets", Some("/var/log/eset")),
    ("/opt/BitDefender-scanner/etc", "Bitdefender Scanner", "Bitdefender", SecurityToolType::ANTIVIRUS, "/opt/BitDefender-scanner/etc", None),
    ("/opt/CrowdStrike", "CrowdStrike Falcon", "CrowdStrike", SecurityToolType::EDR, "/opt/CrowdStrike", None),
    ("/opt/sentinelone", "SentinelOne", "SentinelOne", SecurityToolType::EDR, "/opt/sentinelone", None),
    ("/opt/carbonblack/psc", "Carbon Black", "VMware", SecurityToolType::EDR, "/opt/carbonblack/psc", None),
    ("/etc/opt/microsoft/mdatp", "Microsoft Defender ATP", "Microsoft", SecurityToolType::EDR, "/etc/opt/microsoft/mdatp", None),
    ("/etc/iptables", "iptables", "Netfilter", SecurityToolType::FIREWALL, "/etc/iptables", None),
    ("/etc/apparmor.d", "AppArmor", "Canonical", SecurityToolType::ACCESS_CONTROL, "/etc/apparmor.d", None),
    ("/etc/selinux", "SELinux", "NSA/Red Hat", SecurityToolType::ACCESS_CONTROL, "/etc/selinux", None),
    ("/etc/fail2ban", "Fail2ban", "Fail2ban Community", SecurityToolType::INTRUSION_PREVENTION, "/etc/fail2ban", Some("/var/log/fail2ban.log")),
    ("/etc/aide.conf", "AIDE", "AIDE Community", SecurityToolType::INTEGRITY, "/etc/aide.conf", None),
];

#[async_trait]
impl Platform for LinuxPlatform {
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

        let interfaces = gather_interfaces();

        Ok(SystemInfo {
            hostname,
            platform_variant: detect_variant(&self.commands).await,
            os_version: sys
                .long_os_version()
                .unwrap_or_else(|| "unknown".to_string()),
            architecture: std::env::consts::ARCH.to_string(),
            cpu_cores: sys.cpus().len().max(1) as u32,
            total_memory_mb: sys.total_memory() / 1024,
            free_disk_mb,
            boot_time,
            interfaces,
        })
    }

    async fn scan_security_tools(&self) -> Result<Vec<SecurityTool>> {
        let mut tools = Vec::new();
        for (marker_path, name, vendor, tool_type, config_path, log_path) in CATALOG {
            if Path::new(marker_path).exists() {
                tools.push(SecurityTool {
                    name: name.to_string(),
                    vendor: vendor.to_string(),
                    version: "Unknown".to_string(),
                    tool_type: *tool_type,
                    active: true,
                    config_path: Some(config_path.to_string()),
                    log_path: log_path.map(|s| s.to_string()),
                });
            }
        }
        Ok(tools)
    }

    async fn detect_compliance(&self, _system: &SystemInfo) -> Compliance {
        let mut compliance = Compliance::empty();
        if Path::new("/etc/selinux/config").exists() {
            compliance |= Compliance::NIST;
        }
        compliance
    }

    async fn check_service_or_process(&self, name: &str) -> bool {
        let out = self
            .commands
            .command_output(&["systemctl", "is-active", name])
            .await;
        out.exit_code == 0 || out.stdout.trim() == "active"
    }
}

async fn detect_variant(commands: &Arc<dyn CommandRunner>) -> PlatformVariant {
    // A host running common server-role units is treated as a server
    // variant; desktop session managers indicate a workstation. A host
    // with neither signal (e.g. a minimal headless install or
    // container) is ambiguous rather than assumed to be a workstation.
    for unit in ["sshd", "httpd", "nginx", "postgresql"] {
        if commands.command_output(&["systemctl", "is-active", unit]).await.exit_code == 0 {
            return PlatformVariant::LinuxServer;
        }
    }
    if Path::new("/usr/bin/gnome-shell").exists() || Path::new("/usr/bin/plasmashell").exists() {
        return PlatformVariant::LinuxWorkstation;
    }
    PlatformVariant::Unknown
}

fn gather_interfaces() -> Vec<NetworkInterface> {
    let mut interfaces = Vec::new();
    if let Ok(addrs) = if_addrs::get_if_addrs() {
        for iface in addrs {
            if iface.name == "lo" {
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
                wired: !iface.name.starts_with("wl"),
                wireless: iface.name.starts_with("wl"),
            });
            if interfaces.len() >= 8 {
                break;
            }
        }
    }
    interfaces
}
