//! Layered configuration: built-in defaults, optional JSON file, then
//! `TG_`-prefixed environment variables (highest precedence), matching the
//! Platform/Discovery/Security/Logging/Performance key groups.

use crate::error::{ThreatGuardError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub host: String,
    pub port: u16,
    pub uri: String,
    pub api_key: String,
    pub batch_size: usize,
    pub timeout_seconds: u64,
    pub retry_limit: u32,
    pub compress: bool,
    pub tls_verify: bool,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            host: "ingest.threatguard.example".to_string(),
            port: 443,
            uri: "/v2/events".to_string(),
            api_key: String::new(),
            batch_size: 1000,
            timeout_seconds: 30,
            retry_limit: 3,
            compress: true,
            tls_verify: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
    pub detect_organization: bool,
    pub detect_compliance: bool,
    pub include_network_info: bool,
    pub config_path: Option<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 300,
            detect_organization: true,
            detect_compliance: true,
            include_network_info: true,
            config_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub enabled: bool,
    pub rules_file: Option<String>,
    pub enable_threat_intel: bool,
    pub enable_behavioral_analysis: bool,
    pub drop_noise: bool,
    pub max_rules: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rules_file: None,
            enable_threat_intel: true,
            enable_behavioral_analysis: true,
            drop_noise: true,
            max_rules: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file_path: Option<String>,
    pub console_output: bool,
    pub max_file_size_mb: u64,
    pub max_files: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_path: None,
            console_output: true,
            max_file_size_mb: 100,
            max_files: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    pub max_memory_mb: u64,
    pub max_cpu_percent: u32,
    pub enable_profiling: bool,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            max_memory_mb: 64,
            max_cpu_percent: 5,
            enable_profiling: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AgentConfig {
    pub platform: PlatformConfig,
    pub discovery: DiscoveryConfig,
    pub security: SecurityConfig,
    pub logging: LoggingConfig,
    pub performance: PerformanceConfig,
    /// Not part of the recognized external key groups; derived adaptively
    /// from compliance signals in a `DiscoveryResult` (§4.1).
    pub enable_encryption: bool,
    pub retention_days: u32,
}

impl AgentConfig {
    /// Loads defaults, merges an optional JSON file, then merges `TG_`
    /// environment overrides. A missing `path` is not an error; a present
    /// but unparsable file is.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&AgentConfig::default()).map_err(|e| {
                ThreatGuardError::Config(format!("failed to seed defaults: {e}"))
            })?);

        if let Some(path) = path {
            if path.exists() {
                builder = builder.add_source(config::File::from(path));
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix("TG")
                .separator("__")
                .try_parsing(true),
        );

        let settled = builder
            .build()
            .map_err(|e| ThreatGuardError::Config(format!("failed to build configuration: {e}")))?;

        settled
            .try_deserialize()
            .map_err(|e| ThreatGuardError::Config(format!("failed to deserialize configuration: {e}")))
    }

    /// Applies the adaptive-config derivations from a `DiscoveryResult`,
    /// returning a new config rather than mutating in place so a reload
    /// always starts from the previously-valid configuration.
    pub fn adapt_from_discovery(&self, result: &crate::discovery::DiscoveryResult) -> Self {
        let mut cfg = self.clone();
        let system = &result.system;

        if system.total_memory_mb < 2048 {
            cfg.performance.max_memory_mb = 32;
            cfg.platform.batch_size = 50;
        } else if system.total_memory_mb > 8192 {
            cfg.performance.max_memory_mb = 128;
            cfg.platform.batch_size = 500;
        }

        if system.cpu_cores > 8 {
            cfg.performance.max_cpu_percent = 10;
        } else if system.cpu_cores < 4 {
            cfg.performance.max_cpu_percent = 2;
        }

        let active_tools = result.security_tools.iter().filter(|t| t.active).count();
        if active_tools >= 3 {
            cfg.performance.max_cpu_percent = cfg.performance.max_cpu_percent.saturating_sub(1).max(1);
            cfg.discovery.interval_seconds = 120;
        }

        use crate::discovery::ComplianceFramework as CF;
        let compliance = result.organization.compliance;
        if compliance.contains(CF::PciDss) {
            cfg.enable_encryption = true;
            cfg.retention_days = 365;
            cfg.discovery.interval_seconds = 30;
        }
        if compliance.contains(CF::Hipaa) {
            cfg.enable_encryption = true;
            cfg.retention_days = cfg.retention_days.max(2190);
        }
        if compliance.contains(CF::Sox) {
            cfg.enable_encryption = true;
            cfg.retention_days = cfg.retention_days.max(2555);
        }

        cfg
    }
}
