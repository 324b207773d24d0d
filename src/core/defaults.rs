use serde::{Deserialize, Serialize};
use std::fs;

use crate::paths;

/// Root configuration structure for carrier.json
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CarrierConfig {
    #[serde(default)]
    pub defaults: Defaults,
}

/// All configurable defaults that can be overridden via carrier.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(default = "default_output_archive")]
    pub output_archive: String,

    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: String,

    #[serde(default = "default_log_file")]
    pub log_file: String,

    #[serde(default = "default_staging_root")]
    pub staging_root: String,

    #[serde(default = "default_shell")]
    pub shell: String,

    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Upper bound on in-flight pipelines. Unset means one worker per target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,

    #[serde(default = "default_ssh")]
    pub ssh: SshDefaults,

    #[serde(default = "default_kube")]
    pub kube: KubeDefaults,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output_archive: default_output_archive(),
            artifact_dir: default_artifact_dir(),
            log_file: default_log_file(),
            staging_root: default_staging_root(),
            shell: default_shell(),
            settle_delay_ms: default_settle_delay_ms(),
            max_concurrency: None,
            ssh: default_ssh(),
            kube: default_kube(),
        }
    }
}

/// Configuration for the remote-shell transport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshDefaults {
    #[serde(default = "default_ssh_port")]
    pub port: u16,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u32,

    #[serde(default = "default_strict_host_key_checking")]
    pub strict_host_key_checking: bool,
}

/// Configuration for the orchestrator transport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KubeDefaults {
    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default = "default_kubectl")]
    pub kubectl: String,
}

// =============================================================================
// Default value functions
// =============================================================================

fn default_output_archive() -> String {
    "output.tar.gz".to_string()
}

fn default_artifact_dir() -> String {
    ".".to_string()
}

fn default_log_file() -> String {
    "debug.log".to_string()
}

fn default_staging_root() -> String {
    "/tmp".to_string()
}

fn default_shell() -> String {
    "bash".to_string()
}

fn default_settle_delay_ms() -> u64 {
    1000
}

fn default_ssh() -> SshDefaults {
    SshDefaults {
        port: default_ssh_port(),
        connect_timeout_secs: default_connect_timeout(),
        strict_host_key_checking: default_strict_host_key_checking(),
    }
}

fn default_ssh_port() -> u16 {
    22
}

fn default_connect_timeout() -> u32 {
    10
}

fn default_strict_host_key_checking() -> bool {
    true
}

fn default_kube() -> KubeDefaults {
    KubeDefaults {
        namespace: default_namespace(),
        kubectl: default_kubectl(),
    }
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_kubectl() -> String {
    "kubectl".to_string()
}

// =============================================================================
// Loading functions
// =============================================================================

/// Load defaults, merging file config with built-in defaults.
/// If carrier.json is missing or invalid, silently returns built-in defaults.
pub fn load_defaults() -> Defaults {
    load_config().defaults
}

/// Load the full carrier.json config, falling back to defaults on any error.
pub fn load_config() -> CarrierConfig {
    load_config_from_file().unwrap_or_default()
}

fn load_config_from_file() -> crate::Result<CarrierConfig> {
    let path = paths::carrier_json()?;

    if !path.exists() {
        return Err(crate::Error::other("carrier.json not found"));
    }

    let content = fs::read_to_string(&path).map_err(|e| {
        crate::Error::internal_io(e.to_string(), Some(format!("read {}", path.display())))
    })?;

    parse_config(&content)
}

fn parse_config(content: &str) -> crate::Result<CarrierConfig> {
    serde_json::from_str(content).map_err(|e| {
        crate::Error::validation_invalid_json(e, Some("parse carrier.json".to_string()))
    })
}

/// Get built-in defaults (ignoring any file config)
pub fn builtin_defaults() -> Defaults {
    Defaults::default()
}
