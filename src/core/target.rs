//! Execution targets and their transport parameters.

use serde::Serialize;

/// Remote-shell connection parameters shared by every host in a run.
#[derive(Debug, Clone, Serialize)]
pub struct SshParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_file: Option<String>,
    #[serde(skip)]
    pub password: Option<String>,
    pub strict_host_key_checking: bool,
    pub connect_timeout_secs: u32,
}

impl Default for SshParams {
    fn default() -> Self {
        Self {
            user: None,
            port: 22,
            identity_file: None,
            password: None,
            strict_host_key_checking: true,
            connect_timeout_secs: 10,
        }
    }
}

/// Orchestrator parameters shared by every pod in a run.
#[derive(Debug, Clone, Serialize)]
pub struct KubeParams {
    pub namespace: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    pub kubectl: String,
}

impl Default for KubeParams {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            context: None,
            kubeconfig: None,
            container: None,
            kubectl: "kubectl".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum TransportParams {
    Ssh(SshParams),
    Kube(KubeParams),
}

/// One host or pod a script runs against. Immutable once resolved.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionTarget {
    pub name: String,
    #[serde(flatten)]
    pub transport: TransportParams,
}

impl ExecutionTarget {
    pub fn ssh(name: impl Into<String>, params: SshParams) -> Self {
        Self {
            name: name.into(),
            transport: TransportParams::Ssh(params),
        }
    }

    pub fn kube(name: impl Into<String>, params: KubeParams) -> Self {
        Self {
            name: name.into(),
            transport: TransportParams::Kube(params),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_never_serialized() {
        let target = ExecutionTarget::ssh(
            "web-1",
            SshParams {
                password: Some("hunter2".to_string()),
                ..SshParams::default()
            },
        );
        let json = serde_json::to_string(&target).unwrap();
        assert!(json.contains("\"transport\":\"ssh\""));
        assert!(!json.contains("hunter2"));
    }
}
