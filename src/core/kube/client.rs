use serde::Deserialize;
use std::path::Path;

use crate::error::{Error, Result};
use crate::target::KubeParams;
use crate::transport::{self, Invocation, Transport};

/// Orchestrator client driving the `kubectl` binary.
#[derive(Debug, Clone)]
pub struct KubeClient {
    pub params: KubeParams,
}

#[derive(Debug, Deserialize)]
struct PodList {
    #[serde(default)]
    items: Vec<PodItem>,
}

#[derive(Debug, Deserialize)]
struct PodItem {
    metadata: PodMetadata,
}

#[derive(Debug, Deserialize)]
struct PodMetadata {
    name: String,
}

impl KubeClient {
    pub fn new(params: KubeParams) -> Self {
        Self { params }
    }

    /// Global flags selecting the cluster.
    fn base_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(kubeconfig) = &self.params.kubeconfig {
            args.push("--kubeconfig".to_string());
            args.push(kubeconfig.clone());
        }
        if let Some(context) = &self.params.context {
            args.push("--context".to_string());
            args.push(context.clone());
        }
        args
    }

    fn container_args(&self) -> Vec<String> {
        match &self.params.container {
            Some(container) => vec!["-c".to_string(), container.clone()],
            None => Vec::new(),
        }
    }

    /// Names of pods matching a label selector, in the order the API returns them.
    pub fn list_pods(&self, selector: &str) -> Result<Vec<String>> {
        let mut args = self.base_args();
        args.extend([
            "get".to_string(),
            "pods".to_string(),
            "-n".to_string(),
            self.params.namespace.clone(),
            "-l".to_string(),
            selector.to_string(),
            "-o".to_string(),
            "json".to_string(),
        ]);

        let invocation = transport::run_process(&self.params.kubectl, &args, &[]);
        if !invocation.output.success {
            return Err(Error::resolution_failed(
                format!("labels {}", selector),
                format!(
                    "`{}` exited {}: {}",
                    invocation.command_line,
                    invocation.output.exit_code,
                    invocation.output.stderr.trim()
                ),
            ));
        }

        parse_pod_names(&invocation.output.stdout)
    }

    /// Bind this client to one pod.
    pub fn pod(&self, name: &str) -> KubePod {
        KubePod {
            client: self.clone(),
            name: name.to_string(),
        }
    }
}

fn parse_pod_names(json: &str) -> Result<Vec<String>> {
    let list: PodList = serde_json::from_str(json)
        .map_err(|e| Error::resolution_failed("labels", format!("invalid pod list: {}", e)))?;
    Ok(list.items.into_iter().map(|item| item.metadata.name).collect())
}

/// A [`KubeClient`] bound to a single pod.
#[derive(Debug, Clone)]
pub struct KubePod {
    client: KubeClient,
    pub name: String,
}

impl KubePod {
    fn remote_ref(&self, path: &str) -> String {
        format!("{}/{}:{}", self.client.params.namespace, self.name, path)
    }

    fn exec_args(&self, command: &str) -> Vec<String> {
        let mut args = self.client.base_args();
        args.extend([
            "exec".to_string(),
            "-n".to_string(),
            self.client.params.namespace.clone(),
            self.name.clone(),
        ]);
        args.extend(self.client.container_args());
        args.extend([
            "--".to_string(),
            "sh".to_string(),
            "-c".to_string(),
            command.to_string(),
        ]);
        args
    }

    fn cp_args(&self, from: String, to: String) -> Vec<String> {
        let mut args = self.client.base_args();
        args.extend(["cp".to_string(), from, to]);
        args.extend(self.client.container_args());
        args
    }
}

impl Transport for KubePod {
    fn run(&self, command: &str) -> Invocation {
        transport::run_process(&self.client.params.kubectl, &self.exec_args(command), &[])
    }

    fn upload(&self, local_path: &Path, remote_path: &str) -> Invocation {
        let args = self.cp_args(
            local_path.to_string_lossy().to_string(),
            self.remote_ref(remote_path),
        );
        transport::run_process(&self.client.params.kubectl, &args, &[])
    }

    fn download(&self, remote_path: &str, local_path: &Path) -> Invocation {
        let args = self.cp_args(
            self.remote_ref(remote_path),
            local_path.to_string_lossy().to_string(),
        );
        transport::run_process(&self.client.params.kubectl, &args, &[])
    }
}
