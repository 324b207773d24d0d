use clap::Args;
use std::path::PathBuf;

use carrier::kube::KubeClient;
use carrier::resolve::{self, TargetSource};
use carrier::run::RunReport;
use carrier::{ExecutionTarget, KubeParams};

use super::{CmdResult, RunArgs};

#[derive(Args)]
pub struct KubeArgs {
    /// Script to run in every matching pod
    pub script: PathBuf,

    /// Label selector, e.g. app=web,tier=frontend
    #[arg(long, short = 'l')]
    pub labels: String,

    /// Namespace [default: default]
    #[arg(long, short = 'n')]
    pub namespace: Option<String>,

    /// kubeconfig context
    #[arg(long)]
    pub context: Option<String>,

    /// kubeconfig file
    #[arg(long, value_name = "PATH")]
    pub kubeconfig: Option<String>,

    /// Container within each pod
    #[arg(long, short = 'c')]
    pub container: Option<String>,

    /// kubectl binary [default: kubectl]
    #[arg(long, value_name = "PATH")]
    pub kubectl: Option<String>,

    #[command(flatten)]
    pub run: RunArgs,

    /// Arguments passed to the script (after --)
    #[arg(last = true)]
    pub script_args: Vec<String>,
}

impl KubeArgs {
    fn params(&self, defaults: &carrier::defaults::KubeDefaults) -> KubeParams {
        KubeParams {
            namespace: self
                .namespace
                .clone()
                .unwrap_or_else(|| defaults.namespace.clone()),
            context: self.context.clone(),
            kubeconfig: self
                .kubeconfig
                .as_deref()
                .map(|path| shellexpand::tilde(path).to_string()),
            container: self.container.clone(),
            kubectl: self
                .kubectl
                .clone()
                .unwrap_or_else(|| defaults.kubectl.clone()),
        }
    }
}

pub fn run(args: KubeArgs) -> CmdResult<RunReport> {
    let defaults = super::load_defaults();
    let job = args.run.job(&args.script, args.script_args.clone(), &defaults)?;

    let params = args.params(&defaults.kube);
    let client = KubeClient::new(params.clone());
    let source = TargetSource::Labels {
        selector: args.labels.clone(),
        lister: &client,
    };
    let targets = resolve::resolve(&source, true, |name| {
        ExecutionTarget::kube(name, params.clone())
    })?;

    super::execute(targets, job, &args.run.options(&defaults))
}

#[cfg(test)]
mod tests {
    use super::*;
    use carrier::defaults::KubeDefaults;

    #[test]
    fn params_fall_back_to_config() {
        let args = KubeArgs {
            script: PathBuf::from("collect.sh"),
            labels: "app=web".to_string(),
            namespace: None,
            context: Some("prod".to_string()),
            kubeconfig: None,
            container: None,
            kubectl: None,
            run: RunArgs::default(),
            script_args: Vec::new(),
        };
        let params = args.params(&KubeDefaults {
            namespace: "ops".to_string(),
            kubectl: "/usr/local/bin/kubectl".to_string(),
        });

        assert_eq!(params.namespace, "ops");
        assert_eq!(params.kubectl, "/usr/local/bin/kubectl");
        assert_eq!(params.context.as_deref(), Some("prod"));
    }
}
