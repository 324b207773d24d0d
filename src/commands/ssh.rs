use clap::Args;
use std::path::PathBuf;

use carrier::resolve::{self, TargetSource};
use carrier::run::RunReport;
use carrier::{ExecutionTarget, SshParams};

use super::{CmdResult, RunArgs};

#[derive(Args)]
pub struct SshArgs {
    /// Script to run on every host
    pub script: PathBuf,

    /// Comma-separated hosts
    #[arg(long, value_name = "HOSTS", required_unless_present = "hosts_file", conflicts_with = "hosts_file")]
    pub hosts: Option<String>,

    /// File with one host per line (# starts a comment)
    #[arg(long, value_name = "PATH")]
    pub hosts_file: Option<PathBuf>,

    /// Remote user
    #[arg(long, short = 'u')]
    pub username: Option<String>,

    /// Private key file
    #[arg(long, short = 'i', value_name = "PATH", conflicts_with = "password_prompt")]
    pub identity_file: Option<String>,

    /// Prompt once for a password used on every host (requires sshpass)
    #[arg(long)]
    pub password_prompt: bool,

    /// Remote port [default: 22]
    #[arg(long, short = 'p')]
    pub port: Option<u16>,

    /// Skip host key verification
    #[arg(long)]
    pub ignore_host_key: bool,

    /// Connection timeout in seconds [default: 10]
    #[arg(long, value_name = "SECS")]
    pub connect_timeout: Option<u32>,

    #[command(flatten)]
    pub run: RunArgs,

    /// Arguments passed to the script (after --)
    #[arg(last = true)]
    pub script_args: Vec<String>,
}

impl SshArgs {
    fn source(&self) -> TargetSource<'static> {
        match (&self.hosts, &self.hosts_file) {
            (_, Some(path)) => TargetSource::File(path.clone()),
            (Some(list), None) => TargetSource::List(list.clone()),
            (None, None) => TargetSource::List(String::new()),
        }
    }

    fn params(&self, defaults: &carrier::defaults::SshDefaults) -> carrier::Result<SshParams> {
        let password = if self.password_prompt {
            Some(crate::tty::prompt_password("SSH password: ")?)
        } else {
            None
        };

        Ok(SshParams {
            user: self.username.clone(),
            port: self.port.unwrap_or(defaults.port),
            identity_file: self.identity_file.clone(),
            password,
            strict_host_key_checking: defaults.strict_host_key_checking && !self.ignore_host_key,
            connect_timeout_secs: self.connect_timeout.unwrap_or(defaults.connect_timeout_secs),
        })
    }
}

pub fn run(args: SshArgs) -> CmdResult<RunReport> {
    let defaults = super::load_defaults();
    let job = args.run.job(&args.script, args.script_args.clone(), &defaults)?;

    let names = resolve::resolve_names(&args.source(), true)?;
    let params = args.params(&defaults.ssh)?;
    let targets = names
        .iter()
        .map(|name| ExecutionTarget::ssh(name, params.clone()))
        .collect();

    super::execute(targets, job, &args.run.options(&defaults))
}

#[cfg(test)]
mod tests {
    use super::*;
    use carrier::defaults::SshDefaults;

    fn args() -> SshArgs {
        SshArgs {
            script: PathBuf::from("collect.sh"),
            hosts: Some("web-1,web-2".to_string()),
            hosts_file: None,
            username: Some("ops".to_string()),
            identity_file: None,
            password_prompt: false,
            port: None,
            ignore_host_key: true,
            connect_timeout: None,
            run: RunArgs::default(),
            script_args: Vec::new(),
        }
    }

    #[test]
    fn params_merge_flags_and_config() {
        let params = args()
            .params(&SshDefaults {
                port: 2222,
                connect_timeout_secs: 5,
                strict_host_key_checking: true,
            })
            .unwrap();

        assert_eq!(params.user.as_deref(), Some("ops"));
        assert_eq!(params.port, 2222);
        assert_eq!(params.connect_timeout_secs, 5);
        assert!(!params.strict_host_key_checking);
        assert!(params.password.is_none());
    }

    #[test]
    fn host_list_is_the_source() {
        let names = resolve::resolve_names(&args().source(), true).unwrap();
        assert_eq!(names, vec!["web-1", "web-2"]);
    }
}
