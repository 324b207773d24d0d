use crate::error::{Error, Result};
use crate::target::SshParams;
use crate::transport::{self, Invocation, Transport};
use std::path::Path;

/// Remote-shell client for one host, driving the system `ssh`/`scp` binaries.
pub struct SshClient {
    pub host: String,
    pub user: Option<String>,
    pub port: u16,
    pub identity_file: Option<String>,
    password: Option<String>,
    pub strict_host_key_checking: bool,
    pub connect_timeout_secs: u32,
    /// When true, all commands run locally instead of over SSH.
    /// Set automatically when the host is localhost/127.0.0.1/::1.
    pub is_local: bool,
}

impl SshClient {
    pub fn from_params(host: &str, params: &SshParams) -> Result<Self> {
        let identity_file = match &params.identity_file {
            Some(path) if !path.is_empty() => {
                let expanded = shellexpand::tilde(path).to_string();
                if !Path::new(&expanded).exists() {
                    return Err(Error::ssh_identity_file_not_found(host, expanded));
                }
                Some(expanded)
            }
            _ => None,
        };

        let is_local = is_local_host(host);
        if is_local {
            log_status!("ssh", "Target '{}' is localhost, using local execution", host);
        }

        Ok(Self {
            host: host.to_string(),
            user: params.user.clone().filter(|u| !u.is_empty()),
            port: params.port,
            identity_file,
            password: params.password.clone().filter(|p| !p.is_empty()),
            strict_host_key_checking: params.strict_host_key_checking,
            connect_timeout_secs: params.connect_timeout_secs,
            is_local,
        })
    }

    fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, self.host),
            None => self.host.clone(),
        }
    }

    fn scp_remote(&self, remote_path: &str) -> String {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        match &self.user {
            Some(user) => format!("{}@{}:{}", user, host, remote_path),
            None => format!("{}:{}", host, remote_path),
        }
    }

    /// Options shared by ssh and scp. `scp` spells the port flag `-P`.
    pub fn build_options(&self, for_scp: bool) -> Vec<String> {
        let mut args = Vec::new();

        if for_scp {
            args.push("-q".to_string());
        }

        if let Some(identity_file) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity_file.clone());
        }

        if self.port != 22 {
            args.push(if for_scp { "-P" } else { "-p" }.to_string());
            args.push(self.port.to_string());
        }

        // Password auth needs the prompt that BatchMode would suppress.
        if self.password.is_none() {
            args.extend(["-o".to_string(), "BatchMode=yes".to_string()]);
        }

        args.extend([
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout_secs),
        ]);

        if !self.strict_host_key_checking {
            args.extend([
                "-o".to_string(),
                "StrictHostKeyChecking=no".to_string(),
                "-o".to_string(),
                "UserKnownHostsFile=/dev/null".to_string(),
            ]);
        }

        args
    }

    /// Spawn ssh or scp, going through `sshpass -e` when a password is set.
    fn spawn(&self, program: &str, args: Vec<String>) -> Invocation {
        match &self.password {
            Some(password) => {
                let mut wrapped = vec!["-e".to_string(), program.to_string()];
                wrapped.extend(args);
                transport::run_process("sshpass", &wrapped, &[("SSHPASS", password.as_str())])
            }
            None => transport::run_process(program, &args, &[]),
        }
    }
}

impl Transport for SshClient {
    fn run(&self, command: &str) -> Invocation {
        if self.is_local {
            return transport::run_local_shell(command);
        }

        let mut args = self.build_options(false);
        args.push(self.destination());
        args.push(command.to_string());
        self.spawn("ssh", args)
    }

    fn upload(&self, local_path: &Path, remote_path: &str) -> Invocation {
        if self.is_local {
            return transport::copy_local(local_path, Path::new(remote_path));
        }

        let mut args = self.build_options(true);
        args.push(local_path.to_string_lossy().to_string());
        args.push(self.scp_remote(remote_path));
        self.spawn("scp", args)
    }

    fn download(&self, remote_path: &str, local_path: &Path) -> Invocation {
        if self.is_local {
            return transport::copy_local(Path::new(remote_path), local_path);
        }

        let mut args = self.build_options(true);
        args.push(self.scp_remote(remote_path));
        args.push(local_path.to_string_lossy().to_string());
        self.spawn("scp", args)
    }
}

/// Check if a host address refers to the local machine.
pub fn is_local_host(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(params: SshParams) -> SshClient {
        SshClient::from_params("web-1", &params).unwrap()
    }

    #[test]
    fn key_auth_uses_batch_mode() {
        let opts = client(SshParams::default()).build_options(false);
        assert_eq!(
            opts,
            vec!["-o", "BatchMode=yes", "-o", "ConnectTimeout=10"]
        );
    }

    #[test]
    fn ignore_host_key_disables_known_hosts() {
        let opts = client(SshParams {
            strict_host_key_checking: false,
            ..SshParams::default()
        })
        .build_options(false);
        assert!(opts.contains(&"StrictHostKeyChecking=no".to_string()));
        assert!(opts.contains(&"UserKnownHostsFile=/dev/null".to_string()));
    }

    #[test]
    fn port_flag_differs_for_scp() {
        let c = client(SshParams {
            port: 2222,
            ..SshParams::default()
        });
        let ssh = c.build_options(false);
        let scp = c.build_options(true);
        assert!(ssh.windows(2).any(|w| w == ["-p", "2222"]));
        assert!(scp.windows(2).any(|w| w == ["-P", "2222"]));
        assert_eq!(scp[0], "-q");
    }

    #[test]
    fn password_auth_drops_batch_mode() {
        let opts = client(SshParams {
            password: Some("secret".to_string()),
            ..SshParams::default()
        })
        .build_options(false);
        assert!(!opts.contains(&"BatchMode=yes".to_string()));
        assert!(!opts.iter().any(|o| o.contains("secret")));
    }

    #[test]
    fn destination_includes_user() {
        let c = client(SshParams {
            user: Some("ops".to_string()),
            ..SshParams::default()
        });
        assert_eq!(c.destination(), "ops@web-1");
        assert_eq!(c.scp_remote("/tmp/x"), "ops@web-1:/tmp/x");
    }

    #[test]
    fn missing_identity_file_is_an_error() {
        let err = SshClient::from_params(
            "web-1",
            &SshParams {
                identity_file: Some("/nonexistent/carrier_key".to_string()),
                ..SshParams::default()
            },
        )
        .err()
        .unwrap();
        assert_eq!(err.code, crate::ErrorCode::SshIdentityFileNotFound);
    }

    #[test]
    fn loopback_hosts_run_locally() {
        assert!(is_local_host("localhost"));
        assert!(is_local_host("::1"));
        assert!(!is_local_host("web-1"));
        let c = SshClient::from_params("127.0.0.1", &SshParams::default()).unwrap();
        assert!(c.is_local);
    }
}
