//! Remote session adapter: the stage/push/exec/archive/retrieve/cleanup
//! operations a pipeline drives against one target.

use serde::Serialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::{Error, Result, StageFailedDetails};
use crate::kube::{KubeClient, KubePod};
use crate::paths;
use crate::ssh::SshClient;
use crate::target::{ExecutionTarget, TransportParams};
use crate::transcript::Transcript;
use crate::transport::{Invocation, Transport};
use crate::utils::shell;

/// Remote working directory owned by exactly one pipeline invocation.
#[derive(Debug, Clone, Serialize)]
pub struct StagingHandle {
    pub root: String,
    pub dir: String,
    pub script_name: String,
    pub archive_name: String,
}

impl StagingHandle {
    /// Allocate a unique directory name under `root`. Nothing is created remotely.
    pub fn allocate(root: &str, target: &str, script_name: &str) -> Self {
        let root = match root.trim_end_matches('/') {
            "" => "/".to_string(),
            trimmed => trimmed.to_string(),
        };
        let dir = format!("{}/carrier-{}", root.trim_end_matches('/'), Uuid::new_v4());

        Self {
            root,
            dir,
            script_name: script_name.to_string(),
            archive_name: paths::artifact_file_name(target),
        }
    }

    pub fn script_path(&self) -> String {
        format!("{}/{}", self.dir, self.script_name)
    }

    pub fn archive_path(&self) -> String {
        format!("{}/{}", self.dir, self.archive_name)
    }

    /// Local name a download is written under until it is complete.
    pub fn partial_name(&self) -> String {
        format!("{}.part", self.archive_name)
    }
}

/// Capability surface a pipeline needs from a transport.
///
/// Every failure is a single error carrying the failing stage and the captured
/// output; `cleanup` failures are reported but callers must never escalate them.
pub trait RemoteSession: Send {
    fn target(&self) -> &str;

    /// Create the staging directory after confirming its root is writable.
    fn stage(&self, handle: &StagingHandle, log: &mut Transcript) -> Result<()>;

    /// Upload the script into the staging directory. Returns its remote path.
    fn push(&self, handle: &StagingHandle, script: &Path, log: &mut Transcript) -> Result<String>;

    /// Run the script under `shell` with the staging directory as working directory.
    fn exec(
        &self,
        handle: &StagingHandle,
        shell: &str,
        remote_script: &str,
        args: &[String],
        log: &mut Transcript,
    ) -> Result<()>;

    /// Compress everything the script left behind. Returns the remote archive path.
    fn archive(&self, handle: &StagingHandle, log: &mut Transcript) -> Result<String>;

    /// Copy the remote archive into `artifact_dir`. Returns the local path.
    fn retrieve(
        &self,
        handle: &StagingHandle,
        artifact_dir: &Path,
        log: &mut Transcript,
    ) -> Result<PathBuf>;

    /// Remove the staging directory.
    fn cleanup(&self, handle: &StagingHandle, log: &mut Transcript) -> Result<()>;
}

/// Builds one session per target. Shared by every worker of a run.
pub trait SessionFactory: Send + Sync {
    fn open(&self, target: &ExecutionTarget) -> Result<Box<dyn RemoteSession>>;
}

/// [`RemoteSession`] over any [`Transport`]; every step is a shell command or a copy.
pub struct TransportSession<T: Transport> {
    target: String,
    transport: T,
}

pub type SshSession = TransportSession<SshClient>;
pub type KubeSession = TransportSession<KubePod>;

impl<T: Transport> TransportSession<T> {
    pub fn new(target: impl Into<String>, transport: T) -> Self {
        Self {
            target: target.into(),
            transport,
        }
    }

    fn ensure(&self, stage: &str, invocation: Invocation, log: &mut Transcript) -> Result<Invocation> {
        log.record(stage, &invocation);
        if invocation.output.success {
            return Ok(invocation);
        }

        Err(Error::stage_failed(StageFailedDetails {
            target: self.target.clone(),
            stage: stage.to_string(),
            command: invocation.command_line.clone(),
            exit_code: invocation.output.exit_code,
            output: invocation.output.combined(),
        }))
    }
}

impl<T: Transport> RemoteSession for TransportSession<T> {
    fn target(&self) -> &str {
        &self.target
    }

    fn stage(&self, handle: &StagingHandle, log: &mut Transcript) -> Result<()> {
        let check = self.transport.run(&format!(
            "test -d {root} && test -w {root}",
            root = shell::quote_path(&handle.root)
        ));
        log.record("stage", &check);
        if !check.output.success {
            return Err(Error::permission_denied(
                &self.target,
                &handle.root,
                check.output.combined(),
            ));
        }

        let mkdir = self
            .transport
            .run(&format!("mkdir -p {}", shell::quote_path(&handle.dir)));
        self.ensure("stage", mkdir, log)?;
        Ok(())
    }

    fn push(&self, handle: &StagingHandle, script: &Path, log: &mut Transcript) -> Result<String> {
        let remote_script = handle.script_path();

        let upload = self.transport.upload(script, &remote_script);
        self.ensure("push", upload, log)?;

        let chmod = self
            .transport
            .run(&format!("chmod +x {}", shell::quote_path(&remote_script)));
        self.ensure("push", chmod, log)?;

        Ok(remote_script)
    }

    fn exec(
        &self,
        handle: &StagingHandle,
        shell_name: &str,
        remote_script: &str,
        args: &[String],
        log: &mut Transcript,
    ) -> Result<()> {
        let mut command = format!(
            "cd {} && {} {}",
            shell::quote_path(&handle.dir),
            shell::quote_arg(shell_name),
            shell::quote_path(remote_script)
        );
        if !args.is_empty() {
            command.push(' ');
            command.push_str(&shell::quote_args(args));
        }

        let run = self.transport.run(&command);
        self.ensure("exec", run, log)?;
        Ok(())
    }

    fn archive(&self, handle: &StagingHandle, log: &mut Transcript) -> Result<String> {
        let command = format!(
            "cd {} && tar -czf {} --exclude={} --exclude={} .",
            shell::quote_path(&handle.dir),
            shell::quote_arg(&handle.archive_name),
            shell::quote_arg(&format!("./{}", handle.archive_name)),
            shell::quote_arg(&format!("./{}", handle.script_name)),
        );

        let run = self.transport.run(&command);
        self.ensure("archive", run, log)?;
        Ok(handle.archive_path())
    }

    fn retrieve(
        &self,
        handle: &StagingHandle,
        artifact_dir: &Path,
        log: &mut Transcript,
    ) -> Result<PathBuf> {
        let local_path = artifact_dir.join(&handle.archive_name);
        let partial_path = artifact_dir.join(handle.partial_name());
        let download = self.transport.download(&handle.archive_path(), &partial_path);
        let download = self.ensure("retrieve", download, log)?;

        if !partial_path.is_file() {
            return Err(Error::stage_failed(StageFailedDetails {
                target: self.target.clone(),
                stage: "retrieve".to_string(),
                command: download.command_line,
                exit_code: download.output.exit_code,
                output: format!("{} was not created", partial_path.display()),
            }));
        }

        std::fs::rename(&partial_path, &local_path).map_err(|e| {
            Error::stage_failed(StageFailedDetails {
                target: self.target.clone(),
                stage: "retrieve".to_string(),
                command: format!("rename {} {}", partial_path.display(), local_path.display()),
                exit_code: -1,
                output: e.to_string(),
            })
        })?;

        Ok(local_path)
    }

    fn cleanup(&self, handle: &StagingHandle, log: &mut Transcript) -> Result<()> {
        let run = self
            .transport
            .run(&format!("rm -rf {}", shell::quote_path(&handle.dir)));
        log.record("cleanup", &run);

        if run.output.success {
            Ok(())
        } else {
            Err(Error::cleanup_failed(
                &self.target,
                &handle.dir,
                run.output.combined(),
            ))
        }
    }
}

/// Opens SSH or kubectl sessions according to each target's transport.
#[derive(Debug, Default, Clone, Copy)]
pub struct TransportSessionFactory;

impl SessionFactory for TransportSessionFactory {
    fn open(&self, target: &ExecutionTarget) -> Result<Box<dyn RemoteSession>> {
        match &target.transport {
            TransportParams::Ssh(params) => {
                let client = SshClient::from_params(&target.name, params)?;
                Ok(Box::new(SshSession::new(&target.name, client)))
            }
            TransportParams::Kube(params) => {
                let pod = KubeClient::new(params.clone()).pod(&target.name);
                Ok(Box::new(KubeSession::new(&target.name, pod)))
            }
        }
    }
}
