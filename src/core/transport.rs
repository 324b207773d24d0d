//! Transport primitives: run a shell command on a target, copy files in and out.
//!
//! Every call returns an [`Invocation`] holding the command line that was
//! issued and what it produced, so callers can record a faithful transcript
//! whether the call succeeded or not.

use std::path::Path;
use std::process::Command;

use crate::utils::shell;

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub exit_code: i32,
}

impl CommandOutput {
    /// Output failure for a process that could not be started at all.
    pub fn spawn_error(message: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: message.into(),
            success: false,
            exit_code: -1,
        }
    }

    /// Standard output followed by standard error.
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (true, true) => String::new(),
            (false, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => {
                let mut combined = self.stdout.clone();
                if !combined.ends_with('\n') {
                    combined.push('\n');
                }
                combined.push_str(&self.stderr);
                combined
            }
        }
    }
}

/// One issued command and its result.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub command_line: String,
    pub output: CommandOutput,
}

/// Capability surface over a transport-specific client, bound to one target.
///
/// Calls block until the underlying process exits. There is no timeout: a
/// remote command that never returns holds its caller forever.
pub trait Transport: Send + Sync {
    /// Run `command` through a POSIX shell on the target.
    fn run(&self, command: &str) -> Invocation;

    /// Copy a local file to `remote_path` on the target.
    fn upload(&self, local_path: &Path, remote_path: &str) -> Invocation;

    /// Copy `remote_path` on the target to a local file.
    fn download(&self, remote_path: &str, local_path: &Path) -> Invocation;
}

/// Spawn `program` with `args`, capturing output.
pub fn run_process(program: &str, args: &[String], env: &[(&str, &str)]) -> Invocation {
    let mut line = vec![program.to_string()];
    line.extend(args.iter().cloned());
    let command_line = shell::quote_args(&line);

    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd.envs(env.iter().copied());

    let output = match cmd.output() {
        Ok(out) => CommandOutput {
            stdout: String::from_utf8_lossy(&out.stdout).to_string(),
            stderr: String::from_utf8_lossy(&out.stderr).to_string(),
            success: out.status.success(),
            exit_code: out.status.code().unwrap_or(-1),
        },
        Err(e) => CommandOutput::spawn_error(format!("{} error: {}", program, e)),
    };

    Invocation {
        command_line,
        output,
    }
}

/// Run a shell command on the local machine.
pub fn run_local_shell(command: &str) -> Invocation {
    let invocation = run_process("sh", &["-c".to_string(), command.to_string()], &[]);
    Invocation {
        command_line: command.to_string(),
        output: invocation.output,
    }
}

/// Local file copy presented as an invocation.
pub fn copy_local(from: &Path, to: &Path) -> Invocation {
    let command_line = format!(
        "cp {} {}",
        shell::quote_path(&from.to_string_lossy()),
        shell::quote_path(&to.to_string_lossy())
    );

    let output = match std::fs::copy(from, to) {
        Ok(_) => CommandOutput {
            stdout: String::new(),
            stderr: String::new(),
            success: true,
            exit_code: 0,
        },
        Err(e) => CommandOutput {
            stdout: String::new(),
            stderr: format!("copy failed: {}", e),
            success: false,
            exit_code: 1,
        },
    };

    Invocation {
        command_line,
        output,
    }
}
