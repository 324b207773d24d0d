use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use carrier::defaults::{self, Defaults};
use carrier::run::{self, RunOptions, RunReport};
use carrier::session::TransportSessionFactory;
use carrier::transcript::LogSink;
use carrier::{ExecutionTarget, PipelineJob};

pub type CmdResult<T> = carrier::Result<(T, i32)>;

/// Exit code when the run completed but at least one target failed.
pub const PARTIAL_FAILURE_EXIT: i32 = 20;

/// Interpreters a script may run under.
pub const SHELLS: [&str; 3] = ["bash", "zsh", "sh"];

/// Options shared by every transport.
#[derive(Args, Default, Debug)]
pub struct RunArgs {
    /// Final archive path [default: output.tar.gz]
    #[arg(long, short = 'o', value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Local directory for per-target archives before they are folded in [default: .]
    #[arg(long, value_name = "DIR")]
    pub artifact_dir: Option<PathBuf>,

    /// Diagnostic log file [default: debug.log]
    #[arg(long, value_name = "PATH", conflicts_with = "no_log")]
    pub log_file: Option<PathBuf>,

    /// Do not write a diagnostic log
    #[arg(long)]
    pub no_log: bool,

    /// Remote directory under which staging directories are created [default: /tmp]
    #[arg(long, value_name = "DIR")]
    pub staging_root: Option<String>,

    /// Interpreter the script runs under [default: bash]
    #[arg(long, value_parser = SHELLS)]
    pub shell: Option<String>,

    /// Pause between running the script and archiving its output [default: 1000]
    #[arg(long, value_name = "MS")]
    pub settle_ms: Option<u64>,

    /// Maximum pipelines in flight at once [default: one per target]
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    pub max_parallel: Option<u64>,
}

impl RunArgs {
    /// Build the job every pipeline runs, validating the script first.
    pub fn job(
        &self,
        script: &Path,
        script_args: Vec<String>,
        defaults: &Defaults,
    ) -> carrier::Result<PipelineJob> {
        let shell = match self.shell.as_deref() {
            Some(shell) => shell,
            None if SHELLS.contains(&defaults.shell.as_str()) => defaults.shell.as_str(),
            None => {
                return Err(carrier::Error::config_invalid_value(
                    "defaults.shell",
                    Some(defaults.shell.clone()),
                    format!("must be one of {}", SHELLS.join(", ")),
                ))
            }
        };

        let sink = if self.no_log {
            LogSink::disabled()
        } else {
            let path = self
                .log_file
                .clone()
                .unwrap_or_else(|| PathBuf::from(&defaults.log_file));
            LogSink::to_file(&path)?
        };

        let job = PipelineJob::new(script, shell, script_args)?
            .with_staging_root(
                self.staging_root
                    .clone()
                    .unwrap_or_else(|| defaults.staging_root.clone()),
            )
            .with_artifact_dir(
                self.artifact_dir
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(&defaults.artifact_dir)),
            )
            .with_settle_delay(Duration::from_millis(
                self.settle_ms.unwrap_or(defaults.settle_delay_ms),
            ))
            .with_sink(Arc::new(sink));

        Ok(job)
    }

    pub fn options(&self, defaults: &Defaults) -> RunOptions {
        RunOptions {
            output_archive: self
                .output
                .clone()
                .unwrap_or_else(|| PathBuf::from(&defaults.output_archive)),
            max_concurrency: self
                .max_parallel
                .map(|n| n as usize)
                .or(defaults.max_concurrency),
        }
    }
}

/// Fan out over resolved targets and report. Any failed target makes the
/// exit code non-zero; the report is still returned.
pub(crate) fn execute(
    targets: Vec<ExecutionTarget>,
    job: PipelineJob,
    options: &RunOptions,
) -> CmdResult<RunReport> {
    let report = run::execute(
        &targets,
        Arc::new(TransportSessionFactory),
        Arc::new(job),
        options,
    )?;

    let exit_code = if report.all_succeeded() {
        0
    } else {
        PARTIAL_FAILURE_EXIT
    };
    Ok((report, exit_code))
}

pub(crate) fn load_defaults() -> Defaults {
    defaults::load_defaults()
}

pub mod kube;
pub mod ssh;

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args))
    };
}

pub(crate) fn run_json(command: crate::Commands) -> (carrier::Result<serde_json::Value>, i32) {
    crate::tty::status("carrier is working...");

    match command {
        crate::Commands::Ssh(args) => dispatch!(args, ssh),
        crate::Commands::Kube(args) => dispatch!(args, kube),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let defaults = Defaults::default();
        let args = RunArgs {
            output: Some(PathBuf::from("/out/all.tar.gz")),
            max_parallel: Some(4),
            ..RunArgs::default()
        };
        let options = args.options(&defaults);
        assert_eq!(options.output_archive, PathBuf::from("/out/all.tar.gz"));
        assert_eq!(options.max_concurrency, Some(4));
    }

    #[test]
    fn defaults_fill_unset_flags() {
        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("collect.sh");
        std::fs::write(&script, "true\n").unwrap();

        let defaults = Defaults::default();
        let args = RunArgs {
            no_log: true,
            ..RunArgs::default()
        };
        let job = args.job(&script, Vec::new(), &defaults).unwrap();
        assert_eq!(job.shell, "bash");
        assert_eq!(job.staging_root, "/tmp");
        assert_eq!(job.settle_delay, Duration::from_millis(1000));
        assert_eq!(args.options(&defaults).output_archive, PathBuf::from("output.tar.gz"));
    }

    #[test]
    fn unknown_configured_shell_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("collect.sh");
        std::fs::write(&script, "true\n").unwrap();

        let defaults = Defaults {
            shell: "fish".to_string(),
            ..Defaults::default()
        };
        let args = RunArgs {
            no_log: true,
            ..RunArgs::default()
        };
        let err = args.job(&script, Vec::new(), &defaults).unwrap_err();
        assert_eq!(err.code, carrier::ErrorCode::ConfigInvalidValue);
    }
}
