//! One complete run: fan out over resolved targets, then aggregate.

use serde::Serialize;
use std::fs::OpenOptions;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::aggregate::{self, RunSummary};
use crate::error::{Error, Result};
use crate::paths;
use crate::pipeline::{ExecutionResult, PipelineJob};
use crate::scheduler;
use crate::session::SessionFactory;
use crate::target::ExecutionTarget;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub output_archive: PathBuf,
    pub max_concurrency: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub message: String,
    pub summary: RunSummary,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_targets: Vec<String>,
    pub results: Vec<ExecutionResult>,
}

impl RunReport {
    pub fn all_succeeded(&self) -> bool {
        self.summary.failed == 0
    }
}

/// Run `job` against every target and fold the artifacts into one archive.
///
/// Per-target failures only show up in the report. An error is returned only
/// when the run cannot start. Once targets have run, a final archive that
/// cannot be written becomes a warning in the report and the retrieved
/// artifacts stay in the artifact directory.
pub fn execute(
    targets: &[ExecutionTarget],
    factory: Arc<dyn SessionFactory>,
    job: Arc<PipelineJob>,
    options: &RunOptions,
) -> Result<RunReport> {
    check_output_collision(targets, &job.artifact_dir, &options.output_archive)?;
    check_output_writable(&options.output_archive)?;

    std::fs::create_dir_all(&job.artifact_dir).map_err(|e| {
        Error::internal_io(
            e.to_string(),
            Some(format!("create artifact dir {}", job.artifact_dir.display())),
        )
    })?;

    let results = scheduler::fan_out(targets, factory, job, options.max_concurrency);
    let summary = match aggregate::aggregate(&results, &options.output_archive) {
        Ok(summary) => summary,
        Err(err) => {
            log_status!("run", "Final archive not written: {}", err.message);
            RunSummary {
                succeeded: 0,
                failed: results.len(),
                archive_path: None,
                warnings: vec![format!("final archive: {}", err.message)],
            }
        }
    };
    let message = summary.message();
    log_status!("run", "{}", message);

    let failed_targets = results
        .iter()
        .filter(|r| !r.is_success())
        .map(|r| r.target.name.clone())
        .collect();

    Ok(RunReport {
        message,
        summary,
        failed_targets,
        results,
    })
}

fn check_output_collision(
    targets: &[ExecutionTarget],
    artifact_dir: &Path,
    output: &Path,
) -> Result<()> {
    let output = normalized(output);
    for target in targets {
        if normalized(&paths::artifact_path(artifact_dir, &target.name)) == output {
            return Err(Error::validation_invalid_argument(
                "output",
                format!(
                    "Final archive {} would overwrite the artifact of target '{}'",
                    output.display(),
                    target.name
                ),
                Some(target.name.clone()),
            )
            .with_hint("Pass --output with a different file name"));
        }
    }
    Ok(())
}

/// Fail before any target runs if the final archive could never be created.
fn check_output_writable(output: &Path) -> Result<()> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::archive_write(e.to_string(), parent.display().to_string()))?;
    }

    let existed = output.exists();
    OpenOptions::new()
        .write(true)
        .create(true)
        .open(output)
        .map_err(|e| Error::archive_write(e.to_string(), output.display().to_string()))?;

    if !existed {
        let _ = std::fs::remove_file(output);
    }
    Ok(())
}

fn normalized(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{RemoteSession, StagingHandle};
    use crate::target::SshParams;
    use crate::transcript::Transcript;
    use std::time::Duration;

    /// Writes a small archive for every target except `fail`. With `block`,
    /// a directory is put in that path's place once a target has run.
    struct LocalFactory {
        fail: &'static str,
        block: Option<PathBuf>,
    }

    impl LocalFactory {
        fn failing(fail: &'static str) -> Self {
            Self { fail, block: None }
        }
    }

    struct LocalSession {
        target: String,
        fail: bool,
        block: Option<PathBuf>,
    }

    impl RemoteSession for LocalSession {
        fn target(&self) -> &str {
            &self.target
        }

        fn stage(&self, _handle: &StagingHandle, _log: &mut Transcript) -> Result<()> {
            Ok(())
        }

        fn push(&self, handle: &StagingHandle, _script: &Path, _log: &mut Transcript) -> Result<String> {
            Ok(handle.script_path())
        }

        fn exec(
            &self,
            _handle: &StagingHandle,
            _shell: &str,
            _remote_script: &str,
            _args: &[String],
            _log: &mut Transcript,
        ) -> Result<()> {
            if self.fail {
                return Err(Error::other("script exited 1"));
            }
            Ok(())
        }

        fn archive(&self, handle: &StagingHandle, _log: &mut Transcript) -> Result<String> {
            Ok(handle.archive_path())
        }

        fn retrieve(
            &self,
            handle: &StagingHandle,
            artifact_dir: &Path,
            _log: &mut Transcript,
        ) -> Result<PathBuf> {
            let path = artifact_dir.join(&handle.archive_name);
            std::fs::write(&path, self.target.as_bytes()).map_err(|e| Error::internal_io(e.to_string(), None))?;
            if let Some(block) = &self.block {
                let _ = std::fs::create_dir_all(block);
            }
            Ok(path)
        }

        fn cleanup(&self, _handle: &StagingHandle, _log: &mut Transcript) -> Result<()> {
            Ok(())
        }
    }

    impl SessionFactory for LocalFactory {
        fn open(&self, target: &ExecutionTarget) -> Result<Box<dyn RemoteSession>> {
            Ok(Box::new(LocalSession {
                target: target.name.clone(),
                fail: target.name == self.fail,
                block: self.block.clone(),
            }))
        }
    }

    fn setup(dir: &tempfile::TempDir) -> Arc<PipelineJob> {
        let script = dir.path().join("collect.sh");
        std::fs::write(&script, "true\n").unwrap();
        Arc::new(
            PipelineJob::new(&script, "sh", Vec::new())
                .unwrap()
                .with_artifact_dir(dir.path().join("artifacts"))
                .with_settle_delay(Duration::ZERO),
        )
    }

    fn targets(names: &[&str]) -> Vec<ExecutionTarget> {
        names
            .iter()
            .map(|n| ExecutionTarget::ssh(*n, SshParams::default()))
            .collect()
    }

    #[test]
    fn partial_failure_reports_and_archives_the_rest() {
        let dir = tempfile::TempDir::new().unwrap();
        let options = RunOptions {
            output_archive: dir.path().join("output.tar.gz"),
            max_concurrency: None,
        };

        let report = execute(
            &targets(&["t1", "t2", "t3"]),
            Arc::new(LocalFactory::failing("t2")),
            setup(&dir),
            &options,
        )
        .unwrap();

        assert_eq!(report.summary.succeeded, 2);
        assert_eq!(report.summary.failed, 1);
        assert!(!report.all_succeeded());
        assert_eq!(report.failed_targets, vec!["t2"]);
        assert!(options.output_archive.exists());
        assert!(report.message.starts_with("2 succeeded, 1 failed; final archive: "));
    }

    #[test]
    fn output_overlapping_an_artifact_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let job = setup(&dir);
        let options = RunOptions {
            output_archive: dir.path().join("artifacts").join("output.tar.gz"),
            max_concurrency: None,
        };

        let err = execute(
            &targets(&["output"]),
            Arc::new(LocalFactory::failing("")),
            job,
            &options,
        )
        .unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::ValidationInvalidArgument);
    }

    #[test]
    fn unwritable_output_fails_before_any_target_runs() {
        let dir = tempfile::TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"regular file").unwrap();
        let options = RunOptions {
            output_archive: blocker.join("output.tar.gz"),
            max_concurrency: None,
        };

        let err = execute(
            &targets(&["t1", "t2"]),
            Arc::new(LocalFactory::failing("t2")),
            setup(&dir),
            &options,
        )
        .unwrap_err();

        assert_eq!(err.code, crate::ErrorCode::ArchiveWriteFailed);
        assert!(!dir.path().join("artifacts").exists());
    }

    #[test]
    fn writable_check_leaves_no_file_behind() {
        let dir = tempfile::TempDir::new().unwrap();
        let output = dir.path().join("nested").join("output.tar.gz");
        check_output_writable(&output).unwrap();
        assert!(!output.exists());

        std::fs::write(&output, b"keep").unwrap();
        check_output_writable(&output).unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"keep");
    }

    #[test]
    fn archive_failure_after_fan_out_still_reports() {
        let dir = tempfile::TempDir::new().unwrap();
        let output = dir.path().join("output.tar.gz");
        let options = RunOptions {
            output_archive: output.clone(),
            max_concurrency: None,
        };
        let factory = LocalFactory {
            fail: "t2",
            block: Some(output.clone()),
        };

        let report = execute(&targets(&["t1", "t2"]), Arc::new(factory), setup(&dir), &options)
            .unwrap();

        assert!(!report.all_succeeded());
        assert!(report.summary.archive_path.is_none());
        assert_eq!(report.results.len(), 2);
        assert!(report.summary.warnings[0].starts_with("final archive: "));
        assert!(dir.path().join("artifacts").join("t1.tar.gz").exists());
        assert!(report.message.ends_with("no archive produced"));
    }

    #[test]
    fn collision_check_ignores_current_dir_prefix() {
        let err = check_output_collision(
            &targets(&["output"]),
            Path::new("."),
            Path::new("output.tar.gz"),
        );
        assert!(err.is_err());
        assert!(check_output_collision(
            &targets(&["web-1"]),
            Path::new("."),
            Path::new("output.tar.gz")
        )
        .is_ok());
    }
}
