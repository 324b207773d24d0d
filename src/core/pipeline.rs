//! Per-target pipeline: stage → push → exec → settle → archive → retrieve,
//! with cleanup run on every exit path.

use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::session::{RemoteSession, SessionFactory, StagingHandle};
use crate::target::ExecutionTarget;
use crate::transcript::{LogSink, Transcript};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Created,
    Staged,
    Pushed,
    Executed,
    Settled,
    Archived,
    Retrieved,
    CleanedUp,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureInfo {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    pub details: Value,
}

impl From<&Error> for FailureInfo {
    fn from(err: &Error) -> Self {
        Self {
            code: err.code.as_str().to_string(),
            message: err.message.clone(),
            stage: err.stage().map(str::to_string),
            details: err.details.clone(),
        }
    }
}

/// Outcome of one pipeline. Created once, never mutated afterwards.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub target: ExecutionTarget,
    pub status: ExecutionStatus,
    /// Every state the pipeline passed through, in order.
    pub states: Vec<PipelineState>,
    pub transcript: Vec<String>,
    /// Present only when the archive reached local storage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureInfo>,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }

    /// Failed result for a pipeline that never got a session.
    pub fn not_started(target: &ExecutionTarget, transcript: Vec<String>, err: &Error) -> Self {
        Self {
            target: target.clone(),
            status: ExecutionStatus::Failed,
            states: vec![PipelineState::Created, PipelineState::Failed],
            transcript,
            artifact_path: None,
            error: Some(FailureInfo::from(err)),
        }
    }
}

/// What every pipeline of a run executes. Shared read-only across workers.
#[derive(Debug)]
pub struct PipelineJob {
    pub script: PathBuf,
    pub script_name: String,
    pub shell: String,
    pub args: Vec<String>,
    pub staging_root: String,
    pub artifact_dir: PathBuf,
    /// Pause between exec and archive so late writes from the script land on
    /// disk first. A heuristic, not a completion signal.
    pub settle_delay: Duration,
    pub sink: Arc<LogSink>,
}

impl PipelineJob {
    pub fn new(script: &Path, shell: &str, args: Vec<String>) -> Result<Self> {
        if !script.is_file() {
            return Err(Error::validation_invalid_argument(
                "script",
                format!("Script not found: {}", script.display()),
                Some(script.display().to_string()),
            ));
        }

        let script_name = script
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                Error::validation_invalid_argument(
                    "script",
                    "Script path has no file name",
                    Some(script.display().to_string()),
                )
            })?;

        if shell.trim().is_empty() {
            return Err(Error::validation_invalid_argument(
                "shell",
                "Shell must not be empty",
                None,
            ));
        }

        Ok(Self {
            script: script.to_path_buf(),
            script_name,
            shell: shell.to_string(),
            args,
            staging_root: "/tmp".to_string(),
            artifact_dir: PathBuf::from("."),
            settle_delay: Duration::from_millis(1000),
            sink: Arc::new(LogSink::disabled()),
        })
    }

    pub fn with_staging_root(mut self, root: impl Into<String>) -> Self {
        self.staging_root = root.into();
        self
    }

    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = dir.into();
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_sink(mut self, sink: Arc<LogSink>) -> Self {
        self.sink = sink;
        self
    }
}

/// Run the whole pipeline for one target. Never returns an error: every
/// failure becomes a `Failed` result with the detail in its transcript.
pub fn run(target: &ExecutionTarget, factory: &dyn SessionFactory, job: &PipelineJob) -> ExecutionResult {
    let mut log = Transcript::new(&target.name, Arc::clone(&job.sink));
    log.begin();

    let session = match factory.open(target) {
        Ok(session) => session,
        Err(err) => {
            log.note(format!("error: {}", err.message));
            log.finish("failed");
            return ExecutionResult::not_started(target, log.into_lines(), &err);
        }
    };

    let handle = StagingHandle::allocate(&job.staging_root, &target.name, &job.script_name);
    let mut states = vec![PipelineState::Created];
    let mut cleanup = CleanupGuard {
        session: session.as_ref(),
        handle: &handle,
        sink: Arc::clone(&job.sink),
        done: false,
    };

    let outcome = drive(session.as_ref(), &handle, job, &mut log, &mut states);

    if let Err(err) = &outcome {
        states.push(PipelineState::Failed);
        log.note(format!("error: {}", err.message));
        discard_partial_artifact(&job.artifact_dir.join(handle.partial_name()));
    }

    // Runs whatever happened above; a failure here never changes the outcome.
    if let Err(err) = cleanup.run(&mut log) {
        log.note(format!("warning: {} ({})", err.message, handle.dir));
    }
    states.push(PipelineState::CleanedUp);

    match outcome {
        Ok(artifact) => {
            states.push(PipelineState::Succeeded);
            log.finish("succeeded");
            ExecutionResult {
                target: target.clone(),
                status: ExecutionStatus::Success,
                states,
                transcript: log.into_lines(),
                artifact_path: Some(artifact),
                error: None,
            }
        }
        Err(err) => {
            log.finish("failed");
            ExecutionResult {
                target: target.clone(),
                status: ExecutionStatus::Failed,
                states,
                transcript: log.into_lines(),
                artifact_path: None,
                error: Some(FailureInfo::from(&err)),
            }
        }
    }
}

fn drive(
    session: &dyn RemoteSession,
    handle: &StagingHandle,
    job: &PipelineJob,
    log: &mut Transcript,
    states: &mut Vec<PipelineState>,
) -> Result<PathBuf> {
    session.stage(handle, log)?;
    states.push(PipelineState::Staged);

    let remote_script = session.push(handle, &job.script, log)?;
    states.push(PipelineState::Pushed);

    session.exec(handle, &job.shell, &remote_script, &job.args, log)?;
    states.push(PipelineState::Executed);

    if !job.settle_delay.is_zero() {
        log.note(format!("[settle] waiting {} ms", job.settle_delay.as_millis()));
        std::thread::sleep(job.settle_delay);
    }
    states.push(PipelineState::Settled);

    session.archive(handle, log)?;
    states.push(PipelineState::Archived);

    let artifact = session.retrieve(handle, &job.artifact_dir, log)?;
    states.push(PipelineState::Retrieved);

    Ok(artifact)
}

/// Removes the staging directory exactly once, including when a stage panics.
struct CleanupGuard<'a> {
    session: &'a dyn RemoteSession,
    handle: &'a StagingHandle,
    sink: Arc<LogSink>,
    done: bool,
}

impl CleanupGuard<'_> {
    fn run(&mut self, log: &mut Transcript) -> Result<()> {
        self.done = true;
        self.session.cleanup(self.handle, log)
    }
}

impl Drop for CleanupGuard<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        self.done = true;

        let mut log = Transcript::new(self.session.target(), Arc::clone(&self.sink));
        log.note("pipeline aborted, removing staging directory");
        if let Err(err) = self.session.cleanup(self.handle, &mut log) {
            log.note(format!("warning: {} ({})", err.message, self.handle.dir));
        }
    }
}

/// Only the in-flight download name is ever removed; a finished artifact with
/// the same target name may belong to the user.
fn discard_partial_artifact(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            log_status!("pipeline", "Could not remove partial archive {}: {}", path.display(), e);
        }
    }
}
