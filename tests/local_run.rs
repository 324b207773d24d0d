//! End-to-end runs against loopback hosts, which execute on this machine
//! without ssh.
#![cfg(unix)]

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use carrier::run::{self, RunOptions};
use carrier::session::TransportSessionFactory;
use carrier::transcript::LogSink;
use carrier::{ExecutionStatus, ExecutionTarget, PipelineJob, PipelineState, SshParams};
use flate2::read::GzDecoder;

struct Workspace {
    _dir: tempfile::TempDir,
    root: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        fs::create_dir_all(root.join("staging")).unwrap();
        Self { _dir: dir, root }
    }

    fn script(&self, body: &str) -> PathBuf {
        let path = self.root.join("collect.sh");
        fs::write(&path, body).unwrap();
        path
    }

    fn job(&self, script: &Path, args: Vec<String>) -> PipelineJob {
        PipelineJob::new(script, "sh", args)
            .unwrap()
            .with_staging_root(self.root.join("staging").to_string_lossy().to_string())
            .with_artifact_dir(self.root.join("artifacts"))
            .with_settle_delay(Duration::ZERO)
            .with_sink(Arc::new(LogSink::to_file(&self.root.join("debug.log")).unwrap()))
    }

    fn output(&self) -> PathBuf {
        self.root.join("output.tar.gz")
    }

    fn staging_is_empty(&self) -> bool {
        fs::read_dir(self.root.join("staging")).unwrap().next().is_none()
    }
}

fn loopback(names: &[&str]) -> Vec<ExecutionTarget> {
    names
        .iter()
        .map(|name| ExecutionTarget::ssh(*name, SshParams::default()))
        .collect()
}

/// Entry names of a gzip'd tar archive, with their bytes.
fn read_archive(bytes: impl Read) -> Vec<(String, Vec<u8>)> {
    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    archive
        .entries()
        .unwrap()
        .map(|entry| {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().to_string();
            let mut body = Vec::new();
            entry.read_to_end(&mut body).unwrap();
            (name, body)
        })
        .collect()
}

#[test]
fn collects_script_output_from_every_target() {
    let ws = Workspace::new();
    let script = ws.script("#!/bin/sh\necho \"collected $1\" > result.txt\n");
    let job = ws.job(&script, vec!["logs and more".to_string()]);
    let options = RunOptions {
        output_archive: ws.output(),
        max_concurrency: None,
    };

    let report = run::execute(
        &loopback(&["localhost", "127.0.0.1"]),
        Arc::new(TransportSessionFactory),
        Arc::new(job),
        &options,
    )
    .unwrap();

    assert!(report.all_succeeded(), "{:#?}", report.results);
    assert_eq!(report.summary.succeeded, 2);
    assert_eq!(report.results[0].target.name, "localhost");
    assert_eq!(
        report.results[0].states.last(),
        Some(&PipelineState::Succeeded)
    );

    let outer = read_archive(File::open(ws.output()).unwrap());
    let names: Vec<_> = outer.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["localhost.tar.gz", "127.0.0.1.tar.gz"]);

    for (_, inner) in &outer {
        let files = read_archive(inner.as_slice());
        let (_, body) = files
            .iter()
            .find(|(name, _)| name.ends_with("result.txt"))
            .unwrap();
        assert_eq!(String::from_utf8_lossy(body), "collected logs and more\n");
        assert!(!files.iter().any(|(name, _)| name.ends_with("collect.sh")));
    }

    assert!(ws.staging_is_empty());
    assert!(!ws.root.join("artifacts").join("localhost.tar.gz").exists());

    let log = fs::read_to_string(ws.root.join("debug.log")).unwrap();
    assert!(log.contains("[localhost] ===== end localhost: succeeded ====="));
    assert!(log.contains("[127.0.0.1] [exec] $ cd "));
}

#[test]
fn failing_script_is_reported_and_cleaned_up() {
    let ws = Workspace::new();
    let script = ws.script("#!/bin/sh\necho partial > result.txt\necho broken >&2\nexit 3\n");
    let job = ws.job(&script, Vec::new());
    let options = RunOptions {
        output_archive: ws.output(),
        max_concurrency: Some(1),
    };

    let report = run::execute(
        &loopback(&["localhost"]),
        Arc::new(TransportSessionFactory),
        Arc::new(job),
        &options,
    )
    .unwrap();

    let result = &report.results[0];
    assert_eq!(result.status, ExecutionStatus::Failed);
    assert!(result.artifact_path.is_none());
    let error = result.error.as_ref().unwrap();
    assert_eq!(error.stage.as_deref(), Some("exec"));
    assert_eq!(error.details["exitCode"], 3);
    assert!(result.transcript.iter().any(|line| line == "broken"));

    assert_eq!(report.summary.failed, 1);
    assert!(report.summary.archive_path.is_none());
    assert!(!ws.output().exists());
    assert_eq!(report.message, "0 succeeded, 1 failed; no archive produced");
    assert!(ws.staging_is_empty());
}

#[test]
fn missing_staging_root_fails_at_stage() {
    let ws = Workspace::new();
    let script = ws.script("#!/bin/sh\ntrue\n");
    let job = ws
        .job(&script, Vec::new())
        .with_staging_root(ws.root.join("absent").to_string_lossy().to_string());
    let options = RunOptions {
        output_archive: ws.output(),
        max_concurrency: None,
    };

    let report = run::execute(
        &loopback(&["localhost"]),
        Arc::new(TransportSessionFactory),
        Arc::new(job),
        &options,
    )
    .unwrap();

    let result = &report.results[0];
    assert_eq!(result.error.as_ref().unwrap().code, "remote.permission_denied");
    assert_eq!(
        result.states,
        vec![
            PipelineState::Created,
            PipelineState::Failed,
            PipelineState::CleanedUp
        ]
    );
}
