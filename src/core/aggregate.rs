//! Fold per-target archives into one compressed archive.

use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::pipeline::ExecutionResult;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// Absent when no target produced an artifact.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_path: Option<PathBuf>,
    /// Targets whose artifact could not be folded in.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl RunSummary {
    pub fn message(&self) -> String {
        match &self.archive_path {
            Some(path) => format!(
                "{} succeeded, {} failed; final archive: {}",
                self.succeeded,
                self.failed,
                path.display()
            ),
            None => format!(
                "{} succeeded, {} failed; no archive produced",
                self.succeeded, self.failed
            ),
        }
    }
}

/// Fold every retrieved artifact into `output`, then delete the intermediates.
///
/// Only results carrying an artifact path are folded. `succeeded` counts what
/// was actually folded; everything else counts as failed. When nothing is
/// folded no archive is left behind.
///
/// An intermediate is deleted only once the finished archive holds it. Anything
/// that could not be folded stays in the artifact directory.
pub fn aggregate(results: &[ExecutionResult], output: &Path) -> Result<RunSummary> {
    let artifacts: Vec<(&str, &Path)> = results
        .iter()
        .filter_map(|r| r.artifact_path.as_deref().map(|p| (r.target.name.as_str(), p)))
        .collect();

    if artifacts.is_empty() {
        return Ok(RunSummary {
            succeeded: 0,
            failed: results.len(),
            archive_path: None,
            warnings: Vec::new(),
        });
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| Error::archive_write(e.to_string(), parent.display().to_string()))?;
    }

    let file = File::create(output)
        .map_err(|e| Error::archive_write(e.to_string(), output.display().to_string()))?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));

    let mut folded: Vec<&Path> = Vec::new();
    let mut warnings = Vec::new();

    for (target, path) in artifacts {
        let entry_name = match path.file_name() {
            Some(name) => name.to_owned(),
            None => {
                warnings.push(format!("{}: artifact path has no file name", target));
                continue;
            }
        };

        match builder.append_path_with_name(path, &entry_name) {
            Ok(()) => folded.push(path),
            Err(e) => {
                log_status!("aggregate", "Skipping {}: {}", path.display(), e);
                warnings.push(format!("{}: {}", target, e));
            }
        }
    }

    let finished = builder
        .into_inner()
        .and_then(|encoder| encoder.finish())
        .map_err(|e| Error::archive_write(e.to_string(), output.display().to_string()));

    if let Err(err) = finished {
        let _ = fs::remove_file(output);
        return Err(err);
    }

    if folded.is_empty() {
        let _ = fs::remove_file(output);
        return Ok(RunSummary {
            succeeded: 0,
            failed: results.len(),
            archive_path: None,
            warnings,
        });
    }

    for path in &folded {
        if let Err(e) = fs::remove_file(path) {
            log_status!("aggregate", "Could not remove {}: {}", path.display(), e);
        }
    }

    Ok(RunSummary {
        succeeded: folded.len(),
        failed: results.len() - folded.len(),
        archive_path: Some(output.to_path_buf()),
        warnings,
    })
}
