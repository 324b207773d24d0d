//! Turn a host list, a hosts file, or a label selector into execution targets.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::kube::KubeClient;
use crate::paths;
use crate::target::ExecutionTarget;

/// Something that can list target names for a label selector.
pub trait TargetLister {
    fn list(&self, selector: &str) -> Result<Vec<String>>;
}

impl TargetLister for KubeClient {
    fn list(&self, selector: &str) -> Result<Vec<String>> {
        self.list_pods(selector)
    }
}

pub enum TargetSource<'a> {
    /// Comma-separated names.
    List(String),
    /// One name per line; blank lines and `#` comments are skipped.
    File(PathBuf),
    Labels {
        selector: String,
        lister: &'a dyn TargetLister,
    },
}

impl TargetSource<'_> {
    fn describe(&self) -> String {
        match self {
            TargetSource::List(_) => "host list".to_string(),
            TargetSource::File(path) => format!("hosts file {}", path.display()),
            TargetSource::Labels { selector, .. } => format!("labels {}", selector),
        }
    }
}

/// Resolve `source` into distinct target names, preserving first-seen order.
///
/// With `require_non_empty`, an empty result is an error instead of an empty run.
pub fn resolve_names(source: &TargetSource, require_non_empty: bool) -> Result<Vec<String>> {
    let raw = match source {
        TargetSource::List(list) => parse_list(list),
        TargetSource::File(path) => read_hosts_file(path)?,
        TargetSource::Labels { selector, lister } => {
            if selector.trim().is_empty() {
                return Err(Error::validation_invalid_argument(
                    "labels",
                    "Label selector must not be empty",
                    None,
                ));
            }
            lister.list(selector)?
        }
    };

    let names = dedup(raw);
    if names.is_empty() && require_non_empty {
        return Err(Error::resolution_empty(source.describe()));
    }

    check_artifact_collisions(&names)?;
    log_status!("resolve", "{} target(s) from {}", names.len(), source.describe());
    Ok(names)
}

/// Resolve and bind every name with `bind`.
pub fn resolve<F>(source: &TargetSource, require_non_empty: bool, bind: F) -> Result<Vec<ExecutionTarget>>
where
    F: Fn(&str) -> ExecutionTarget,
{
    Ok(resolve_names(source, require_non_empty)?
        .iter()
        .map(|name| bind(name.as_str()))
        .collect())
}

pub fn parse_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

fn read_hosts_file(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::resolution_failed(format!("hosts file {}", path.display()), e.to_string())
    })?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

fn dedup(names: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .into_iter()
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

/// Two targets whose names sanitize to the same artifact file would overwrite
/// each other locally.
fn check_artifact_collisions(names: &[String]) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(paths::artifact_file_name(name)) {
            return Err(Error::resolution_failed(
                "targets",
                format!(
                    "'{}' maps to artifact {} already used by another target",
                    name,
                    paths::artifact_file_name(name)
                ),
            ));
        }
    }
    Ok(())
}
