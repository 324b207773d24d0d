use crate::error::{Error, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Base carrier config directory (~/.config/carrier/ on all platforms)
pub fn carrier() -> Result<PathBuf> {
    #[cfg(windows)]
    {
        let appdata = env::var("APPDATA").map_err(|_| {
            Error::internal_unexpected(
                "APPDATA environment variable not set on Windows".to_string(),
            )
        })?;
        Ok(PathBuf::from(appdata).join("carrier"))
    }

    #[cfg(not(windows))]
    {
        let home = env::var("HOME").map_err(|_| {
            Error::internal_unexpected(
                "HOME environment variable not set on Unix-like system".to_string(),
            )
        })?;
        Ok(PathBuf::from(home).join(".config").join("carrier"))
    }
}

/// Global carrier.json config file path
pub fn carrier_json() -> Result<PathBuf> {
    Ok(carrier()?.join("carrier.json"))
}

/// Local file name for a target's retrieved archive.
///
/// Path separators and drive/port colons are replaced so one target always
/// maps to exactly one file inside the artifact directory.
pub fn artifact_file_name(target: &str) -> String {
    let sanitized: String = target
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            other => other,
        })
        .collect();
    format!("{}.tar.gz", sanitized)
}

/// Full local path for a target's retrieved archive.
pub fn artifact_path(artifact_dir: &Path, target: &str) -> PathBuf {
    artifact_dir.join(artifact_file_name(target))
}
