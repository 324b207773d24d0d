use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorCode {
    ConfigInvalidValue,

    ValidationInvalidArgument,
    ValidationInvalidJson,

    TargetResolutionFailed,
    TargetNoneResolved,

    SshIdentityFileNotFound,

    RemotePermissionDenied,
    RemoteStageFailed,
    RemoteCleanupFailed,

    ArchiveWriteFailed,

    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigInvalidValue => "config.invalid_value",

            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",
            ErrorCode::ValidationInvalidJson => "validation.invalid_json",

            ErrorCode::TargetResolutionFailed => "target.resolution_failed",
            ErrorCode::TargetNoneResolved => "target.none_resolved",

            ErrorCode::SshIdentityFileNotFound => "ssh.identity_file_not_found",

            ErrorCode::RemotePermissionDenied => "remote.permission_denied",
            ErrorCode::RemoteStageFailed => "remote.stage_failed",
            ErrorCode::RemoteCleanupFailed => "remote.cleanup_failed",

            ErrorCode::ArchiveWriteFailed => "archive.write_failed",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }

    /// Errors that abort a whole run rather than a single target.
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            ErrorCode::TargetResolutionFailed | ErrorCode::TargetNoneResolved
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
    pub retryable: Option<bool>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionDetails {
    pub source: String,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionDeniedDetails {
    pub target: String,
    pub path: String,
    pub output: String,
}

/// Detail payload for a failed pipeline stage.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageFailedDetails {
    pub target: String,
    pub stage: String,
    pub command: String,
    pub exit_code: i32,
    pub output: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalIoErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

fn to_details<T: Serialize>(details: T) -> Value {
    serde_json::to_value(details).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
            retryable: None,
        }
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        id: Option<String>,
    ) -> Self {
        let problem = problem.into();
        let details = to_details(InvalidArgumentDetails {
            field: field.into(),
            problem: problem.clone(),
            id,
        });

        Self::new(
            ErrorCode::ValidationInvalidArgument,
            format!("Invalid argument: {}", problem),
            details,
        )
    }

    pub fn validation_invalid_json(err: serde_json::Error, context: Option<String>) -> Self {
        let details = serde_json::json!({
            "error": err.to_string(),
            "context": context,
        });

        Self::new(ErrorCode::ValidationInvalidJson, "Invalid JSON", details)
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        let details = serde_json::json!({
            "key": key.into(),
            "value": value,
            "problem": problem.into(),
        });

        Self::new(
            ErrorCode::ConfigInvalidValue,
            "Invalid configuration value",
            details,
        )
    }

    pub fn resolution_failed(source: impl Into<String>, problem: impl Into<String>) -> Self {
        let problem = problem.into();
        let details = to_details(ResolutionDetails {
            source: source.into(),
            problem: problem.clone(),
        });

        Self::new(
            ErrorCode::TargetResolutionFailed,
            format!("Could not resolve targets: {}", problem),
            details,
        )
    }

    pub fn resolution_empty(source: impl Into<String>) -> Self {
        let details = to_details(ResolutionDetails {
            source: source.into(),
            problem: "no targets matched".to_string(),
        });

        Self::new(ErrorCode::TargetNoneResolved, "No targets resolved", details)
            .with_hint("Check the host list or label selector and namespace")
    }

    pub fn ssh_identity_file_not_found(
        target: impl Into<String>,
        identity_file: impl Into<String>,
    ) -> Self {
        let details = serde_json::json!({
            "target": target.into(),
            "identityFile": identity_file.into(),
        });

        Self::new(
            ErrorCode::SshIdentityFileNotFound,
            "SSH identity file not found",
            details,
        )
    }

    pub fn permission_denied(
        target: impl Into<String>,
        path: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        let path = path.into();
        let details = to_details(PermissionDeniedDetails {
            target: target.into(),
            path: path.clone(),
            output: output.into(),
        });

        Self::new(
            ErrorCode::RemotePermissionDenied,
            format!("Staging root '{}' is not writable", path),
            details,
        )
        .with_hint("Pass --staging-root with a directory the remote user can write to")
    }

    pub fn stage_failed(details: StageFailedDetails) -> Self {
        let message = format!(
            "Stage '{}' failed on {} (exit {})",
            details.stage, details.target, details.exit_code
        );
        Self::new(ErrorCode::RemoteStageFailed, message, to_details(details))
    }

    pub fn cleanup_failed(target: impl Into<String>, path: impl Into<String>, output: impl Into<String>) -> Self {
        let details = serde_json::json!({
            "target": target.into(),
            "path": path.into(),
            "output": output.into(),
        });

        Self::new(
            ErrorCode::RemoteCleanupFailed,
            "Failed to remove staging directory",
            details,
        )
    }

    pub fn archive_write(error: impl Into<String>, path: impl Into<String>) -> Self {
        let details = serde_json::json!({
            "error": error.into(),
            "path": path.into(),
        });

        Self::new(
            ErrorCode::ArchiveWriteFailed,
            "Failed to write archive",
            details,
        )
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        let details = to_details(InternalIoErrorDetails {
            error: error.into(),
            context,
        });

        Self::new(ErrorCode::InternalIoError, "IO error", details)
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        let details = serde_json::json!({
            "error": error.into(),
            "context": context,
        });

        Self::new(ErrorCode::InternalJsonError, "JSON error", details)
    }

    pub fn internal_unexpected(error: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InternalUnexpected,
            "Unexpected error",
            serde_json::json!({ "error": error.into() }),
        )
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::internal_unexpected(message)
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }

    /// Stage name carried by a stage failure, if any.
    pub fn stage(&self) -> Option<&str> {
        self.details.get("stage").and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_failed_carries_stage_and_output() {
        let err = Error::stage_failed(StageFailedDetails {
            target: "web-1".to_string(),
            stage: "exec".to_string(),
            command: "bash collect.sh".to_string(),
            exit_code: 3,
            output: "boom".to_string(),
        });

        assert_eq!(err.code, ErrorCode::RemoteStageFailed);
        assert_eq!(err.stage(), Some("exec"));
        assert_eq!(err.details["exitCode"], 3);
        assert_eq!(err.details["output"], "boom");
        assert!(err.message.contains("web-1"));
    }

    #[test]
    fn resolution_codes_are_fatal() {
        assert!(Error::resolution_empty("labels").code.is_resolution());
        assert!(Error::resolution_failed("file", "missing").code.is_resolution());
        assert!(!Error::permission_denied("h", "/tmp", "").code.is_resolution());
    }

    #[test]
    fn permission_denied_has_hint() {
        let err = Error::permission_denied("db-1", "/srv", "Permission denied");
        assert_eq!(err.code.as_str(), "remote.permission_denied");
        assert_eq!(err.hints.len(), 1);
        assert_eq!(err.details["path"], "/srv");
    }
}
