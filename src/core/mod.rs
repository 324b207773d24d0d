// Public modules
pub mod aggregate;
pub mod error;
pub mod kube;
pub mod pipeline;
pub mod resolve;
pub mod run;
pub mod scheduler;
pub mod session;
pub mod ssh;
pub mod target;
pub mod transcript;
pub mod transport;

// Internal modules - not part of public API
pub(crate) mod paths;

// Public modules for CLI access
pub mod defaults;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, Result};
pub use pipeline::{ExecutionResult, ExecutionStatus, PipelineJob, PipelineState};
pub use run::{RunOptions, RunReport};
pub use target::{ExecutionTarget, KubeParams, SshParams};
