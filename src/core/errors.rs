/*!
 * Error Types
 * Centralized error handling with thiserror and miette
 */

use super::types::Pid;
use miette::Diagnostic;
use thiserror::Error;

/// Result type for executor operations
pub type ParallelResult<T> = Result<T, ParallelError>;

/// Errors surfaced to the caller of a parallel operation
///
/// Exactly one of these is raised per failed batch, after every child in the
/// batch has been reaped.
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum ParallelError {
    #[error("Task '{label}' (PID {pid}) failed with {type_name}: {message}")]
    #[diagnostic(
        code(forklift::child_failure),
        help("The task body returned an error or panicked. Its captured output was replayed above.")
    )]
    ChildFailure {
        label: String,
        pid: Pid,
        type_name: String,
        message: String,
        detail: String,
    },

    #[error("Batch timed out after {elapsed_ms}ms (timeout: {timeout_ms}ms), killed: [{}]", killed.join(", "))]
    #[diagnostic(
        code(forklift::timeout),
        help("Raise the per-call timeout or the process-wide default with set_default_timeout.")
    )]
    Timeout {
        elapsed_ms: u64,
        timeout_ms: u64,
        killed: Vec<String>,
    },

    #[error("Result of task '{label}' (PID {pid}) could not be marshaled: {message}")]
    #[diagnostic(
        code(forklift::serialization_failure),
        help("Task results must be serde-serializable into self-describing JSON (e.g. map keys must be strings).")
    )]
    SerializationFailure {
        label: String,
        pid: Pid,
        message: String,
    },

    #[error("Task '{label}' (PID {pid}) exited without producing a result: {status}")]
    #[diagnostic(
        code(forklift::child_process_lost),
        help("The process was killed externally or exited before writing its result.")
    )]
    ChildProcessLost {
        label: String,
        pid: Pid,
        status: String,
    },

    #[error("Failed to spawn task '{label}': {message}")]
    #[diagnostic(
        code(forklift::spawn_failed),
        help("Check process and file descriptor limits.")
    )]
    Spawn { label: String, message: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Binding(#[from] BindingError),
}

impl ParallelError {
    /// True for failures that originate in a task process
    ///
    /// A lost child counts as a child failure with a generic message.
    pub fn is_child_failure(&self) -> bool {
        matches!(
            self,
            Self::ChildFailure { .. } | Self::ChildProcessLost { .. }
        )
    }

    /// Label of the task the error belongs to, if any
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::ChildFailure { label, .. }
            | Self::SerializationFailure { label, .. }
            | Self::ChildProcessLost { label, .. }
            | Self::Spawn { label, .. } => Some(label),
            Self::Timeout { .. } | Self::Binding(_) => None,
        }
    }
}

/// Errors reading a caller-visible binding
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum BindingError {
    #[error("Binding '{0}' not found")]
    #[diagnostic(code(binding::not_found))]
    NotFound(String),

    #[error("Binding '{0}' is still unresolved")]
    #[diagnostic(
        code(binding::unresolved),
        help("The binding belongs to a background task. Call wait_for_processes first.")
    )]
    Unresolved(String),

    #[error("Binding '{name}' holds an incompatible value: {message}")]
    #[diagnostic(code(binding::type_mismatch))]
    TypeMismatch { name: String, message: String },
}
