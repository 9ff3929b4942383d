/*!
 * IPC Module
 * Per-task channels between a forked task process and the executor
 */

pub mod capture;
pub mod pipe;
pub mod result;

// Re-export for convenience
pub use capture::OutputCapture;
pub use pipe::{DrainState, PipeError, PipeReader};
pub use result::{FailureDescriptor, FailureKind, ResultReceiver, TaskResult};
