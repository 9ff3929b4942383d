/*!
 * Forklift
 * Run a handful of task closures in forked processes, replay their output in
 * completion order and marshal their results back into the parent
 */

pub mod core;
pub mod ipc;
pub mod monitoring;
pub mod process;

// Re-exports
pub use crate::core::{
    default_timeout, set_default_timeout, BindingError, ParallelError, ParallelResult, Pid,
    RunOptions, TaskLabel,
};
pub use ipc::{FailureDescriptor, FailureKind, TaskResult};
pub use monitoring::init_tracing;
pub use process::{Bindings, Executor, Slot, Task};
