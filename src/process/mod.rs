/*!
 * Process Module
 * Task processes, batches, bindings and the executor
 */

pub mod background;
pub mod batch;
pub mod bindings;
pub mod child;
pub mod executor;
pub mod task;

// Re-export for convenience
pub use background::{detached_count, pending_count, reap_detached, wait_detached};
pub use batch::{BatchPolicy, Delivery, ExecutionBatch};
pub use bindings::{Bindings, SharedBindings, Slot};
pub use child::{ChildHandle, CompletedChild, ExitState};
pub use executor::Executor;
pub use task::Task;
