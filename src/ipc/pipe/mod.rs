/*!
 * Pipe Module
 * Unix pipes carrying bytes from a task process to the executor
 */

pub mod pipe;
pub mod types;

// Re-export public API
pub use pipe::{channel, PipeReader};
pub use types::{DrainState, PipeError};
