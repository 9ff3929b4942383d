/*!
 * Pipe Types
 * Errors and drain state for child-to-parent OS pipes
 */

use thiserror::Error;

/// Pipe error types
#[derive(Debug, Error)]
pub enum PipeError {
    #[error("Failed to create pipe: {0}")]
    CreateFailed(#[source] nix::Error),

    #[error("Failed to configure pipe descriptor: {0}")]
    ConfigureFailed(#[source] nix::Error),

    #[error("Pipe read failed: {0}")]
    ReadFailed(#[source] std::io::Error),

    #[error("Pipe write failed: {0}")]
    WriteFailed(#[source] std::io::Error),
}

/// Outcome of a non-blocking drain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    /// The writer may still produce more bytes
    Open,
    /// Every write end is closed and the pipe is empty
    Eof,
}
