/*!
 * Core Module
 * Fundamental types, configuration and error handling
 */

pub mod config;
pub mod errors;
pub mod limits;
pub mod serialization;
pub mod types;

// Re-export for convenience
pub use config::{default_timeout, set_default_timeout, RunOptions};
pub use errors::*;
pub use types::*;
