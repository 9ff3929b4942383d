/*!
 * Core Types
 * Common types used across the executor
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// OS process ID type
pub type Pid = i32;

/// Human-readable task identifier
///
/// Either supplied by the caller or derived from the call site as
/// `file:line:column`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskLabel(String);

impl TaskLabel {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Label derived from a source location
    pub fn from_location(location: &std::panic::Location<'_>) -> Self {
        Self(format!(
            "{}:{}:{}",
            location.file(),
            location.line(),
            location.column()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskLabel {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

impl From<String> for TaskLabel {
    fn from(label: String) -> Self {
        Self(label)
    }
}
