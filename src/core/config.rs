/*!
 * Executor Configuration
 *
 * Process-wide default timeout plus per-call run options.
 */

use super::limits::DEFAULT_BATCH_TIMEOUT;
use parking_lot::{const_rwlock, RwLock};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable overriding the default batch timeout, in seconds
pub const TIMEOUT_ENV_VAR: &str = "FORKLIFT_TIMEOUT_SECS";

static DEFAULT_TIMEOUT: RwLock<Duration> = const_rwlock(DEFAULT_BATCH_TIMEOUT);

/// Current process-wide default batch timeout
pub fn default_timeout() -> Duration {
    *DEFAULT_TIMEOUT.read()
}

/// Replace the process-wide default batch timeout
///
/// Read by value by every later call that does not pass its own timeout.
pub fn set_default_timeout(timeout: Duration) {
    *DEFAULT_TIMEOUT.write() = timeout;
}

/// Initialize the default timeout from `FORKLIFT_TIMEOUT_SECS`, if set
///
/// Returns the timeout in effect afterwards.
pub fn init_from_env() -> Duration {
    if let Ok(raw) = std::env::var(TIMEOUT_ENV_VAR) {
        match raw.trim().parse::<u64>() {
            Ok(secs) => {
                set_default_timeout(Duration::from_secs(secs));
                info!(timeout_secs = secs, "Default batch timeout set from environment");
            }
            Err(e) => {
                warn!(value = %raw, error = %e, "Ignoring invalid {}", TIMEOUT_ENV_VAR);
            }
        }
    }
    default_timeout()
}

/// Options for a single parallel invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Batch budget; `None` reads the process-wide default at call time
    pub timeout: Option<Duration>,
    /// Terminate all siblings as soon as one task fails
    pub kill_all_on_error: bool,
    /// Label for `each_in_parallel` tasks; defaults to the call site
    pub label: Option<String>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_kill_all_on_error(mut self, kill: bool) -> Self {
        self.kill_all_on_error = kill;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Timeout to enforce for this call
    pub fn effective_timeout(&self) -> Duration {
        self.timeout.unwrap_or_else(default_timeout)
    }
}
