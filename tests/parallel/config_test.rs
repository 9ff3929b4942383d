/*!
 * Default Timeout Tests
 */

use super::common::executor;
use forklift::{default_timeout, set_default_timeout, ParallelError, RunOptions, Task};
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::convert::Infallible;
use std::thread::sleep;
use std::time::Duration;

/// Restores the process-wide default when dropped
struct DefaultTimeoutGuard(Duration);

impl DefaultTimeoutGuard {
    fn set(timeout: Duration) -> Self {
        let previous = default_timeout();
        set_default_timeout(timeout);
        Self(previous)
    }
}

impl Drop for DefaultTimeoutGuard {
    fn drop(&mut self) {
        set_default_timeout(self.0);
    }
}

#[test]
#[serial]
fn test_default_applies_without_per_call_timeout() {
    let _guard = DefaultTimeoutGuard::set(Duration::from_millis(400));
    let (mut executor, _) = executor();

    let err = executor
        .run_in_parallel(
            vec![Task::new("dawdle", || {
                sleep(Duration::from_secs(10));
                Ok::<_, Infallible>(())
            })],
            RunOptions::new(),
        )
        .unwrap_err();

    match err {
        ParallelError::Timeout { timeout_ms, killed, .. } => {
            assert_eq!(timeout_ms, 400);
            assert_eq!(killed, vec!["dawdle".to_string()]);
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[test]
#[serial]
fn test_per_call_timeout_overrides_default() {
    let _guard = DefaultTimeoutGuard::set(Duration::from_millis(100));
    let (mut executor, _) = executor();

    executor
        .run_in_parallel(
            vec![Task::new("patient", || {
                sleep(Duration::from_millis(400));
                Ok::<_, Infallible>("finished")
            })],
            RunOptions::new().with_timeout(Duration::from_secs(20)),
        )
        .unwrap();

    assert_eq!(executor.bindings().get::<String>("patient").unwrap(), "finished");
}

#[test]
#[serial]
fn test_default_is_read_at_call_time() {
    let options = RunOptions::new();
    let _guard = DefaultTimeoutGuard::set(Duration::from_secs(7));
    assert_eq!(options.effective_timeout(), Duration::from_secs(7));
}
