/*!
 * Failure Policy Tests
 * Error propagation, kill-all behavior and lost children
 */

use super::common::{announced_pids, block_start, executor, process_exists, say, SharedSink};
use forklift::{Executor, ParallelError, RunOptions, Task};
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::collections::HashMap;
use std::convert::Infallible;
use std::io::{self, Write};
use std::thread::sleep;
use std::time::{Duration, Instant};

#[derive(Debug, thiserror::Error)]
#[error("disk quota exceeded on {0}")]
struct QuotaError(String);

#[test]
#[serial]
fn test_failure_leaves_siblings_populated() {
    let (mut executor, sink) = executor();

    let err = executor
        .run_in_parallel(
            vec![
                Task::new("ok-1", || Ok::<_, QuotaError>(1)),
                Task::new("broken", || -> Result<i32, QuotaError> {
                    say("about to fail");
                    Err(QuotaError("/var".into()))
                }),
                Task::new("ok-2", || {
                    sleep(Duration::from_millis(200));
                    Ok::<_, QuotaError>(2)
                }),
            ],
            RunOptions::new(),
        )
        .unwrap_err();

    match &err {
        ParallelError::ChildFailure {
            label,
            type_name,
            message,
            ..
        } => {
            assert_eq!(label, "broken");
            assert!(type_name.ends_with("QuotaError"), "type was {type_name}");
            assert_eq!(message, "disk quota exceeded on /var");
        }
        other => panic!("expected child failure, got {other:?}"),
    }
    assert!(err.is_child_failure());
    assert_eq!(err.label(), Some("broken"));

    // Without kill-all every sibling ran to completion
    assert_eq!(executor.bindings().get::<i32>("ok-1").unwrap(), 1);
    assert_eq!(executor.bindings().get::<i32>("ok-2").unwrap(), 2);
    assert!(!executor.bindings().contains("broken"));

    // The failing task's output is still replayed
    let console = sink.contents();
    assert!(console[block_start(&console, "broken")..].contains("about to fail"));
}

#[test]
#[serial]
fn test_kill_all_terminates_siblings() {
    let (mut executor, sink) = executor();
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("finished");
    let marker_path = marker.clone();
    let started = Instant::now();

    let err = executor
        .run_in_parallel(
            vec![
                Task::new("doomed", || -> Result<(), QuotaError> {
                    sleep(Duration::from_millis(100));
                    Err(QuotaError("/home".into()))
                }),
                Task::new("long", move || {
                    say("long started");
                    sleep(Duration::from_secs(5));
                    std::fs::write(&marker_path, b"done")?;
                    Ok::<_, std::io::Error>(())
                }),
            ],
            RunOptions::new()
                .with_kill_all_on_error(true)
                .with_timeout(Duration::from_secs(30)),
        )
        .unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(err.label(), Some("doomed"));
    assert!(!executor.bindings().contains("long"));

    let console = sink.contents();
    for pid in announced_pids(&console) {
        assert!(!process_exists(pid), "pid {pid} still running");
    }

    // The killed sibling's partial output is replayed
    assert!(console[block_start(&console, "long")..].contains("long started"));

    sleep(Duration::from_millis(200));
    assert!(!marker.exists());
}

/// Console that stalls on every replay block, giving siblings time to exit
#[derive(Clone, Default)]
struct StallingSink(SharedSink);

impl Write for StallingSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.windows(12).any(|w| w == b"Begin output") {
            sleep(Duration::from_millis(300));
        }
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

#[test]
#[serial]
fn test_kill_all_logs_sibling_that_already_failed() {
    let console = StallingSink::default();
    let logs = SharedSink::default();
    let mut executor = Executor::with_sink(console.clone());

    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();

    let err = tracing::subscriber::with_default(subscriber, || {
        executor
            .run_in_parallel(
                vec![
                    Task::new("alpha", || -> Result<(), String> { Err("alpha broke".into()) }),
                    Task::new("beta", || -> Result<(), String> { Err("beta broke".into()) }),
                ],
                RunOptions::new().with_kill_all_on_error(true),
            )
            .unwrap_err()
    });

    assert!(matches!(err.label(), Some("alpha") | Some("beta")));

    let logged = logs.contents();
    assert!(logged.contains("alpha broke"), "logs were:\n{logged}");
    assert!(logged.contains("beta broke"), "logs were:\n{logged}");

    let output = console.0.contents();
    for pid in announced_pids(&output) {
        assert!(!process_exists(pid), "pid {pid} still running");
    }
    assert_eq!(output.matches("------ Completed output for").count(), 2);
}

#[test]
#[serial]
fn test_first_failure_by_spawn_order_is_raised() {
    let (mut executor, _) = executor();

    let err = executor
        .run_in_parallel(
            vec![
                Task::new("first", || -> Result<(), QuotaError> {
                    sleep(Duration::from_millis(300));
                    Err(QuotaError("first".into()))
                }),
                Task::new("second", || -> Result<(), QuotaError> {
                    Err(QuotaError("second".into()))
                }),
            ],
            RunOptions::new(),
        )
        .unwrap_err();

    // "second" fails first in time but "first" was spawned first
    assert_eq!(err.label(), Some("first"));
}

#[test]
#[serial]
fn test_panic_becomes_child_failure() {
    let (mut executor, _) = executor();

    let err = executor
        .run_in_parallel(
            vec![Task::new("explode", || -> Result<(), Infallible> {
                panic!("index out of range")
            })],
            RunOptions::new(),
        )
        .unwrap_err();

    match err {
        ParallelError::ChildFailure {
            type_name, message, ..
        } => {
            assert_eq!(type_name, "panic");
            assert_eq!(message, "index out of range");
        }
        other => panic!("expected child failure, got {other:?}"),
    }
}

#[test]
#[serial]
fn test_unencodable_result_is_serialization_failure() {
    let (mut executor, _) = executor();

    let err = executor
        .run_in_parallel(
            vec![Task::new("tuple-keys", || {
                Ok::<_, Infallible>(HashMap::from([((1, 2), "pair")]))
            })],
            RunOptions::new(),
        )
        .unwrap_err();

    match err {
        ParallelError::SerializationFailure { label, .. } => assert_eq!(label, "tuple-keys"),
        other => panic!("expected serialization failure, got {other:?}"),
    }
    assert!(!executor.bindings().contains("tuple-keys"));
}

#[test]
#[serial]
fn test_non_finite_float_is_serialization_failure() {
    let (mut executor, _) = executor();

    let err = executor
        .run_in_parallel(
            vec![
                Task::new("nan", || Ok::<_, Infallible>(f64::NAN)),
                Task::new("finite", || Ok::<_, Infallible>(0.25f64)),
            ],
            RunOptions::new(),
        )
        .unwrap_err();

    match err {
        ParallelError::SerializationFailure { label, message, .. } => {
            assert_eq!(label, "nan");
            assert!(message.contains("NaN"), "message was {message}");
        }
        other => panic!("expected serialization failure, got {other:?}"),
    }
    assert!(!executor.bindings().contains("nan"));
    assert_eq!(executor.bindings().get::<f64>("finite").unwrap(), 0.25);
}

#[test]
#[serial]
fn test_exit_without_result_is_lost_child() {
    let (mut executor, _) = executor();

    let err = executor
        .run_in_parallel(
            vec![Task::new("quitter", || -> Result<(), Infallible> {
                std::process::exit(3)
            })],
            RunOptions::new(),
        )
        .unwrap_err();

    match &err {
        ParallelError::ChildProcessLost { label, status, .. } => {
            assert_eq!(label, "quitter");
            assert_eq!(status, "exit code 3");
        }
        other => panic!("expected lost child, got {other:?}"),
    }
    assert!(err.is_child_failure());
}

#[test]
#[serial]
fn test_error_renders_as_diagnostic() {
    let (mut executor, _) = executor();

    let err = executor
        .run_in_parallel(
            vec![Task::new("render", || -> Result<(), QuotaError> {
                Err(QuotaError("/tmp".into()))
            })],
            RunOptions::new(),
        )
        .unwrap_err();

    let report = miette::Report::new(err);
    assert!(report.to_string().contains("disk quota exceeded on /tmp"));
}
