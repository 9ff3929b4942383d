/*!
 * each_in_parallel Tests
 */

use super::common::{announced_pids, executor};
use forklift::{ParallelError, RunOptions};
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::convert::Infallible;
use std::thread::sleep;
use std::time::Duration;

#[test]
#[serial]
fn test_results_in_input_order() {
    let (mut executor, sink) = executor();

    // Later items finish first
    let results = executor
        .each_in_parallel(
            vec![4u64, 3, 2, 1],
            |n| {
                sleep(Duration::from_millis(n * 60));
                Ok::<_, Infallible>(n * 10)
            },
            RunOptions::new(),
        )
        .unwrap();

    assert_eq!(results, vec![40, 30, 20, 10]);
    assert_eq!(announced_pids(&sink.contents()).len(), 4);
}

#[test]
#[serial]
fn test_default_label_is_call_site() {
    let (mut executor, sink) = executor();

    let results = executor
        .each_in_parallel(vec!["a", "b"], |s| Ok::<_, Infallible>(s.to_uppercase()), RunOptions::new())
        .unwrap();
    assert_eq!(results, vec!["A".to_string(), "B".to_string()]);

    let console = sink.contents();
    let expected = format!("Forked process for '{}:", file!());
    assert_eq!(console.matches(&expected).count(), 2, "console was:\n{console}");
}

#[test]
#[serial]
fn test_custom_label() {
    let (mut executor, sink) = executor();

    executor
        .each_in_parallel(
            1..=3,
            |n: i32| Ok::<_, Infallible>(n),
            RunOptions::new().with_label("resize-images"),
        )
        .unwrap();

    let console = sink.contents();
    assert_eq!(console.matches("Forked process for 'resize-images'").count(), 3);
    assert_eq!(console.matches("------ Begin output for resize-images - ").count(), 3);
}

#[test]
#[serial]
fn test_element_error_propagates() {
    let (mut executor, _) = executor();

    let err = executor
        .each_in_parallel(
            vec![1, 2, 3],
            |n: i32| {
                if n == 2 {
                    Err(format!("cannot process {}", n))
                } else {
                    Ok(n)
                }
            },
            RunOptions::new().with_label("checker"),
        )
        .unwrap_err();

    match err {
        ParallelError::ChildFailure { label, message, .. } => {
            assert_eq!(label, "checker");
            assert_eq!(message, "cannot process 2");
        }
        other => panic!("expected child failure, got {other:?}"),
    }
}

#[test]
#[serial]
fn test_empty_input() {
    let (mut executor, sink) = executor();

    let results = executor
        .each_in_parallel(Vec::<u8>::new(), |n| Ok::<_, Infallible>(n), RunOptions::new())
        .unwrap();

    assert!(results.is_empty());
    assert!(sink.contents().is_empty());
}
