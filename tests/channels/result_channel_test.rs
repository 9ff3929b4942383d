//! Property tests for the result channel
//!
//! Values are pushed through a real pipe by a writer thread while the reader
//! drains it, the same way a task process and the executor share it.

use forklift::core::serialization::to_vec_with_header;
use forklift::ipc::{result, DrainState, TaskResult};
use forklift::{ParallelError, TaskLabel};
use proptest::prelude::*;
use serde_json::{Map, Value};
use std::fs::File;
use std::io::Write;
use std::os::fd::OwnedFd;
use std::thread;
use std::time::Duration;

/// Arbitrary JSON documents without floats
fn json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 _-]{0,24}".prop_map(Value::String),
    ];

    leaf.prop_recursive(4, 64, 8, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..8).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,8}", inner, 0..8)
                .prop_map(|map| Value::Object(map.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

/// Write `bytes` from another thread and drain the channel until EOF
fn transfer(bytes: Vec<u8>) -> Result<Value, ParallelError> {
    let (mut receiver, writer) = result::open().unwrap();

    let sender = thread::spawn(move || {
        let mut file = File::from(writer);
        file.write_all(&bytes).unwrap();
    });

    while receiver.drain().unwrap() != DrainState::Eof {
        thread::sleep(Duration::from_millis(1));
    }
    sender.join().unwrap();

    receiver.decode(&TaskLabel::from("prop"), 42, "exit code 0")
}

fn send_through(result: TaskResult) -> Result<Value, ParallelError> {
    let (mut receiver, writer) = result::open().unwrap();
    let sender = thread::spawn(move || result::send(writer, &result).unwrap());

    while receiver.drain().unwrap() != DrainState::Eof {
        thread::sleep(Duration::from_millis(1));
    }
    sender.join().unwrap();

    receiver.decode(&TaskLabel::from("prop"), 42, "exit code 0")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_nested_values_survive_the_channel(value in json_value()) {
        let decoded = send_through(TaskResult::from_outcome(Ok::<_, String>(&value))).unwrap();
        prop_assert_eq!(decoded, value);
    }

    #[test]
    fn prop_truncated_frame_is_lost_child(value in json_value(), cut in 0.0f64..1.0) {
        let frame = to_vec_with_header(&TaskResult::from_outcome(Ok::<_, String>(&value))).unwrap();
        let keep = ((frame.len() as f64) * cut) as usize;
        prop_assume!(keep < frame.len());

        match transfer(frame[..keep].to_vec()) {
            Err(ParallelError::ChildProcessLost { pid, status, .. }) => {
                prop_assert_eq!(pid, 42);
                prop_assert_eq!(status, "exit code 0");
            }
            other => prop_assert!(false, "expected lost child, got {:?}", other),
        }
    }

    #[test]
    fn prop_error_messages_survive_the_channel(message in "\\PC{0,200}") {
        let outcome: Result<(), String> = Err(message.clone());
        match send_through(TaskResult::from_outcome(outcome)) {
            Err(ParallelError::ChildFailure { message: received, type_name, .. }) => {
                prop_assert_eq!(received, message);
                prop_assert!(type_name.ends_with("String"));
            }
            other => prop_assert!(false, "expected child failure, got {:?}", other),
        }
    }
}

#[test]
fn test_large_payload_exceeds_pipe_buffer() {
    let value = Value::String("z".repeat(1 << 20));
    let decoded = send_through(TaskResult::from_outcome(Ok::<_, String>(&value))).unwrap();
    assert_eq!(decoded, value);
}
