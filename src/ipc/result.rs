/*!
 * Result Marshaling Channel
 *
 * Carries exactly one `TaskResult` from a task process to the executor. The
 * envelope is a versioned bincode frame; the success payload is JSON so any
 * serde value can be held by the parent without knowing its Rust type.
 */

use super::pipe::{channel, DrainState, PipeError, PipeReader};
use crate::core::errors::ParallelError;
use crate::core::serialization::{bincode, json, BincodeError};
use crate::core::types::{Pid, TaskLabel};
use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::os::fd::OwnedFd;

/// Classification of a task failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Body returned `Err`
    Error,
    /// Body panicked
    Panic,
    /// Returned value could not be encoded
    Serialization,
}

/// Failure description that survives the process boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDescriptor {
    pub kind: FailureKind,
    /// Rust type name of the error (or of the unencodable value)
    pub type_name: String,
    pub message: String,
    /// Debug rendering of the error, the closest thing to a stack summary
    pub detail: String,
}

/// One task's final result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskResult {
    /// JSON-encoded return value
    Success(Vec<u8>),
    Failure(FailureDescriptor),
}

impl TaskResult {
    /// Build a result from a task body's return
    pub fn from_outcome<T, E>(outcome: Result<T, E>) -> Self
    where
        T: Serialize,
        E: fmt::Display + fmt::Debug,
    {
        match outcome {
            Ok(value) => match json::to_vec(&value) {
                Ok(payload) => Self::Success(payload),
                Err(e) => Self::Failure(FailureDescriptor {
                    kind: FailureKind::Serialization,
                    type_name: std::any::type_name::<T>().to_string(),
                    message: std::error::Error::source(&e)
                        .map(|source| source.to_string())
                        .unwrap_or_else(|| e.to_string()),
                    detail: format!("{:?}", e),
                }),
            },
            Err(e) => Self::Failure(FailureDescriptor {
                kind: FailureKind::Error,
                type_name: std::any::type_name::<E>().to_string(),
                message: e.to_string(),
                detail: format!("{:?}", e),
            }),
        }
    }

    /// Build a failure from a caught panic payload
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());

        Self::Failure(FailureDescriptor {
            kind: FailureKind::Panic,
            type_name: "panic".to_string(),
            detail: format!("task panicked: {}", message),
            message,
        })
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Write a result frame through the child's end of the channel
pub fn send(writer: OwnedFd, result: &TaskResult) -> Result<(), ResultSendError> {
    let frame = bincode::to_vec_with_header(result)?;
    let mut file = File::from(writer);
    file.write_all(&frame)
        .and_then(|_| file.flush())
        .map_err(PipeError::WriteFailed)?;
    Ok(())
}

/// Errors while sending a result frame from the child
#[derive(Debug, thiserror::Error)]
pub enum ResultSendError {
    #[error(transparent)]
    Encode(#[from] BincodeError),

    #[error(transparent)]
    Pipe(#[from] PipeError),
}

/// Parent side of a task's result channel
#[derive(Debug)]
pub struct ResultReceiver {
    reader: PipeReader,
    buffer: BytesMut,
}

/// Create a result channel; the write end goes to the child
pub fn open() -> Result<(ResultReceiver, OwnedFd), PipeError> {
    let (reader, writer) = channel()?;
    Ok((
        ResultReceiver {
            reader,
            buffer: BytesMut::new(),
        },
        writer,
    ))
}

impl ResultReceiver {
    /// Pull frame bytes written so far
    ///
    /// Large results exceed the pipe buffer, so this runs while the child is
    /// still writing.
    pub fn drain(&mut self) -> Result<DrainState, PipeError> {
        self.reader.drain_into(&mut self.buffer)
    }

    #[inline]
    pub fn reader(&self) -> &PipeReader {
        &self.reader
    }

    /// Decode the received frame into the task's value
    ///
    /// `exit_status` describes how the child ended and is used when no
    /// complete frame arrived.
    pub fn decode(
        &self,
        label: &TaskLabel,
        pid: Pid,
        exit_status: &str,
    ) -> Result<Value, ParallelError> {
        let lost = || ParallelError::ChildProcessLost {
            label: label.to_string(),
            pid,
            status: exit_status.to_string(),
        };

        if self.buffer.is_empty() {
            return Err(lost());
        }

        let result: TaskResult = match bincode::from_slice_with_header(&self.buffer) {
            Ok(result) => result,
            Err(BincodeError::BufferTooSmall { .. }) => return Err(lost()),
            Err(e) => {
                return Err(ParallelError::SerializationFailure {
                    label: label.to_string(),
                    pid,
                    message: e.to_string(),
                })
            }
        };

        match result {
            TaskResult::Success(payload) => {
                json::from_slice::<Value>(&payload).map_err(|e| {
                    ParallelError::SerializationFailure {
                        label: label.to_string(),
                        pid,
                        message: e.to_string(),
                    }
                })
            }
            TaskResult::Failure(failure) => Err(failure_to_error(label, pid, failure)),
        }
    }
}

fn failure_to_error(label: &TaskLabel, pid: Pid, failure: FailureDescriptor) -> ParallelError {
    match failure.kind {
        FailureKind::Serialization => ParallelError::SerializationFailure {
            label: label.to_string(),
            pid,
            message: format!("{} ({})", failure.message, failure.type_name),
        },
        FailureKind::Error | FailureKind::Panic => ParallelError::ChildFailure {
            label: label.to_string(),
            pid,
            type_name: failure.type_name,
            message: failure.message,
            detail: failure.detail,
        },
    }
}
