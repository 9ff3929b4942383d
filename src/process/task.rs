/*!
 * Tasks
 * A labeled closure plus the binding its result is written to
 */

use crate::core::types::TaskLabel;
use crate::ipc::TaskResult;
use serde::Serialize;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

type TaskBody<'a> = Box<dyn FnOnce() -> TaskResult + 'a>;

/// One unit of work executed in its own forked process
///
/// The body only ever runs in the child, so it may borrow from the caller's
/// stack and does not need to be `Send`.
pub struct Task<'a> {
    label: TaskLabel,
    binding: String,
    body: TaskBody<'a>,
}

impl<'a> Task<'a> {
    /// Create a task whose result binding is named after its label
    pub fn new<T, E, F>(label: impl Into<TaskLabel>, body: F) -> Self
    where
        F: FnOnce() -> Result<T, E> + 'a,
        T: Serialize,
        E: fmt::Display + fmt::Debug,
    {
        let label = label.into();
        Self {
            binding: label.as_str().to_string(),
            label,
            body: Box::new(move || TaskResult::from_outcome(body())),
        }
    }

    /// Create a task labeled with the caller's source location
    #[track_caller]
    pub fn at_caller<T, E, F>(body: F) -> Self
    where
        F: FnOnce() -> Result<T, E> + 'a,
        T: Serialize,
        E: fmt::Display + fmt::Debug,
    {
        Self::new(TaskLabel::from_location(panic::Location::caller()), body)
    }

    /// Write the result to `binding` instead of the label
    pub fn bind(mut self, binding: impl Into<String>) -> Self {
        self.binding = binding.into();
        self
    }

    pub fn label(&self) -> &TaskLabel {
        &self.label
    }

    pub fn binding(&self) -> &str {
        &self.binding
    }

    pub(crate) fn into_parts(self) -> (TaskLabel, String, TaskBody<'a>) {
        (self.label, self.binding, self.body)
    }
}

impl fmt::Debug for Task<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("label", &self.label)
            .field("binding", &self.binding)
            .finish_non_exhaustive()
    }
}

/// Run a body, turning a panic into a failure result
pub(crate) fn run_body(body: TaskBody<'_>) -> TaskResult {
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(result) => result,
        Err(payload) => TaskResult::from_panic(payload.as_ref()),
    }
}
