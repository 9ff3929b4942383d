/*!
 * Parallel Executor
 * Forks one process per task and writes their decoded results back
 */

use super::background;
use super::batch::{BatchPolicy, ExecutionBatch};
use super::bindings::{Bindings, SharedBindings};
use super::child::{self, ChildHandle};
use super::task::Task;
use crate::core::config::RunOptions;
use crate::core::errors::{ParallelError, ParallelResult};
use crate::core::serialization::json;
use crate::core::types::{Pid, TaskLabel};
use crate::ipc::capture;
use parking_lot::{Mutex, MutexGuard};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::{info, warn};

/// Runs tasks in forked processes on behalf of one caller context
///
/// Console announcements and replayed output go to the sink (stdout by
/// default); decoded results go to the executor's bindings. Background tasks
/// keep a handle on those bindings, so their results land here whichever
/// executor joins them.
pub struct Executor {
    sink: Box<dyn Write + Send>,
    bindings: SharedBindings,
}

impl Executor {
    pub fn new() -> Self {
        Self::with_sink(io::stdout())
    }

    /// Executor writing console output to `sink`
    pub fn with_sink(sink: impl Write + Send + 'static) -> Self {
        Self {
            sink: Box::new(sink),
            bindings: Arc::new(Mutex::new(Bindings::new())),
        }
    }

    /// Lock the executor's bindings for reading
    pub fn bindings(&self) -> MutexGuard<'_, Bindings> {
        self.bindings.lock()
    }

    /// Run every task in its own process and wait for all of them
    ///
    /// Each success is written to the task's binding as soon as its child
    /// completes. The first failure (by spawn order, or the first observed
    /// with `kill_all_on_error`) is returned after every child was reaped.
    pub fn run_in_parallel(&mut self, tasks: Vec<Task<'_>>, options: RunOptions) -> ParallelResult<()> {
        let policy = policy_for(&options);
        let batch = self.spawn_batch(tasks)?;

        let bindings = &self.bindings;
        batch.resolve(policy, &mut self.sink, |delivery| {
            bindings.lock().resolve(delivery.binding, delivery.value);
            Ok(())
        })
    }

    /// Apply `f` to every item in its own process, returning results in
    /// input order
    ///
    /// Tasks are labeled with `options.label`, or with the caller's source
    /// location when no label is given.
    #[track_caller]
    pub fn each_in_parallel<I, T, R, E, F>(
        &mut self,
        items: I,
        f: F,
        options: RunOptions,
    ) -> ParallelResult<Vec<R>>
    where
        I: IntoIterator<Item = T>,
        F: Fn(T) -> Result<R, E>,
        R: Serialize + DeserializeOwned,
        E: fmt::Display + fmt::Debug,
    {
        let label = match &options.label {
            Some(label) => TaskLabel::new(label.clone()),
            None => TaskLabel::from_location(std::panic::Location::caller()),
        };

        let f = &f;
        let tasks: Vec<Task<'_>> = items
            .into_iter()
            .map(|item| Task::new(label.clone(), move || f(item)))
            .collect();

        let policy = policy_for(&options);
        let mut results: Vec<Option<R>> = std::iter::repeat_with(|| None).take(tasks.len()).collect();
        let batch = self.spawn_batch(tasks)?;

        batch.resolve(policy, &mut self.sink, |delivery| {
            let value = json::from_value::<R>(delivery.value).map_err(|e| {
                ParallelError::SerializationFailure {
                    label: delivery.label.to_string(),
                    pid: delivery.pid,
                    message: e.to_string(),
                }
            })?;
            results[delivery.index] = Some(value);
            Ok(())
        })?;

        results
            .into_iter()
            .map(|result| {
                result.ok_or_else(|| ParallelError::ChildProcessLost {
                    label: label.to_string(),
                    pid: 0,
                    status: "no result delivered".to_string(),
                })
            })
            .collect()
    }

    /// Fork tasks and return immediately
    ///
    /// With `ignore_results` the children are detached: their output goes
    /// straight to the inherited stdout and they are only tracked so they can
    /// be reaped. Otherwise each child is registered for the next
    /// `wait_for_processes` and its binding is set to the unresolved
    /// placeholder.
    pub fn run_in_background(
        &mut self,
        tasks: Vec<Task<'_>>,
        ignore_results: bool,
    ) -> ParallelResult<Vec<Pid>> {
        background::reap_detached();

        if ignore_results {
            let mut pids = Vec::with_capacity(tasks.len());
            for task in tasks {
                let (label, pid) = child::spawn_detached(task)?;
                self.announce(&label, pid.as_raw());
                background::track_detached(label, pid);
                pids.push(pid.as_raw());
            }
            return Ok(pids);
        }

        let batch = self.spawn_handles(tasks)?;
        let pids = batch.iter().map(ChildHandle::pid).collect();
        {
            let mut bindings = self.bindings.lock();
            for handle in &batch {
                bindings.mark_unresolved(handle.binding());
            }
        }
        background::register(batch, &self.bindings);
        Ok(pids)
    }

    /// Join every registered background task as one batch
    ///
    /// A no-op when nothing is pending. Uses the same wait, replay and
    /// failure policy as `run_in_parallel`. Each result is written to the
    /// bindings of the executor that spawned it.
    pub fn wait_for_processes(&mut self, options: RunOptions) -> ParallelResult<()> {
        background::reap_detached();

        let pending = background::take_pending();
        if pending.is_empty() {
            return Ok(());
        }

        info!(tasks = pending.len(), "Waiting for background tasks");
        let (handles, targets): (Vec<_>, Vec<_>) = pending
            .into_iter()
            .map(|entry| (entry.handle, entry.target))
            .unzip();

        let batch = ExecutionBatch::new(handles);
        batch.resolve(policy_for(&options), &mut self.sink, |delivery| {
            targets[delivery.index]
                .lock()
                .resolve(delivery.binding, delivery.value);
            Ok(())
        })
    }

    fn spawn_batch(&mut self, tasks: Vec<Task<'_>>) -> ParallelResult<ExecutionBatch> {
        background::reap_detached();
        self.spawn_handles(tasks).map(ExecutionBatch::new)
    }

    /// Fork every task, announcing each in spawn order
    ///
    /// If one fork fails, the already-forked children are killed and reaped.
    fn spawn_handles(&mut self, tasks: Vec<Task<'_>>) -> ParallelResult<Vec<ChildHandle>> {
        let mut handles = Vec::with_capacity(tasks.len());
        for task in tasks {
            match child::spawn(task) {
                Ok(handle) => {
                    self.announce(handle.label(), handle.pid());
                    handles.push(handle);
                }
                Err(e) => {
                    warn!(error = %e, spawned = handles.len(), "Aborting batch after spawn failure");
                    ExecutionBatch::new(handles).abort(&mut self.sink);
                    return Err(e);
                }
            }
        }
        Ok(handles)
    }

    fn announce(&mut self, label: &TaskLabel, pid: Pid) {
        info!(pid, label = %label, "Forked task process");
        if let Err(e) = capture::write_announcement(&mut self.sink, label, pid) {
            warn!(pid, error = %e, "Failed to write spawn announcement");
        }
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("bindings", &*self.bindings.lock())
            .finish_non_exhaustive()
    }
}

fn policy_for(options: &RunOptions) -> BatchPolicy {
    BatchPolicy {
        timeout: options.effective_timeout(),
        kill_all_on_error: options.kill_all_on_error,
    }
}
