/*!
 * Execution Batches
 *
 * Waits on every child spawned by one invocation: multiplexes their channels
 * with poll(2), reaps them without blocking, replays output in completion
 * order and applies the timeout and failure policy.
 */

use super::child::{ChildHandle, CompletedChild};
use crate::core::errors::{ParallelError, ParallelResult};
use crate::core::limits::POLL_INTERVAL_MS;
use crate::core::types::{Pid, TaskLabel};
use crate::ipc::capture;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use serde_json::Value;
use std::io::Write;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

/// Timeout and failure policy for one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPolicy {
    pub timeout: Duration,
    pub kill_all_on_error: bool,
}

/// A decoded success, handed to the caller as soon as its child completes
#[derive(Debug)]
pub struct Delivery<'b> {
    /// Position of the task in spawn order
    pub index: usize,
    pub label: &'b TaskLabel,
    pub pid: Pid,
    pub binding: &'b str,
    pub value: Value,
}

/// Every child spawned by one invocation, in spawn order
#[derive(Debug)]
pub struct ExecutionBatch {
    id: Uuid,
    handles: Vec<ChildHandle>,
}

impl ExecutionBatch {
    pub fn new(handles: Vec<ChildHandle>) -> Self {
        Self {
            id: Uuid::new_v4(),
            handles,
        }
    }

    /// Kill, reap and replay every child; used when spawning a batch fails
    pub fn abort<W: Write + ?Sized>(self, sink: &mut W) {
        for handle in self.handles {
            terminate_and_replay(handle, sink);
        }
    }

    /// Wait for the whole batch under `policy`
    ///
    /// `deliver` receives each successful value as soon as its child has been
    /// drained; an error it returns counts as that child's failure.
    pub fn resolve<W, F>(self, policy: BatchPolicy, sink: &mut W, mut deliver: F) -> ParallelResult<()>
    where
        W: Write + ?Sized,
        F: FnMut(Delivery<'_>) -> ParallelResult<()>,
    {
        let span = info_span!("batch", batch_id = %self.id, tasks = self.handles.len());
        let _entered = span.enter();

        let started = Instant::now();
        let deadline = started + policy.timeout;

        let mut outstanding: Vec<(usize, ChildHandle)> =
            self.handles.into_iter().enumerate().collect();
        let mut failures: Vec<(usize, ParallelError)> = Vec::new();
        let mut triggered: Option<ParallelError> = None;
        let mut timed_out = false;

        while !outstanding.is_empty() {
            wait_for_activity(&outstanding, deadline.saturating_duration_since(Instant::now()));

            for (_, handle) in outstanding.iter_mut() {
                handle.drain();
            }

            let mut i = 0;
            while i < outstanding.len() {
                let Some(exit) = outstanding[i].1.try_reap() else {
                    i += 1;
                    continue;
                };

                let (index, handle) = outstanding.remove(i);
                let completed = handle.complete(exit);
                replay(&completed, sink);

                if let Err(e) = settle(index, completed, &mut deliver) {
                    if policy.kill_all_on_error {
                        triggered = Some(e);
                        break;
                    }
                    failures.push((index, e));
                }
            }

            if triggered.is_some() {
                // Siblings that already exited keep their own outcome
                for (index, mut handle) in outstanding.drain(..) {
                    match handle.try_reap() {
                        Some(exit) => {
                            let completed = handle.complete(exit);
                            replay(&completed, sink);
                            if let Err(e) = settle(index, completed, &mut deliver) {
                                failures.push((index, e));
                            }
                        }
                        None => terminate_and_replay(handle, sink),
                    }
                }
                break;
            }

            if !outstanding.is_empty() && Instant::now() >= deadline {
                timed_out = true;
                break;
            }
        }

        if timed_out {
            let killed: Vec<String> = outstanding
                .drain(..)
                .map(|(_, handle)| {
                    let label = handle.label().to_string();
                    terminate_and_replay(handle, sink);
                    label
                })
                .collect();

            for (_, e) in &failures {
                error!(error = %e, "Task failed in timed out batch");
            }
            error!(killed = ?killed, "Batch timed out");

            return Err(ParallelError::Timeout {
                elapsed_ms: started.elapsed().as_millis() as u64,
                timeout_ms: policy.timeout.as_millis() as u64,
                killed,
            });
        }

        if let Some(e) = triggered {
            for (_, other) in &failures {
                error!(error = %other, "Additional task failure");
            }
            return Err(e);
        }

        failures.sort_by_key(|(index, _)| *index);
        let mut failures = failures.into_iter();
        match failures.next() {
            Some((_, first)) => {
                for (_, other) in failures {
                    error!(error = %other, "Additional task failure not re-raised");
                }
                Err(first)
            }
            None => {
                debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Batch completed");
                Ok(())
            }
        }
    }
}

/// Hand a completed child's value to `deliver`, or return its failure
fn settle<F>(index: usize, completed: CompletedChild, deliver: &mut F) -> ParallelResult<()>
where
    F: FnMut(Delivery<'_>) -> ParallelResult<()>,
{
    let outcome = match completed.value {
        Some(Ok(value)) => deliver(Delivery {
            index,
            label: &completed.label,
            pid: completed.pid,
            binding: &completed.binding,
            value,
        }),
        Some(Err(e)) => Err(e),
        None => Ok(()),
    };

    match &outcome {
        Ok(()) => info!(
            pid = completed.pid,
            label = %completed.label,
            elapsed_ms = completed.elapsed.as_millis() as u64,
            "Task completed"
        ),
        Err(e) => warn!(pid = completed.pid, label = %completed.label, error = %e, "Task failed"),
    }
    outcome
}

/// Sleep until some child has written data or closed a channel
///
/// Bounded by the poll interval so exits and the deadline are noticed.
fn wait_for_activity(outstanding: &[(usize, ChildHandle)], remaining: Duration) {
    let interval = Duration::from_millis(u64::from(POLL_INTERVAL_MS)).min(remaining);

    let mut fds: Vec<PollFd<'_>> = outstanding
        .iter()
        .flat_map(|(_, handle)| handle.open_readers())
        .map(|reader| PollFd::new(reader.poll_fd(), PollFlags::POLLIN))
        .collect();

    if fds.is_empty() {
        // Channels closed, the processes are just exiting
        std::thread::sleep(interval);
        return;
    }

    let timeout = PollTimeout::from(interval.as_millis() as u16);
    if let Err(e) = poll(&mut fds, timeout) {
        if e != nix::errno::Errno::EINTR {
            warn!(error = %e, "poll failed");
            std::thread::sleep(interval);
        }
    }
}

fn terminate_and_replay<W: Write + ?Sized>(mut handle: ChildHandle, sink: &mut W) {
    let exit = handle.terminate();
    let completed = handle.complete_terminated(exit);
    warn!(pid = completed.pid, label = %completed.label, "Terminated task process");
    replay(&completed, sink);
}

fn replay<W: Write + ?Sized>(completed: &CompletedChild, sink: &mut W) {
    if let Err(e) =
        capture::write_replay_block(sink, &completed.label, completed.pid, &completed.output)
    {
        warn!(pid = completed.pid, label = %completed.label, error = %e, "Failed to replay task output");
    }
}
