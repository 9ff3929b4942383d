/*!
 * Task Processes
 * Forking a task into its own process and tracking it from the parent
 */

use super::task::{run_body, Task};
use crate::core::errors::{ParallelError, ParallelResult};
use crate::core::limits::{EXIT_CHANNEL_FAILED, EXIT_SUCCESS, EXIT_TASK_FAILED};
use crate::core::types::{Pid, TaskLabel};
use crate::ipc::{capture, result, OutputCapture, PipeReader, ResultReceiver};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid as NixPid};
use serde_json::Value;
use std::io::{self, Write};
use std::os::fd::OwnedFd;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How a reaped child ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitState {
    Exited(i32),
    Signaled(Signal),
    /// The process vanished without us reaping it
    Vanished,
}

impl ExitState {
    fn from_wait_status(status: WaitStatus) -> Option<Self> {
        match status {
            WaitStatus::Exited(_, code) => Some(Self::Exited(code)),
            WaitStatus::Signaled(_, signal, _) => Some(Self::Signaled(signal)),
            _ => None,
        }
    }

    /// Human-readable status used in lost-child errors
    pub fn describe(&self) -> String {
        match self {
            Self::Exited(code) => format!("exit code {}", code),
            Self::Signaled(signal) => format!("killed by {}", signal.as_str()),
            Self::Vanished => "process no longer exists".to_string(),
        }
    }
}

/// Parent-side handle on one forked task process
///
/// Owned exclusively by the executor from fork until the child is reaped and
/// its channels drained.
#[derive(Debug)]
pub struct ChildHandle {
    pid: NixPid,
    label: TaskLabel,
    binding: String,
    started: Instant,
    capture: OutputCapture,
    result: ResultReceiver,
}

/// A reaped and drained child
#[derive(Debug)]
pub struct CompletedChild {
    pub label: TaskLabel,
    pub binding: String,
    pub pid: Pid,
    pub elapsed: Duration,
    pub exit: ExitState,
    pub output: bytes::Bytes,
    /// `None` when the child was terminated by the executor
    pub value: Option<Result<Value, ParallelError>>,
}

fn flush_std_streams() {
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();
}

/// Fork a task into its own process with captured output and a result channel
pub fn spawn(task: Task<'_>) -> ParallelResult<ChildHandle> {
    let (label, binding, body) = task.into_parts();
    let spawn_error = |message: String| ParallelError::Spawn {
        label: label.to_string(),
        message,
    };

    let (capture, capture_writer) = capture::open().map_err(|e| spawn_error(e.to_string()))?;
    let (receiver, result_writer) = result::open().map_err(|e| spawn_error(e.to_string()))?;

    // Anything buffered now would otherwise be flushed again by the child
    flush_std_streams();

    // SAFETY: the child only runs the task body and then calls _exit, it
    // never returns into the caller's stack.
    match unsafe { fork() } {
        Ok(ForkResult::Child) => {
            drop(capture);
            drop(receiver);
            run_in_child(body, capture_writer, result_writer)
        }
        Ok(ForkResult::Parent { child }) => {
            drop(capture_writer);
            drop(result_writer);
            debug!(pid = child.as_raw(), label = %label, "Forked task process");
            Ok(ChildHandle {
                pid: child,
                label,
                binding,
                started: Instant::now(),
                capture,
                result: receiver,
            })
        }
        Err(errno) => Err(spawn_error(format!("fork failed: {}", errno))),
    }
}

/// Fork a task whose result is discarded and whose output is not captured
pub fn spawn_detached(task: Task<'_>) -> ParallelResult<(TaskLabel, NixPid)> {
    let (label, _, body) = task.into_parts();

    flush_std_streams();

    // SAFETY: as in `spawn`, the child never returns from this function.
    match unsafe { fork() } {
        Ok(ForkResult::Child) => {
            let code = if run_body(body).is_success() {
                EXIT_SUCCESS
            } else {
                EXIT_TASK_FAILED
            };
            flush_std_streams();
            unsafe { nix::libc::_exit(code) }
        }
        Ok(ForkResult::Parent { child }) => Ok((label, child)),
        Err(errno) => Err(ParallelError::Spawn {
            label: label.to_string(),
            message: format!("fork failed: {}", errno),
        }),
    }
}

fn run_in_child(
    body: Box<dyn FnOnce() -> crate::ipc::TaskResult + '_>,
    capture_writer: OwnedFd,
    result_writer: OwnedFd,
) -> ! {
    if capture::redirect_std_streams(&capture_writer).is_err() {
        unsafe { nix::libc::_exit(EXIT_CHANNEL_FAILED) };
    }
    drop(capture_writer);

    let outcome = run_body(body);
    let code = if outcome.is_success() {
        EXIT_SUCCESS
    } else {
        EXIT_TASK_FAILED
    };

    flush_std_streams();

    match result::send(result_writer, &outcome) {
        Ok(()) => unsafe { nix::libc::_exit(code) },
        Err(e) => {
            let _ = writeln!(io::stderr(), "failed to send task result: {}", e);
            unsafe { nix::libc::_exit(EXIT_CHANNEL_FAILED) }
        }
    }
}

impl ChildHandle {
    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid.as_raw()
    }

    #[inline]
    pub fn label(&self) -> &TaskLabel {
        &self.label
    }

    #[inline]
    pub fn binding(&self) -> &str {
        &self.binding
    }

    /// Readers that have not reached EOF, for poll(2)
    pub fn open_readers(&self) -> impl Iterator<Item = &PipeReader> {
        [self.capture.reader(), self.result.reader()]
            .into_iter()
            .filter(|reader| !reader.is_eof())
    }

    /// Move any bytes the child has written into the parent's buffers
    pub fn drain(&mut self) {
        if let Err(e) = self.capture.drain() {
            warn!(pid = self.pid(), label = %self.label, error = %e, "Failed to drain task output");
        }
        if let Err(e) = self.result.drain() {
            warn!(pid = self.pid(), label = %self.label, error = %e, "Failed to drain task result");
        }
    }

    /// Reap the child if it has exited, without blocking
    pub fn try_reap(&mut self) -> Option<ExitState> {
        match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => None,
            Ok(status) => ExitState::from_wait_status(status),
            Err(Errno::EINTR) => None,
            Err(Errno::ECHILD) => Some(ExitState::Vanished),
            Err(e) => {
                warn!(pid = self.pid(), label = %self.label, error = %e, "waitpid failed");
                Some(ExitState::Vanished)
            }
        }
    }

    /// Forcibly terminate the child and reap it
    pub fn terminate(&mut self) -> ExitState {
        match kill(self.pid, Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => warn!(pid = self.pid(), label = %self.label, error = %e, "Failed to kill task process"),
        }

        loop {
            match waitpid(self.pid, None) {
                Ok(status) => {
                    if let Some(exit) = ExitState::from_wait_status(status) {
                        return exit;
                    }
                }
                Err(Errno::EINTR) => continue,
                Err(_) => return ExitState::Vanished,
            }
        }
    }

    /// Drain the remaining bytes of a reaped child and decode its result
    pub fn complete(mut self, exit: ExitState) -> CompletedChild {
        self.drain();
        let value = self.result.decode(&self.label, self.pid(), &exit.describe());
        self.into_completed(exit, Some(value))
    }

    /// Drain what a terminated child wrote; no result is expected from it
    pub fn complete_terminated(mut self, exit: ExitState) -> CompletedChild {
        self.drain();
        self.into_completed(exit, None)
    }

    fn into_completed(
        mut self,
        exit: ExitState,
        value: Option<Result<Value, ParallelError>>,
    ) -> CompletedChild {
        CompletedChild {
            pid: self.pid(),
            elapsed: self.started.elapsed(),
            output: self.capture.take(),
            label: self.label,
            binding: self.binding,
            exit,
            value,
        }
    }
}

/// Reap a detached child if it has exited
pub(crate) fn try_reap_detached(pid: NixPid) -> Option<ExitState> {
    match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
        Ok(WaitStatus::StillAlive) | Err(Errno::EINTR) => None,
        Ok(status) => ExitState::from_wait_status(status),
        Err(_) => Some(ExitState::Vanished),
    }
}

/// Block until a detached child exits
pub(crate) fn wait_detached(pid: NixPid) -> ExitState {
    loop {
        match waitpid(pid, None) {
            Ok(status) => {
                if let Some(exit) = ExitState::from_wait_status(status) {
                    return exit;
                }
            }
            Err(Errno::EINTR) => continue,
            Err(_) => return ExitState::Vanished,
        }
    }
}
