/*!
 * Background Registry
 *
 * Process-wide state for fire-and-forget spawns: children whose results will
 * be joined later, and detached children that are only tracked for reaping.
 */

use super::bindings::SharedBindings;
use super::child::{self, ChildHandle};
use crate::core::types::TaskLabel;
use nix::unistd::Pid as NixPid;
use parking_lot::{const_mutex, Mutex};
use tracing::{debug, info};

/// A background child awaiting `wait_for_processes`
///
/// `target` is the bindings of the executor that spawned the child; the
/// handle names the slot inside it.
#[derive(Debug)]
pub(crate) struct PendingBackgroundEntry {
    pub(crate) handle: ChildHandle,
    pub(crate) target: SharedBindings,
}

/// A detached child whose result is discarded
#[derive(Debug)]
struct DetachedChild {
    label: TaskLabel,
    pid: NixPid,
}

static PENDING: Mutex<Vec<PendingBackgroundEntry>> = const_mutex(Vec::new());
static DETACHED: Mutex<Vec<DetachedChild>> = const_mutex(Vec::new());

/// Append background children, in spawn order, to the pending batch
pub(crate) fn register(handles: Vec<ChildHandle>, target: &SharedBindings) {
    let mut pending = PENDING.lock();
    pending.extend(handles.into_iter().map(|handle| PendingBackgroundEntry {
        handle,
        target: SharedBindings::clone(target),
    }));
    debug!(pending = pending.len(), "Registered background tasks");
}

/// Remove and return every pending child
pub(crate) fn take_pending() -> Vec<PendingBackgroundEntry> {
    std::mem::take(&mut *PENDING.lock())
}

/// Number of background children not yet joined
pub fn pending_count() -> usize {
    PENDING.lock().len()
}

pub(crate) fn track_detached(label: TaskLabel, pid: NixPid) {
    DETACHED.lock().push(DetachedChild { label, pid });
}

/// Number of detached children not yet reaped
pub fn detached_count() -> usize {
    DETACHED.lock().len()
}

/// Reap every detached child that has already exited
///
/// Returns how many were reaped.
pub fn reap_detached() -> usize {
    let mut detached = DETACHED.lock();
    let before = detached.len();
    detached.retain(|entry| match child::try_reap_detached(entry.pid) {
        Some(exit) => {
            info!(pid = entry.pid.as_raw(), label = %entry.label, status = %exit.describe(), "Reaped detached task");
            false
        }
        None => true,
    });
    before - detached.len()
}

/// Block until every detached child has exited and reap it
pub fn wait_detached() -> usize {
    let drained = std::mem::take(&mut *DETACHED.lock());
    let count = drained.len();
    for entry in drained {
        let exit = child::wait_detached(entry.pid);
        info!(pid = entry.pid.as_raw(), label = %entry.label, status = %exit.describe(), "Reaped detached task");
    }
    count
}
