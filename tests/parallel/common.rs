/*!
 * Shared helpers for executor tests
 */

use forklift::Executor;
use parking_lot::Mutex;
use std::io::{self, Write};
use std::sync::Arc;

/// Console sink that tests can read back
#[derive(Clone, Default)]
pub struct SharedSink(Arc<Mutex<Vec<u8>>>);

impl SharedSink {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn executor() -> (Executor, SharedSink) {
    let sink = SharedSink::default();
    (Executor::with_sink(sink.clone()), sink)
}

/// Write a line to the process's real stdout
///
/// `println!` is redirected by the test harness and would not reach the
/// capture pipe of a forked task.
pub fn say(line: &str) {
    let mut out = io::stdout();
    let _ = writeln!(out, "{}", line);
    let _ = out.flush();
}

/// Pids from every spawn announcement, in the order they were written
pub fn announced_pids(console: &str) -> Vec<i32> {
    console
        .lines()
        .filter_map(|line| line.split("PID = '").nth(1))
        .filter_map(|rest| rest.trim_end_matches('\'').parse().ok())
        .collect()
}

/// True while a process with this pid exists (zombies excluded once reaped)
pub fn process_exists(pid: i32) -> bool {
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_ok()
}

/// Byte offset of a task's replay block
pub fn block_start(console: &str, label: &str) -> usize {
    console
        .find(&format!("------ Begin output for {} - ", label))
        .unwrap_or_else(|| panic!("no output block for {label} in:\n{console}"))
}
