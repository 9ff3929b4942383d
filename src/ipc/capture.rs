/*!
 * Output Capture Channel
 *
 * Replaces a task process's stdout and stderr with one pipe. The parent drains
 * it continuously and replays the collected bytes as a single delimited block
 * once the child has exited.
 */

use super::pipe::{channel, DrainState, PipeError, PipeReader};
use crate::core::limits::INITIAL_CAPTURE_CAPACITY;
use crate::core::types::{Pid, TaskLabel};
use bytes::{Bytes, BytesMut};
use nix::libc::{STDERR_FILENO, STDOUT_FILENO};
use std::io::{self, Write};
use std::os::fd::{AsRawFd, OwnedFd};

/// Parent side of a task's captured stdout/stderr
#[derive(Debug)]
pub struct OutputCapture {
    reader: PipeReader,
    buffer: BytesMut,
}

/// Create a capture channel; the write end goes to the child
pub fn open() -> Result<(OutputCapture, OwnedFd), PipeError> {
    let (reader, writer) = channel()?;
    Ok((
        OutputCapture {
            reader,
            buffer: BytesMut::with_capacity(INITIAL_CAPTURE_CAPACITY),
        },
        writer,
    ))
}

/// Point the calling process's stdout and stderr at the capture pipe
///
/// Called in the child right after fork.
pub fn redirect_std_streams(writer: &OwnedFd) -> nix::Result<()> {
    nix::unistd::dup2(writer.as_raw_fd(), STDOUT_FILENO)?;
    nix::unistd::dup2(writer.as_raw_fd(), STDERR_FILENO)?;
    Ok(())
}

impl OutputCapture {
    /// Pull whatever the child has written so far
    pub fn drain(&mut self) -> Result<DrainState, PipeError> {
        self.reader.drain_into(&mut self.buffer)
    }

    #[inline]
    pub fn reader(&self) -> &PipeReader {
        &self.reader
    }

    /// Bytes captured so far
    pub fn captured(&self) -> &[u8] {
        &self.buffer
    }

    /// Take the captured bytes, leaving the buffer empty
    pub fn take(&mut self) -> Bytes {
        self.buffer.split().freeze()
    }
}

/// Announcement written when a task process has been forked
pub fn write_announcement<W: Write + ?Sized>(
    sink: &mut W,
    label: &TaskLabel,
    pid: Pid,
) -> io::Result<()> {
    writeln!(sink, "Forked process for '{}' - PID = '{}'", label, pid)?;
    sink.flush()
}

/// Replay one child's captured output as a single contiguous block
pub fn write_replay_block<W: Write + ?Sized>(
    sink: &mut W,
    label: &TaskLabel,
    pid: Pid,
    output: &[u8],
) -> io::Result<()> {
    let mut block = Vec::with_capacity(output.len() + 128);
    writeln!(block, "------ Begin output for {} - {}", label, pid)?;
    block.extend_from_slice(output);
    if !output.is_empty() && !output.ends_with(b"\n") {
        block.push(b'\n');
    }
    writeln!(block, "------ Completed output for {} - {}", label, pid)?;

    sink.write_all(&block)?;
    sink.flush()
}
