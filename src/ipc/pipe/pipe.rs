/*!
 * Pipe Implementation
 * Unidirectional OS pipe whose read end never blocks the parent
 */

use super::types::{DrainState, PipeError};
use crate::core::limits::READ_CHUNK_SIZE;
use bytes::BytesMut;
use nix::fcntl::{fcntl, FcntlArg, FdFlag, OFlag};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};

/// Parent-owned read end of a child's pipe
///
/// The descriptor is non-blocking so draining never waits on the child.
#[derive(Debug)]
pub struct PipeReader {
    file: File,
    eof: bool,
}

/// Create a pipe, returning the non-blocking read end and the write end
///
/// Both ends are close-on-exec so commands executed by a task do not hold
/// sibling descriptors open.
pub fn channel() -> Result<(PipeReader, OwnedFd), PipeError> {
    let (read_end, write_end) = nix::unistd::pipe().map_err(PipeError::CreateFailed)?;

    for fd in [read_end.as_raw_fd(), write_end.as_raw_fd()] {
        fcntl(fd, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC)).map_err(PipeError::ConfigureFailed)?;
    }
    fcntl(read_end.as_raw_fd(), FcntlArg::F_SETFL(OFlag::O_NONBLOCK))
        .map_err(PipeError::ConfigureFailed)?;

    Ok((
        PipeReader {
            file: File::from(read_end),
            eof: false,
        },
        write_end,
    ))
}

impl PipeReader {
    /// Read everything currently available into `buffer`
    ///
    /// Returns `Eof` once the writer side is closed and nothing is left.
    pub fn drain_into(&mut self, buffer: &mut BytesMut) -> Result<DrainState, PipeError> {
        if self.eof {
            return Ok(DrainState::Eof);
        }

        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.file.read(&mut chunk) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(DrainState::Eof);
                }
                Ok(n) => buffer.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(DrainState::Open),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(PipeError::ReadFailed(e)),
            }
        }
    }

    #[inline]
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Descriptor to register with poll(2)
    #[inline]
    pub fn poll_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}
