//! [`SerialAdapter`] over a raw file descriptor whose line settings are managed elsewhere.
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::time::Duration;

use tracing::info;

use crate::serial::SerialAdapter;
use crate::Result;

/// Adapter for a tty that was configured out-of-band, e.g. with `stty`.
pub struct FdAdapter {
    file: File,
}

impl FdAdapter {
    pub fn new(fd: OwnedFd) -> FdAdapter {
        FdAdapter { file: fd.into() }
    }

    /// Open `path` read/write without making it the controlling terminal.
    pub fn open(path: impl AsRef<Path>) -> Result<FdAdapter> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY)
            .open(path.as_ref())?;
        info!("Opened {}", path.as_ref().display());
        Ok(FdAdapter { file })
    }
}

impl SerialAdapter for FdAdapter {
    fn is_open(&self) -> bool {
        unsafe { libc::fcntl(self.file.as_raw_fd(), libc::F_GETFD) != -1 }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let written = self.file.write(data)?;
        Ok(written)
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let mut pfd = libc::pollfd {
            fd: self.file.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

        let ret = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if ret < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(err.into());
        }
        if ret == 0 {
            return Ok(0);
        }

        Ok(self.file.read(buf)?)
    }
}
