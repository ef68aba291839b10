use log::error;
use std::{
    io,
    os::unix::io::{AsRawFd, RawFd},
};

use super::poll;

/// An owned file descriptor, closed on drop.
#[derive(Debug)]
pub struct Fd {
    id: RawFd,
}

impl Fd {
    /// Take ownership of `id`.
    pub(crate) fn new(id: RawFd) -> Self {
        Fd { id }
    }

    #[inline]
    pub fn id(&self) -> RawFd {
        self.id
    }

    /// Wait until the descriptor is readable or `timeout` elapses.
    /// Returns `true` if it is readable.
    #[inline]
    pub fn poll_read(&self, timeout: Option<std::time::Duration>) -> io::Result<bool> {
        poll::poll_read(self, timeout)
    }
}

impl AsRawFd for Fd {
    fn as_raw_fd(&self) -> RawFd {
        self.id
    }
}

impl Drop for Fd {
    fn drop(&mut self) {
        let err = unsafe { libc::close(self.id) };

        if err != 0 {
            error!(
                "failed to close fd {}: {}",
                self.id,
                io::Error::last_os_error()
            );
        }
    }
}
