use libc::{EINTR, POLLIN};
use std::{cmp, io, ptr, time::Duration};

use super::Fd;
use crate::util;

/// `ppoll()` on a single descriptor for readability. An interrupted
/// wait is reported as not ready.
pub fn poll_read(fd: &Fd, timeout: Option<Duration>) -> io::Result<bool> {
    let mut pollfd = libc::pollfd {
        fd: fd.id(),
        events: POLLIN,
        revents: 0,
    };

    let timeout = timeout.map(|t| libc::timespec {
        tv_sec: cmp::min(t.as_secs(), libc::time_t::MAX as u64) as libc::time_t,
        tv_nsec: t.subsec_nanos() as libc::c_long,
    });

    let timeout_ptr = timeout
        .as_ref()
        .map_or(ptr::null(), |t| t as *const libc::timespec);

    let ret = unsafe { libc::ppoll(&mut pollfd, 1, timeout_ptr, ptr::null()) };

    if ret < 0 {
        if util::get_errno() != EINTR {
            return Err(io::Error::last_os_error());
        } else {
            return Ok(false);
        }
    }

    if ret == 0 {
        Ok(false)
    } else {
        Ok(true)
    }
}
