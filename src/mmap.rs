use libc::{MAP_ANONYMOUS, MAP_FAILED, MAP_POPULATE, MAP_SHARED, PROT_READ, PROT_WRITE};
use log::error;
use std::{
    io, mem,
    os::unix::io::RawFd,
    ptr::{self, NonNull},
};

use crate::ring::MappedRegion;

/// A shared, read-write memory mapping. Unmapped on drop.
#[derive(Debug)]
pub struct Mmap {
    addr: NonNull<u8>,
    len: usize,
}

unsafe impl Send for Mmap {}

// SAFETY: the mapping itself is never mutated through `&Mmap`;
// concurrent access to its contents is governed by the ring protocol.
unsafe impl Sync for Mmap {}

impl Mmap {
    /// Map `len` bytes of zeroed memory not backed by any file.
    /// Pages are only faulted in when touched.
    pub fn anonymous(len: usize) -> io::Result<Self> {
        // MAP_ANONYMOUS: mapping not backed by a file.
        // MAP_SHARED: shares this mapping, so changes are visible
        // to other processes mapping the same file.
        Self::map(len, MAP_ANONYMOUS | MAP_SHARED, -1)
    }

    /// Map `len` bytes of the memory exposed by `fd`, shared with
    /// whoever else maps it.
    pub fn shared(fd: RawFd, len: usize) -> io::Result<Self> {
        // MAP_POPULATE: pre-populate page tables, reduces blocking on
        // page faults later.
        Self::map(len, MAP_SHARED | MAP_POPULATE, fd)
    }

    fn map(len: usize, flags: libc::c_int, fd: RawFd) -> io::Result<Self> {
        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                PROT_READ | PROT_WRITE, // prot
                flags,
                fd,
                0, // offset
            )
        };

        if addr == MAP_FAILED {
            Err(io::Error::last_os_error())
        } else {
            let addr = NonNull::new(addr as *mut u8)
                .expect("ptr non-null since we confirmed `mmap()` succeeded");

            Ok(Mmap { addr, len })
        }
    }

    /// Pointer to the start of the mapping.
    #[inline]
    pub fn addr(&self) -> NonNull<u8> {
        self.addr
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Unmap now, reporting failure instead of logging it.
    pub fn unmap(self) -> io::Result<()> {
        let this = mem::ManuallyDrop::new(self);

        let err = unsafe { libc::munmap(this.addr.as_ptr() as *mut libc::c_void, this.len) };

        if err != 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

impl Drop for Mmap {
    fn drop(&mut self) {
        let err = unsafe { libc::munmap(self.addr.as_ptr() as *mut libc::c_void, self.len) };

        if err != 0 {
            error!(
                "`munmap()` failed with error: {}",
                io::Error::last_os_error()
            );
        }
    }
}

impl MappedRegion for Mmap {
    #[inline]
    fn addr(&self) -> NonNull<u8> {
        Mmap::addr(self)
    }

    #[inline]
    fn len(&self) -> usize {
        Mmap::len(self)
    }

    fn unmap(self) -> io::Result<()> {
        Mmap::unmap(self)
    }
}
