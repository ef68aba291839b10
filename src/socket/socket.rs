use libc::{c_int, socklen_t, ETH_P_ALL, SOCK_RAW};
use std::{
    ffi::{CString, NulError},
    io, mem,
    os::unix::io::AsRawFd,
    time::Duration,
};
use thiserror::Error;

use crate::{
    config::CaptureFlags,
    mmap::Mmap,
    ring::{ControlPlane, Stats},
};

use super::{
    fd::Fd,
    sys::{self, PfqDevQueue, PfqStats},
};

/// Matches every device when adding or removing devices.
pub const ANY_DEVICE: i32 = sys::Q_ANY_DEVICE;

/// Matches every hardware queue of a device.
pub const ANY_QUEUE: i32 = sys::Q_ANY_QUEUE;

#[derive(Error, Debug)]
pub enum SocketCreateError {
    #[error("PFQ module not loaded")]
    ModuleNotLoaded(#[source] io::Error),
    #[error("OS or FFI call failed: {context}")]
    OsError {
        context: &'static str,
        #[source]
        io_err: io::Error,
    },
}

/// A PF_Q socket, the control plane of a kernel capture ring.
///
/// Pass it to [`Ring::new`](crate::Ring::new) to map and read its
/// ring. Devices can be bound and unbound at any time.
#[derive(Debug)]
pub struct PfqSocket {
    fd: Fd,
}

impl PfqSocket {
    /// Open a socket with the geometry defaults of the loaded module.
    pub fn new() -> Result<Self, SocketCreateError> {
        let fd = unsafe {
            libc::socket(sys::PF_Q, SOCK_RAW, (ETH_P_ALL as u16).to_be() as c_int)
        };

        if fd < 0 {
            return Err(SocketCreateError::ModuleNotLoaded(
                io::Error::last_os_error(),
            ));
        }

        Ok(Self { fd: Fd::new(fd) })
    }

    /// Open a socket and request `slot_count` slots per half of
    /// `caplen` bytes each.
    pub fn with_geometry(slot_count: usize, caplen: usize) -> Result<Self, SocketCreateError> {
        let mut socket = Self::new()?;

        socket
            .set_geometry(slot_count, caplen)
            .map_err(|io_err| SocketCreateError::OsError {
                context: "failed to set socket geometry",
                io_err,
            })?;

        Ok(socket)
    }

    fn setopt<T>(&self, opt: c_int, val: &T) -> io::Result<()> {
        let ret = unsafe {
            libc::setsockopt(
                self.fd.id(),
                sys::PF_Q,
                opt,
                val as *const T as *const libc::c_void,
                mem::size_of::<T>() as socklen_t,
            )
        };

        if ret == -1 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    fn getopt<T: Default>(&self, opt: c_int) -> io::Result<T> {
        let mut val = T::default();
        self.getopt_into(opt, &mut val)?;
        Ok(val)
    }

    fn getopt_into<T>(&self, opt: c_int, val: &mut T) -> io::Result<()> {
        let mut size = mem::size_of::<T>() as socklen_t;

        let ret = unsafe {
            libc::getsockopt(
                self.fd.id(),
                sys::PF_Q,
                opt,
                val as *mut T as *mut libc::c_void,
                &mut size,
            )
        };

        if ret == -1 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    /// The socket's file descriptor.
    #[inline]
    pub fn fd(&self) -> &Fd {
        &self.fd
    }

    /// Identifier the module assigned to this socket.
    pub fn id(&self) -> io::Result<i32> {
        self.getopt::<c_int>(sys::SO_GET_ID)
    }

    /// Whether the module considers capture enabled on this socket.
    pub fn is_enabled(&self) -> io::Result<bool> {
        Ok(self.getopt::<c_int>(sys::SO_GET_STATUS)? != 0)
    }

    /// Index of the interface named `dev`.
    pub fn ifindex(&self, dev: &str) -> io::Result<i32> {
        if_index(dev)
    }

    /// Capture from hardware queue `queue` of the device with index
    /// `index`. Use [`ANY_QUEUE`] for every queue.
    pub fn add_device(&mut self, index: i32, queue: i32) -> io::Result<()> {
        self.setopt(
            sys::SO_ADD_DEVICE,
            &PfqDevQueue {
                if_index: index,
                hw_queue: queue,
            },
        )
    }

    pub fn add_device_by_name(&mut self, dev: &str, queue: i32) -> io::Result<()> {
        let index = self.ifindex(dev)?;
        self.add_device(index, queue)
    }

    pub fn remove_device(&mut self, index: i32, queue: i32) -> io::Result<()> {
        self.setopt(
            sys::SO_REMOVE_DEVICE,
            &PfqDevQueue {
                if_index: index,
                hw_queue: queue,
            },
        )
    }

    pub fn remove_device_by_name(&mut self, dev: &str, queue: i32) -> io::Result<()> {
        let index = self.ifindex(dev)?;
        self.remove_device(index, queue)
    }

    /// Bitmask of the sockets capturing from `queue` of device
    /// `index`.
    pub fn owners(&self, index: i32, queue: i32) -> io::Result<u64> {
        // The module overwrites the request with the result.
        let mut dq = [0u64; 1];

        // SAFETY: `PfqDevQueue` is two `c_int`s, which fit in a `u64`.
        unsafe {
            *(dq.as_mut_ptr() as *mut PfqDevQueue) = PfqDevQueue {
                if_index: index,
                hw_queue: queue,
            };
        }

        self.getopt_into(sys::SO_GET_OWNERS, &mut dq)?;

        Ok(dq[0])
    }

    pub fn set_load_balance(&mut self, enabled: bool) -> io::Result<()> {
        self.setopt(sys::SO_LOAD_BALANCE, &(enabled as c_int))
    }

    pub fn set_tstamp(&mut self, enabled: bool) -> io::Result<()> {
        self.setopt(sys::SO_TSTAMP_TYPE, &(enabled as c_int))
    }

    pub fn tstamp(&self) -> io::Result<bool> {
        Ok(self.getopt::<c_int>(sys::SO_GET_TSTAMP_TYPE)? != 0)
    }
}

impl AsRawFd for PfqSocket {
    fn as_raw_fd(&self) -> std::os::unix::io::RawFd {
        self.fd.id()
    }
}

impl ControlPlane for PfqSocket {
    type Region = Mmap;

    fn geometry(&self) -> io::Result<(usize, usize)> {
        let slots = self.getopt::<libc::size_t>(sys::SO_GET_SLOTS)?;
        let caplen = self.getopt::<libc::size_t>(sys::SO_GET_CAPLEN)?;

        Ok((slots, caplen))
    }

    fn set_geometry(&mut self, slot_count: usize, caplen: usize) -> io::Result<()> {
        self.setopt::<libc::size_t>(sys::SO_SLOTS, &slot_count)?;
        self.setopt::<libc::size_t>(sys::SO_CAPLEN, &caplen)
    }

    fn set_flags(&mut self, flags: CaptureFlags) -> io::Result<()> {
        self.set_tstamp(flags.contains(CaptureFlags::TIMESTAMP))?;
        self.set_load_balance(flags.contains(CaptureFlags::LOAD_BALANCE))
    }

    fn set_enabled(&mut self, enabled: bool) -> io::Result<()> {
        self.setopt(sys::SO_TOGGLE_QUEUE, &(enabled as c_int))
    }

    fn region_size(&self) -> io::Result<usize> {
        self.getopt::<libc::size_t>(sys::SO_GET_QUEUE_MEM)
    }

    fn map_region(&mut self, len: usize) -> io::Result<Mmap> {
        Mmap::shared(self.fd.id(), len)
    }

    fn wait_readable(&self, timeout: Option<Duration>) -> io::Result<bool> {
        self.fd.poll_read(timeout)
    }

    fn stats(&self) -> io::Result<Stats> {
        let stats = self.getopt::<PfqStats>(sys::SO_GET_STATS)?;

        Ok(Stats::new(
            stats.recv as u64,
            stats.lost as u64,
            stats.drop as u64,
        ))
    }
}

fn if_index(dev: &str) -> io::Result<i32> {
    let name = CString::new(dev).map_err(invalid_if_name)?;

    let index = unsafe { libc::if_nametoindex(name.as_ptr()) };

    if index == 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(index as i32)
    }
}

fn invalid_if_name(e: NulError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, e)
}
