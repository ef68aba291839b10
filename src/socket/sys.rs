//! Constants and structures shared with the PFQ kernel module.
//!
//! Values mirror `linux/pf_q.h` and must match the module that is
//! loaded.

use libc::{c_int, c_ulong};

/// Protocol family registered by the module.
pub const PF_Q: c_int = 27;

/// Wildcard device index.
pub const Q_ANY_DEVICE: c_int = -1;

/// Wildcard hardware queue.
pub const Q_ANY_QUEUE: c_int = -1;

// setsockopt
pub const SO_TOGGLE_QUEUE: c_int = 1;
pub const SO_ADD_DEVICE: c_int = 2;
pub const SO_REMOVE_DEVICE: c_int = 3;
pub const SO_LOAD_BALANCE: c_int = 4;
pub const SO_TSTAMP_TYPE: c_int = 5;
pub const SO_CAPLEN: c_int = 6;
pub const SO_SLOTS: c_int = 7;

// getsockopt
pub const SO_GET_ID: c_int = 20;
pub const SO_GET_STATUS: c_int = 21;
pub const SO_GET_STATS: c_int = 22;
pub const SO_GET_QUEUE_MEM: c_int = 23;
pub const SO_GET_TSTAMP_TYPE: c_int = 24;
pub const SO_GET_CAPLEN: c_int = 25;
pub const SO_GET_SLOTS: c_int = 26;
pub const SO_GET_OWNERS: c_int = 27;

/// A device and hardware queue pair.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct PfqDevQueue {
    pub if_index: c_int,
    pub hw_queue: c_int,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct PfqStats {
    pub recv: c_ulong,
    pub lost: c_ulong,
    pub drop: c_ulong,
}
