//! # pfq-rs
//!
//! Consumer side of PFQ, a double-buffered packet capture ring shared
//! between a kernel producer and a userspace reader.
//!
//! The shared region holds a control word followed by two halves of
//! fixed-size slots. The producer appends frames to the active half
//! while the consumer reads the other. A single atomic exchange hands
//! the filled half to the consumer and the drained one back to the
//! producer.
//!
//! A [`Ring`] drives the exchange over any [`ControlPlane`]: the kernel
//! module through a [`PfqSocket`](socket::PfqSocket), or the software
//! producer in [`sim`].
//!
//! ```no_run
//! use pfq_rs::{socket::{PfqSocket, ANY_QUEUE}, Config, Ring};
//! use std::time::Duration;
//!
//! let mut socket = PfqSocket::new().unwrap();
//! socket.add_device_by_name("eth0", ANY_QUEUE).unwrap();
//!
//! let mut ring = Ring::with_config(socket, &Config::default()).unwrap();
//! ring.enable().unwrap();
//!
//! loop {
//!     let batch = ring.acquire(Some(Duration::from_millis(100))).unwrap();
//!
//!     for slot in batch.committed() {
//!         println!("{} bytes on if {}", slot.len(), slot.if_index());
//!     }
//! }
//! ```

pub mod config;
pub mod mmap;
pub mod ring;
pub mod sim;
pub mod socket;

mod util;

pub mod prelude;

pub use config::{Caplen, CaptureFlags, Config, ConfigBuilder, ConfigError, SlotCount};
pub use ring::{
    Batch, ControlPlane, Half, MappedRegion, Ring, RingError, RingLayout, Slot, SlotHeader, Stats,
    Timestamp,
};
pub use socket::PfqSocket;
