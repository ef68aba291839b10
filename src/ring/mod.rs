//! The double-buffered capture ring and the interface to the producer
//! that fills it.

mod batch;
pub use batch::{Batch, Iter};

mod control;
pub use control::{Half, CONTROL_HEADER_SIZE};
pub(crate) use control::{ControlHeader, ControlWord};

mod layout;
pub use layout::{LayoutError, RingLayout, SLOT_ALIGN};

mod reader;
pub use reader::{Ring, RingError};

pub(crate) mod slot;
pub use slot::{Slot, SlotHeader, Timestamp, SLOT_HEADER_SIZE};

mod stats;
pub use stats::Stats;

use std::{io, ptr::NonNull, time::Duration};

use crate::config::CaptureFlags;

/// Memory shared with the producer, as handed out by
/// [`ControlPlane::map_region`]. Dropping it unmaps it.
pub trait MappedRegion {
    /// Start of the region. Aligned to at least 8 bytes.
    fn addr(&self) -> NonNull<u8>;

    fn len(&self) -> usize;

    /// Unmap the region, reporting any failure.
    fn unmap(self) -> io::Result<()>;
}

/// The producer's side of the ring: configuration, enabling, mapping,
/// readiness and counters.
///
/// Implemented by [`PfqSocket`](crate::socket::PfqSocket) for the
/// kernel module and by [`SimControl`](crate::sim::SimControl) for a
/// producer simulated in software.
pub trait ControlPlane {
    type Region: MappedRegion;

    /// The current `(slot_count, caplen)`.
    fn geometry(&self) -> io::Result<(usize, usize)>;

    /// Request a new geometry. Only valid while capture is off.
    fn set_geometry(&mut self, slot_count: usize, caplen: usize) -> io::Result<()>;

    fn set_flags(&mut self, flags: CaptureFlags) -> io::Result<()>;

    /// Turn capture on or off. Turning it on allocates the region.
    fn set_enabled(&mut self, enabled: bool) -> io::Result<()>;

    /// Size of the region, valid once capture is on.
    fn region_size(&self) -> io::Result<usize>;

    fn map_region(&mut self, len: usize) -> io::Result<Self::Region>;

    /// Block until the ring has data or `timeout` elapses. `None`
    /// waits forever and `Some(Duration::ZERO)` returns immediately.
    fn wait_readable(&self, timeout: Option<Duration>) -> io::Result<bool>;

    fn stats(&self) -> io::Result<Stats>;
}
