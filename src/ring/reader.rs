use log::{debug, error, trace, warn};
use std::{
    io,
    ptr::NonNull,
    sync::atomic::{self, Ordering},
    time::Duration,
};
use thiserror::Error;

use crate::config::{Caplen, Config, SlotCount};

use super::{
    slot, Batch, ControlHeader, ControlPlane, ControlWord, LayoutError, MappedRegion, RingLayout,
    Stats,
};

#[derive(Error, Debug)]
pub enum RingError {
    #[error("ring is already enabled")]
    AlreadyEnabled,
    #[error("ring is not enabled")]
    NotEnabled,
    #[error("{context}")]
    Map {
        context: &'static str,
        #[source]
        io_err: io::Error,
    },
    #[error("{context}")]
    Control {
        context: &'static str,
        #[source]
        io_err: io::Error,
    },
    #[error("waiting for ring data failed")]
    Io(#[from] io::Error),
    #[error("invalid ring geometry")]
    Layout(#[from] LayoutError),
    #[error("buffer of {got} bytes cannot hold a full half of {needed} bytes")]
    BufferTooShort { needed: usize, got: usize },
}

impl RingError {
    fn control(context: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |io_err| RingError::Control { context, io_err }
    }

    fn map(context: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |io_err| RingError::Map { context, io_err }
    }
}

/// Consumer side of a double-buffered capture ring.
///
/// The producer fills one half of the shared region while the
/// consumer drains the other. Each call to [`acquire`](Ring::acquire)
/// hands the half the producer was filling to the caller as a
/// [`Batch`] and gives the producer the half drained on the previous
/// call. A ring is owned by a single consumer thread.
pub struct Ring<C: ControlPlane> {
    control: C,
    layout: RingLayout,
    region: Option<C::Region>,
    next_len: usize,
    clamped: u64,
}

impl<C: ControlPlane> Ring<C> {
    /// Create a ring using the geometry currently configured on
    /// `control`.
    pub fn new(control: C) -> Result<Self, RingError> {
        let (slot_count, caplen) = control
            .geometry()
            .map_err(RingError::control("failed to read ring geometry"))?;

        let layout = RingLayout::new(slot_count, caplen)?;

        debug!(
            "ring created with {} slots of {} bytes per half",
            layout.slot_count(),
            layout.slot_size()
        );

        Ok(Self {
            control,
            layout,
            region: None,
            next_len: 0,
            clamped: 0,
        })
    }

    /// Configure `control` according to `config`, then create the
    /// ring.
    pub fn with_config(mut control: C, config: &Config) -> Result<Self, RingError> {
        control
            .set_geometry(
                config.slot_count().get() as usize,
                config.caplen().get() as usize,
            )
            .map_err(RingError::control("failed to set ring geometry"))?;

        control
            .set_flags(config.flags())
            .map_err(RingError::control("failed to set capture flags"))?;

        Self::new(control)
    }

    /// Start capturing and map the shared region.
    ///
    /// On failure capture is switched back off and nothing is left
    /// mapped.
    pub fn enable(&mut self) -> Result<(), RingError> {
        if self.region.is_some() {
            return Err(RingError::AlreadyEnabled);
        }

        self.control
            .set_enabled(true)
            .map_err(RingError::control("failed to enable capture"))?;

        match self.map_region() {
            Ok(region) => {
                debug!("ring enabled, {} bytes mapped", region.len());

                self.region = Some(region);
                self.next_len = 0;

                Ok(())
            }
            Err(e) => {
                if let Err(io_err) = self.control.set_enabled(false) {
                    error!("failed to disable capture after mapping error: {}", io_err);
                }
                Err(e)
            }
        }
    }

    fn map_region(&mut self) -> Result<C::Region, RingError> {
        let required = self.layout.total_size();

        let size = self
            .control
            .region_size()
            .map_err(RingError::map("failed to read region size"))?;

        if size < required {
            return Err(RingError::Map {
                context: "region is smaller than the ring layout",
                io_err: io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("region of {} bytes, layout needs {}", size, required),
                ),
            });
        }

        let region = self
            .control
            .map_region(size)
            .map_err(RingError::map("failed to map region"))?;

        if region.len() < required || region.addr().as_ptr() as usize % 8 != 0 {
            // Dropping the region unmaps it.
            return Err(RingError::Map {
                context: "mapped region does not fit the ring layout",
                io_err: io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("mapped {} bytes, layout needs {}", region.len(), required),
                ),
            });
        }

        Ok(region)
    }

    /// Unmap the shared region and stop capturing. Fails with
    /// [`NotEnabled`](RingError::NotEnabled) if the ring is not
    /// enabled, so calling it twice is an error.
    ///
    /// The ring is left disabled even if an error is returned.
    pub fn disable(&mut self) -> Result<(), RingError> {
        let region = self.region.take().ok_or(RingError::NotEnabled)?;

        self.next_len = 0;

        let unmapped = region
            .unmap()
            .map_err(RingError::map("failed to unmap region"));

        self.control
            .set_enabled(false)
            .map_err(RingError::control("failed to disable capture"))?;

        debug!("ring disabled");

        unmapped
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.region.is_some()
    }

    /// Wait until the producer reports data or `timeout` elapses.
    /// `None` waits forever, `Some(Duration::ZERO)` only checks.
    /// Returns `true` if data is ready.
    pub fn poll(&self, timeout: Option<Duration>) -> Result<bool, RingError> {
        if self.region.is_none() {
            return Err(RingError::NotEnabled);
        }

        Ok(self.control.wait_readable(timeout)?)
    }

    /// Swap halves with the producer and return the slots it wrote
    /// since the previous call.
    ///
    /// If less than half of the slots are filled, first waits up to
    /// `timeout` for more data (see [`poll`](Ring::poll)). The
    /// returned batch may be empty. Trailing slots of the batch may
    /// still be in flight, check [`Slot::is_committed`] or iterate
    /// [`Batch::committed`].
    ///
    /// [`Slot::is_committed`]: super::Slot::is_committed
    pub fn acquire(&mut self, timeout: Option<Duration>) -> Result<Batch<'_>, RingError> {
        let region = self.region.as_ref().ok_or(RingError::NotEnabled)?;
        let base = region.addr();
        let layout = self.layout;

        // SAFETY: the region is mapped, 8-byte aligned and at least
        // `layout.total_size()` long, checked when enabling.
        let header = unsafe { ControlHeader::from_base(base) };

        let word = header.load();

        // Low watermark: wait rather than spin when little is pending.
        if word.len() < (layout.slot_count() / 2) as u64 {
            self.control.wait_readable(timeout)?;
        }

        // The half delivered by the previous call is about to become
        // the producer's target again. Clear its commit flags first.
        let delivered = word.active().other();

        for index in 0..self.next_len {
            // SAFETY: `next_len <= slot_count`, so every offset lies
            // within the region.
            unsafe {
                let ptr = base.as_ptr().add(layout.slot_offset(delivered, index));
                slot::clear(NonNull::new_unchecked(ptr));
            }
        }

        atomic::fence(Ordering::Release);

        let prior = header.exchange(ControlWord::new(delivered, 0));

        // The producer pauses when the active half fills up.
        header.set_disabled(false);

        let slot_count = layout.slot_count();

        let len = if prior.len() > slot_count as u64 {
            warn!(
                "producer reported {} slots in a half of {}, clamping",
                prior.len(),
                slot_count
            );
            self.clamped += 1;
            slot_count
        } else {
            prior.len() as usize
        };

        self.next_len = len;

        trace!("acquired {} slots from half {:?}", len, prior.active());

        // SAFETY: the half lies within the region and `len` is bounded
        // by the slot count.
        let batch = unsafe {
            let ptr = base.as_ptr().add(layout.half_offset(prior.active()));
            Batch::new(NonNull::new_unchecked(ptr), layout.slot_size(), len)
        };

        Ok(batch)
    }

    /// Same as [`acquire`](Ring::acquire).
    #[inline]
    pub fn read(&mut self, timeout: Option<Duration>) -> Result<Batch<'_>, RingError> {
        self.acquire(timeout)
    }

    /// Acquire a batch and copy it into `buf`, returning a batch over
    /// the copy. The copy stays valid across further acquisitions.
    ///
    /// `buf` must be able to hold a full half, see
    /// [`RingLayout::half_size`]. Slots that were still in flight when
    /// copied stay uncommitted in the copy.
    pub fn recv<'b>(
        &mut self,
        buf: &'b mut [u8],
        timeout: Option<Duration>,
    ) -> Result<Batch<'b>, RingError> {
        let needed = self.layout.half_size();

        if buf.len() < needed {
            return Err(RingError::BufferTooShort {
                needed,
                got: buf.len(),
            });
        }

        let batch = self.acquire(timeout)?;
        let bytes = batch.as_bytes();

        buf[..bytes.len()].copy_from_slice(bytes);

        // SAFETY: `buf` now holds `batch.len()` consecutive slots.
        Ok(unsafe {
            Batch::new(
                NonNull::new_unchecked(buf.as_mut_ptr()),
                batch.slot_size(),
                batch.len(),
            )
        })
    }

    /// Current capture counters.
    pub fn stats(&self) -> Result<Stats, RingError> {
        self.control
            .stats()
            .map_err(RingError::control("failed to read capture stats"))
    }

    /// Change the capture length. Fails with
    /// [`AlreadyEnabled`](RingError::AlreadyEnabled) while enabled.
    pub fn set_caplen(&mut self, caplen: Caplen) -> Result<(), RingError> {
        self.set_geometry(self.layout.slot_count(), caplen.get() as usize)
    }

    /// Change the number of slots per half. Fails with
    /// [`AlreadyEnabled`](RingError::AlreadyEnabled) while enabled.
    pub fn set_slots(&mut self, slot_count: SlotCount) -> Result<(), RingError> {
        self.set_geometry(slot_count.get() as usize, self.layout.caplen())
    }

    fn set_geometry(&mut self, slot_count: usize, caplen: usize) -> Result<(), RingError> {
        if self.is_enabled() {
            return Err(RingError::AlreadyEnabled);
        }

        let layout = RingLayout::new(slot_count, caplen)?;

        self.control
            .set_geometry(slot_count, caplen)
            .map_err(RingError::control("failed to set ring geometry"))?;

        debug!("ring geometry set to {} slots, caplen {}", slot_count, caplen);

        self.layout = layout;

        Ok(())
    }

    #[inline]
    pub fn caplen(&self) -> usize {
        self.layout.caplen()
    }

    #[inline]
    pub fn slots(&self) -> usize {
        self.layout.slot_count()
    }

    #[inline]
    pub fn slot_size(&self) -> usize {
        self.layout.slot_size()
    }

    #[inline]
    pub fn layout(&self) -> &RingLayout {
        &self.layout
    }

    /// Size of the mapped region, zero when not enabled.
    #[inline]
    pub fn mem_size(&self) -> usize {
        self.region.as_ref().map_or(0, |r| r.len())
    }

    /// Number of acquisitions whose length had to be clamped to the
    /// slot count.
    #[inline]
    pub fn clamped_batches(&self) -> u64 {
        self.clamped
    }

    #[inline]
    pub fn control(&self) -> &C {
        &self.control
    }

    #[inline]
    pub fn control_mut(&mut self) -> &mut C {
        &mut self.control
    }
}

impl<C: ControlPlane> Drop for Ring<C> {
    fn drop(&mut self) {
        if let Some(region) = self.region.take() {
            if let Err(e) = region.unmap() {
                error!("failed to unmap ring region: {}", e);
            }

            if let Err(e) = self.control.set_enabled(false) {
                error!("failed to disable capture: {}", e);
            }
        }
    }
}
