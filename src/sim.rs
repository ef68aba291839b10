//! A producer simulated in software.
//!
//! Implements the producer side of the shared-memory contract, the
//! same one the kernel module follows, over an anonymous mapping. A
//! [`SimControl`] stands in for the control plane of a
//! [`Ring`](crate::Ring) while any number of [`SimProducer`] handles,
//! usually on another thread, write frames into it.
//!
//! ```no_run
//! use pfq_rs::{sim::{Packet, SimControl}, Ring};
//! use std::time::Duration;
//!
//! let control = SimControl::new(1024, 128).unwrap();
//! let producer = control.producer();
//!
//! let mut ring = Ring::new(control).unwrap();
//! ring.enable().unwrap();
//!
//! producer.push(&Packet::new(b"frame"));
//!
//! let batch = ring.acquire(Some(Duration::from_millis(10))).unwrap();
//! assert_eq!(batch.len(), 1);
//! ```

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::{
    cmp, io,
    ptr::NonNull,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use crate::{
    config::CaptureFlags,
    mmap::Mmap,
    ring::{
        slot::{self, SlotHeader, Timestamp},
        ControlHeader, ControlPlane, ControlWord, Half, LayoutError, MappedRegion, RingLayout,
        Stats,
    },
};

/// A frame offered to the producer.
#[derive(Debug, Clone, Copy)]
pub struct Packet<'a> {
    pub data: &'a [u8],
    pub if_index: u8,
    pub hw_queue: u8,
}

impl<'a> Packet<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            if_index: 0,
            hw_queue: 0,
        }
    }

    pub fn with_source(data: &'a [u8], if_index: u8, hw_queue: u8) -> Self {
        Self {
            data,
            if_index,
            hw_queue,
        }
    }
}

/// What became of a pushed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Written into the active half.
    Delivered,
    /// The active half was full.
    Lost,
    /// Capture was off.
    Dropped,
}

#[derive(Debug)]
struct State {
    layout: RingLayout,
    flags: CaptureFlags,
    region: Option<Arc<Mmap>>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    received: AtomicU64,
    lost: AtomicU64,
    dropped: AtomicU64,
    doorbell_tx: Sender<()>,
    doorbell_rx: Receiver<()>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, State> {
        // State stays consistent even if a holder panicked.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn region(&self) -> Option<(Arc<Mmap>, RingLayout, CaptureFlags)> {
        let state = self.state();
        state
            .region
            .as_ref()
            .map(|r| (Arc::clone(r), state.layout, state.flags))
    }

    fn pending(&self) -> u64 {
        match self.region() {
            // SAFETY: the region is alive for as long as we hold the
            // `Arc`, and its header sits at offset zero.
            Some((region, _, _)) => unsafe { ControlHeader::from_base(region.addr()) }
                .load()
                .len(),
            None => 0,
        }
    }

    fn ring(&self) {
        // A full doorbell already has a wakeup pending.
        let _ = self.doorbell_tx.try_send(());
    }
}

/// The simulated control plane. Pass it to
/// [`Ring::new`](crate::Ring::new).
#[derive(Debug)]
pub struct SimControl {
    shared: Arc<Shared>,
}

impl SimControl {
    /// A producer for `slot_count` slots per half of `caplen` bytes.
    pub fn new(slot_count: usize, caplen: usize) -> Result<Self, LayoutError> {
        let layout = RingLayout::new(slot_count, caplen)?;
        let (doorbell_tx, doorbell_rx) = crossbeam_channel::bounded(1);

        let shared = Shared {
            state: Mutex::new(State {
                layout,
                flags: CaptureFlags::empty(),
                region: None,
            }),
            received: AtomicU64::new(0),
            lost: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            doorbell_tx,
            doorbell_rx,
        };

        Ok(Self {
            shared: Arc::new(shared),
        })
    }

    /// A handle for writing frames into the ring.
    pub fn producer(&self) -> SimProducer {
        SimProducer {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn flags(&self) -> CaptureFlags {
        self.shared.state().flags
    }
}

/// The simulated region, kept alive by both the ring and any producer
/// midway through a write.
#[derive(Debug)]
pub struct SimRegion {
    mmap: Arc<Mmap>,
}

impl MappedRegion for SimRegion {
    #[inline]
    fn addr(&self) -> NonNull<u8> {
        self.mmap.addr()
    }

    #[inline]
    fn len(&self) -> usize {
        self.mmap.len()
    }

    fn unmap(self) -> io::Result<()> {
        match Arc::try_unwrap(self.mmap) {
            Ok(mmap) => mmap.unmap(),
            // Still shared with the control plane or a producer, the
            // last one out unmaps.
            Err(_) => Ok(()),
        }
    }
}

fn os_error(code: i32) -> io::Error {
    io::Error::from_raw_os_error(code)
}

impl ControlPlane for SimControl {
    type Region = SimRegion;

    fn geometry(&self) -> io::Result<(usize, usize)> {
        let layout = self.shared.state().layout;
        Ok((layout.slot_count(), layout.caplen()))
    }

    fn set_geometry(&mut self, slot_count: usize, caplen: usize) -> io::Result<()> {
        let mut state = self.shared.state();

        if state.region.is_some() {
            return Err(os_error(libc::EBUSY));
        }

        state.layout = RingLayout::new(slot_count, caplen)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        Ok(())
    }

    fn set_flags(&mut self, flags: CaptureFlags) -> io::Result<()> {
        self.shared.state().flags = flags;
        Ok(())
    }

    fn set_enabled(&mut self, enabled: bool) -> io::Result<()> {
        let mut state = self.shared.state();

        match (enabled, state.region.is_some()) {
            (true, false) => {
                let mmap = Mmap::anonymous(state.layout.total_size())?;
                state.region = Some(Arc::new(mmap));
            }
            (false, true) => {
                state.region = None;
            }
            _ => (),
        }

        Ok(())
    }

    fn region_size(&self) -> io::Result<usize> {
        self.shared
            .state()
            .region
            .as_ref()
            .map(|r| r.len())
            .ok_or_else(|| os_error(libc::EINVAL))
    }

    fn map_region(&mut self, len: usize) -> io::Result<SimRegion> {
        let state = self.shared.state();

        match state.region.as_ref() {
            Some(mmap) if len <= mmap.len() => Ok(SimRegion {
                mmap: Arc::clone(mmap),
            }),
            Some(_) => Err(os_error(libc::EINVAL)),
            None => Err(os_error(libc::ENODEV)),
        }
    }

    fn wait_readable(&self, timeout: Option<Duration>) -> io::Result<bool> {
        if self.shared.pending() > 0 {
            return Ok(true);
        }

        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            let rung = match deadline {
                None => self.shared.doorbell_rx.recv().is_ok(),
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());

                    match self.shared.doorbell_rx.recv_timeout(remaining) {
                        Ok(()) => true,
                        Err(RecvTimeoutError::Timeout) => return Ok(self.shared.pending() > 0),
                        Err(RecvTimeoutError::Disconnected) => false,
                    }
                }
            };

            if !rung {
                return Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "producer doorbell disconnected",
                ));
            }

            // Stale wakeups from slots already consumed are possible.
            if self.shared.pending() > 0 {
                return Ok(true);
            }
        }
    }

    fn stats(&self) -> io::Result<Stats> {
        Ok(Stats::new(
            self.shared.received.load(Ordering::Relaxed),
            self.shared.lost.load(Ordering::Relaxed),
            self.shared.dropped.load(Ordering::Relaxed),
        ))
    }
}

/// Writes frames into the active half of a simulated ring.
#[derive(Debug, Clone)]
pub struct SimProducer {
    shared: Arc<Shared>,
}

impl SimProducer {
    /// Write `packet` into the next free slot and commit it.
    pub fn push(&self, packet: &Packet<'_>) -> Delivery {
        match self.reserve() {
            Ok(mut reservation) => {
                reservation.write(packet);
                reservation.commit();
                Delivery::Delivered
            }
            Err(delivery) => delivery,
        }
    }

    /// Reserve the next free slot of the active half without
    /// committing it. On failure returns why, as
    /// [`Lost`](Delivery::Lost) or [`Dropped`](Delivery::Dropped), and
    /// counts the frame accordingly.
    pub fn reserve(&self) -> Result<SlotReservation, Delivery> {
        let (region, layout, flags) = match self.shared.region() {
            Some(r) => r,
            None => {
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                return Err(Delivery::Dropped);
            }
        };

        // SAFETY: see `Shared::pending`.
        let header = unsafe { ControlHeader::from_base(region.addr()) };
        let slot_count = layout.slot_count() as u64;

        let observed = header.load();

        if header.is_disabled() || observed.len() >= slot_count {
            return Err(self.lose(header, observed, slot_count));
        }

        let word = header.reserve();

        if word.len() >= slot_count {
            return Err(self.lose(header, word, slot_count));
        }

        let offset = layout.slot_offset(word.active(), word.len() as usize);

        // SAFETY: the offset of an in-range slot lies inside the
        // region.
        let ptr = unsafe { NonNull::new_unchecked(region.addr().as_ptr().add(offset)) };

        Ok(SlotReservation {
            ptr,
            max_caplen: layout.caplen(),
            timestamp: flags.contains(CaptureFlags::TIMESTAMP),
            shared: Arc::clone(&self.shared),
            _region: region,
        })
    }

    /// Count a frame refused because the half in `observed` was full
    /// and pause until the consumer swaps halves.
    fn lose(&self, header: &ControlHeader, observed: ControlWord, slot_count: u64) -> Delivery {
        header.set_disabled(true);

        // The consumer clears the flag after its exchange. If the
        // exchange came first, the pause would stick to a fresh half.
        let current = header.load_latest();

        if current.active() != observed.active() || current.len() < slot_count {
            header.set_disabled(false);
        }

        self.shared.lost.fetch_add(1, Ordering::Relaxed);

        // A full half is worth draining now.
        self.shared.ring();

        Delivery::Lost
    }

    /// The half currently being filled, `None` while capture is off.
    pub fn active_half(&self) -> Option<Half> {
        self.shared
            .region()
            .map(|(region, _, _)| unsafe { ControlHeader::from_base(region.addr()) }.load().active())
    }

    /// Number of slots reserved in the active half.
    pub fn pending(&self) -> u64 {
        self.shared.pending()
    }

    /// Whether the producer stopped delivering because the active half
    /// filled up.
    pub fn is_paused(&self) -> bool {
        self.shared
            .region()
            .map_or(false, |(region, _, _)| {
                unsafe { ControlHeader::from_base(region.addr()) }.is_disabled()
            })
    }

    /// Overwrite the slot count of the active half with `len`, which
    /// need not be in range. Returns `false` if capture is off.
    pub fn force_valid_len(&self, len: u64) -> bool {
        match self.shared.region() {
            Some((region, _, _)) => {
                let header = unsafe { ControlHeader::from_base(region.addr()) };
                header.store(ControlWord::new(header.load().active(), len));
                self.shared.ring();
                true
            }
            None => false,
        }
    }
}

/// A slot reserved by [`SimProducer::reserve`]. The consumer sees it
/// as in flight until [`commit`](SlotReservation::commit) is called;
/// dropping it leaves the slot uncommitted.
#[derive(Debug)]
pub struct SlotReservation {
    ptr: NonNull<u8>,
    max_caplen: usize,
    timestamp: bool,
    shared: Arc<Shared>,
    _region: Arc<Mmap>,
}

unsafe impl Send for SlotReservation {}

impl SlotReservation {
    /// Write the header and payload of `packet`. The payload is
    /// truncated to the ring's capture length.
    pub fn write(&mut self, packet: &Packet<'_>) {
        let caplen = cmp::min(packet.data.len(), self.max_caplen);
        let len = cmp::min(packet.data.len(), u16::MAX as usize);

        let tstamp = if self.timestamp {
            now()
        } else {
            Timestamp::default()
        };

        let header = SlotHeader::new(
            caplen as u16,
            len as u16,
            packet.if_index,
            packet.hw_queue,
            tstamp,
        );

        // SAFETY: the slot was reserved for us alone and lies within
        // the region we keep alive.
        unsafe { slot::write(self.ptr, self.max_caplen, &header, packet.data) };
    }

    /// Publish the slot to the consumer.
    pub fn commit(self) {
        // SAFETY: see `write`.
        unsafe { slot::commit(self.ptr) };

        self.shared.received.fetch_add(1, Ordering::Relaxed);
        self.shared.ring();
    }
}

fn now() -> Timestamp {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();

    Timestamp {
        sec: since_epoch.as_secs() as u32,
        nsec: since_epoch.subsec_nanos(),
    }
}
