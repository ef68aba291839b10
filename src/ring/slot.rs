//! Types for reading a single ring slot.
//!
//! Every slot starts with a fixed 16-byte header followed by up to
//! `caplen` bytes of payload:
//!
//! ```text
//!  0        2        4          5          6     7        8           12           16
//!  +--------+--------+----------+----------+-----+--------+-----------+------------+---------
//!  | caplen |  len   | if_index | hw_queue | rsv | commit | tstamp s  | tstamp ns  | payload
//!  +--------+--------+----------+----------+-----+--------+-----------+------------+---------
//! ```
//!
//! The commit byte sits in the first 8-byte word, so zeroing that
//! word is enough to hand the slot back to the producer.

use std::{
    fmt,
    marker::PhantomData,
    ptr::{self, NonNull},
    slice,
    sync::atomic::{AtomicU64, AtomicU8, Ordering},
    time::Duration,
};

/// Size in bytes of the header at the start of every slot.
pub const SLOT_HEADER_SIZE: usize = 16;

const CAPLEN_OFFSET: usize = 0;
const LEN_OFFSET: usize = 2;
const IF_INDEX_OFFSET: usize = 4;
const HW_QUEUE_OFFSET: usize = 5;
const COMMIT_OFFSET: usize = 7;
const TSTAMP_SEC_OFFSET: usize = 8;
const TSTAMP_NSEC_OFFSET: usize = 12;

/// Time at which a frame was captured, if the producer was asked to
/// stamp frames. Zero otherwise.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp {
    pub sec: u32,
    pub nsec: u32,
}

impl Timestamp {
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.sec == 0 && self.nsec == 0
    }
}

impl From<Timestamp> for Duration {
    fn from(ts: Timestamp) -> Self {
        Duration::new(u64::from(ts.sec), ts.nsec)
    }
}

/// A copy of a slot's metadata.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SlotHeader {
    caplen: u16,
    len: u16,
    if_index: u8,
    hw_queue: u8,
    tstamp: Timestamp,
}

impl SlotHeader {
    pub(crate) fn new(caplen: u16, len: u16, if_index: u8, hw_queue: u8, tstamp: Timestamp) -> Self {
        Self {
            caplen,
            len,
            if_index,
            hw_queue,
            tstamp,
        }
    }

    /// Number of payload bytes captured.
    #[inline]
    pub fn caplen(&self) -> usize {
        self.caplen as usize
    }

    /// Length of the frame on the wire.
    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    pub fn if_index(&self) -> u8 {
        self.if_index
    }

    #[inline]
    pub fn hw_queue(&self) -> u8 {
        self.hw_queue
    }

    #[inline]
    pub fn timestamp(&self) -> Timestamp {
        self.tstamp
    }
}

/// A view of one slot of a [`Batch`](super::Batch).
#[derive(Clone, Copy)]
pub struct Slot<'a> {
    ptr: NonNull<u8>,
    max_caplen: usize,
    _marker: PhantomData<&'a [u8]>,
}

impl<'a> Slot<'a> {
    /// # Safety
    ///
    /// `ptr` must point to the start of a slot of `SLOT_HEADER_SIZE +
    /// max_caplen` bytes which stays valid for `'a`.
    #[inline]
    pub(crate) unsafe fn new(ptr: NonNull<u8>, max_caplen: usize) -> Self {
        Self {
            ptr,
            max_caplen,
            _marker: PhantomData,
        }
    }

    #[inline]
    fn read<T: Copy>(&self, offset: usize) -> T {
        // SAFETY: offsets are within the header, which the
        // constructor's contract guarantees is readable. Reads are
        // unaligned since copied batches may live in any buffer.
        unsafe { ptr::read_unaligned(self.ptr.as_ptr().add(offset) as *const T) }
    }

    #[inline]
    fn commit_flag(&self) -> &AtomicU8 {
        // SAFETY: see `read`. `AtomicU8` has an alignment of one.
        unsafe { &*(self.ptr.as_ptr().add(COMMIT_OFFSET) as *const AtomicU8) }
    }

    /// Whether the producer has finished writing this slot. Header
    /// and payload reads are only meaningful once this is `true`.
    #[inline]
    pub fn is_committed(&self) -> bool {
        self.commit_flag().load(Ordering::Acquire) != 0
    }

    /// Spin until the slot is committed, giving up after `max_spins`
    /// checks. Returns whether the commit was observed.
    #[inline]
    pub fn wait_committed(&self, max_spins: usize) -> bool {
        for _ in 0..max_spins {
            if self.is_committed() {
                return true;
            }
            std::hint::spin_loop();
        }
        self.is_committed()
    }

    /// Copy of the slot header.
    #[inline]
    pub fn header(&self) -> SlotHeader {
        SlotHeader {
            caplen: self.read(CAPLEN_OFFSET),
            len: self.read(LEN_OFFSET),
            if_index: self.read(IF_INDEX_OFFSET),
            hw_queue: self.read(HW_QUEUE_OFFSET),
            tstamp: self.timestamp(),
        }
    }

    /// Number of payload bytes captured.
    #[inline]
    pub fn caplen(&self) -> usize {
        self.read::<u16>(CAPLEN_OFFSET) as usize
    }

    /// Length of the frame on the wire, which may exceed
    /// [`caplen`](Self::caplen).
    #[inline]
    pub fn len(&self) -> usize {
        self.read::<u16>(LEN_OFFSET) as usize
    }

    /// Index of the interface the frame arrived on.
    #[inline]
    pub fn if_index(&self) -> u8 {
        self.read(IF_INDEX_OFFSET)
    }

    /// Hardware queue the frame arrived on.
    #[inline]
    pub fn hw_queue(&self) -> u8 {
        self.read(HW_QUEUE_OFFSET)
    }

    #[inline]
    pub fn timestamp(&self) -> Timestamp {
        Timestamp {
            sec: self.read(TSTAMP_SEC_OFFSET),
            nsec: self.read(TSTAMP_NSEC_OFFSET),
        }
    }

    /// The captured payload. Bounded by the ring's capture length
    /// whatever the header claims.
    #[inline]
    pub fn data(&self) -> &'a [u8] {
        let len = std::cmp::min(self.caplen(), self.max_caplen);

        // SAFETY: the payload area is `max_caplen` bytes long and
        // `len` never exceeds it.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr().add(SLOT_HEADER_SIZE), len) }
    }
}

impl fmt::Debug for Slot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("committed", &self.is_committed())
            .field("header", &self.header())
            .finish()
    }
}

/// Write `header` and `payload` into the slot at `ptr`, leaving the
/// commit flag untouched. `payload` is truncated to `max_caplen`.
///
/// # Safety
///
/// `ptr` must point to a slot of `SLOT_HEADER_SIZE + max_caplen`
/// bytes that no one else is accessing.
pub(crate) unsafe fn write(ptr: NonNull<u8>, max_caplen: usize, header: &SlotHeader, payload: &[u8]) {
    let base = ptr.as_ptr();
    let len = std::cmp::min(payload.len(), max_caplen);

    ptr::write_unaligned(base.add(CAPLEN_OFFSET) as *mut u16, header.caplen);
    ptr::write_unaligned(base.add(LEN_OFFSET) as *mut u16, header.len);
    ptr::write(base.add(IF_INDEX_OFFSET), header.if_index);
    ptr::write(base.add(HW_QUEUE_OFFSET), header.hw_queue);
    ptr::write_unaligned(base.add(TSTAMP_SEC_OFFSET) as *mut u32, header.tstamp.sec);
    ptr::write_unaligned(base.add(TSTAMP_NSEC_OFFSET) as *mut u32, header.tstamp.nsec);
    ptr::copy_nonoverlapping(payload.as_ptr(), base.add(SLOT_HEADER_SIZE), len);
}

/// Publish a slot written with [`write`].
///
/// # Safety
///
/// `ptr` must point to the start of a live slot.
#[inline]
pub(crate) unsafe fn commit(ptr: NonNull<u8>) {
    (*(ptr.as_ptr().add(COMMIT_OFFSET) as *const AtomicU8)).store(1, Ordering::Release)
}

/// Zero the first header word, clearing the commit flag along with
/// the lengths.
///
/// # Safety
///
/// `ptr` must point to the start of a live slot aligned to 8 bytes.
#[inline]
pub(crate) unsafe fn clear(ptr: NonNull<u8>) {
    (*(ptr.as_ptr() as *const AtomicU64)).store(0, Ordering::Relaxed)
}
