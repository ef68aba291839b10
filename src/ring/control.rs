//! The control header at the start of the shared region.
//!
//! Its first word tells which half of the double buffer the producer
//! is currently filling and how many slots of that half it has
//! reserved so far. The producer advances the count one slot at a
//! time with atomic increments, and the consumer hands a drained half
//! back by swapping the whole word in a single atomic exchange. The
//! packed representation never leaves this module.

use std::{
    mem,
    ptr::NonNull,
    sync::atomic::{AtomicU32, AtomicU64, Ordering},
};

const HALF_BIT: u64 = 1 << 63;
const LEN_MASK: u64 = HALF_BIT - 1;

/// Size in bytes of the control header.
pub const CONTROL_HEADER_SIZE: usize = mem::size_of::<ControlHeader>();

/// One of the two halves of the double buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Half {
    Zero,
    One,
}

impl Half {
    /// Position of this half within the region, `0` or `1`.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Half::Zero => 0,
            Half::One => 1,
        }
    }

    #[inline]
    pub fn other(self) -> Half {
        match self {
            Half::Zero => Half::One,
            Half::One => Half::Zero,
        }
    }
}

/// Decoded value of the control word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ControlWord {
    active: Half,
    len: u64,
}

impl ControlWord {
    /// `len` is truncated to the 63 bits available in the packed word.
    #[inline]
    pub(crate) fn new(active: Half, len: u64) -> Self {
        Self {
            active,
            len: len & LEN_MASK,
        }
    }

    /// The half currently being written by the producer.
    #[inline]
    pub(crate) fn active(&self) -> Half {
        self.active
    }

    /// Number of slots the producer has reserved in the active half.
    /// Not bounded by the slot count.
    #[inline]
    pub(crate) fn len(&self) -> u64 {
        self.len
    }

    #[inline]
    fn from_raw(raw: u64) -> Self {
        let active = if raw & HALF_BIT == 0 {
            Half::Zero
        } else {
            Half::One
        };

        Self {
            active,
            len: raw & LEN_MASK,
        }
    }

    #[inline]
    fn into_raw(self) -> u64 {
        match self.active {
            Half::Zero => self.len,
            Half::One => HALF_BIT | self.len,
        }
    }
}

/// The header as laid out at offset zero of the region.
#[repr(C)]
#[derive(Debug, Default)]
pub(crate) struct ControlHeader {
    word: AtomicU64,
    disabled: AtomicU32,
    _reserved: u32,
}

impl ControlHeader {
    /// # Safety
    ///
    /// `base` must point to the start of a live region, aligned to 8
    /// bytes and at least [`CONTROL_HEADER_SIZE`] long, which outlives
    /// `'a`.
    #[inline]
    pub(crate) unsafe fn from_base<'a>(base: NonNull<u8>) -> &'a Self {
        &*(base.as_ptr() as *const ControlHeader)
    }

    /// A possibly stale snapshot, only good for deciding whether to
    /// wait.
    #[inline]
    pub(crate) fn load(&self) -> ControlWord {
        ControlWord::from_raw(self.word.load(Ordering::Relaxed))
    }

    /// Replace the control word, returning its prior value. The only
    /// write the consumer ever makes to the word.
    #[inline]
    pub(crate) fn exchange(&self, word: ControlWord) -> ControlWord {
        ControlWord::from_raw(self.word.swap(word.into_raw(), Ordering::SeqCst))
    }

    /// Reserve the next slot of the active half on behalf of the
    /// producer. Returns the word prior to the increment, whose `len`
    /// is the reserved slot's index.
    #[inline]
    pub(crate) fn reserve(&self) -> ControlWord {
        ControlWord::from_raw(self.word.fetch_add(1, Ordering::AcqRel))
    }

    /// The latest word, ordered after any preceding
    /// [`set_disabled`](Self::set_disabled) on this thread.
    #[inline]
    pub(crate) fn load_latest(&self) -> ControlWord {
        ControlWord::from_raw(self.word.load(Ordering::SeqCst))
    }

    #[inline]
    pub(crate) fn store(&self, word: ControlWord) {
        self.word.store(word.into_raw(), Ordering::Release)
    }

    #[inline]
    pub(crate) fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Acquire) != 0
    }

    #[inline]
    pub(crate) fn set_disabled(&self, disabled: bool) {
        self.disabled.store(disabled as u32, Ordering::SeqCst)
    }
}
