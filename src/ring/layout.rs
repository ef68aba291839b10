use thiserror::Error;

use crate::util;

use super::{control::CONTROL_HEADER_SIZE, slot::SLOT_HEADER_SIZE, Half};

/// Slots start on 8-byte boundaries so the word holding the commit
/// flag can be cleared with a single aligned store.
pub const SLOT_ALIGN: usize = 8;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutError {
    #[error("ring with {slot_count} slots of caplen {caplen} does not fit in the address space")]
    TooLarge { slot_count: usize, caplen: usize },
}

/// Geometry of the shared region: a control header followed by two
/// equal halves of `slot_count` fixed-size slots each.
///
/// ```text
/// +----------------+---------------------------+---------------------------+
/// | control header | half 0: slot_count slots  | half 1: slot_count slots  |
/// +----------------+---------------------------+---------------------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingLayout {
    slot_count: usize,
    caplen: usize,
    slot_size: usize,
    half_size: usize,
    total_size: usize,
}

impl RingLayout {
    pub fn new(slot_count: usize, caplen: usize) -> Result<Self, LayoutError> {
        let too_large = LayoutError::TooLarge { slot_count, caplen };

        let slot_size = SLOT_HEADER_SIZE
            .checked_add(caplen)
            .and_then(|len| util::align_up(len, SLOT_ALIGN))
            .ok_or(too_large)?;

        let half_size = slot_count.checked_mul(slot_size).ok_or(too_large)?;

        let total_size = half_size
            .checked_mul(2)
            .and_then(|len| len.checked_add(CONTROL_HEADER_SIZE))
            .ok_or(too_large)?;

        Ok(Self {
            slot_count,
            caplen,
            slot_size,
            half_size,
            total_size,
        })
    }

    /// Number of slots in each half.
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    /// Maximum payload bytes per slot.
    #[inline]
    pub fn caplen(&self) -> usize {
        self.caplen
    }

    /// Size of a single slot, header included. Also the stride
    /// between consecutive slots.
    #[inline]
    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    /// Size of one half of the double buffer.
    #[inline]
    pub fn half_size(&self) -> usize {
        self.half_size
    }

    /// Size of the whole region, control header included.
    #[inline]
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    /// Offset of the first slot of `half` from the region base.
    #[inline]
    pub fn half_offset(&self, half: Half) -> usize {
        CONTROL_HEADER_SIZE + half.index() * self.half_size
    }

    /// Offset of slot `index` of `half` from the region base.
    /// `index` must be less than [`slot_count`](Self::slot_count).
    #[inline]
    pub fn slot_offset(&self, half: Half, index: usize) -> usize {
        debug_assert!(index < self.slot_count);
        self.half_offset(half) + index * self.slot_size
    }
}
