use std::{iter::FusedIterator, marker::PhantomData, ptr::NonNull, slice};

use super::{slot::SLOT_HEADER_SIZE, Slot};

/// A view over the contiguous run of slots delivered by one
/// acquisition.
///
/// Borrowed from the [`Ring`](super::Ring) that produced it, so it
/// cannot outlive the next acquisition, after which the producer may
/// reuse the memory.
#[derive(Clone, Copy)]
pub struct Batch<'a> {
    base: NonNull<u8>,
    slot_size: usize,
    len: usize,
    _marker: PhantomData<&'a [u8]>,
}

unsafe impl Send for Batch<'_> {}

impl<'a> Batch<'a> {
    /// # Safety
    ///
    /// `base` must point to `len * slot_size` readable bytes holding
    /// consecutive slots, valid for `'a`. `slot_size` must be at
    /// least [`SLOT_HEADER_SIZE`].
    #[inline]
    pub(crate) unsafe fn new(base: NonNull<u8>, slot_size: usize, len: usize) -> Self {
        debug_assert!(slot_size >= SLOT_HEADER_SIZE);

        Self {
            base,
            slot_size,
            len,
            _marker: PhantomData,
        }
    }

    /// Number of slots in the batch.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Distance in bytes between consecutive slots.
    #[inline]
    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    /// The slot at `index`, or `None` if out of range.
    #[inline]
    pub fn get(&self, index: usize) -> Option<Slot<'a>> {
        if index < self.len {
            // SAFETY: bounds checked above.
            Some(unsafe { self.slot_unchecked(index) })
        } else {
            None
        }
    }

    /// # Safety
    ///
    /// `index` must be less than `self.len`.
    #[inline]
    unsafe fn slot_unchecked(&self, index: usize) -> Slot<'a> {
        let ptr = NonNull::new_unchecked(self.base.as_ptr().add(index * self.slot_size));
        Slot::new(ptr, self.slot_size - SLOT_HEADER_SIZE)
    }

    /// Iterate over the slots in order. Every call starts again from
    /// the first slot.
    #[inline]
    pub fn iter(&self) -> Iter<'a> {
        Iter {
            batch: *self,
            pos: 0,
        }
    }

    /// The leading run of slots whose commit flag is already set.
    /// Stops at the first slot the producer is still writing.
    #[inline]
    pub fn committed(&self) -> impl Iterator<Item = Slot<'a>> {
        self.iter().take_while(|slot| slot.is_committed())
    }

    /// The raw bytes spanned by the batch, headers included.
    #[inline]
    pub fn as_bytes(&self) -> &'a [u8] {
        // SAFETY: the constructor's contract covers exactly this
        // range.
        unsafe { slice::from_raw_parts(self.base.as_ptr(), self.len * self.slot_size) }
    }
}

impl<'a> IntoIterator for &Batch<'a> {
    type Item = Slot<'a>;
    type IntoIter = Iter<'a>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a> IntoIterator for Batch<'a> {
    type Item = Slot<'a>;
    type IntoIter = Iter<'a>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl std::fmt::Debug for Batch<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Batch")
            .field("len", &self.len)
            .field("slot_size", &self.slot_size)
            .finish()
    }
}

/// Forward iterator over the slots of a [`Batch`]. Advances by a
/// constant stride of one slot size.
#[derive(Debug, Clone)]
pub struct Iter<'a> {
    batch: Batch<'a>,
    pos: usize,
}

impl<'a> Iterator for Iter<'a> {
    type Item = Slot<'a>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.batch.get(self.pos)?;
        self.pos += 1;
        Some(slot)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.batch.len - self.pos;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl FusedIterator for Iter<'_> {}

#[cfg(test)]
mod tests {
    use crate::ring::slot::{self, SlotHeader, Timestamp};

    use super::*;

    const CAPLEN: usize = 16;
    const SLOT_SIZE: usize = SLOT_HEADER_SIZE + CAPLEN;

    /// Heap buffer of `n` slots, 8-byte aligned.
    fn slots(n: usize) -> Vec<u64> {
        vec![0u64; n * SLOT_SIZE / 8]
    }

    fn base(buf: &mut Vec<u64>) -> NonNull<u8> {
        NonNull::new(buf.as_mut_ptr() as *mut u8).unwrap()
    }

    fn fill(buf: &mut Vec<u64>, n: usize, committed: usize) {
        let base = base(buf);

        for i in 0..n {
            let ptr = unsafe { NonNull::new_unchecked(base.as_ptr().add(i * SLOT_SIZE)) };
            let header = SlotHeader::new(1, 1, i as u8, 0, Timestamp::default());

            unsafe {
                slot::write(ptr, CAPLEN, &header, &[i as u8]);

                if i < committed {
                    slot::commit(ptr);
                }
            }
        }
    }

    #[test]
    fn iterates_every_slot_in_order() {
        let mut buf = slots(4);
        fill(&mut buf, 4, 4);

        let batch = unsafe { Batch::new(base(&mut buf), SLOT_SIZE, 4) };

        assert_eq!(batch.len(), 4);
        assert_eq!(batch.iter().len(), 4);

        let seen: Vec<u8> = batch.iter().map(|slot| slot.data()[0]).collect();
        assert_eq!(seen, vec![0, 1, 2, 3]);

        let if_indexes: Vec<u8> = (&batch).into_iter().map(|slot| slot.if_index()).collect();
        assert_eq!(if_indexes, vec![0, 1, 2, 3]);
    }

    #[test]
    fn iteration_is_restartable() {
        let mut buf = slots(3);
        fill(&mut buf, 3, 3);

        let batch = unsafe { Batch::new(base(&mut buf), SLOT_SIZE, 3) };

        let mut iter = batch.iter();
        iter.next();
        iter.next();

        assert_eq!(batch.iter().count(), 3);
        assert_eq!(iter.count(), 1);
    }

    #[test]
    fn iteration_stops_at_len_not_buffer_end() {
        let mut buf = slots(8);
        fill(&mut buf, 8, 8);

        let batch = unsafe { Batch::new(base(&mut buf), SLOT_SIZE, 5) };

        let mut iter = batch.iter();
        assert_eq!(iter.by_ref().count(), 5);
        assert!(iter.next().is_none());
        assert!(batch.get(5).is_none());
        assert_eq!(batch.as_bytes().len(), 5 * SLOT_SIZE);
    }

    #[test]
    fn empty_batch_yields_nothing() {
        let mut buf = slots(1);

        let batch = unsafe { Batch::new(base(&mut buf), SLOT_SIZE, 0) };

        assert!(batch.is_empty());
        assert!(batch.iter().next().is_none());
        assert!(batch.as_bytes().is_empty());
    }

    #[test]
    fn committed_stops_at_first_uncommitted_slot() {
        let mut buf = slots(6);
        fill(&mut buf, 6, 4);

        let batch = unsafe { Batch::new(base(&mut buf), SLOT_SIZE, 6) };

        assert_eq!(batch.committed().count(), 4);
        assert!(!batch.get(4).unwrap().is_committed());
    }
}
