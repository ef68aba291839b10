#[inline]
pub fn get_errno() -> i32 {
    errno::errno().0
}

/// Round `val` up to the next multiple of `align`, which must be a
/// power of two. Returns `None` on overflow.
#[inline]
pub fn align_up(val: usize, align: usize) -> Option<usize> {
    debug_assert!(is_pow_of_two(align));
    val.checked_add(align - 1).map(|v| v & !(align - 1))
}

#[inline]
pub fn is_pow_of_two(val: usize) -> bool {
    if val == 0 {
        return false;
    }
    (val & (val - 1)) == 0
}
