use std::{
    fmt,
    ops::{Add, AddAssign, Sub, SubAssign},
};

/// Snapshot of a ring's capture counters.
///
/// Counters only grow while the ring is enabled, so subtracting an
/// earlier snapshot from a later one gives the activity in between.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    /// Frames delivered into the ring.
    pub received: u64,
    /// Frames that found the active half full.
    pub lost: u64,
    /// Frames discarded before reaching the ring, e.g. while capture
    /// was off.
    pub dropped: u64,
}

impl Stats {
    pub fn new(received: u64, lost: u64, dropped: u64) -> Self {
        Self {
            received,
            lost,
            dropped,
        }
    }
}

impl AddAssign for Stats {
    fn add_assign(&mut self, rhs: Self) {
        self.received = self.received.wrapping_add(rhs.received);
        self.lost = self.lost.wrapping_add(rhs.lost);
        self.dropped = self.dropped.wrapping_add(rhs.dropped);
    }
}

impl SubAssign for Stats {
    fn sub_assign(&mut self, rhs: Self) {
        self.received = self.received.wrapping_sub(rhs.received);
        self.lost = self.lost.wrapping_sub(rhs.lost);
        self.dropped = self.dropped.wrapping_sub(rhs.dropped);
    }
}

impl Add for Stats {
    type Output = Stats;

    fn add(mut self, rhs: Self) -> Self::Output {
        self += rhs;
        self
    }
}

impl Sub for Stats {
    type Output = Stats;

    fn sub(mut self, rhs: Self) -> Self::Output {
        self -= rhs;
        self
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.received, self.lost, self.dropped)
    }
}
