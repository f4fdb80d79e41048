//! Sequence Number Handling
//!
//! RTP uses 16-bit sequence numbers that wrap every 65536 packets. This module
//! provides a wrapped sequence number type whose ordering is defined on the
//! circular number line rather than on the raw integer value.
//!
//! Two sequence numbers exactly 32768 apart sit in each other's half-space
//! boundary. Neither is considered newer than the other; callers that need a
//! decision for that pair must make it themselves.

use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// Size of the 16-bit sequence space
pub const SEQ_SPACE: u32 = 1 << 16;

/// Distance at which the circular ordering becomes ambiguous
pub const HALF_SEQ_SPACE: u32 = SEQ_SPACE / 2;

/// Returns true iff `high` comes after `low` on the circular number line.
///
/// Computed as the signed 16-bit result of `high - low` being positive, which
/// splits the circle into two 32768-wide half-spaces around `low`. A pair
/// exactly 32768 apart yields `false` in both directions.
#[inline]
pub fn is_newer(low: u16, high: u16) -> bool {
    (high.wrapping_sub(low) as i16) > 0
}

/// RTP sequence number with 16-bit wraparound semantics
///
/// Deliberately does not implement `Ord`: the circular ordering is not
/// transitive over the whole space, so it cannot back a sorted container.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct SeqNo(u16);

impl SeqNo {
    /// Create a new sequence number
    #[inline]
    pub const fn new(value: u16) -> Self {
        SeqNo(value)
    }

    /// Get the raw sequence number value
    #[inline]
    pub const fn as_raw(self) -> u16 {
        self.0
    }

    /// Increment the sequence number by 1
    #[inline]
    pub fn increment(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }

    /// Get the next sequence number
    #[inline]
    pub fn next(self) -> Self {
        SeqNo(self.0.wrapping_add(1))
    }

    /// Get the previous sequence number
    #[inline]
    pub fn prev(self) -> Self {
        SeqNo(self.0.wrapping_sub(1))
    }

    /// Calculate the distance from this sequence number to another
    ///
    /// Positive values mean `other` is ahead of `self`, negative means it is
    /// behind. A distance of exactly 32768 is reported as `i16::MIN`.
    #[inline]
    pub fn distance_to(self, other: SeqNo) -> i16 {
        other.0.wrapping_sub(self.0) as i16
    }

    /// Unsigned forward distance from `self` to `other`, in `0..65536`
    #[inline]
    pub fn forward_distance_to(self, other: SeqNo) -> u16 {
        other.0.wrapping_sub(self.0)
    }

    /// Check if this sequence number is before another
    #[inline]
    pub fn lt(self, other: SeqNo) -> bool {
        is_newer(self.0, other.0)
    }

    /// Check if this sequence number is before or equal to another
    #[inline]
    pub fn le(self, other: SeqNo) -> bool {
        self == other || self.lt(other)
    }

    /// Check if this sequence number is after another
    #[inline]
    pub fn gt(self, other: SeqNo) -> bool {
        is_newer(other.0, self.0)
    }

    /// Check if this sequence number is after or equal to another
    #[inline]
    pub fn ge(self, other: SeqNo) -> bool {
        self == other || self.gt(other)
    }
}

impl fmt::Debug for SeqNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SeqNo({})", self.0)
    }
}

impl fmt::Display for SeqNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for SeqNo {
    fn from(value: u16) -> Self {
        SeqNo(value)
    }
}

impl From<SeqNo> for u16 {
    fn from(seq: SeqNo) -> u16 {
        seq.0
    }
}

impl Add<u16> for SeqNo {
    type Output = SeqNo;

    fn add(self, rhs: u16) -> SeqNo {
        SeqNo(self.0.wrapping_add(rhs))
    }
}

impl AddAssign<u16> for SeqNo {
    fn add_assign(&mut self, rhs: u16) {
        self.0 = self.0.wrapping_add(rhs);
    }
}

impl Sub<u16> for SeqNo {
    type Output = SeqNo;

    fn sub(self, rhs: u16) -> SeqNo {
        SeqNo(self.0.wrapping_sub(rhs))
    }
}

impl SubAssign<u16> for SeqNo {
    fn sub_assign(&mut self, rhs: u16) {
        self.0 = self.0.wrapping_sub(rhs);
    }
}

impl Sub for SeqNo {
    type Output = i16;

    /// Calculate the signed distance between two sequence numbers
    fn sub(self, rhs: SeqNo) -> i16 {
        rhs.distance_to(self)
    }
}

/// Inclusive range of sequence numbers, possibly crossing the wrap point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeqRange {
    /// First sequence number in range
    pub start: SeqNo,
    /// Last sequence number in range (inclusive)
    pub end: SeqNo,
}

impl SeqRange {
    /// Create a new range
    pub fn new(start: SeqNo, end: SeqNo) -> Self {
        SeqRange { start, end }
    }

    /// Create a single-packet range
    pub fn single(seq: SeqNo) -> Self {
        SeqRange { start: seq, end: seq }
    }

    /// Check if this range contains a sequence number
    pub fn contains(&self, seq: SeqNo) -> bool {
        self.start.forward_distance_to(seq) <= self.start.forward_distance_to(self.end)
    }

    /// Number of sequence numbers covered
    pub fn len(&self) -> usize {
        self.start.forward_distance_to(self.end) as usize + 1
    }

    /// Check if this is a single packet
    pub fn is_single(&self) -> bool {
        self.start == self.end
    }

    /// Iterate the range from `start` to `end`
    pub fn iter(&self) -> SeqRangeIter {
        SeqRangeIter {
            next: self.start,
            remaining: self.len(),
        }
    }
}

impl IntoIterator for SeqRange {
    type Item = SeqNo;
    type IntoIter = SeqRangeIter;

    fn into_iter(self) -> SeqRangeIter {
        self.iter()
    }
}

/// Iterator over a [`SeqRange`]
#[derive(Debug, Clone)]
pub struct SeqRangeIter {
    next: SeqNo,
    remaining: usize,
}

impl Iterator for SeqRangeIter {
    type Item = SeqNo;

    fn next(&mut self) -> Option<SeqNo> {
        if self.remaining == 0 {
            return None;
        }
        let seq = self.next;
        self.next = seq.next();
        self.remaining -= 1;
        Some(seq)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for SeqRangeIter {}
