//! Circular receive buffer indexed by RTP sequence number
//!
//! For UDP the buffered sequence space looks like this:
//!
//! ```text
//!   [ seq1 | seq2 | seq3 ... seq10 | seq11 (lost) | seq12 | seq13 ]
//!            ^ low                                          ^ high
//! ```
//!
//! Everything before `low` has been delivered or given up on. Between `low`
//! and `high` the buffer holds packets of frames that are not complete yet,
//! with holes for packets still being recovered. Slots are addressed by the
//! extended (unwrapped) sequence number modulo the capacity, so the window
//! `[low, high]` must stay narrower than the capacity or newer packets start
//! overwriting older ones.

use crate::packet::MediaPacket;
use crate::sequence::{SeqNo, SeqRange, HALF_SEQ_SPACE, SEQ_SPACE};

/// Largest supported capacity, half the sequence space
pub const MAX_CAPACITY: usize = 1 << 15;

/// Result of feeding a sequence number to [`RingBuffer::update`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqUpdate {
    /// First sequence number ever seen, the window starts here
    Initialized,
    /// Sequence number moved `high` forward, skipping `gap` if any
    Advanced { gap: Option<SeqRange> },
    /// Sequence number lies inside `[low, high]`: fills a hole or duplicates
    InWindow,
    /// Startup reordering moved `low` back, exposing `gap` if any
    Extended { gap: Option<SeqRange> },
    /// Sequence number is too far ahead for anything buffered to survive.
    /// The old window was emptied (`released` packets dropped) and restarts
    /// at the new sequence number.
    Jumped { released: usize },
    /// Sequence number is behind the window and must be ignored
    Stale,
}

impl SeqUpdate {
    /// Newly missing sequence numbers reported by this update
    pub fn gap(&self) -> Option<SeqRange> {
        match self {
            SeqUpdate::Advanced { gap } | SeqUpdate::Extended { gap } => *gap,
            _ => None,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, SeqUpdate::Stale)
    }
}

/// Buffered packet with the sequence number that owns the slot
struct Slot<P> {
    seq: SeqNo,
    packet: P,
}

/// Fixed-capacity circular packet store
pub struct RingBuffer<P> {
    /// Buffer storage (circular)
    slots: Vec<Option<Slot<P>>>,
    /// Buffer capacity
    capacity: usize,
    /// Oldest sequence number still tracked
    low: SeqNo,
    /// Highest sequence number observed
    high: SeqNo,
    /// Whether `low` and `high` hold real values yet
    initialized: bool,
    /// Number of times `high` wrapped past 65535
    flip_count: u32,
}

impl<P: MediaPacket> RingBuffer<P> {
    /// Create a new ring buffer
    ///
    /// The capacity is clamped to `1..=MAX_CAPACITY`.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_CAPACITY);

        RingBuffer {
            slots: (0..capacity).map(|_| None).collect(),
            capacity,
            low: SeqNo::new(0),
            high: SeqNo::new(0),
            initialized: false,
            flip_count: 0,
        }
    }

    /// Get the slot index for a sequence number
    ///
    /// Counted on the unwrapped sequence line relative to `high`, so
    /// neighbouring sequence numbers keep neighbouring slots across the
    /// 16-bit wrap whatever the capacity.
    #[inline]
    fn index(&self, seq: SeqNo) -> usize {
        let high = self.flip_count as i64 * SEQ_SPACE as i64 + self.high.as_raw() as i64;
        let extended = high + self.high.distance_to(seq) as i64;
        extended.rem_euclid(self.capacity as i64) as usize
    }

    pub fn low(&self) -> SeqNo {
        self.low
    }

    pub fn high(&self) -> SeqNo {
        self.high
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Number of sequence numbers from `low` up to `high`, not counting `low`
    ///
    /// Zero when the window is empty (`low` has moved past `high`).
    pub fn span(&self) -> usize {
        if !self.initialized {
            return 0;
        }
        self.low.distance_to(self.high).max(0) as usize
    }

    /// True when every tracked sequence number has been delivered or dropped
    pub fn is_empty(&self) -> bool {
        !self.initialized || self.high.lt(self.low)
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Store a packet in the slot for `seq`
    ///
    /// If the slot holds a packet for another sequence number, that packet is
    /// evicted and handed back so the caller can account for the loss. A
    /// packet for the same sequence number is simply replaced.
    pub fn set(&mut self, seq: SeqNo, packet: P) -> Option<(SeqNo, P)> {
        if !self.initialized {
            self.initialized = true;
            self.low = seq;
            self.high = seq;
        } else if seq.gt(self.high) {
            self.raise_high(seq);
        }

        let idx = self.index(seq);
        let evicted = match self.slots[idx].take() {
            Some(slot) if slot.seq != seq => Some((slot.seq, slot.packet)),
            _ => None,
        };

        self.slots[idx] = Some(Slot { seq, packet });
        evicted
    }

    /// Clear the slot for `at`, returning its packet
    pub fn remove(&mut self, at: SeqNo) -> Option<P> {
        let idx = self.index(at);

        match &self.slots[idx] {
            Some(slot) if slot.seq == at => self.slots[idx].take().map(|slot| slot.packet),
            _ => None,
        }
    }

    /// Get the packet stored for `seq`
    pub fn get(&self, seq: SeqNo) -> Option<&P> {
        match &self.slots[self.index(seq)] {
            Some(slot) if slot.seq == seq => Some(&slot.packet),
            _ => None,
        }
    }

    /// Check whether the packet for `seq` is buffered
    pub fn contains(&self, seq: SeqNo) -> bool {
        self.get(seq).is_some()
    }

    /// Move the trailing edge of the window; slots are not cleared
    pub fn advance_to(&mut self, seq: SeqNo) {
        self.low = seq;
    }

    /// The window no longer fits in the buffer
    pub fn overflow(&self) -> bool {
        self.span() >= self.capacity
    }

    /// The window fills half the buffer
    pub fn is_heavy(&self) -> bool {
        self.span() >= self.capacity / 2
    }

    /// First frame-start packet after `low`
    pub fn next_start_of_frame(&self) -> Option<SeqNo> {
        self.scan_after(self.low, |packet| packet.is_frame_start())
    }

    /// First frame-start packet after `seq`
    pub fn next_start_of_frame_after(&self, seq: SeqNo) -> Option<SeqNo> {
        self.scan_after(seq, |packet| packet.is_frame_start())
    }

    /// First packet after `low` that starts a key frame
    pub fn next_keyframe(&self) -> Option<SeqNo> {
        self.scan_after(self.low, |packet| packet.is_keyframe() && packet.is_frame_start())
    }

    /// First buffered packet after `low`
    pub fn next_occupied(&self) -> Option<SeqNo> {
        self.scan_after(self.low, |_| true)
    }

    /// Scan `(from, high]` for a buffered packet matching `pred`
    fn scan_after<F>(&self, from: SeqNo, pred: F) -> Option<SeqNo>
    where
        F: Fn(&P) -> bool,
    {
        if self.is_empty() {
            return None;
        }

        let steps = from.distance_to(self.high);
        let mut current = from;
        for _ in 0..steps.max(0) {
            current = current.next();
            if self.get(current).is_some_and(|packet| pred(packet)) {
                return Some(current);
            }
        }

        None
    }

    /// `high` extended with the wrap count, never decreases
    pub fn get_extended_highest_sequence(&self) -> u32 {
        self.flip_count
            .wrapping_mul(SEQ_SPACE)
            .wrapping_add(self.high.as_raw() as u32)
    }

    /// Decide what an arriving sequence number means for the window
    ///
    /// `startup` allows an early packet that arrives before the first one seen
    /// to move `low` back instead of being rejected as stale, because the
    /// first packet received is not necessarily the first one sent.
    pub fn update(&mut self, seq: SeqNo, startup: bool) -> SeqUpdate {
        if !self.initialized {
            self.initialized = true;
            self.low = seq;
            self.high = seq;
            return SeqUpdate::Initialized;
        }

        if seq.gt(self.high) {
            if self.is_jump(seq) {
                let released = self.clear_window();
                self.raise_high(seq);
                self.low = seq;
                return SeqUpdate::Jumped { released };
            }

            let gap = if seq == self.high.next() {
                None
            } else {
                Some(SeqRange::new(self.high.next(), seq.prev()))
            };
            self.raise_high(seq);
            return SeqUpdate::Advanced { gap };
        }

        if seq.ge(self.low) && seq.le(self.high) {
            return SeqUpdate::InWindow;
        }

        if startup && seq.lt(self.low) {
            let span = seq.distance_to(self.high);
            if span > 0 && (span as usize) < self.capacity {
                let gap = if seq.next() == self.low {
                    None
                } else {
                    Some(SeqRange::new(seq.next(), self.low.prev()))
                };
                self.low = seq;
                return SeqUpdate::Extended { gap };
            }
        }

        SeqUpdate::Stale
    }

    /// `seq` is at least a full buffer past `high`, or so far past `low` that
    /// the window would span half the sequence space and its ordering would
    /// become ambiguous
    fn is_jump(&self, seq: SeqNo) -> bool {
        self.high.forward_distance_to(seq) as usize >= self.capacity
            || self.low.forward_distance_to(seq) as u32 >= HALF_SEQ_SPACE
    }

    /// Drop every buffered packet in `[low, high]`
    fn clear_window(&mut self) -> usize {
        if self.is_empty() {
            return 0;
        }

        let mut released = 0;
        for seq in SeqRange::new(self.low, self.high) {
            if self.remove(seq).is_some() {
                released += 1;
            }
        }
        released
    }

    fn raise_high(&mut self, seq: SeqNo) {
        // Newer but numerically smaller means the 16-bit counter wrapped.
        if seq.as_raw() < self.high.as_raw() {
            self.flip_count = self.flip_count.wrapping_add(1);
        }
        self.high = seq;
    }
}
