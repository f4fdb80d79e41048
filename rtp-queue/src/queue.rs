//! Receive queue for one RTP stream
//!
//! [`RtpQueue`] ties the pieces together. Each arriving packet updates the
//! ring buffer window, gaps it reveals are registered with the NACK list,
//! reception statistics are updated, and complete frames are moved out of the
//! buffer for the application to drain.
//!
//! Under pressure the queue gives up on data rather than growing: a window
//! that no longer fits the buffer is resynchronised to the next frame start,
//! and a NACK list that overflows skips ahead to a buffered key frame. Both
//! raise the key-frame request flag, which the owner turns into a PLI/FIR.

use crate::frame::Frame;
use crate::nack::{NackGenerator, NackMaintenance, NackPolicy};
use crate::packet::MediaPacket;
use crate::ring_buffer::{RingBuffer, SeqUpdate, MAX_CAPACITY};
use crate::sequence::{SeqNo, SeqRange};
use crate::stats::{QueueStats, ReceptionStats};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Queue errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Packet has no sequence number")]
    MissingSequence,

    #[error("Invalid capacity {0}, must be between 1 and {max}", max = MAX_CAPACITY)]
    InvalidCapacity(usize),
}

/// What happened to an inserted packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Stored for the first time
    Stored,
    /// Stored, and it filled a hole that was being nacked
    Recovered,
    /// Already buffered, dropped
    Duplicate,
    /// Behind the window, dropped
    Stale,
}

/// Queue configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueOptions {
    /// Ring buffer slots
    pub capacity: usize,
    /// Deliver every packet as its own frame (audio)
    pub one_packet_per_frame: bool,
    /// Retransmission request policy
    pub nack: NackPolicy,
    /// Media clock rate, for jitter in timestamp units
    pub clock_rate: u32,
    /// NACK list limit, two thirds of the capacity when unset
    pub max_nack_queue_size: Option<usize>,
}

impl Default for QueueOptions {
    fn default() -> Self {
        QueueOptions {
            capacity: 1024,
            one_packet_per_frame: false,
            nack: NackPolicy::default(),
            clock_rate: 90_000,
            max_nack_queue_size: None,
        }
    }
}

impl QueueOptions {
    /// Options for a single-packet-per-frame audio stream
    pub fn audio(clock_rate: u32) -> Self {
        QueueOptions {
            capacity: 100,
            one_packet_per_frame: true,
            clock_rate,
            ..Default::default()
        }
    }
}

/// Receiver-side packet ordering and loss recovery for one stream
pub struct RtpQueue<P> {
    ring: RingBuffer<P>,
    nack: NackGenerator,
    one_packet_per_frame: bool,
    /// Completed frames waiting to be drained
    frames: Vec<Frame<P>>,
    frames_collected: u64,
    /// Sticky key-frame request, cleared when read
    request_key_frame: bool,
    /// Buffer was heavy after the previous insert
    heavy: bool,
    /// Nothing delivered or dropped yet; early reordered packets may still
    /// extend the window backwards
    startup: bool,
    stats: ReceptionStats,
}

impl<P: MediaPacket> RtpQueue<P> {
    pub fn new(options: QueueOptions) -> Result<Self, QueueError> {
        if options.capacity == 0 || options.capacity > MAX_CAPACITY {
            return Err(QueueError::InvalidCapacity(options.capacity));
        }

        let ring = RingBuffer::new(options.capacity);
        let max_nack_queue_size = options
            .max_nack_queue_size
            .unwrap_or(ring.capacity() * 2 / 3);

        Ok(RtpQueue {
            nack: NackGenerator::new(options.nack, max_nack_queue_size),
            ring,
            one_packet_per_frame: options.one_packet_per_frame,
            frames: Vec::new(),
            frames_collected: 0,
            request_key_frame: false,
            heavy: false,
            startup: true,
            stats: ReceptionStats::new(options.clock_rate),
        })
    }

    /// Feed one arriving packet
    ///
    /// Only a packet without a sequence number is an error. Loss, reordering,
    /// duplication and overflow are reported through the outcome, the
    /// statistics and the key-frame flag.
    pub fn insert(&mut self, packet: P, now: Instant) -> Result<InsertOutcome, QueueError> {
        let seq = packet.sequence().ok_or(QueueError::MissingSequence)?;

        let update = self.ring.update(seq, self.startup);
        if update.is_stale() {
            tracing::trace!(%seq, low = %self.ring.low(), "stale packet dropped");
            self.stats.on_stale();
            return Ok(InsertOutcome::Stale);
        }

        if let SeqUpdate::Jumped { released } = update {
            self.restart_window(seq, released);
        }

        if self.ring.contains(seq) {
            tracing::trace!(%seq, "duplicate packet dropped");
            self.stats.on_duplicate();
            return Ok(InsertOutcome::Duplicate);
        }

        let outcome = if self.nack.remove(seq).is_some() {
            tracing::trace!(%seq, "recovered packet");
            self.stats.on_recovered();
            InsertOutcome::Recovered
        } else {
            self.stats.on_received(now, packet.timestamp());
            InsertOutcome::Stored
        };

        if let Some((displaced, _)) = self.ring.set(seq, packet) {
            // Only happens while overflowing; the resync below moves past it.
            tracing::debug!(%displaced, %seq, "buffered packet overwritten");
            self.stats.on_dropped(1);
        }

        // After storing, so resyncs triggered by the gap can see this packet.
        if let Some(gap) = update.gap() {
            self.register_gap(gap, now);
        }

        self.resync_on_overflow();

        let heavy = self.ring.is_heavy();
        if heavy && !self.heavy {
            tracing::debug!(span = self.ring.span(), capacity = self.ring.capacity(), "buffer heavy");
            self.request_keyframe();
        }
        self.heavy = heavy;

        self.collect_packet();

        Ok(outcome)
    }

    /// The stream jumped past everything buffered
    ///
    /// The ring buffer has already dropped the old window; every hole still
    /// being nacked is given up with it.
    fn restart_window(&mut self, seq: SeqNo, released: usize) {
        let holes = self.nack.len();
        tracing::warn!(%seq, released, holes, "sequence jump, window restarted");

        self.nack.clear();
        self.stats.on_lost(holes as u64);
        self.stats.on_dropped(released as u64);
        self.heavy = false;
        self.startup = false;
        self.request_keyframe();
    }

    /// Track every sequence number of a newly detected gap
    fn register_gap(&mut self, gap: SeqRange, now: Instant) {
        tracing::debug!(start = %gap.start, end = %gap.end, missing = gap.len(), "gap detected");

        // Only the newest part of a gap wider than the list can be tracked.
        let untracked = gap.len().saturating_sub(self.nack.max_queue_size());
        let mut given_up = untracked as u64;
        let mut newest_unrecoverable = None;

        for seq in gap.iter().skip(untracked) {
            if let Some(evicted) = self.nack.insert(seq, now) {
                given_up += 1;
                newest_unrecoverable = Some(evicted);
            }
        }

        if untracked > 0 {
            newest_unrecoverable = Some(gap.start + (untracked - 1) as u16);
        }
        self.stats.on_lost(given_up);

        if let Some(seq) = newest_unrecoverable {
            self.notify_nack_list_full();
            self.notify_drop_seq(seq);
        }
    }

    /// Shrink the window until it fits the buffer again
    fn resync_on_overflow(&mut self) {
        while self.ring.overflow() {
            let next = if self.one_packet_per_frame {
                self.ring.next_occupied()
            } else {
                self.ring.next_start_of_frame()
            };

            match next {
                Some(next) => {
                    tracing::debug!(low = %self.ring.low(), %next, "overflow, resync to next frame");
                    self.discard_until(next, true);
                }
                None => {
                    let forced = self.ring.high() - (self.ring.capacity() - 1) as u16;
                    tracing::warn!(low = %self.ring.low(), %forced, "overflow without a frame start");
                    self.request_keyframe();
                    self.discard_until(forced, true);
                    break;
                }
            }
        }
    }

    /// Move every complete frame at the head of the window into the output
    ///
    /// Returns the number of frames collected.
    pub fn collect_packet(&mut self) -> usize {
        let mut collected = 0;

        while let Some(end) = self.next_frame_end() {
            self.take_frame(end);
            collected += 1;
        }

        collected
    }

    /// Last sequence number of the complete frame starting at `low`
    fn next_frame_end(&mut self) -> Option<SeqNo> {
        loop {
            if self.ring.is_empty() {
                return None;
            }

            let low = self.ring.low();
            let head_starts_frame = self.ring.get(low)?.is_frame_start();

            if self.one_packet_per_frame {
                return Some(low);
            }
            if head_starts_frame {
                break;
            }

            // Tail of a frame whose start is gone.
            let next = self.ring.next_start_of_frame()?;
            self.discard_until(next, false);
        }

        let low = self.ring.low();
        let high = self.ring.high();
        let mut seq = low;

        loop {
            let packet = self.ring.get(seq)?;

            if seq != low && packet.is_frame_start() {
                return Some(seq.prev());
            }
            if packet.is_frame_end() {
                return Some(seq);
            }
            if seq == high {
                return None;
            }

            seq = seq.next();
        }
    }

    fn take_frame(&mut self, end: SeqNo) {
        let start = self.ring.low();
        let range = SeqRange::new(start, end);

        let packets: Vec<P> = range.iter().filter_map(|seq| self.ring.remove(seq)).collect();

        tracing::trace!(first = %start, last = %end, packets = packets.len(), "frame collected");

        self.ring.advance_to(end.next());
        self.frames_collected += 1;
        self.startup = false;
        self.frames.push(Frame::new(start, end, packets));
    }

    /// Release everything in `[low, next)` and move `low` to `next`
    fn discard_until(&mut self, next: SeqNo, count_as_lost: bool) -> usize {
        let low = self.ring.low();
        if !next.gt(low) {
            return 0;
        }

        let mut released = 0;
        let mut holes = 0;
        for seq in SeqRange::new(low, next.prev()) {
            if self.nack.remove(seq).is_some() {
                holes += 1;
            }
            if self.ring.remove(seq).is_some() {
                released += 1;
            }
        }
        self.stats.on_lost(holes);

        self.ring.advance_to(next);
        self.startup = false;

        if count_as_lost {
            self.stats.on_dropped(released as u64);
        } else {
            self.stats.on_discarded(released as u64);
        }

        tracing::debug!(from = %low, to = %next, released, holes, "discarded");
        released
    }

    /// `seq` will never be delivered
    ///
    /// A buffered packet for `seq` is released and counted lost, as is a hole
    /// still being nacked. The frame containing `seq` cannot complete, so the
    /// window skips to the next frame start after it, requesting a key frame
    /// when there is none.
    pub fn notify_drop_seq(&mut self, seq: SeqNo) {
        if self.ring.remove(seq).is_some() {
            self.stats.on_dropped(1);
        }
        if self.nack.remove(seq).is_some() {
            self.stats.on_lost(1);
        }
        self.skip_past(seq);
    }

    fn skip_past(&mut self, seq: SeqNo) {
        if self.ring.is_empty() || seq.lt(self.ring.low()) || seq.gt(self.ring.high()) {
            return;
        }

        let next = if self.one_packet_per_frame {
            seq.next()
        } else {
            match self.ring.next_start_of_frame_after(seq) {
                Some(next) => next,
                None => {
                    tracing::warn!(%seq, "no frame start after dropped packet");
                    self.request_keyframe();
                    seq.next()
                }
            }
        };

        self.discard_until(next, false);
        self.collect_packet();
    }

    /// The NACK list gave up on a sequence number to stay within its limit
    ///
    /// Requests a key frame; if one is already buffered, everything before it
    /// is skipped.
    pub fn notify_nack_list_full(&mut self) {
        self.request_keyframe();

        if let Some(keyframe) = self.ring.next_keyframe() {
            tracing::debug!(low = %self.ring.low(), %keyframe, "nack list full, skip to key frame");
            self.discard_until(keyframe, false);
            self.collect_packet();
        }
    }

    /// Run NACK list maintenance
    ///
    /// Expired and evicted sequence numbers are dropped from the window.
    pub fn check_queue_size(&mut self, now: Instant) -> NackMaintenance {
        let maintenance = self.nack.check_queue_size(now);
        self.stats
            .on_lost((maintenance.expired.len() + maintenance.evicted.len()) as u64);

        for &seq in &maintenance.expired {
            self.notify_drop_seq(seq);
        }

        if let Some(&newest) = maintenance.evicted.last() {
            self.notify_nack_list_full();
            self.notify_drop_seq(newest);
        }

        maintenance
    }

    /// Sequence numbers to request now
    pub fn get_nack_seqs(&mut self, now: Instant) -> Vec<SeqNo> {
        let seqs = self.nack.get_nack_seqs(now);
        self.stats.on_nacks(seqs.len() as u64);
        seqs
    }

    pub fn update_rtt(&mut self, rtt: Duration) {
        self.nack.update_rtt(rtt);
    }

    pub fn request_keyframe(&mut self) {
        if !self.request_key_frame {
            self.request_key_frame = true;
            self.stats.on_keyframe_request();
        }
    }

    /// Read and clear the key-frame request flag
    pub fn get_and_clean_if_needed_request_key_frame(&mut self) -> bool {
        std::mem::take(&mut self.request_key_frame)
    }

    /// Take every completed frame, oldest first
    pub fn get_and_clean_collected_frames(&mut self) -> Vec<Frame<P>> {
        std::mem::take(&mut self.frames)
    }

    /// Loss fraction since the previous call, scaled to 0-255
    pub fn get_fraction_lost(&mut self) -> u8 {
        self.stats.fraction_lost()
    }

    pub fn get_cumulative_number_of_packets_lost(&self) -> u32 {
        self.stats.cumulative_lost()
    }

    pub fn get_interarrival_jitter(&self) -> u32 {
        self.stats.jitter()
    }

    pub fn get_extended_highest_sequence(&self) -> u32 {
        self.ring.get_extended_highest_sequence()
    }

    pub fn ring(&self) -> &RingBuffer<P> {
        &self.ring
    }

    pub fn nack(&self) -> &NackGenerator {
        &self.nack
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            packets_received: self.stats.packets_received(),
            packets_recovered: self.stats.packets_recovered(),
            packets_lost: self.stats.packets_lost(),
            packets_duplicate: self.stats.packets_duplicate(),
            packets_stale: self.stats.packets_stale(),
            packets_discarded: self.stats.packets_discarded(),
            frames_collected: self.frames_collected,
            keyframe_requests: self.stats.keyframe_requests(),
            nacks_requested: self.stats.nacks_requested(),
            jitter: self.stats.jitter(),
            extended_highest_sequence: self.ring.get_extended_highest_sequence(),
            nack_list_len: self.nack.len(),
            buffer_span: self.ring.span(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{FrameBoundary, RtpPacket};
    use bytes::Bytes;

    fn packet(seq: u16, boundary: FrameBoundary, keyframe: bool) -> RtpPacket {
        RtpPacket::new(
            SeqNo::new(seq),
            seq as u32 * 100,
            0,
            boundary,
            keyframe,
            Bytes::new(),
        )
    }

    fn first(seq: u16) -> RtpPacket {
        packet(seq, FrameBoundary::First, false)
    }

    fn middle(seq: u16) -> RtpPacket {
        packet(seq, FrameBoundary::Middle, false)
    }

    fn last(seq: u16) -> RtpPacket {
        packet(seq, FrameBoundary::Last, false)
    }

    fn solo(seq: u16) -> RtpPacket {
        packet(seq, FrameBoundary::Solo, false)
    }

    fn queue(capacity: usize, one_packet_per_frame: bool) -> RtpQueue<RtpPacket> {
        RtpQueue::new(QueueOptions {
            capacity,
            one_packet_per_frame,
            ..Default::default()
        })
        .unwrap()
    }

    fn frame_bounds(frames: &[Frame<RtpPacket>]) -> Vec<(u16, u16)> {
        frames
            .iter()
            .map(|frame| (frame.first_seq().as_raw(), frame.last_seq().as_raw()))
            .collect()
    }

    struct Unsequenced;

    impl MediaPacket for Unsequenced {
        fn sequence(&self) -> Option<SeqNo> {
            None
        }

        fn timestamp(&self) -> u32 {
            0
        }

        fn is_frame_start(&self) -> bool {
            true
        }

        fn is_keyframe(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_new_validates_capacity() {
        for capacity in [0, MAX_CAPACITY + 1] {
            let result = RtpQueue::<RtpPacket>::new(QueueOptions {
                capacity,
                ..Default::default()
            });
            assert_eq!(result.err(), Some(QueueError::InvalidCapacity(capacity)));
        }

        let queue = queue(1000, false);
        assert_eq!(queue.ring().capacity(), 1000);
        assert_eq!(queue.nack().max_queue_size(), 666);

        let audio = RtpQueue::<RtpPacket>::new(QueueOptions::audio(48_000)).unwrap();
        assert_eq!(audio.ring().capacity(), 100);
    }

    #[test]
    fn test_missing_sequence_is_rejected() {
        let mut queue = RtpQueue::<Unsequenced>::new(QueueOptions::default()).unwrap();
        assert_eq!(
            queue.insert(Unsequenced, Instant::now()),
            Err(QueueError::MissingSequence)
        );
        assert!(!queue.ring().is_initialized());
    }

    #[test]
    fn test_gap_is_nacked_until_filled() {
        let now = Instant::now();
        let mut queue = queue(8, false);

        queue.insert(first(1), now).unwrap();
        queue.insert(middle(2), now).unwrap();
        for seq in 4..=7 {
            queue.insert(middle(seq), now).unwrap();
        }
        queue.insert(last(8), now).unwrap();

        assert_eq!(queue.nack().len(), 1);
        assert!(queue.nack().contains(SeqNo::new(3)));
        assert!(queue.get_and_clean_collected_frames().is_empty());
        // Still waiting for 3, nothing given up yet.
        assert_eq!(queue.get_cumulative_number_of_packets_lost(), 0);
        assert_eq!(queue.get_fraction_lost(), 0);

        assert_eq!(queue.insert(middle(3), now), Ok(InsertOutcome::Recovered));

        let frames = queue.get_and_clean_collected_frames();
        assert_eq!(frame_bounds(&frames), vec![(1, 8)]);
        assert_eq!(frames[0].len(), 8);
        assert!(queue.nack().is_empty());
        assert!(queue.ring().is_empty());

        assert_eq!(queue.get_cumulative_number_of_packets_lost(), 0);
        assert_eq!(queue.stats().packets_received, 8);
        assert_eq!(queue.stats().packets_recovered, 1);
    }

    #[test]
    fn test_duplicate_is_dropped() {
        let now = Instant::now();
        let mut queue = queue(16, false);

        assert_eq!(queue.insert(first(1), now), Ok(InsertOutcome::Stored));
        assert_eq!(queue.insert(first(1), now), Ok(InsertOutcome::Duplicate));

        let stats = queue.stats();
        assert_eq!(stats.packets_duplicate, 1);
        assert_eq!(stats.packets_received, 1);
        assert_eq!(stats.packets_lost, 0);
        assert!(queue.nack().is_empty());
    }

    #[test]
    fn test_delivered_packet_is_stale() {
        let now = Instant::now();
        let mut queue = queue(16, false);

        queue.insert(solo(10), now).unwrap();
        assert_eq!(queue.get_and_clean_collected_frames().len(), 1);

        assert_eq!(queue.insert(solo(10), now), Ok(InsertOutcome::Stale));
        assert_eq!(queue.insert(solo(9), now), Ok(InsertOutcome::Stale));
        assert_eq!(queue.stats().packets_stale, 2);
    }

    #[test]
    fn test_per_packet_mode() {
        let now = Instant::now();
        let mut queue = queue(16, true);

        for seq in 1..=3 {
            queue.insert(middle(seq), now).unwrap();
        }
        assert_eq!(
            frame_bounds(&queue.get_and_clean_collected_frames()),
            vec![(1, 1), (2, 2), (3, 3)]
        );

        queue.insert(middle(5), now).unwrap();
        assert!(queue.get_and_clean_collected_frames().is_empty());

        queue.insert(middle(4), now).unwrap();
        assert_eq!(
            frame_bounds(&queue.get_and_clean_collected_frames()),
            vec![(4, 4), (5, 5)]
        );
    }

    #[test]
    fn test_frames_split_on_boundaries() {
        let now = Instant::now();
        let mut queue = queue(16, false);

        queue.insert(first(10), now).unwrap();
        queue.insert(middle(11), now).unwrap();
        assert_eq!(queue.stats().frames_collected, 0);

        // The next frame start completes the previous frame.
        queue.insert(first(12), now).unwrap();
        queue.insert(solo(13), now).unwrap();

        let frames = queue.get_and_clean_collected_frames();
        assert_eq!(frame_bounds(&frames), vec![(10, 11), (12, 12), (13, 13)]);
        assert_eq!(frames[0].timestamp(), Some(1000));
        assert!(queue.get_and_clean_collected_frames().is_empty());
    }

    #[test]
    fn test_startup_reordering_extends_window() {
        let now = Instant::now();
        let mut queue = queue(16, false);

        queue.insert(middle(12), now).unwrap();
        assert_eq!(queue.insert(first(10), now), Ok(InsertOutcome::Stored));
        assert!(queue.nack().contains(SeqNo::new(11)));

        assert_eq!(queue.insert(middle(11), now), Ok(InsertOutcome::Recovered));
        queue.insert(last(13), now).unwrap();

        assert_eq!(
            frame_bounds(&queue.get_and_clean_collected_frames()),
            vec![(10, 13)]
        );
    }

    #[test]
    fn test_overflow_resyncs_to_frame_start() {
        let now = Instant::now();
        let mut queue = queue(8, false);

        queue.insert(first(1), now).unwrap();
        queue.insert(middle(2), now).unwrap();
        queue.insert(first(4), now).unwrap();
        for seq in 5..=8 {
            queue.insert(middle(seq), now).unwrap();
        }
        assert!(queue.nack().contains(SeqNo::new(3)));

        // Window 1..=9 no longer fits eight slots.
        queue.insert(first(9), now).unwrap();

        assert_eq!(queue.ring().low(), SeqNo::new(9));
        assert!(queue.nack().is_empty());
        assert_eq!(
            frame_bounds(&queue.get_and_clean_collected_frames()),
            vec![(4, 8)]
        );

        let stats = queue.stats();
        assert_eq!(stats.packets_lost, 3);
        assert_eq!(stats.packets_discarded, 2);
    }

    #[test]
    fn test_overflow_without_frame_start_requests_keyframe() {
        let now = Instant::now();
        let mut queue = queue(8, false);

        queue.insert(first(1), now).unwrap();
        for seq in 2..=8 {
            queue.insert(middle(seq), now).unwrap();
        }
        assert!(queue.get_and_clean_if_needed_request_key_frame());

        queue.insert(middle(9), now).unwrap();

        assert!(queue.get_and_clean_if_needed_request_key_frame());
        assert!(!queue.ring().overflow());
        assert_eq!(queue.ring().low(), SeqNo::new(2));
    }

    #[test]
    fn test_heavy_requests_keyframe_once() {
        let now = Instant::now();
        let mut queue = queue(8, false);

        queue.insert(first(1), now).unwrap();
        for seq in 2..=4 {
            queue.insert(middle(seq), now).unwrap();
        }
        assert!(!queue.get_and_clean_if_needed_request_key_frame());

        queue.insert(middle(5), now).unwrap();
        assert!(queue.get_and_clean_if_needed_request_key_frame());
        assert!(!queue.get_and_clean_if_needed_request_key_frame());

        queue.insert(middle(6), now).unwrap();
        assert!(!queue.get_and_clean_if_needed_request_key_frame());
        assert_eq!(queue.stats().keyframe_requests, 1);
    }

    #[test]
    fn test_wide_gap_beyond_nack_limit() {
        let now = Instant::now();
        let mut queue = RtpQueue::new(QueueOptions {
            capacity: 32,
            max_nack_queue_size: Some(2),
            ..Default::default()
        })
        .unwrap();

        queue.insert(first(1), now).unwrap();
        queue.insert(middle(5), now).unwrap();

        let tracked: Vec<u16> = queue.nack().iter().map(|entry| entry.seq().as_raw()).collect();
        assert_eq!(tracked, vec![3, 4]);
        assert!(queue.get_and_clean_if_needed_request_key_frame());
        assert_eq!(queue.ring().low(), SeqNo::new(3));
        assert_eq!(queue.stats().packets_lost, 1);
        assert_eq!(queue.stats().packets_discarded, 1);
    }

    #[test]
    fn test_nack_list_full_skips_to_keyframe() {
        let now = Instant::now();
        let mut queue = RtpQueue::new(QueueOptions {
            capacity: 32,
            max_nack_queue_size: Some(2),
            ..Default::default()
        })
        .unwrap();

        queue.insert(first(1), now).unwrap();
        queue.insert(packet(3, FrameBoundary::First, true), now).unwrap();
        queue.insert(middle(4), now).unwrap();
        queue.insert(first(6), now).unwrap();
        assert!(!queue.get_and_clean_if_needed_request_key_frame());

        // Tracking 7 and 8 evicts 2 and 5.
        queue.insert(last(9), now).unwrap();

        assert!(queue.get_and_clean_if_needed_request_key_frame());
        let tracked: Vec<u16> = queue.nack().iter().map(|entry| entry.seq().as_raw()).collect();
        assert_eq!(tracked, vec![7, 8]);
        assert_eq!(queue.ring().low(), SeqNo::new(6));
        assert_eq!(queue.stats().packets_lost, 2);
        assert_eq!(queue.stats().packets_discarded, 3);
        assert!(queue.get_and_clean_collected_frames().is_empty());
    }

    #[test]
    fn test_expired_nack_drops_frame() {
        let start = Instant::now();
        let mut queue = RtpQueue::new(QueueOptions {
            capacity: 16,
            nack: NackPolicy {
                max_alive_time: Duration::from_millis(100),
                ..Default::default()
            },
            ..Default::default()
        })
        .unwrap();

        queue.insert(first(1), start).unwrap();
        queue.insert(last(2), start).unwrap();
        queue.insert(first(3), start).unwrap();
        queue.insert(last(5), start).unwrap();
        queue.insert(solo(6), start).unwrap();
        assert_eq!(
            frame_bounds(&queue.get_and_clean_collected_frames()),
            vec![(1, 2)]
        );

        assert!(queue.check_queue_size(start + Duration::from_millis(50)).is_empty());

        let maintenance = queue.check_queue_size(start + Duration::from_millis(200));
        assert_eq!(maintenance.expired, vec![SeqNo::new(4)]);
        assert_eq!(
            frame_bounds(&queue.get_and_clean_collected_frames()),
            vec![(6, 6)]
        );
        assert!(queue.nack().is_empty());
        assert_eq!(queue.stats().packets_discarded, 2);
        assert_eq!(queue.get_cumulative_number_of_packets_lost(), 1);
        assert_eq!(queue.get_fraction_lost(), (256u32 / 6) as u8);
    }

    #[test]
    fn test_notify_drop_seq_in_per_packet_mode() {
        let now = Instant::now();
        let mut queue = queue(16, true);

        queue.insert(solo(1), now).unwrap();
        queue.insert(solo(3), now).unwrap();
        assert_eq!(queue.get_and_clean_collected_frames().len(), 1);

        queue.notify_drop_seq(SeqNo::new(2));

        assert_eq!(
            frame_bounds(&queue.get_and_clean_collected_frames()),
            vec![(3, 3)]
        );
        assert!(queue.nack().is_empty());
    }

    #[test]
    fn test_nack_seqs_and_rtt() {
        let start = Instant::now();
        let mut queue = queue(16, false);

        queue.insert(first(1), start).unwrap();
        queue.insert(middle(4), start).unwrap();

        assert!(queue.get_nack_seqs(start).is_empty());
        assert_eq!(
            queue.get_nack_seqs(start + Duration::from_millis(10)),
            vec![SeqNo::new(2), SeqNo::new(3)]
        );
        assert_eq!(queue.stats().nacks_requested, 2);

        queue.update_rtt(Duration::from_millis(300));
        assert_eq!(queue.nack().request_interval(), Duration::from_millis(450));
    }

    #[test]
    fn test_sequence_jump_restarts_window() {
        let now = Instant::now();
        let mut queue = queue(8, false);

        queue.insert(first(0), now).unwrap();
        for seq in 1..=5 {
            queue.insert(middle(seq), now).unwrap();
        }
        queue.insert(middle(7), now).unwrap();
        assert!(queue.nack().contains(SeqNo::new(6)));
        assert!(queue.get_and_clean_if_needed_request_key_frame());

        // 32765 past high, 32772 past low.
        assert_eq!(queue.insert(solo(32772), now), Ok(InsertOutcome::Stored));
        assert_eq!(queue.ring().low(), SeqNo::new(32773));
        assert!(queue.nack().is_empty());
        assert!(queue.get_and_clean_if_needed_request_key_frame());

        for seq in 32773..=32972 {
            queue.insert(solo(seq), now).unwrap();
        }

        let frames = queue.get_and_clean_collected_frames();
        assert_eq!(frames.len(), 201);
        assert_eq!(frames[0].first_seq(), SeqNo::new(32772));
        assert_eq!(frames[200].last_seq(), SeqNo::new(32972));
        assert!(queue.ring().is_empty());

        // Seven buffered packets and the hole at 6.
        let stats = queue.stats();
        assert_eq!(stats.packets_lost, 8);
        assert_eq!(stats.packets_received, 208);
    }

    #[test]
    fn test_extended_sequence_across_wrap() {
        let now = Instant::now();
        let mut queue = queue(16, true);

        for seq in [65534, 65535, 0, 1] {
            queue.insert(solo(seq), now).unwrap();
        }

        assert_eq!(queue.get_extended_highest_sequence(), 65536 + 1);
        assert_eq!(queue.get_and_clean_collected_frames().len(), 4);
    }
}
