//! Reception statistics for RTCP receiver reports
//!
//! Loss and jitter follow RFC 3550 (appendix A.3 and A.8), with one
//! difference: a sequence number counts as lost only once the queue gives up
//! on it, not when the gap is first seen. Reordered and retransmitted packets
//! therefore never enter the loss count, and the cumulative count never
//! decreases.

use std::time::Instant;

/// Running counters and the jitter estimator for one stream
#[derive(Debug, Clone)]
pub struct ReceptionStats {
    /// Media clock rate used to express arrival times in timestamp units
    clock_rate: u32,
    /// Arrival time of the first packet, origin of the arrival clock
    epoch: Option<Instant>,
    /// Smoothed interarrival jitter, in timestamp units
    jitter: f64,
    /// Relative transit time of the previous packet
    last_transit: Option<u32>,
    packets_received: u64,
    packets_lost: u64,
    /// Counters at the previous fraction-lost report
    prior_received: u64,
    prior_lost: u64,
    packets_recovered: u64,
    packets_duplicate: u64,
    packets_stale: u64,
    packets_discarded: u64,
    keyframe_requests: u64,
    nacks_requested: u64,
}

impl ReceptionStats {
    pub fn new(clock_rate: u32) -> Self {
        ReceptionStats {
            clock_rate: clock_rate.max(1),
            epoch: None,
            jitter: 0.0,
            last_transit: None,
            packets_received: 0,
            packets_lost: 0,
            prior_received: 0,
            prior_lost: 0,
            packets_recovered: 0,
            packets_duplicate: 0,
            packets_stale: 0,
            packets_discarded: 0,
            keyframe_requests: 0,
            nacks_requested: 0,
        }
    }

    /// Arrival time in media clock units, wrapping like RTP timestamps
    fn arrival_units(&mut self, now: Instant) -> u32 {
        let epoch = *self.epoch.get_or_insert(now);
        let micros = now.saturating_duration_since(epoch).as_micros();
        (micros * self.clock_rate as u128 / 1_000_000) as u32
    }

    /// A packet arrived for the first time
    pub fn on_received(&mut self, now: Instant, timestamp: u32) {
        self.packets_received += 1;

        let transit = self.arrival_units(now).wrapping_sub(timestamp);
        if let Some(last) = self.last_transit {
            let d = (transit.wrapping_sub(last) as i32).unsigned_abs() as f64;
            self.jitter += (d - self.jitter) / 16.0;
        }
        self.last_transit = Some(transit);
    }

    /// A packet arrived after its sequence number was reported missing
    ///
    /// Retransmissions do not feed the jitter estimate: their arrival time
    /// says nothing about the path delay of the original.
    pub fn on_recovered(&mut self) {
        self.packets_received += 1;
        self.packets_recovered += 1;
    }

    /// Missing sequence numbers that will not be waited for any longer
    pub fn on_lost(&mut self, count: u64) {
        self.packets_lost += count;
    }

    /// A buffered packet was released before delivery because the buffer
    /// overflowed; the sender's data is lost to the application.
    pub fn on_dropped(&mut self, count: u64) {
        self.packets_discarded += count;
        self.packets_lost += count;
    }

    /// Buffered packets released because their frame could not be completed
    pub fn on_discarded(&mut self, count: u64) {
        self.packets_discarded += count;
    }

    pub fn on_duplicate(&mut self) {
        self.packets_duplicate += 1;
    }

    pub fn on_stale(&mut self) {
        self.packets_stale += 1;
    }

    pub fn on_keyframe_request(&mut self) {
        self.keyframe_requests += 1;
    }

    pub fn on_nacks(&mut self, count: u64) {
        self.nacks_requested += count;
    }

    /// Fraction of packets lost since the previous call, scaled to 0-255
    ///
    /// Resets the interval.
    pub fn fraction_lost(&mut self) -> u8 {
        let lost = self.packets_lost.saturating_sub(self.prior_lost);
        let received = self.packets_received.saturating_sub(self.prior_received);
        let expected = lost + received;

        self.prior_lost = self.packets_lost;
        self.prior_received = self.packets_received;

        if expected == 0 || lost == 0 {
            return 0;
        }

        ((lost << 8) / expected).min(255) as u8
    }

    /// Total packets lost over the session
    pub fn cumulative_lost(&self) -> u32 {
        self.packets_lost.min(u32::MAX as u64) as u32
    }

    /// Interarrival jitter in timestamp units
    pub fn jitter(&self) -> u32 {
        self.jitter as u32
    }

    pub fn packets_received(&self) -> u64 {
        self.packets_received
    }

    pub fn packets_lost(&self) -> u64 {
        self.packets_lost
    }

    pub fn packets_recovered(&self) -> u64 {
        self.packets_recovered
    }

    pub fn packets_duplicate(&self) -> u64 {
        self.packets_duplicate
    }

    pub fn packets_stale(&self) -> u64 {
        self.packets_stale
    }

    pub fn packets_discarded(&self) -> u64 {
        self.packets_discarded
    }

    pub fn keyframe_requests(&self) -> u64 {
        self.keyframe_requests
    }

    pub fn nacks_requested(&self) -> u64 {
        self.nacks_requested
    }
}

/// Point-in-time view of a queue
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Packets received for the first time, retransmissions included
    pub packets_received: u64,
    /// Packets that filled a hole in the window
    pub packets_recovered: u64,
    /// Sequence numbers given up on, plus packets dropped on overflow
    pub packets_lost: u64,
    /// Packets received more than once
    pub packets_duplicate: u64,
    /// Packets that arrived behind the window
    pub packets_stale: u64,
    /// Received packets released without being delivered
    pub packets_discarded: u64,
    /// Frames handed to the application
    pub frames_collected: u64,
    /// Key-frame requests raised
    pub keyframe_requests: u64,
    /// Sequence numbers emitted for retransmission requests
    pub nacks_requested: u64,
    /// Interarrival jitter (timestamp units)
    pub jitter: u32,
    /// Highest sequence number extended with the wrap count
    pub extended_highest_sequence: u32,
    /// Sequence numbers currently being nacked
    pub nack_list_len: usize,
    /// Width of the buffered window
    pub buffer_span: usize,
}
