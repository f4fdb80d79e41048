//! Synthetic sender and lossy network link
//!
//! [`VideoSource`] produces an RTP video stream: fixed-size frames, a key
//! frame every `keyframe_interval` frames or on demand. [`Link`] carries the
//! packets to the receiver with a seeded random model of loss, reordering,
//! duplication and delay, and answers NACKs from its send history one round
//! trip later.

use crate::config::LinkConfig;
use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rtp_queue::{FrameBoundary, RtpPacket, SeqNo};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::time::Duration;

/// Spacing between packets of one frame
const PACKET_SPACING: Duration = Duration::from_micros(200);

/// Packets kept for retransmission (power of two)
const HISTORY_SIZE: usize = 4096;

/// Synthetic SSRC of the simulated stream
const SSRC: u32 = 0x5eed_0001;

/// Video stream generator
pub struct VideoSource {
    next_seq: SeqNo,
    frame_index: u32,
    packets_left: u64,
    packets_per_frame: u16,
    keyframe_interval: u32,
    clock_rate: u32,
    frame_rate: u32,
    payload: Bytes,
    force_keyframe: bool,
}

impl VideoSource {
    pub fn new(config: &LinkConfig, clock_rate: u32) -> Self {
        VideoSource {
            next_seq: SeqNo::new(config.first_seq),
            frame_index: 0,
            packets_left: config.packets,
            packets_per_frame: config.packets_per_frame.max(1),
            keyframe_interval: config.keyframe_interval.max(1),
            clock_rate,
            frame_rate: config.frame_rate.max(1),
            payload: Bytes::from(vec![0u8; config.payload_size]),
            force_keyframe: false,
        }
    }

    /// Every packet has been produced
    pub fn is_done(&self) -> bool {
        self.packets_left == 0
    }

    /// Make the next frame a key frame
    pub fn request_keyframe(&mut self) {
        self.force_keyframe = true;
    }

    /// Packets of the next frame with their send offsets within the frame
    pub fn next_frame(&mut self) -> Vec<(Duration, RtpPacket)> {
        let count = (self.packets_per_frame as u64).min(self.packets_left) as u16;
        if count == 0 {
            return Vec::new();
        }

        let keyframe = self.force_keyframe || self.frame_index % self.keyframe_interval == 0;
        let timestamp = (self.frame_index as u64 * self.clock_rate as u64 / self.frame_rate as u64) as u32;

        let packets = (0..count)
            .map(|i| {
                let boundary = FrameBoundary::from_flags(i == 0, i + 1 == count);
                let packet = RtpPacket::new(
                    self.next_seq,
                    timestamp,
                    SSRC,
                    boundary,
                    keyframe,
                    self.payload.clone(),
                );
                self.next_seq.increment();
                (PACKET_SPACING * i as u32, packet)
            })
            .collect();

        if keyframe {
            tracing::trace!(frame = self.frame_index, "sending key frame");
        }

        self.force_keyframe = false;
        self.frame_index += 1;
        self.packets_left -= count as u64;
        packets
    }
}

/// Link counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Original packets sent
    pub packets_sent: u64,
    /// Packets (original or retransmitted) lost on the link
    pub packets_dropped: u64,
    /// Packets held back behind later ones
    pub packets_reordered: u64,
    /// Extra copies delivered
    pub packets_duplicated: u64,
    /// Retransmissions sent in answer to NACKs
    pub packets_retransmitted: u64,
    /// NACKed sequence numbers no longer in the send history
    pub nacks_unanswered: u64,
}

/// Packet in flight
struct Arrival {
    at: Duration,
    order: u64,
    packet: RtpPacket,
}

impl PartialEq for Arrival {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.order == other.order
    }
}

impl Eq for Arrival {}

impl PartialOrd for Arrival {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Arrival {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.at, self.order).cmp(&(other.at, other.order))
    }
}

#[inline]
fn history_index(seq: SeqNo) -> usize {
    seq.as_raw() as usize & (HISTORY_SIZE - 1)
}

/// Lossy one-way link with a retransmission path
pub struct Link {
    rng: StdRng,
    loss: f64,
    reorder: f64,
    duplicate: f64,
    delay: Duration,
    jitter_ms: u64,
    in_flight: BinaryHeap<Reverse<Arrival>>,
    next_order: u64,
    /// Sent packets indexed by `seq mod HISTORY_SIZE`
    history: Vec<Option<RtpPacket>>,
    stats: LinkStats,
}

impl Link {
    pub fn new(config: &LinkConfig) -> Self {
        Link {
            rng: StdRng::seed_from_u64(config.seed),
            loss: config.loss,
            reorder: config.reorder,
            duplicate: config.duplicate,
            delay: config.delay(),
            jitter_ms: config.jitter_ms,
            in_flight: BinaryHeap::new(),
            next_order: 0,
            history: (0..HISTORY_SIZE).map(|_| None).collect(),
            stats: LinkStats::default(),
        }
    }

    /// Send an original packet at simulated time `at`
    pub fn send(&mut self, packet: RtpPacket, at: Duration) {
        self.stats.packets_sent += 1;

        let idx = history_index(packet.sequence);
        self.history[idx] = Some(packet.clone());

        if self.rng.gen_bool(self.duplicate) {
            self.stats.packets_duplicated += 1;
            let delay = self.path_delay() + Duration::from_millis(1);
            self.schedule(packet.clone(), at + delay);
        }

        self.transmit(packet, at);
    }

    /// Answer a NACK: resend from history, arriving one round trip later
    pub fn retransmit(&mut self, seqs: &[SeqNo], at: Duration) {
        for &seq in seqs {
            let cached = self.history[history_index(seq)]
                .as_ref()
                .filter(|packet| packet.sequence == seq)
                .cloned();

            match cached {
                Some(packet) => {
                    self.stats.packets_retransmitted += 1;
                    // The request itself takes one trip to reach the sender.
                    self.transmit(packet, at + self.delay);
                }
                None => self.stats.nacks_unanswered += 1,
            }
        }
    }

    fn transmit(&mut self, packet: RtpPacket, at: Duration) {
        if self.rng.gen_bool(self.loss) {
            tracing::trace!(seq = %packet.sequence, "link dropped packet");
            self.stats.packets_dropped += 1;
            return;
        }

        let mut delay = self.path_delay();
        if self.rng.gen_bool(self.reorder) {
            self.stats.packets_reordered += 1;
            delay += Duration::from_millis(self.rng.gen_range(5..=30));
        }

        self.schedule(packet, at + delay);
    }

    fn path_delay(&mut self) -> Duration {
        let jitter = if self.jitter_ms > 0 {
            self.rng.gen_range(0..=self.jitter_ms * 1000)
        } else {
            0
        };
        self.delay + Duration::from_micros(jitter)
    }

    fn schedule(&mut self, packet: RtpPacket, at: Duration) {
        let order = self.next_order;
        self.next_order += 1;
        self.in_flight.push(Reverse(Arrival { at, order, packet }));
    }

    /// Next packet arriving no later than `now`
    pub fn poll(&mut self, now: Duration) -> Option<RtpPacket> {
        match self.in_flight.peek() {
            Some(Reverse(arrival)) if arrival.at <= now => {
                self.in_flight.pop().map(|Reverse(arrival)| arrival.packet)
            }
            _ => None,
        }
    }

    /// Packets still travelling
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }
}
