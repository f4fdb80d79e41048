//! Packet contract consumed by the queue
//!
//! The queue never parses wire data. It works on already-parsed packets
//! through the [`MediaPacket`] trait, so any depacketizer's output type can be
//! buffered as long as it exposes the few header facts the queue needs.
//! [`RtpPacket`] is a plain owned implementation for callers without their own
//! packet type.

use crate::sequence::SeqNo;
use bytes::Bytes;

/// Header facts the queue needs from a parsed media packet
pub trait MediaPacket {
    /// RTP sequence number, `None` if the packet has no usable one
    fn sequence(&self) -> Option<SeqNo>;

    /// RTP media timestamp, in units of the stream clock rate
    fn timestamp(&self) -> u32;

    /// First packet of an access unit
    fn is_frame_start(&self) -> bool;

    /// Last packet of an access unit (the RTP marker bit for video)
    ///
    /// Optional: without it a frame completes when the next frame starts.
    fn is_frame_end(&self) -> bool {
        false
    }

    /// Packet belongs to a key frame
    fn is_keyframe(&self) -> bool;
}

/// Position of a packet inside its access unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameBoundary {
    /// Middle packet of a multi-packet frame
    Middle = 0b00,
    /// Last packet of a multi-packet frame
    Last = 0b01,
    /// First packet of a multi-packet frame
    First = 0b10,
    /// Single-packet frame
    Solo = 0b11,
}

impl FrameBoundary {
    pub fn from_bits(value: u8) -> Self {
        match value & 0b11 {
            0b00 => FrameBoundary::Middle,
            0b01 => FrameBoundary::Last,
            0b10 => FrameBoundary::First,
            _ => FrameBoundary::Solo,
        }
    }

    pub fn as_bits(self) -> u8 {
        self as u8
    }

    /// Boundary from the start/end flags of a depacketizer
    pub fn from_flags(start: bool, end: bool) -> Self {
        match (start, end) {
            (true, true) => FrameBoundary::Solo,
            (true, false) => FrameBoundary::First,
            (false, true) => FrameBoundary::Last,
            (false, false) => FrameBoundary::Middle,
        }
    }

    #[inline]
    pub fn is_start(self) -> bool {
        matches!(self, FrameBoundary::First | FrameBoundary::Solo)
    }

    #[inline]
    pub fn is_end(self) -> bool {
        matches!(self, FrameBoundary::Last | FrameBoundary::Solo)
    }
}

/// Parsed RTP packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket {
    /// Sequence number
    pub sequence: SeqNo,
    /// Media timestamp
    pub timestamp: u32,
    /// Synchronisation source
    pub ssrc: u32,
    /// Position inside the frame
    pub boundary: FrameBoundary,
    /// Part of a key frame
    pub keyframe: bool,
    /// Payload after the RTP header
    pub payload: Bytes,
}

impl RtpPacket {
    /// Create a new packet
    pub fn new(
        sequence: SeqNo,
        timestamp: u32,
        ssrc: u32,
        boundary: FrameBoundary,
        keyframe: bool,
        payload: Bytes,
    ) -> Self {
        RtpPacket {
            sequence,
            timestamp,
            ssrc,
            boundary,
            keyframe,
            payload,
        }
    }

    /// Single-packet frame, the usual shape of an audio packet
    pub fn solo(sequence: SeqNo, timestamp: u32, payload: Bytes) -> Self {
        Self::new(sequence, timestamp, 0, FrameBoundary::Solo, false, payload)
    }

    /// Payload size in bytes
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

impl MediaPacket for RtpPacket {
    fn sequence(&self) -> Option<SeqNo> {
        Some(self.sequence)
    }

    fn timestamp(&self) -> u32 {
        self.timestamp
    }

    fn is_frame_start(&self) -> bool {
        self.boundary.is_start()
    }

    fn is_frame_end(&self) -> bool {
        self.boundary.is_end()
    }

    fn is_keyframe(&self) -> bool {
        self.keyframe
    }
}

impl<P: MediaPacket + ?Sized> MediaPacket for Box<P> {
    fn sequence(&self) -> Option<SeqNo> {
        (**self).sequence()
    }

    fn timestamp(&self) -> u32 {
        (**self).timestamp()
    }

    fn is_frame_start(&self) -> bool {
        (**self).is_frame_start()
    }

    fn is_frame_end(&self) -> bool {
        (**self).is_frame_end()
    }

    fn is_keyframe(&self) -> bool {
        (**self).is_keyframe()
    }
}
