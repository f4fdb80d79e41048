//! Shared stream builders for the workspace integration tests

use bytes::Bytes;
use rtp_queue::{FrameBoundary, RtpPacket, SeqNo};

/// Packet with a payload that records its own sequence number
pub fn packet(seq: SeqNo, timestamp: u32, boundary: FrameBoundary, keyframe: bool) -> RtpPacket {
    let payload = Bytes::copy_from_slice(&seq.as_raw().to_be_bytes());
    RtpPacket::new(seq, timestamp, 0xCAFE, boundary, keyframe, payload)
}

/// `frames` video frames of `packets_per_frame` packets each, the first frame
/// a key frame, timestamps 3000 apart (30 fps at 90 kHz)
pub fn video_stream(first_seq: u16, frames: usize, packets_per_frame: usize) -> Vec<RtpPacket> {
    let mut seq = SeqNo::new(first_seq);
    let mut packets = Vec::with_capacity(frames * packets_per_frame);

    for frame in 0..frames {
        for i in 0..packets_per_frame {
            let boundary = FrameBoundary::from_flags(i == 0, i + 1 == packets_per_frame);
            packets.push(packet(seq, frame as u32 * 3000, boundary, frame == 0));
            seq.increment();
        }
    }

    packets
}

/// Single-packet frames, 20 ms of 48 kHz audio each
pub fn audio_stream(first_seq: u16, count: usize) -> Vec<RtpPacket> {
    let mut seq = SeqNo::new(first_seq);

    (0..count)
        .map(|i| {
            let packet = packet(seq, i as u32 * 960, FrameBoundary::Solo, false);
            seq.increment();
            packet
        })
        .collect()
}
