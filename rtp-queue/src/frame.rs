//! Completed frames handed to the application

use crate::packet::MediaPacket;
use crate::sequence::SeqNo;

/// Packets of one access unit, in sequence order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame<P> {
    packets: Vec<P>,
    first_seq: SeqNo,
    last_seq: SeqNo,
    keyframe: bool,
}

impl<P: MediaPacket> Frame<P> {
    pub(crate) fn new(first_seq: SeqNo, last_seq: SeqNo, packets: Vec<P>) -> Self {
        let keyframe = packets.first().is_some_and(|packet| packet.is_keyframe());

        Frame {
            packets,
            first_seq,
            last_seq,
            keyframe,
        }
    }

    pub fn first_seq(&self) -> SeqNo {
        self.first_seq
    }

    pub fn last_seq(&self) -> SeqNo {
        self.last_seq
    }

    /// Media timestamp of the frame
    pub fn timestamp(&self) -> Option<u32> {
        self.packets.first().map(|packet| packet.timestamp())
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// First packet is part of a key frame
    pub fn is_keyframe(&self) -> bool {
        self.keyframe
    }

    pub fn packets(&self) -> &[P] {
        &self.packets
    }

    pub fn into_packets(self) -> Vec<P> {
        self.packets
    }

    pub fn iter(&self) -> std::slice::Iter<'_, P> {
        self.packets.iter()
    }
}

impl<P> IntoIterator for Frame<P> {
    type Item = P;
    type IntoIter = std::vec::IntoIter<P>;

    fn into_iter(self) -> Self::IntoIter {
        self.packets.into_iter()
    }
}
