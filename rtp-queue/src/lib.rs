//! RTP Receive Queue
//!
//! This crate implements the receiver side of an RTP media stream: packet
//! reordering in a sequence-indexed ring buffer, loss detection and NACK
//! scheduling, frame reassembly, and the jitter and loss statistics reported
//! in RTCP receiver reports.
//!
//! The crate performs no I/O and never reads the clock. Callers pass the
//! arrival instant to every time-dependent operation and drive NACK
//! maintenance from their own timer.

pub mod frame;
pub mod nack;
pub mod packet;
pub mod queue;
pub mod ring_buffer;
pub mod sequence;
pub mod stats;

pub use frame::Frame;
pub use nack::{NackEntry, NackGenerator, NackMaintenance, NackPolicy, RTT_BACKOFF_PERCENT};
pub use packet::{FrameBoundary, MediaPacket, RtpPacket};
pub use queue::{InsertOutcome, QueueError, QueueOptions, RtpQueue};
pub use ring_buffer::{RingBuffer, SeqUpdate, MAX_CAPACITY};
pub use sequence::{is_newer, SeqNo, SeqRange};
pub use stats::{QueueStats, ReceptionStats};
