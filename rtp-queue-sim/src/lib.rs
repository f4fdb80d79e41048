//! RTP Queue Simulator Library
//!
//! Drives an [`rtp_queue::RtpQueue`] with a synthetic video stream over a
//! seeded lossy link on a virtual clock, for the `rtpq-sim` tool.

pub mod config;
pub mod link;
pub mod report;
pub mod sim;
pub mod time;

pub use config::{ConfigError, LinkConfig, NackConfig, QueueConfig, SimConfig};
pub use link::{Link, LinkStats, VideoSource};
pub use report::{display_report, format_bytes, format_duration};
pub use sim::{IntervalReport, SimReport, Simulation};
pub use time::{SimClock, Timer};
