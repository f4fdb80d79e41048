//! Configuration file support for the simulator

use rtp_queue::{NackPolicy, QueueOptions, MAX_CAPACITY};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Receive queue settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueConfig {
    /// Ring buffer slots
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Deliver every packet as its own frame
    #[serde(default)]
    pub one_packet_per_frame: bool,
    /// Media clock rate in Hz
    #[serde(default = "default_clock_rate")]
    pub clock_rate: u32,
    /// NACK list limit (two thirds of the capacity when unset)
    pub max_nack_queue_size: Option<usize>,
}

fn default_capacity() -> usize {
    1024
}

fn default_clock_rate() -> u32 {
    90_000
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            capacity: default_capacity(),
            one_packet_per_frame: false,
            clock_rate: default_clock_rate(),
            max_nack_queue_size: None,
        }
    }
}

/// Retransmission request settings, durations in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NackConfig {
    /// Maximum requests per sequence number
    #[serde(default = "default_max_count")]
    pub max_count: u32,
    /// Give up on a missing packet after this long
    #[serde(default = "default_max_alive_ms")]
    pub max_alive_ms: u64,
    /// Wait before the first request
    #[serde(default = "default_first_request_delay_ms")]
    pub first_request_delay_ms: u64,
    /// Minimum spacing between repeated requests
    #[serde(default = "default_request_interval_ms")]
    pub request_interval_ms: u64,
    /// How often the NACK timer runs
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

fn default_max_count() -> u32 {
    10
}

fn default_max_alive_ms() -> u64 {
    2000
}

fn default_first_request_delay_ms() -> u64 {
    10
}

fn default_request_interval_ms() -> u64 {
    400
}

fn default_tick_ms() -> u64 {
    20
}

impl Default for NackConfig {
    fn default() -> Self {
        NackConfig {
            max_count: default_max_count(),
            max_alive_ms: default_max_alive_ms(),
            first_request_delay_ms: default_first_request_delay_ms(),
            request_interval_ms: default_request_interval_ms(),
            tick_ms: default_tick_ms(),
        }
    }
}

/// Synthetic stream and network settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkConfig {
    /// Packets to send
    #[serde(default = "default_packets")]
    pub packets: u64,
    /// Frames per second
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
    /// Packets per frame
    #[serde(default = "default_packets_per_frame")]
    pub packets_per_frame: u16,
    /// Frames between key frames
    #[serde(default = "default_keyframe_interval")]
    pub keyframe_interval: u32,
    /// Payload bytes per packet
    #[serde(default = "default_payload_size")]
    pub payload_size: usize,
    /// First sequence number, close to the wrap to exercise it
    #[serde(default = "default_first_seq")]
    pub first_seq: u16,
    /// Probability a packet is lost (0.0 to 1.0)
    #[serde(default = "default_loss")]
    pub loss: f64,
    /// Probability a packet is delayed behind its successors
    #[serde(default = "default_reorder")]
    pub reorder: f64,
    /// Probability a packet is delivered twice
    #[serde(default = "default_duplicate")]
    pub duplicate: f64,
    /// One-way delay in milliseconds
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    /// Maximum extra random delay in milliseconds
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
    /// Random seed
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Statistics interval in milliseconds
    #[serde(default = "default_report_interval_ms")]
    pub report_interval_ms: u64,
}

fn default_packets() -> u64 {
    5000
}

fn default_frame_rate() -> u32 {
    30
}

fn default_packets_per_frame() -> u16 {
    5
}

fn default_keyframe_interval() -> u32 {
    60
}

fn default_payload_size() -> usize {
    1200
}

fn default_first_seq() -> u16 {
    65000
}

fn default_loss() -> f64 {
    0.02
}

fn default_reorder() -> f64 {
    0.05
}

fn default_duplicate() -> f64 {
    0.01
}

fn default_delay_ms() -> u64 {
    40
}

fn default_jitter_ms() -> u64 {
    10
}

fn default_seed() -> u64 {
    1
}

fn default_report_interval_ms() -> u64 {
    1000
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            packets: default_packets(),
            frame_rate: default_frame_rate(),
            packets_per_frame: default_packets_per_frame(),
            keyframe_interval: default_keyframe_interval(),
            payload_size: default_payload_size(),
            first_seq: default_first_seq(),
            loss: default_loss(),
            reorder: default_reorder(),
            duplicate: default_duplicate(),
            delay_ms: default_delay_ms(),
            jitter_ms: default_jitter_ms(),
            seed: default_seed(),
            report_interval_ms: default_report_interval_ms(),
        }
    }
}

/// Combined configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SimConfig {
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub nack: NackConfig,
    #[serde(default)]
    pub link: LinkConfig,
}

impl SimConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: SimConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Example configuration: a 30 fps video stream over a lossy link
    pub fn example() -> Self {
        SimConfig::default()
    }

    /// Check value ranges the queue and link cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.capacity == 0 || self.queue.capacity > MAX_CAPACITY {
            return Err(ConfigError::Invalid(format!(
                "queue.capacity must be between 1 and {}, got {}",
                MAX_CAPACITY, self.queue.capacity
            )));
        }

        for (name, value) in [
            ("link.loss", self.link.loss),
            ("link.reorder", self.link.reorder),
            ("link.duplicate", self.link.duplicate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be between 0.0 and 1.0, got {}",
                    name, value
                )));
            }
        }

        if self.link.frame_rate == 0 || self.link.packets_per_frame == 0 {
            return Err(ConfigError::Invalid(
                "link.frame_rate and link.packets_per_frame must be positive".to_string(),
            ));
        }

        if self.nack.tick_ms == 0 || self.link.report_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "nack.tick_ms and link.report_interval_ms must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Options for the receive queue under test
    pub fn queue_options(&self) -> QueueOptions {
        QueueOptions {
            capacity: self.queue.capacity,
            one_packet_per_frame: self.queue.one_packet_per_frame,
            nack: self.nack.policy(),
            clock_rate: self.queue.clock_rate,
            max_nack_queue_size: self.queue.max_nack_queue_size,
        }
    }
}

impl NackConfig {
    pub fn policy(&self) -> NackPolicy {
        NackPolicy {
            max_count: self.max_count,
            max_alive_time: Duration::from_millis(self.max_alive_ms),
            first_request_delay: Duration::from_millis(self.first_request_delay_ms),
            base_request_interval: Duration::from_millis(self.request_interval_ms),
        }
    }

    /// Get NACK timer interval as Duration
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

impl LinkConfig {
    /// Get one-way delay as Duration
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Round trip: a request travels one way, the retransmission the other
    pub fn rtt(&self) -> Duration {
        self.delay() * 2
    }

    /// Get statistics interval as Duration
    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }

    /// Time between frames
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.frame_rate.max(1)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
