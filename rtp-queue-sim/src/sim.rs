//! Simulation driver
//!
//! Runs one receive queue against the synthetic link on the virtual clock,
//! advancing in 1 ms steps. Each step sends the frames that are due, feeds
//! every packet that has arrived to the queue, drains completed frames, and
//! runs the NACK and report timers the way a real receive loop would.

use crate::config::SimConfig;
use crate::link::{Link, LinkStats, VideoSource};
use crate::time::{SimClock, Timer};
use rtp_queue::{InsertOutcome, QueueError, QueueStats, RtpPacket, RtpQueue};
use std::time::Duration;

/// Clock step of the simulation loop
const STEP: Duration = Duration::from_millis(1);

/// Time allowed after the last frame for retransmissions to settle
const DRAIN_TIME: Duration = Duration::from_secs(3);

/// One receiver report interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalReport {
    /// Simulated time of the report
    pub at: Duration,
    pub fraction_lost: u8,
    pub cumulative_lost: u32,
    pub jitter: u32,
    pub extended_highest_sequence: u32,
}

/// Outcome of a run
#[derive(Debug, Clone)]
pub struct SimReport {
    /// Simulated duration
    pub duration: Duration,
    /// Link counters
    pub link: LinkStats,
    /// Final queue counters
    pub queue: QueueStats,
    /// Frames handed to the application
    pub frames_delivered: u64,
    /// Key frames among them
    pub keyframes_delivered: u64,
    /// Payload bytes delivered
    pub bytes_delivered: u64,
    /// Key-frame requests forwarded to the sender
    pub keyframe_requests: u64,
    /// Periodic receiver reports
    pub intervals: Vec<IntervalReport>,
}

/// A configured simulation
pub struct Simulation {
    config: SimConfig,
    clock: SimClock,
    source: VideoSource,
    link: Link,
    queue: RtpQueue<RtpPacket>,
    frames_delivered: u64,
    keyframes_delivered: u64,
    bytes_delivered: u64,
    keyframe_requests: u64,
    intervals: Vec<IntervalReport>,
}

impl Simulation {
    pub fn new(config: SimConfig) -> Result<Self, QueueError> {
        let mut queue = RtpQueue::new(config.queue_options())?;
        queue.update_rtt(config.link.rtt());

        Ok(Simulation {
            clock: SimClock::new(),
            source: VideoSource::new(&config.link, config.queue.clock_rate),
            link: Link::new(&config.link),
            queue,
            config,
            frames_delivered: 0,
            keyframes_delivered: 0,
            bytes_delivered: 0,
            keyframe_requests: 0,
            intervals: Vec::new(),
        })
    }

    /// Run until every packet is sent and the link and NACK list settle
    pub fn run(mut self) -> Result<SimReport, QueueError> {
        let frame_interval = self.config.link.frame_interval();
        let mut nack_timer = Timer::new(self.config.nack.tick(), self.clock.now());
        let mut report_timer = Timer::new(self.config.link.report_interval(), self.clock.now());
        let mut next_frame_at = Duration::ZERO;
        let mut drain_deadline = None;

        tracing::info!(
            packets = self.config.link.packets,
            loss = self.config.link.loss,
            capacity = self.config.queue.capacity,
            "simulation starting"
        );

        loop {
            let elapsed = self.clock.elapsed();
            let now = self.clock.now();

            while !self.source.is_done() && next_frame_at <= elapsed {
                for (offset, packet) in self.source.next_frame() {
                    self.link.send(packet, next_frame_at + offset);
                }
                next_frame_at += frame_interval;
            }

            while let Some(packet) = self.link.poll(elapsed) {
                let seq = packet.sequence;
                match self.queue.insert(packet, now)? {
                    InsertOutcome::Recovered => tracing::trace!(%seq, "retransmission arrived"),
                    InsertOutcome::Duplicate | InsertOutcome::Stale => {
                        tracing::trace!(%seq, "late or repeated packet")
                    }
                    InsertOutcome::Stored => {}
                }
            }

            self.drain_frames();

            if nack_timer.try_fire(now) {
                self.queue.check_queue_size(now);
                let seqs = self.queue.get_nack_seqs(now);
                if !seqs.is_empty() {
                    tracing::debug!(count = seqs.len(), first = %seqs[0], "sending NACK");
                    self.link.retransmit(&seqs, elapsed);
                }
                self.drain_frames();
            }

            if self.queue.get_and_clean_if_needed_request_key_frame() {
                tracing::debug!("requesting key frame");
                self.keyframe_requests += 1;
                self.source.request_keyframe();
            }

            if report_timer.try_fire(now) {
                self.report(elapsed);
            }

            if self.source.is_done() && self.link.in_flight() == 0 {
                let deadline = *drain_deadline.get_or_insert(elapsed + DRAIN_TIME);
                if self.queue.nack().is_empty() || elapsed >= deadline {
                    break;
                }
            }

            self.clock.advance(STEP);
        }

        self.report(self.clock.elapsed());

        Ok(SimReport {
            duration: self.clock.elapsed(),
            link: self.link.stats().clone(),
            queue: self.queue.stats(),
            frames_delivered: self.frames_delivered,
            keyframes_delivered: self.keyframes_delivered,
            bytes_delivered: self.bytes_delivered,
            keyframe_requests: self.keyframe_requests,
            intervals: self.intervals,
        })
    }

    fn drain_frames(&mut self) {
        for frame in self.queue.get_and_clean_collected_frames() {
            self.frames_delivered += 1;
            if frame.is_keyframe() {
                self.keyframes_delivered += 1;
            }
            self.bytes_delivered += frame.iter().map(|packet| packet.size() as u64).sum::<u64>();
        }
    }

    fn report(&mut self, at: Duration) {
        let report = IntervalReport {
            at,
            fraction_lost: self.queue.get_fraction_lost(),
            cumulative_lost: self.queue.get_cumulative_number_of_packets_lost(),
            jitter: self.queue.get_interarrival_jitter(),
            extended_highest_sequence: self.queue.get_extended_highest_sequence(),
        };

        tracing::info!(
            at_ms = at.as_millis() as u64,
            fraction_lost = report.fraction_lost,
            cumulative_lost = report.cumulative_lost,
            jitter = report.jitter,
            highest = report.extended_highest_sequence,
            frames = self.frames_delivered,
            "receiver report"
        );

        self.intervals.push(report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(loss: f64) -> SimConfig {
        let mut config = SimConfig::example();
        config.link.packets = 500;
        config.link.first_seq = 65_300;
        config.link.loss = loss;
        config.link.reorder = 0.0;
        config.link.duplicate = 0.0;
        config
    }

    #[test]
    fn test_clean_link_delivers_every_frame() {
        let report = Simulation::new(config(0.0)).unwrap().run().unwrap();

        assert_eq!(report.link.packets_sent, 500);
        assert_eq!(report.frames_delivered, 100);
        assert_eq!(report.queue.packets_received, 500);
        assert_eq!(report.queue.packets_lost, 0);
        assert_eq!(report.bytes_delivered, 500 * 1200);
        // 65300 + 499 crosses the wrap once.
        assert_eq!(report.queue.extended_highest_sequence, 65_300 + 499);
        assert!(report.intervals.iter().all(|interval| interval.fraction_lost == 0));
    }

    #[test]
    fn test_same_seed_same_result() {
        let first = Simulation::new(config(0.05)).unwrap().run().unwrap();
        let second = Simulation::new(config(0.05)).unwrap().run().unwrap();

        assert_eq!(first.link, second.link);
        assert_eq!(first.queue, second.queue);
        assert_eq!(first.intervals, second.intervals);
    }

    #[test]
    fn test_lossy_link_recovers_through_nacks() {
        let report = Simulation::new(config(0.05)).unwrap().run().unwrap();

        assert!(report.link.packets_dropped > 0);
        assert!(report.link.packets_retransmitted > 0);
        assert!(report.queue.packets_recovered > 0);
        assert!(report.queue.nacks_requested >= report.link.packets_retransmitted);
        assert!(report.frames_delivered > 0);
    }
}
