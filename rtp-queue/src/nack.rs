//! Missing-packet tracking for NACK generation
//!
//! Every sequence number the ring buffer reports as missing gets an entry
//! here. The owner periodically asks which entries are due for a (repeated)
//! retransmission request and runs maintenance to expire entries that will
//! not be recovered in time.

use crate::sequence::SeqNo;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Multiplier applied to the measured RTT when spacing repeated requests, in
/// percent
pub const RTT_BACKOFF_PERCENT: u32 = 150;

/// Retransmission request policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NackPolicy {
    /// Maximum number of requests for one sequence number
    pub max_count: u32,
    /// Entries older than this are given up on
    pub max_alive_time: Duration,
    /// Wait before the first request, so plain reordering is not nacked
    pub first_request_delay: Duration,
    /// Minimum spacing between requests for the same sequence number
    pub base_request_interval: Duration,
}

impl Default for NackPolicy {
    fn default() -> Self {
        NackPolicy {
            max_count: 10,
            max_alive_time: Duration::from_secs(2),
            first_request_delay: Duration::from_millis(10),
            base_request_interval: Duration::from_millis(400),
        }
    }
}

/// Tracking state for one missing sequence number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NackEntry {
    seq: SeqNo,
    generated_at: Instant,
    last_requested_at: Option<Instant>,
    request_count: u32,
}

impl NackEntry {
    fn new(seq: SeqNo, now: Instant) -> Self {
        NackEntry {
            seq,
            generated_at: now,
            last_requested_at: None,
            request_count: 0,
        }
    }

    pub fn seq(&self) -> SeqNo {
        self.seq
    }

    /// When the loss was detected
    pub fn generated_at(&self) -> Instant {
        self.generated_at
    }

    /// When the last request went out, `None` before the first one
    pub fn last_requested_at(&self) -> Option<Instant> {
        self.last_requested_at
    }

    pub fn request_count(&self) -> u32 {
        self.request_count
    }
}

/// Sequence numbers removed by [`NackGenerator::check_queue_size`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NackMaintenance {
    /// Lived longer than `max_alive_time`
    pub expired: Vec<SeqNo>,
    /// Dropped oldest-first to respect the queue size limit
    pub evicted: Vec<SeqNo>,
}

impl NackMaintenance {
    pub fn is_empty(&self) -> bool {
        self.expired.is_empty() && self.evicted.is_empty()
    }
}

/// Receiver-side NACK list
///
/// Entries are kept oldest to newest under the wraparound ordering. All
/// tracked sequence numbers lie inside the ring buffer window, which is
/// narrower than half the sequence space, so ordering relative to the oldest
/// entry is consistent.
pub struct NackGenerator {
    /// Missing sequence numbers, oldest first
    entries: VecDeque<NackEntry>,
    /// Maximum number of tracked entries
    max_queue_size: usize,
    policy: NackPolicy,
    /// Latest measured round-trip time
    rtt: Option<Duration>,
}

impl NackGenerator {
    /// Create a new NACK list
    ///
    /// # Arguments
    /// * `policy` - Request scheduling and expiry
    /// * `max_queue_size` - Maximum tracked entries (at least one)
    pub fn new(policy: NackPolicy, max_queue_size: usize) -> Self {
        NackGenerator {
            entries: VecDeque::new(),
            max_queue_size: max_queue_size.max(1),
            policy,
            rtt: None,
        }
    }

    /// Locate `seq`, or the index it would be inserted at
    fn position(&self, seq: SeqNo) -> Result<usize, usize> {
        let Some(oldest) = self.entries.front() else {
            return Err(0);
        };

        let base = oldest.seq;
        let target = base.distance_to(seq);
        let idx = self
            .entries
            .partition_point(|entry| base.distance_to(entry.seq) < target);

        match self.entries.get(idx) {
            Some(entry) if entry.seq == seq => Ok(idx),
            _ => Err(idx),
        }
    }

    /// Start tracking a missing sequence number
    ///
    /// Returns the oldest entry's sequence number when tracking `seq` pushed
    /// the list past its size limit. That entry is no longer tracked and will
    /// not be recovered.
    pub fn insert(&mut self, seq: SeqNo, now: Instant) -> Option<SeqNo> {
        match self.position(seq) {
            Ok(_) => return None,
            Err(idx) => self.entries.insert(idx, NackEntry::new(seq, now)),
        }

        if self.entries.len() > self.max_queue_size {
            let evicted = self.entries.pop_front().map(|entry| entry.seq);
            tracing::debug!(?evicted, limit = self.max_queue_size, "nack list full");
            return evicted;
        }

        None
    }

    /// Stop tracking a sequence number
    pub fn remove(&mut self, seq: SeqNo) -> Option<NackEntry> {
        let idx = self.position(seq).ok()?;
        self.entries.remove(idx)
    }

    /// Look up a tracked sequence number
    pub fn find(&self, seq: SeqNo) -> Option<&NackEntry> {
        let idx = self.position(seq).ok()?;
        self.entries.get(idx)
    }

    pub fn contains(&self, seq: SeqNo) -> bool {
        self.position(seq).is_ok()
    }

    /// Expire old entries and enforce the size limit
    pub fn check_queue_size(&mut self, now: Instant) -> NackMaintenance {
        let max_alive_time = self.policy.max_alive_time;
        let mut maintenance = NackMaintenance::default();

        self.entries.retain(|entry| {
            if now.saturating_duration_since(entry.generated_at) > max_alive_time {
                maintenance.expired.push(entry.seq);
                false
            } else {
                true
            }
        });

        while self.entries.len() > self.max_queue_size {
            if let Some(entry) = self.entries.pop_front() {
                maintenance.evicted.push(entry.seq);
            }
        }

        if !maintenance.is_empty() {
            tracing::debug!(
                expired = maintenance.expired.len(),
                evicted = maintenance.evicted.len(),
                remaining = self.entries.len(),
                "nack maintenance"
            );
        }

        maintenance
    }

    /// Collect sequence numbers due for a retransmission request
    ///
    /// Each returned entry has its request counter bumped. An entry that has
    /// been requested `max_count` times stays tracked but is not requested
    /// again.
    pub fn get_nack_seqs(&mut self, now: Instant) -> Vec<SeqNo> {
        let interval = self.request_interval();
        let first_delay = self.policy.first_request_delay;
        let max_count = self.policy.max_count;
        let mut seqs = Vec::new();

        for entry in &mut self.entries {
            if entry.request_count >= max_count {
                continue;
            }

            let due = match entry.last_requested_at {
                None => now.saturating_duration_since(entry.generated_at) >= first_delay,
                Some(last) => now.saturating_duration_since(last) >= interval,
            };

            if due {
                entry.request_count += 1;
                entry.last_requested_at = Some(now);
                seqs.push(entry.seq);
            }
        }

        seqs
    }

    /// Record the latest measured round-trip time
    pub fn update_rtt(&mut self, rtt: Duration) {
        self.rtt = Some(rtt);
    }

    pub fn rtt(&self) -> Option<Duration> {
        self.rtt
    }

    /// Spacing between repeated requests for one sequence number
    ///
    /// `max(base_request_interval, rtt * RTT_BACKOFF_PERCENT / 100)`
    pub fn request_interval(&self) -> Duration {
        match self.rtt {
            Some(rtt) => self
                .policy
                .base_request_interval
                .max(rtt * RTT_BACKOFF_PERCENT / 100),
            None => self.policy.base_request_interval,
        }
    }

    pub fn policy(&self) -> &NackPolicy {
        &self.policy
    }

    pub fn max_queue_size(&self) -> usize {
        self.max_queue_size
    }

    /// Tracked entries, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &NackEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> NackPolicy {
        NackPolicy {
            max_count: 3,
            max_alive_time: Duration::from_millis(1000),
            first_request_delay: Duration::from_millis(10),
            base_request_interval: Duration::from_millis(100),
        }
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn seqs(values: &[u16]) -> Vec<SeqNo> {
        values.iter().copied().map(SeqNo::new).collect()
    }

    #[test]
    fn test_insert_find_remove() {
        let start = Instant::now();
        let mut nack = NackGenerator::new(policy(), 16);

        nack.insert(SeqNo::new(10), start);
        nack.insert(SeqNo::new(11), start);
        nack.insert(SeqNo::new(10), start + ms(5));

        assert_eq!(nack.len(), 2);
        let entry = nack.find(SeqNo::new(10)).unwrap();
        assert_eq!(entry.generated_at(), start);
        assert_eq!(entry.request_count(), 0);

        assert!(nack.remove(SeqNo::new(10)).is_some());
        assert!(nack.find(SeqNo::new(10)).is_none());
        assert!(nack.remove(SeqNo::new(10)).is_none());
    }

    #[test]
    fn test_ordering_across_wrap() {
        let now = Instant::now();
        let mut nack = NackGenerator::new(policy(), 16);

        for seq in [1u16, 65534, 0, 65535, 2] {
            nack.insert(SeqNo::new(seq), now);
        }

        let order: Vec<SeqNo> = nack.iter().map(NackEntry::seq).collect();
        assert_eq!(order, seqs(&[65534, 65535, 0, 1, 2]));
        assert!(nack.contains(SeqNo::new(0)));
    }

    #[test]
    fn test_insert_evicts_oldest_when_full() {
        let now = Instant::now();
        let mut nack = NackGenerator::new(policy(), 3);

        assert_eq!(nack.insert(SeqNo::new(65535), now), None);
        assert_eq!(nack.insert(SeqNo::new(0), now), None);
        assert_eq!(nack.insert(SeqNo::new(1), now), None);
        assert_eq!(nack.insert(SeqNo::new(2), now), Some(SeqNo::new(65535)));

        assert_eq!(nack.len(), 3);
        assert!(nack.find(SeqNo::new(65535)).is_none());
    }

    #[test]
    fn test_first_request_delay() {
        let start = Instant::now();
        let mut nack = NackGenerator::new(policy(), 16);
        nack.insert(SeqNo::new(5), start);

        assert!(nack.get_nack_seqs(start + ms(5)).is_empty());
        assert_eq!(nack.get_nack_seqs(start + ms(10)), seqs(&[5]));
        assert_eq!(nack.find(SeqNo::new(5)).unwrap().request_count(), 1);
    }

    #[test]
    fn test_request_interval_and_max_count() {
        let start = Instant::now();
        let mut nack = NackGenerator::new(policy(), 16);
        nack.insert(SeqNo::new(5), start);

        assert_eq!(nack.get_nack_seqs(start + ms(10)), seqs(&[5]));
        assert!(nack.get_nack_seqs(start + ms(50)).is_empty());
        assert!(nack.get_nack_seqs(start + ms(109)).is_empty());
        assert_eq!(nack.get_nack_seqs(start + ms(110)), seqs(&[5]));
        assert_eq!(nack.get_nack_seqs(start + ms(210)), seqs(&[5]));

        // max_count reached: still tracked, no longer requested
        assert!(nack.get_nack_seqs(start + ms(500)).is_empty());
        assert!(nack.find(SeqNo::new(5)).is_some());
        assert_eq!(nack.find(SeqNo::new(5)).unwrap().request_count(), 3);
    }

    #[test]
    fn test_rtt_stretches_interval() {
        let start = Instant::now();
        let mut nack = NackGenerator::new(policy(), 16);
        assert_eq!(nack.request_interval(), ms(100));

        nack.update_rtt(ms(40));
        assert_eq!(nack.request_interval(), ms(100));

        nack.update_rtt(ms(200));
        assert_eq!(nack.request_interval(), ms(300));

        nack.insert(SeqNo::new(9), start);
        assert_eq!(nack.get_nack_seqs(start + ms(10)), seqs(&[9]));
        assert!(nack.get_nack_seqs(start + ms(200)).is_empty());
        assert_eq!(nack.get_nack_seqs(start + ms(310)), seqs(&[9]));
    }

    #[test]
    fn test_check_queue_size_expires() {
        let start = Instant::now();
        let mut nack = NackGenerator::new(policy(), 16);
        nack.insert(SeqNo::new(1), start);
        nack.insert(SeqNo::new(2), start + ms(500));

        assert!(nack.check_queue_size(start + ms(1000)).is_empty());

        let maintenance = nack.check_queue_size(start + ms(1001));
        assert_eq!(maintenance.expired, seqs(&[1]));
        assert!(maintenance.evicted.is_empty());
        assert!(nack.find(SeqNo::new(1)).is_none());
        assert!(nack.find(SeqNo::new(2)).is_some());
    }

    #[test]
    fn test_get_nack_seqs_oldest_first() {
        let start = Instant::now();
        let mut nack = NackGenerator::new(policy(), 16);
        nack.insert(SeqNo::new(3), start);
        nack.insert(SeqNo::new(1), start);
        nack.insert(SeqNo::new(2), start);

        assert_eq!(nack.get_nack_seqs(start + ms(20)), seqs(&[1, 2, 3]));
    }
}
