//! Registry of slaves discovered on the bus.
//!
//! One record per slave, insertion order retained. The registry is bounded:
//! admitting a fourth slave evicts the first-inserted one. All timestamps
//! come in through the caller so the expiry and hold windows stay
//! deterministic under test.

use crate::clock::Timestamp;
use crate::constants::{ACTUAL_JITTER_CA, MAX_SLAVES};
use crate::types::TwcId;
use log::warn;

/// Everything the controller tracks about one slave.
#[derive(Debug, Clone)]
pub struct SlaveRecord {
    pub id: TwcId,
    /// When any frame was last received from this slave
    pub last_rx_at: Timestamp,
    /// The cap currently negotiated with this slave; `None` until the first
    /// heartbeat seeds it from the slave's own report
    pub req_max_ca: Option<i32>,
    /// The limit the slave itself most recently reported, used to keep
    /// re-asserting an unacknowledged cap between replies
    pub reported_req_ca: Option<i32>,
    /// Last significant draw sample; `None` until one is seen
    pub actual_ca: Option<i32>,
    /// When the negotiated cap last actually changed; `None` if never
    pub req_max_changed_at: Option<Timestamp>,
    /// When the draw last moved by more than the jitter threshold
    pub actual_changed_at: Option<Timestamp>,
}

impl SlaveRecord {
    fn new(id: TwcId, now: Timestamp) -> Self {
        Self {
            id,
            last_rx_at: now,
            req_max_ca: None,
            reported_req_ca: None,
            actual_ca: None,
            req_max_changed_at: None,
            actual_changed_at: None,
        }
    }

    /// Fold one heartbeat's samples into the record. Seeds the negotiated
    /// cap from the slave's report on first contact; the seed does not count
    /// as a cap change.
    pub fn observe_heartbeat(&mut self, req_max_ca: u16, actual_ca: u16, now: Timestamp) {
        self.last_rx_at = now;
        self.reported_req_ca = Some(i32::from(req_max_ca));
        if self.req_max_ca.is_none() {
            self.req_max_ca = Some(i32::from(req_max_ca));
        }
        let actual = i32::from(actual_ca);
        let significant = match self.actual_ca {
            None => true,
            Some(prev) => (actual - prev).abs() > ACTUAL_JITTER_CA,
        };
        if significant {
            self.actual_ca = Some(actual);
            self.actual_changed_at = Some(now);
        }
    }
}

#[derive(Debug, Default)]
pub struct SlaveRegistry {
    slaves: Vec<SlaveRecord>,
    rr_index: usize,
}

impl SlaveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slaves.is_empty()
    }

    pub fn get(&self, id: TwcId) -> Option<&SlaveRecord> {
        self.slaves.iter().find(|s| s.id == id)
    }

    pub fn get_mut(&mut self, id: TwcId) -> Option<&mut SlaveRecord> {
        self.slaves.iter_mut().find(|s| s.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SlaveRecord> {
        self.slaves.iter()
    }

    /// Admit or refresh a slave. Idempotent for known ids (only `last_rx_at`
    /// moves). Admitting one past the capacity evicts the oldest entry.
    pub fn upsert(&mut self, id: TwcId, now: Timestamp) -> &mut SlaveRecord {
        if let Some(idx) = self.slaves.iter().position(|s| s.id == id) {
            self.slaves[idx].last_rx_at = now;
            return &mut self.slaves[idx];
        }
        if self.slaves.len() >= MAX_SLAVES {
            let evicted = self.slaves.remove(0);
            warn!(
                "Slave registry full, evicting oldest slave {} to admit {}",
                evicted.id, id
            );
            self.rr_index %= self.slaves.len().max(1);
        }
        self.slaves.push(SlaveRecord::new(id, now));
        self.slaves.last_mut().unwrap()
    }

    pub fn remove(&mut self, id: TwcId) -> bool {
        let Some(idx) = self.slaves.iter().position(|s| s.id == id) else {
            return false;
        };
        self.slaves.remove(idx);
        if !self.slaves.is_empty() {
            self.rr_index %= self.slaves.len();
        }
        true
    }

    /// Advance the round-robin cursor and return the slave it lands on.
    pub fn next_round_robin(&mut self) -> Option<TwcId> {
        if self.slaves.is_empty() {
            return None;
        }
        self.rr_index = (self.rr_index + 1) % self.slaves.len();
        Some(self.slaves[self.rr_index].id)
    }

    /// Sum of negotiated caps across all slaves, each clamped to >= 0.
    pub fn sum_req_max(&self) -> i32 {
        self.slaves
            .iter()
            .map(|s| s.req_max_ca.unwrap_or(0).max(0))
            .sum()
    }

    /// Same sum with one slave left out, used when testing a candidate value
    /// for that slave.
    pub fn sum_req_max_excluding(&self, id: TwcId) -> i32 {
        self.slaves
            .iter()
            .filter(|s| s.id != id)
            .map(|s| s.req_max_ca.unwrap_or(0).max(0))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u8) -> TwcId {
        TwcId::from_bytes(0x10, n)
    }

    #[test]
    fn upsert_is_idempotent() {
        let mut reg = SlaveRegistry::new();
        let t0 = Timestamp::from_secs(1);
        reg.upsert(id(1), t0);
        for i in 2..10 {
            reg.upsert(id(1), Timestamp::from_secs(i));
        }
        assert_eq!(reg.len(), 1);
        // Refresh moves last_rx_at; identity fields stay put.
        assert_eq!(reg.get(id(1)).unwrap().last_rx_at, Timestamp::from_secs(9));
    }

    #[test]
    fn fourth_slave_evicts_the_oldest() {
        let mut reg = SlaveRegistry::new();
        for n in 1..=4 {
            reg.upsert(id(n), Timestamp::from_secs(n as u64));
        }
        assert_eq!(reg.len(), MAX_SLAVES);
        assert!(reg.get(id(1)).is_none());
        assert!(reg.get(id(2)).is_some());
        assert!(reg.get(id(4)).is_some());
    }

    #[test]
    fn round_robin_cycles_in_insertion_order() {
        let mut reg = SlaveRegistry::new();
        for n in 1..=3 {
            reg.upsert(id(n), Timestamp::ZERO);
        }
        let picks: Vec<_> = (0..6).map(|_| reg.next_round_robin().unwrap()).collect();
        assert_eq!(picks, vec![id(2), id(3), id(1), id(2), id(3), id(1)]);
    }

    #[test]
    fn round_robin_survives_removal() {
        let mut reg = SlaveRegistry::new();
        for n in 1..=3 {
            reg.upsert(id(n), Timestamp::ZERO);
        }
        assert_eq!(reg.next_round_robin(), Some(id(2)));
        assert!(reg.remove(id(3)));
        // Cursor stays in bounds and keeps cycling over the survivors.
        let picks: Vec<_> = (0..4).map(|_| reg.next_round_robin().unwrap()).collect();
        assert!(picks.iter().all(|p| *p == id(1) || *p == id(2)));
    }

    #[test]
    fn heartbeat_seeds_without_marking_a_change() {
        let mut reg = SlaveRegistry::new();
        let rec = reg.upsert(id(1), Timestamp::ZERO);
        rec.observe_heartbeat(1200, 1150, Timestamp::from_secs(1));
        assert_eq!(rec.req_max_ca, Some(1200));
        assert_eq!(rec.reported_req_ca, Some(1200));
        assert!(rec.req_max_changed_at.is_none());
        assert_eq!(rec.actual_ca, Some(1150));
        assert_eq!(rec.actual_changed_at, Some(Timestamp::from_secs(1)));
    }

    #[test]
    fn draw_jitter_below_threshold_is_ignored() {
        let mut reg = SlaveRegistry::new();
        let rec = reg.upsert(id(1), Timestamp::ZERO);
        rec.observe_heartbeat(1200, 1000, Timestamp::from_secs(1));
        rec.observe_heartbeat(1200, 1050, Timestamp::from_secs(2));
        assert_eq!(rec.actual_ca, Some(1000));
        assert_eq!(rec.actual_changed_at, Some(Timestamp::from_secs(1)));
        rec.observe_heartbeat(1200, 1081, Timestamp::from_secs(3));
        assert_eq!(rec.actual_ca, Some(1081));
        assert_eq!(rec.actual_changed_at, Some(Timestamp::from_secs(3)));
    }

    #[test]
    fn sums_clamp_missing_records_to_zero() {
        let mut reg = SlaveRegistry::new();
        reg.upsert(id(1), Timestamp::ZERO).req_max_ca = Some(2100);
        reg.upsert(id(2), Timestamp::ZERO);
        reg.upsert(id(3), Timestamp::ZERO).req_max_ca = Some(1500);
        assert_eq!(reg.sum_req_max(), 3600);
        assert_eq!(reg.sum_req_max_excluding(id(1)), 1500);
    }
}
