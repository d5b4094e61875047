//! Diagnostic slave mode.
//!
//! Impersonates a wall connector on the bus so a real (or this crate's)
//! master can be exercised without hardware: beacons linkready every 10 s
//! while idle, answers master heartbeats by mirroring the advertised cap,
//! and re-randomizes its identity when a master announcement collides with
//! it.

use crate::clock::{Clock, Timestamp};
use crate::codec::{self, FrameDecoder};
use crate::constants::*;
use crate::error::Result;
use crate::master::Tick;
use crate::message;
use crate::transport::Bus;
use crate::types::{Message, Sign, SlaveStatus, TwcId};
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::thread;

pub struct Slave<B: Bus, C: Clock> {
    bus: B,
    clock: C,
    decoder: FrameDecoder,
    pending: VecDeque<[u8; BODY_LEN]>,
    own_id: TwcId,
    own_sign: Sign,
    status: u8,
    /// Cap most recently advertised by the master, echoed back in replies
    mirrored_cap_ca: u16,
    /// Simulated draw; this fake never powers a car
    actual_ca: u16,
    last_beacon_at: Option<Timestamp>,
}

impl<B: Bus, C: Clock> Slave<B, C> {
    pub fn new(bus: B, clock: C, own_id: TwcId, own_sign: Sign) -> Self {
        Self {
            bus,
            clock,
            decoder: FrameDecoder::new(),
            pending: VecDeque::new(),
            own_id,
            own_sign,
            status: SlaveStatus::Ready as u8,
            mirrored_cap_ca: 0,
            actual_ca: 0,
            last_beacon_at: None,
        }
    }

    pub fn id(&self) -> TwcId {
        self.own_id
    }

    pub fn run(&mut self) -> Result<()> {
        info!(
            "Fake slave {} (sign {}) online",
            self.own_id, self.own_sign
        );
        loop {
            match self.tick() {
                Tick::MidFrame => thread::sleep(MID_FRAME_BACKOFF),
                Tick::Sent => thread::sleep(POST_TX_SETTLE),
                Tick::Idle => {}
            }
        }
    }

    pub fn tick(&mut self) -> Tick {
        while let Some(byte) = self.bus.read_byte() {
            if let Some(body) = self.decoder.push(byte) {
                self.pending.push_back(body);
            }
        }
        if self.decoder.mid_frame() {
            return Tick::MidFrame;
        }

        let mut sent = false;
        while let Some(body) = self.pending.pop_front() {
            sent |= self.handle_frame(&body);
        }
        if sent {
            return Tick::Sent;
        }

        let now = self.clock.now();
        let beacon_due = match self.last_beacon_at {
            None => true,
            Some(t) => now.since(t) > SLAVE_BEACON_INTERVAL,
        };
        if beacon_due {
            self.send_beacon(now);
            return Tick::Sent;
        }
        Tick::Idle
    }

    fn send_beacon(&mut self, now: Timestamp) {
        let frame = message::slave_linkready(self.own_id, self.own_sign);
        if let Err(e) = self.bus.write_frame(&frame) {
            warn!("Beacon write failed: {}", e);
        }
        self.last_beacon_at = Some(now);
    }

    /// Returns whether a frame was transmitted in response.
    fn handle_frame(&mut self, body: &[u8; BODY_LEN]) -> bool {
        match Message::parse(body) {
            Message::MasterLinkReady1 { sender, .. } | Message::MasterLinkReady2 { sender, .. }
                if sender == self.own_id =>
            {
                let old = self.own_id;
                self.own_id = TwcId::random();
                self.own_sign = Sign::random();
                warn!(
                    "Master announcement collides with our id {}; now {} (sign {})",
                    old, self.own_id, self.own_sign
                );
                false
            }
            Message::MasterLinkReady2 { sender, .. } => {
                debug!("Master {} finished announcing, introducing ourselves", sender);
                self.send_beacon(self.clock.now());
                true
            }
            Message::MasterHeartbeat {
                sender,
                receiver,
                cmd,
                cap_ca,
                ..
            } => {
                if receiver != self.own_id {
                    return false;
                }
                self.mirrored_cap_ca = cap_ca;
                debug!(
                    "Master {} heartbeat cmd {:#04X}, mirroring cap {} cA",
                    sender, cmd, cap_ca
                );
                let frame = message::slave_heartbeat(
                    self.own_id,
                    sender,
                    self.status,
                    self.mirrored_cap_ca,
                    self.actual_ca,
                );
                if let Err(e) = self.bus.write_frame(&frame) {
                    warn!("Heartbeat reply write failed: {}", e);
                }
                true
            }
            Message::MasterLinkReady1 { .. } | Message::MasterIdle4h => false,
            Message::SlaveLinkReady { .. } | Message::SlaveHeartbeat { .. } => false,
            Message::Unknown { raw } => {
                info!("Unclassified frame: {}", codec::hex(&raw));
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::transport::TestBus;
    use std::time::Duration;

    const OWN: TwcId = TwcId([0x66, 0x66]);
    const MASTER: TwcId = TwcId([0x77, 0x77]);

    fn new_slave(clock: &ManualClock) -> Slave<TestBus, &ManualClock> {
        Slave::new(TestBus::new(), clock, OWN, Sign(0x66))
    }

    #[test]
    fn beacons_immediately_then_every_ten_seconds() {
        let clock = ManualClock::new();
        let mut slave = new_slave(&clock);

        assert_eq!(slave.tick(), Tick::Sent);
        assert_eq!(
            slave.bus.sent().last().unwrap(),
            &message::slave_linkready(OWN, Sign(0x66))
        );

        clock.advance(Duration::from_secs(5));
        assert_eq!(slave.tick(), Tick::Idle);
        clock.advance(Duration::from_secs(6));
        assert_eq!(slave.tick(), Tick::Sent);
        assert_eq!(slave.bus.sent().len(), 2);
    }

    #[test]
    fn master_linkready2_triggers_an_immediate_beacon() {
        let clock = ManualClock::new();
        let mut slave = new_slave(&clock);
        slave.tick();
        slave.bus.tx.clear();

        slave
            .bus
            .inject(&message::master_linkready2(MASTER, Sign(0x77)));
        assert_eq!(slave.tick(), Tick::Sent);
        assert_eq!(
            slave.bus.sent().last().unwrap(),
            &message::slave_linkready(OWN, Sign(0x66))
        );
    }

    #[test]
    fn heartbeat_reply_mirrors_the_advertised_cap() {
        let clock = ManualClock::new();
        let mut slave = new_slave(&clock);
        slave.tick();
        slave.bus.tx.clear();

        slave
            .bus
            .inject(&message::master_heartbeat(MASTER, OWN, 0x05, 0x0834, 0));
        slave.tick();
        assert_eq!(
            slave.bus.sent().last().unwrap(),
            &message::slave_heartbeat(OWN, MASTER, SlaveStatus::Ready as u8, 0x0834, 0)
        );

        // A zeroed idle ack zeroes the mirror too.
        slave
            .bus
            .inject(&message::master_heartbeat(MASTER, OWN, 0x00, 0, 0));
        slave.tick();
        assert_eq!(
            slave.bus.sent().last().unwrap(),
            &message::slave_heartbeat(OWN, MASTER, SlaveStatus::Ready as u8, 0, 0)
        );
    }

    #[test]
    fn heartbeat_for_someone_else_is_ignored() {
        let clock = ManualClock::new();
        let mut slave = new_slave(&clock);
        slave.tick();
        slave.bus.tx.clear();

        let other = TwcId::from_bytes(0x12, 0x34);
        slave
            .bus
            .inject(&message::master_heartbeat(MASTER, other, 0x05, 1000, 0));
        slave.tick();
        assert!(slave.bus.sent().is_empty());
    }

    #[test]
    fn identity_is_rerandomized_before_the_next_outbound_frame() {
        let clock = ManualClock::new();
        let mut slave = new_slave(&clock);
        let original_sign = slave.own_sign;

        slave
            .bus
            .inject(&message::master_linkready1(OWN, Sign(0x77)));
        // Conflict is consumed and the very next outbound frame (the startup
        // beacon, sent on this same tick) already carries the new identity.
        assert_eq!(slave.tick(), Tick::Sent);
        assert!(slave.own_id != OWN || slave.own_sign != original_sign);
        assert_eq!(
            slave.bus.sent().last().unwrap(),
            &message::slave_linkready(slave.own_id, slave.own_sign)
        );
    }
}
