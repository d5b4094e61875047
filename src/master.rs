//! Master state machine and the cooperative scheduling loop.
//!
//! Single-threaded: the outer tick drains whatever inbound bytes are
//! available, and only when the bus is quiescent performs one unit of work
//! (a startup linkready, one round-robin heartbeat, or a power-source poll).
//! Nothing is transmitted while a partial inbound frame is buffered; the bus
//! is half-duplex.

use crate::clock::{Clock, Timestamp};
use crate::codec::{self, FrameDecoder};
use crate::constants::*;
use crate::error::Result;
use crate::message;
use crate::policy;
use crate::power::PowerSource;
use crate::registry::SlaveRegistry;
use crate::transport::Bus;
use crate::types::{HeartbeatCommand, Message, Sign, SlaveStatus, TwcId};
use log::{debug, error, info, warn};
use std::collections::VecDeque;
use std::thread;

/// Where the master is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Announcing ourselves with the linkready bursts
    Booting,
    /// Normal operation: heartbeats and power polls
    Cruising,
}

/// What one outer tick did, which tells the loop how long to yield.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// A frame is partially buffered; back off briefly and re-read
    MidFrame,
    /// A frame went out; give the peer time to reply
    Sent,
    /// Nothing to do
    Idle,
}

pub struct Master<B: Bus, C: Clock> {
    bus: B,
    clock: C,
    decoder: FrameDecoder,
    pending: VecDeque<[u8; BODY_LEN]>,
    registry: SlaveRegistry,
    power: PowerSource,
    own_id: TwcId,
    own_sign: Sign,
    wiring_cap_a: i32,
    global_cap_ca: i32,
    startup_msgs_left: u8,
    last_tx_at: Timestamp,
    last_power_poll_at: Timestamp,
}

impl<B: Bus, C: Clock> Master<B, C> {
    pub fn new(
        bus: B,
        clock: C,
        power: PowerSource,
        own_id: TwcId,
        own_sign: Sign,
        wiring_cap_a: i32,
    ) -> Self {
        Self {
            bus,
            clock,
            decoder: FrameDecoder::new(),
            pending: VecDeque::new(),
            registry: SlaveRegistry::new(),
            power,
            own_id,
            own_sign,
            wiring_cap_a,
            global_cap_ca: INITIAL_GLOBAL_CAP_CA,
            startup_msgs_left: STARTUP_LINKREADY_COUNT,
            last_tx_at: Timestamp::ZERO,
            last_power_poll_at: Timestamp::ZERO,
        }
    }

    pub fn phase(&self) -> Phase {
        if self.startup_msgs_left > 0 {
            Phase::Booting
        } else {
            Phase::Cruising
        }
    }

    /// Run forever. Exits only if the caller interrupts the process; all
    /// protocol-level failures degrade and continue.
    pub fn run(&mut self) -> Result<()> {
        info!(
            "Master {} (sign {}) online, wiring limit {} A",
            self.own_id, self.own_sign, self.wiring_cap_a
        );
        loop {
            match self.tick() {
                Tick::MidFrame => thread::sleep(MID_FRAME_BACKOFF),
                Tick::Sent => thread::sleep(POST_TX_SETTLE),
                // The transport's read timeout paces the idle loop.
                Tick::Idle => {}
            }
        }
    }

    /// One outer scheduling tick: drain all currently available inbound
    /// bytes, then - only if the bus is quiescent - handle the buffered
    /// frames and perform one unit of scheduled work.
    ///
    /// # Returns
    /// What happened, so the caller can pick the right backoff.
    pub fn tick(&mut self) -> Tick {
        while let Some(byte) = self.bus.read_byte() {
            if let Some(body) = self.decoder.push(byte) {
                self.pending.push_back(body);
            }
        }
        if self.decoder.mid_frame() {
            return Tick::MidFrame;
        }
        let mut replied = false;
        while let Some(body) = self.pending.pop_front() {
            replied |= self.handle_frame(&body);
        }
        if replied {
            return Tick::Sent;
        }

        if self.startup_msgs_left > 0 {
            self.send_startup_linkready();
            return Tick::Sent;
        }

        let now = self.clock.now();
        if now.since(self.last_tx_at) > HEARTBEAT_INTERVAL
            && !self.registry.is_empty()
            && self.round_robin_heartbeat(now)
        {
            return Tick::Sent;
        }

        if now.since(self.last_power_poll_at) > POWER_POLL_INTERVAL {
            self.global_cap_ca = self.power.poll(self.clock.local_hour(), self.global_cap_ca);
            self.last_power_poll_at = now;
        }
        Tick::Idle
    }

    fn transmit(&mut self, frame: &[u8]) {
        if let Err(e) = self.bus.write_frame(frame) {
            warn!("Frame write failed, peers will re-sync: {}", e);
        }
        self.last_tx_at = self.clock.now();
    }

    fn send_startup_linkready(&mut self) {
        let frame = if self.startup_msgs_left > STARTUP_LINKREADY_COUNT / 2 {
            message::master_linkready1(self.own_id, self.own_sign)
        } else {
            message::master_linkready2(self.own_id, self.own_sign)
        };
        self.startup_msgs_left -= 1;
        if self.startup_msgs_left == 0 {
            info!("Linkready burst complete, cruising");
        }
        self.transmit(&frame);
    }

    /// Service the next slave in rotation: expire it if silent, otherwise
    /// send it a heartbeat. Returns whether a frame went out.
    fn round_robin_heartbeat(&mut self, now: Timestamp) -> bool {
        let Some(id) = self.registry.next_round_robin() else {
            return false;
        };
        let (last_rx_at, seeded, reported) = {
            let rec = self.registry.get(id).expect("cursor returned a live id");
            (rec.last_rx_at, rec.req_max_ca.is_some(), rec.reported_req_ca)
        };

        if now.since(last_rx_at) > SLAVE_TIMEOUT {
            warn!(
                "Slave {} silent for {:?}, dropping it",
                id,
                now.since(last_rx_at)
            );
            self.registry.remove(id);
            return false;
        }

        let frame = if !seeded {
            // Linked but no heartbeat yet; plain keep-alive.
            message::master_heartbeat(self.own_id, id, HeartbeatCommand::Idle as u8, 0, 0)
        } else {
            let desired = policy::allocate(
                &mut self.registry,
                id,
                &mut self.global_cap_ca,
                self.wiring_cap_a,
                now,
            );
            if Some(desired) != reported {
                message::master_heartbeat(
                    self.own_id,
                    id,
                    HeartbeatCommand::SetCap as u8,
                    desired.max(0) as u16,
                    0,
                )
            } else {
                message::master_heartbeat(self.own_id, id, HeartbeatCommand::Idle as u8, 0, 0)
            }
        };
        self.transmit(&frame);
        true
    }

    /// Returns whether a reply was transmitted.
    fn handle_frame(&mut self, body: &[u8; BODY_LEN]) -> bool {
        let now = self.clock.now();
        match Message::parse(body) {
            Message::SlaveLinkReady {
                sender,
                sign,
                max_amps_ca,
            } => {
                if sender == self.own_id {
                    error!(
                        "Slave linkready mirrors our own id {}; restarting linkready burst",
                        sender
                    );
                    self.startup_msgs_left = STARTUP_LINKREADY_COUNT;
                    return false;
                }
                debug!(
                    "Slave {} (sign {}) ready, hardware limit {} cA",
                    sender, sign, max_amps_ca
                );
                self.registry.upsert(sender, now);
                // Greet immediately so the slave latches onto this master.
                let frame =
                    message::master_heartbeat(self.own_id, sender, HeartbeatCommand::Idle as u8, 0, 0);
                self.transmit(&frame);
                true
            }
            Message::SlaveHeartbeat {
                sender,
                receiver,
                status,
                req_max_ca,
                actual_ca,
                ..
            } => {
                if receiver != self.own_id {
                    debug!(
                        "Slave {} heartbeat addressed to {}, not us; ignoring",
                        sender, receiver
                    );
                    return false;
                }
                let Some(rec) = self.registry.get_mut(sender) else {
                    error!("Heartbeat from unknown slave {}, dropping", sender);
                    return false;
                };
                rec.observe_heartbeat(req_max_ca, actual_ca, now);
                match SlaveStatus::from_u8(status) {
                    Some(state) => debug!(
                        "Slave {} {:?}, reports max {} cA, drawing {} cA",
                        sender, state, req_max_ca, actual_ca
                    ),
                    None => warn!("Slave {} reports unrecognized status {:#04X}", sender, status),
                }
                let desired = policy::allocate(
                    &mut self.registry,
                    sender,
                    &mut self.global_cap_ca,
                    self.wiring_cap_a,
                    now,
                );
                let frame = if desired != i32::from(req_max_ca) {
                    message::master_heartbeat(
                        self.own_id,
                        sender,
                        HeartbeatCommand::SetCap as u8,
                        desired.max(0) as u16,
                        0,
                    )
                } else {
                    message::master_heartbeat(self.own_id, sender, HeartbeatCommand::Idle as u8, 0, 0)
                };
                self.transmit(&frame);
                true
            }
            Message::MasterLinkReady1 { sender, .. } | Message::MasterLinkReady2 { sender, .. } => {
                if sender != self.own_id {
                    warn!("Another master ({}) is announcing on this bus", sender);
                }
                false
            }
            Message::MasterHeartbeat { sender, .. } => {
                if sender != self.own_id {
                    warn!("Another master ({}) is issuing heartbeats", sender);
                }
                false
            }
            Message::MasterIdle4h => {
                debug!("Idle-4h marker seen");
                false
            }
            Message::Unknown { raw } => {
                info!("Unclassified frame: {}", codec::hex(&raw));
                false
            }
        }
    }
}
