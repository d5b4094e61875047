//! Classification of validated frame bodies into [`Message`] values, and
//! builders producing the exact wire bytes for every outbound message.
//!
//! Body layout (unescaped, after the start marker): `type[2] sender[2]
//! slot[2] payload[7] checksum[1]`. For heartbeats the slot is the receiver
//! id; for linkready messages its first byte carries the sender's sign and
//! the advertised capability starts in the second.

use crate::codec;
use crate::constants::*;
use crate::types::{Message, Sign, TwcId};

impl Message {
    /// Classify a validated 14-byte body. Never fails; anything outside the
    /// decoding table comes back as [`Message::Unknown`].
    pub fn parse(body: &[u8; BODY_LEN]) -> Message {
        let sender = TwcId::from_bytes(body[2], body[3]);
        match [body[0], body[1]] {
            TYPE_SLAVE_LINKREADY => Message::SlaveLinkReady {
                sender,
                sign: Sign(body[4]),
                max_amps_ca: u16::from_be_bytes([body[5], body[6]]),
            },
            TYPE_SLAVE_HEARTBEAT => Message::SlaveHeartbeat {
                sender,
                receiver: TwcId::from_bytes(body[4], body[5]),
                status: body[6],
                req_max_ca: u16::from_be_bytes([body[7], body[8]]),
                actual_ca: u16::from_be_bytes([body[9], body[10]]),
                extra: [body[11], body[12]],
            },
            TYPE_MASTER_LINKREADY1 => Message::MasterLinkReady1 {
                sender,
                sign: Sign(body[4]),
            },
            TYPE_MASTER_LINKREADY2 => Message::MasterLinkReady2 {
                sender,
                sign: Sign(body[4]),
            },
            TYPE_MASTER_HEARTBEAT => Message::MasterHeartbeat {
                sender,
                receiver: TwcId::from_bytes(body[4], body[5]),
                cmd: body[6],
                cap_ca: u16::from_be_bytes([body[7], body[8]]),
                flag: body[9],
                extra: [body[10], body[11], body[12]],
            },
            TYPE_MASTER_IDLE_4H => Message::MasterIdle4h,
            _ => Message::Unknown {
                raw: body.to_vec(),
            },
        }
    }
}

fn base(msg_type: [u8; 2], sender: TwcId) -> [u8; BODY_LEN - 1] {
    let mut core = [0u8; BODY_LEN - 1];
    core[..2].copy_from_slice(&msg_type);
    core[2..4].copy_from_slice(&sender.as_bytes());
    core
}

/// First-stage master boot beacon.
pub fn master_linkready1(sender: TwcId, sign: Sign) -> Vec<u8> {
    let mut core = base(TYPE_MASTER_LINKREADY1, sender);
    core[4] = sign.0;
    codec::encode(&core)
}

/// Second-stage master boot beacon.
pub fn master_linkready2(sender: TwcId, sign: Sign) -> Vec<u8> {
    let mut core = base(TYPE_MASTER_LINKREADY2, sender);
    core[4] = sign.0;
    codec::encode(&core)
}

/// Master heartbeat. `cmd` 0x00 acknowledges steady state (zeroed payload),
/// 0x05 advertises `cap_ca` as the slave's new limit.
pub fn master_heartbeat(sender: TwcId, receiver: TwcId, cmd: u8, cap_ca: u16, flag: u8) -> Vec<u8> {
    let mut core = base(TYPE_MASTER_HEARTBEAT, sender);
    core[4..6].copy_from_slice(&receiver.as_bytes());
    core[6] = cmd;
    core[7..9].copy_from_slice(&cap_ca.to_be_bytes());
    core[9] = flag;
    codec::encode(&core)
}

/// Slave presence beacon declaring an 80.00 A capable device.
pub fn slave_linkready(sender: TwcId, sign: Sign) -> Vec<u8> {
    let mut core = base(TYPE_SLAVE_LINKREADY, sender);
    core[4] = sign.0;
    core[5..7].copy_from_slice(&SLAVE_ADVERTISED_MAX_CA.to_be_bytes());
    codec::encode(&core)
}

/// Slave status report addressed to a master.
pub fn slave_heartbeat(
    sender: TwcId,
    receiver: TwcId,
    status: u8,
    req_max_ca: u16,
    actual_ca: u16,
) -> Vec<u8> {
    let mut core = base(TYPE_SLAVE_HEARTBEAT, sender);
    core[4..6].copy_from_slice(&receiver.as_bytes());
    core[6] = status;
    core[7..9].copy_from_slice(&req_max_ca.to_be_bytes());
    core[9..11].copy_from_slice(&actual_ca.to_be_bytes());
    codec::encode(&core)
}

/// Periodic idle marker sent by real masters; all fields zero.
pub fn master_idle4h() -> Vec<u8> {
    codec::encode(&{
        let mut core = [0u8; BODY_LEN - 1];
        core[..2].copy_from_slice(&TYPE_MASTER_IDLE_4H);
        core
    })
}
