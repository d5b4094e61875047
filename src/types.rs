//! Core protocol types: device identities and the typed wire messages.

use rand::Rng;
use std::fmt;

/// Two-byte device identity, unique per device on a bus. Carried in network
/// order and not semantically ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TwcId(pub [u8; 2]);

impl TwcId {
    pub fn from_bytes(hi: u8, lo: u8) -> Self {
        TwcId([hi, lo])
    }

    pub fn as_bytes(&self) -> [u8; 2] {
        self.0
    }

    /// Fresh identity, used when the configured one collides with a peer.
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        TwcId([rng.gen(), rng.gen()])
    }
}

impl fmt::Display for TwcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}{:02X}", self.0[0], self.0[1])
    }
}

/// Opaque per-device sign byte carried in linkready messages. Stable across a
/// session but regenerated on an identity conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sign(pub u8);

impl Sign {
    pub fn random() -> Self {
        Sign(rand::thread_rng().gen())
    }
}

impl fmt::Display for Sign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}", self.0)
    }
}

/// Status byte a slave reports in its heartbeat.
///
/// These values must match the wall connector firmware exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SlaveStatus {
    /// Ready, no car or car done
    Ready = 0x00,
    /// Actively charging
    Charging = 0x01,
    /// Lost contact with the master
    MasterLost = 0x02,
    /// Car plugged in but not charging
    PluggedNoCharge = 0x03,
    /// Car plugged in, ready to charge
    PluggedReady = 0x04,
    /// Transient state between the others
    Transient = 0x05,
    /// Lost contact with the master while a car was plugged in
    LostWhilePlugged = 0x08,
}

impl SlaveStatus {
    pub fn from_u8(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(SlaveStatus::Ready),
            0x01 => Some(SlaveStatus::Charging),
            0x02 => Some(SlaveStatus::MasterLost),
            0x03 => Some(SlaveStatus::PluggedNoCharge),
            0x04 => Some(SlaveStatus::PluggedReady),
            0x05 => Some(SlaveStatus::Transient),
            0x08 => Some(SlaveStatus::LostWhilePlugged),
            _ => None,
        }
    }
}

/// Command byte in a master heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HeartbeatCommand {
    /// Steady-state acknowledge, zeroed payload
    Idle = 0x00,
    /// Error report (observed from real masters, never emitted)
    Error = 0x02,
    /// Advertise a new charging cap, cA in the next two bytes
    SetCap = 0x05,
}

/// A classified wire message. All current fields are centi-amps (0.01 A) as
/// carried in big-endian 16-bit fields on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Slave presence beacon, declares the hardware's maximum current
    SlaveLinkReady {
        sender: TwcId,
        sign: Sign,
        max_amps_ca: u16,
    },
    /// Slave status and current-limit report addressed to a master
    SlaveHeartbeat {
        sender: TwcId,
        receiver: TwcId,
        status: u8,
        req_max_ca: u16,
        actual_ca: u16,
        extra: [u8; 2],
    },
    /// First-stage master boot beacon
    MasterLinkReady1 { sender: TwcId, sign: Sign },
    /// Second-stage master boot beacon
    MasterLinkReady2 { sender: TwcId, sign: Sign },
    /// Master command/acknowledge addressed to one slave
    MasterHeartbeat {
        sender: TwcId,
        receiver: TwcId,
        cmd: u8,
        cap_ca: u16,
        flag: u8,
        extra: [u8; 3],
    },
    /// Periodic idle marker observed from real masters
    MasterIdle4h,
    /// Anything the decoding table does not recognize
    Unknown { raw: Vec<u8> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trip() {
        for b in [0x00u8, 0x01, 0x02, 0x03, 0x04, 0x05, 0x08] {
            let status = SlaveStatus::from_u8(b).unwrap();
            assert_eq!(status as u8, b);
        }
        assert!(SlaveStatus::from_u8(0x06).is_none());
        assert!(SlaveStatus::from_u8(0xFF).is_none());
    }

    #[test]
    fn id_formats_as_hex() {
        assert_eq!(TwcId::from_bytes(0xAB, 0xCD).to_string(), "ABCD");
        assert_eq!(Sign(0x05).to_string(), "05");
    }
}
