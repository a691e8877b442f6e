//! Packets and flow identification.

use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::types::{EntityId, SimTime};

/// Transport protocol of a flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Udp,
    Tcp,
}

impl Protocol {
    /// IANA protocol number.
    pub fn number(self) -> u8 {
        match self {
            Protocol::Tcp => 6,
            Protocol::Udp => 17,
        }
    }
}

/// The 5-tuple identifying a flow.
///
/// Ordering is lexicographic over the fields, which gives reports a stable
/// iteration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FlowKey {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub protocol: Protocol,
    pub src_port: u16,
    pub dst_port: u16,
}

impl FlowKey {
    /// Creates a UDP flow key.
    pub fn udp(src: Ipv4Addr, src_port: u16, dst: Ipv4Addr, dst_port: u16) -> Self {
        Self {
            src,
            dst,
            protocol: Protocol::Udp,
            src_port,
            dst_port,
        }
    }

    /// Returns the key of the opposite direction.
    pub fn reversed(&self) -> Self {
        Self {
            src: self.dst,
            dst: self.src,
            protocol: self.protocol,
            src_port: self.dst_port,
            dst_port: self.src_port,
        }
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{} ({:?})",
            self.src, self.src_port, self.dst, self.dst_port, self.protocol
        )
    }
}

/// A packet in flight.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    /// Unique id within the run
    pub uid: u64,
    /// Flow this packet belongs to
    pub flow: FlowKey,
    /// Size on the wire, in bytes
    pub size_bytes: u32,
    /// Time the packet was handed to the channel
    pub sent_at: SimTime,
    /// Sending entity
    pub source: EntityId,
    /// Receiving entity
    pub destination: EntityId,
}

impl Packet {
    /// Size in bits.
    pub fn size_bits(&self) -> u64 {
        self.size_bytes as u64 * 8
    }
}
