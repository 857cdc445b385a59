//! Protocol-wide identifiers and constants.

use std::time::Duration;

/// Four-byte protocol identifier at the start of every packet.
pub const MAGIC: [u8; 4] = [0x20, 0x24, 0x10, 0x01];

/// Server-assigned connection identifier. Clients use 0 until the
/// CONNECTION_RESPONSE arrives.
pub type ConnectionID = u64;

/// Client-assigned stream identifier.
pub type StreamID = u64;

/// `magic(4) | connectionID(8) | packetSequenceID(4) | frameCount(4)`.
pub const PACKET_HEADER_SIZE: usize = 20;

/// Initial maximum packet size before MTU discovery.
pub const MIN_PACKET_SIZE: u64 = 1200;

/// Ceiling for MTU discovery.
pub const MAX_PACKET_SIZE: u64 = 1452;

/// Largest datagram the socket layer will ever read.
pub const MAX_UDP_PAYLOAD_SIZE: usize = 1472;

pub const MAX_ACK_DELAY: Duration = Duration::from_millis(25);

pub const TIMER_GRANULARITY: Duration = Duration::from_millis(2);

/// A connection with no received packets for this long is torn down.
pub const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(30);

/// A packet is retransmitted at most this many times before it is given up.
pub const RETRANSMISSION_ATTEMPTS: u8 = 3;

pub const SEND_BUFFER_SIZE: usize = 1024 * 1024 * 7;

pub const RECEIVE_BUFFER_SIZE: usize = 1024 * 1024 * 7;
