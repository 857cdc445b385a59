//! Spectral: a reliable, connection-oriented, multi-stream transport over
//! UDP.
//!
//! One UDP socket carries one or more logical connections; each connection
//! multiplexes independently ordered byte streams with reliable, in-order
//! delivery per stream. The transport provides acknowledgement with range
//! compression, RTT estimation, Reno/CUBIC congestion control with pacing,
//! path-MTU probing and a connection-close protocol over a minimal wire
//! format. There is no encryption and no cryptographic handshake.
//!
//! Servers call [`Listener::bind`] and [`Listener::accept`]; clients call
//! [`dial`]. Both sides then open or accept [`Stream`]s on the resulting
//! [`Connection`].

mod ack_queue;
mod client;
mod closer;
pub mod congestion;
mod connection;
mod error;
mod frame;
mod listener;
mod mtu_discovery;
mod protocol;
mod receive_queue;
mod retransmission_queue;
mod ring_buffer;
mod send_queue;
mod server;
mod stream;
mod stream_map;
mod udp;

pub use client::dial;
pub use connection::Connection;
pub use error::Error;
pub use frame::connection::{CLOSE_APPLICATION, CLOSE_GRACEFUL, CLOSE_INTERNAL, CLOSE_TIMEOUT};
pub use listener::Listener;
pub use protocol::{ConnectionID, StreamID};
pub use stream::Stream;
