//! Server-side connection plumbing, used by the listener.

use crate::connection::{
    Connection, Engine, PACKET_CHANNEL_CAPACITY, ReceivedPacket, Role, RoleHandler, Shared,
    STREAM_REQUEST_CAPACITY,
};
use crate::protocol::{ConnectionID, StreamID};
use crate::udp::UdpConn;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::{Mutex, mpsc};

/// Server-side handle state: the queue of stream requests awaiting
/// `accept_stream`.
pub(crate) struct ServerHandle {
    pub stream_requests: Mutex<mpsc::Receiver<StreamID>>,
}

/// Creates a server connection over the listener's shared socket and spawns
/// its engine. Returns the public handle plus the packet sender the listener
/// routes datagrams through.
pub(crate) fn new_connection(
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
    connection_id: ConnectionID,
    mtud: bool,
) -> (Connection, mpsc::Sender<ReceivedPacket>) {
    let (packet_tx, packet_rx) = mpsc::channel(PACKET_CHANNEL_CAPACITY);
    let (wake_tx, wake_rx) = mpsc::channel(1);
    let (stream_requests_tx, stream_requests_rx) = mpsc::channel(STREAM_REQUEST_CAPACITY);

    let shared = Arc::new(Shared::new(UdpConn::new(socket, peer), connection_id, wake_tx));
    let handle = Arc::new(ServerHandle { stream_requests: Mutex::new(stream_requests_rx) });
    let engine = Engine::new(
        shared.clone(),
        packet_rx,
        wake_rx,
        RoleHandler::Server { stream_requests_tx },
        mtud,
    );
    tokio::spawn(engine.run());

    (Connection::new(shared, Role::Server(handle)), packet_tx)
}
