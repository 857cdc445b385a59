//! The server listener: demultiplexes inbound datagrams to connections by
//! connection ID and creates connections lazily on CONNECTION_REQUEST.

use crate::closer::Closer;
use crate::connection::{Connection, ReceivedPacket, Shared};
use crate::error::Error;
use crate::frame::{Frame, connection::CLOSE_GRACEFUL, pack, pool};
use crate::protocol::{ConnectionID, MAX_UDP_PAYLOAD_SIZE};
use crate::server;
use dashmap::DashMap;
use log::{debug, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::UdpSocket;
use tokio::sync::{Mutex, mpsc};
use tokio::time::Instant;

const INCOMING_CAPACITY: usize = 100;

struct ConnectionEntry {
    packet_tx: mpsc::Sender<ReceivedPacket>,
    shared: Arc<Shared>,
}

/// Accepts spectral connections on a single UDP socket.
pub struct Listener {
    socket: Arc<UdpSocket>,
    connections: Arc<DashMap<ConnectionID, ConnectionEntry>>,
    incoming: Mutex<mpsc::Receiver<Connection>>,
    closer: Arc<Closer>,
}

impl Listener {
    /// Binds the socket and starts the demultiplexing read loop.
    pub async fn bind(address: &str) -> Result<Listener, Error> {
        let addr: SocketAddr = tokio::net::lookup_host(address)
            .await?
            .next()
            .ok_or_else(|| Error::Socket(format!("could not resolve {}", address)))?;
        let (socket, mtud) = crate::udp::bind(addr)?;
        let socket = Arc::new(socket);
        info!("listener bound to {}", socket.local_addr()?);

        let connections = Arc::new(DashMap::new());
        let (incoming_tx, incoming_rx) = mpsc::channel(INCOMING_CAPACITY);
        let closer = Arc::new(Closer::new());

        tokio::spawn(read_loop(ReadLoop {
            socket: socket.clone(),
            connections: connections.clone(),
            by_addr: Arc::new(DashMap::new()),
            incoming_tx,
            closer: closer.clone(),
            next_connection_id: AtomicU64::new(1),
            mtud,
        }));

        Ok(Listener { socket, connections, incoming: Mutex::new(incoming_rx), closer })
    }

    /// Waits for the next incoming connection.
    pub async fn accept(&self) -> Result<Connection, Error> {
        let mut incoming = self.incoming.lock().await;
        tokio::select! {
            _ = self.closer.closed() => Err(self.closer.err()),
            connection = incoming.recv() => connection.ok_or_else(|| self.closer.err()),
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.socket.local_addr()?)
    }

    /// Closes the listener and gracefully closes every live connection.
    pub async fn close(&self) {
        if !self.closer.close(Error::Closed("listener closed".to_string())) {
            return;
        }
        info!("listener closing");
        let entries: Vec<Arc<Shared>> =
            self.connections.iter().map(|entry| entry.value().shared.clone()).collect();
        for shared in entries {
            let close = Frame::ConnectionClose(crate::frame::ConnectionClose {
                code: CLOSE_GRACEFUL,
                message: "closed listener".to_string(),
            });
            let _ = shared.write_unreliable(&close).await;
            shared.internal_close(Error::Closed("closed listener".to_string()));
        }
        self.connections.clear();
    }
}

struct ReadLoop {
    socket: Arc<UdpSocket>,
    connections: Arc<DashMap<ConnectionID, ConnectionEntry>>,
    /// Pre-handshake traffic still carries connection ID 0; route it by the
    /// peer address until the client learns its assigned ID.
    by_addr: Arc<DashMap<SocketAddr, ConnectionID>>,
    incoming_tx: mpsc::Sender<Connection>,
    closer: Arc<Closer>,
    next_connection_id: AtomicU64,
    mtud: bool,
}

async fn read_loop(state: ReadLoop) {
    let mut buf = vec![0u8; MAX_UDP_PAYLOAD_SIZE];
    loop {
        let (n, addr) = tokio::select! {
            biased;
            _ = state.closer.closed() => return,
            result = state.socket.recv_from(&mut buf) => match result {
                Ok(read) => read,
                Err(e) => {
                    warn!("listener socket read failed: {}", e);
                    state.closer.close(e.into());
                    return;
                }
            },
        };
        if n == 0 {
            continue;
        }

        let (connection_id, sequence_id, frames) = match pack::unpack(&buf[..n]) {
            Ok(decoded) => decoded,
            Err(e) => {
                debug!("dropping undecodable datagram from {}: {}", addr, e);
                continue;
            }
        };
        let packet = ReceivedPacket { sequence_id, frames, now: Instant::now() };

        if connection_id != 0 {
            match state.connections.get(&connection_id) {
                Some(entry) => deliver(entry.value(), packet),
                // Unknown connection IDs are dropped silently.
                None => discard(packet),
            }
            continue;
        }

        // Connection ID 0: either a known pre-handshake peer or a new dial.
        if let Some(id) = state.by_addr.get(&addr).map(|entry| *entry.value()) {
            if let Some(entry) = state.connections.get(&id) {
                deliver(entry.value(), packet);
                continue;
            }
        }

        let is_request = packet.frames.iter().any(|fr| matches!(fr, Frame::ConnectionRequest(_)));
        if !is_request {
            discard(packet);
            continue;
        }

        let id = state.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let (connection, packet_tx) =
            server::new_connection(state.socket.clone(), addr, id, state.mtud);
        info!("accepted connection {} from {}", id, addr);

        let shared = connection.shared().clone();
        state.connections.insert(id, ConnectionEntry { packet_tx: packet_tx.clone(), shared: shared.clone() });
        state.by_addr.insert(addr, id);

        // Drop the routing entries once the connection dies.
        {
            let connections = state.connections.clone();
            let by_addr = state.by_addr.clone();
            let shared = shared.clone();
            tokio::spawn(async move {
                shared.closer.closed().await;
                connections.remove(&id);
                by_addr.remove_if(&addr, |_, mapped| *mapped == id);
            });
        }

        if state.incoming_tx.try_send(connection).is_err() {
            warn!("accept backlog full, refusing connection {}", id);
            shared.internal_close(Error::Closed("accept backlog full".to_string()));
            state.connections.remove(&id);
            state.by_addr.remove(&addr);
            continue;
        }

        let entry = ConnectionEntry { packet_tx, shared };
        deliver(&entry, packet);
    }
}

fn deliver(entry: &ConnectionEntry, packet: ReceivedPacket) {
    if let Err(e) = entry.packet_tx.try_send(packet) {
        let packet = match e {
            mpsc::error::TrySendError::Full(packet) => {
                debug!("connection {} packet backlog full, dropping datagram", entry.shared.connection_id());
                packet
            }
            mpsc::error::TrySendError::Closed(packet) => packet,
        };
        discard(packet);
    }
}

fn discard(packet: ReceivedPacket) {
    for fr in packet.frames {
        pool::recycle(fr);
    }
}
