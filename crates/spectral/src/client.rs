//! Dialing side: socket setup, handshake and the client read loop.

use crate::connection::{
    Connection, Engine, PACKET_CHANNEL_CAPACITY, ReceivedPacket, Role, RoleHandler, Shared,
};
use crate::error::Error;
use crate::frame::{
    ConnectionRequest, ConnectionResponse, Frame,
    connection::{CLOSE_INTERNAL, RESPONSE_SUCCESS},
    pack,
};
use crate::protocol::StreamID;
use crate::udp::{self, UdpConn};
use dashmap::DashMap;
use log::{debug, info};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::time::Instant;

/// Client-side handle state: the handshake response slot and the routing
/// table for in-flight stream opens.
pub(crate) struct ClientHandle {
    pub response: Mutex<mpsc::Receiver<ConnectionResponse>>,
    pub stream_responses: Arc<DashMap<StreamID, oneshot::Sender<u8>>>,
    pub next_stream_id: AtomicU64,
}

/// Connects to a spectral server, completing the handshake within `timeout`.
pub async fn dial(address: &str, timeout: Duration) -> Result<Connection, Error> {
    let peer = resolve(address).await?;
    let bind_addr: SocketAddr = match peer {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    let (socket, mtud) = udp::bind(bind_addr)?;
    let socket = Arc::new(socket);

    let (packet_tx, packet_rx) = mpsc::channel(PACKET_CHANNEL_CAPACITY);
    let (wake_tx, wake_rx) = mpsc::channel(1);
    let (response_tx, response_rx) = mpsc::channel(1);
    let stream_responses = Arc::new(DashMap::new());

    let shared = Arc::new(Shared::new(UdpConn::new(socket.clone(), peer), 0, wake_tx));
    let handle = Arc::new(ClientHandle {
        response: Mutex::new(response_rx),
        stream_responses: stream_responses.clone(),
        next_stream_id: AtomicU64::new(0),
    });
    let engine = Engine::new(
        shared.clone(),
        packet_rx,
        wake_rx,
        RoleHandler::Client { response_tx, stream_responses },
        mtud,
    );
    tokio::spawn(engine.run());
    tokio::spawn(read_loop(socket, shared.clone(), packet_tx));

    let connection = Connection::new(shared.clone(), Role::Client(handle.clone()));
    info!("dialing {}", peer);
    connection.shared().write_frame(&Frame::ConnectionRequest(ConnectionRequest))?;

    let response = {
        let mut response_rx = handle.response.lock().await;
        tokio::select! {
            _ = shared.closer.closed() => Err(shared.closer.err()),
            _ = tokio::time::sleep(timeout) => Err(Error::Timeout),
            response = response_rx.recv() => response.ok_or(Error::ConnectionRefused),
        }
    };

    match response {
        Ok(fr) if fr.response == RESPONSE_SUCCESS => {
            debug!("connection established, id {}", fr.connection_id);
            Ok(connection)
        }
        Ok(_) => {
            connection.close_with_error(CLOSE_INTERNAL, "failed to open connection").await;
            Err(Error::ConnectionRefused)
        }
        Err(e) => {
            connection.close_with_error(CLOSE_INTERNAL, "dial failed").await;
            Err(e)
        }
    }
}

async fn resolve(address: &str) -> Result<SocketAddr, Error> {
    tokio::net::lookup_host(address)
        .await?
        .next()
        .ok_or_else(|| Error::Socket(format!("could not resolve {}", address)))
}

/// Reads datagrams from the dialer-owned socket into the engine until the
/// connection closes.
async fn read_loop(
    socket: Arc<UdpSocket>,
    shared: Arc<Shared>,
    packet_tx: mpsc::Sender<ReceivedPacket>,
) {
    let mut buf = vec![0u8; 1500];
    loop {
        tokio::select! {
            biased;
            _ = shared.closer.closed() => return,
            result = socket.recv_from(&mut buf) => {
                let (n, _) = match result {
                    Ok(read) => read,
                    Err(e) => {
                        debug!("socket read failed: {}", e);
                        shared.internal_close(e.into());
                        return;
                    }
                };
                if n == 0 {
                    continue;
                }

                match pack::unpack(&buf[..n]) {
                    Ok((_, sequence_id, frames)) => {
                        let packet = ReceivedPacket { sequence_id, frames, now: Instant::now() };
                        if packet_tx.send(packet).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => debug!("dropping undecodable datagram: {}", e),
                }
            }
        }
    }
}
