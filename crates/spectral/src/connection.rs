//! The per-connection transport engine.
//!
//! A single tokio task owns all mutable engine state: the packet sequence
//! counter, sender, RTT estimator, ack/receive/retransmission queues and MTU
//! discovery. Its only inputs are the inbound-packet channel, a one-slot
//! wake channel nudged by stream writes, and one coalesced timer.

use crate::ack_queue::{ACK_RANGE_CHUNK, AckQueue};
use crate::client::ClientHandle;
use crate::closer::Closer;
use crate::congestion::{Rtt, Sender};
use crate::error::Error;
use crate::frame::{
    ConnectionClose, ConnectionResponse, Frame, MtuResponse, StreamResponse, pack, pool,
    connection::{CLOSE_INTERNAL, CLOSE_TIMEOUT, RESPONSE_SUCCESS},
};
use crate::mtu_discovery::MtuDiscovery;
use crate::protocol::{
    ConnectionID, INACTIVITY_TIMEOUT, MIN_PACKET_SIZE, PACKET_HEADER_SIZE, StreamID,
};
use crate::receive_queue::ReceiveQueue;
use crate::retransmission_queue::{RetransmissionQueue, Shift};
use crate::send_queue::SendQueue;
use crate::server::ServerHandle;
use crate::stream::Stream;
use crate::stream_map::StreamMap;
use crate::udp::UdpConn;
use dashmap::DashMap;
use log::{debug, info, trace, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep_until};

pub(crate) const PACKET_CHANNEL_CAPACITY: usize = 512;
pub(crate) const STREAM_REQUEST_CAPACITY: usize = 100;

/// One decoded datagram on its way into the engine.
#[derive(Debug)]
pub(crate) struct ReceivedPacket {
    pub sequence_id: u32,
    pub frames: Vec<Frame>,
    pub now: Instant,
}

/// The thread-safe half of a connection, shared between the engine task,
/// streams and the public handle. Everything else belongs to the engine.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) conn: UdpConn,
    pub(crate) connection_id: AtomicU64,
    pub(crate) send_queue: SendQueue,
    pub(crate) streams: StreamMap,
    pub(crate) closer: Closer,
    wake_tx: mpsc::Sender<()>,
}

impl Shared {
    pub fn new(conn: UdpConn, connection_id: ConnectionID, wake_tx: mpsc::Sender<()>) -> Self {
        Self {
            conn,
            connection_id: AtomicU64::new(connection_id),
            send_queue: SendQueue::new(),
            streams: StreamMap::new(),
            closer: Closer::new(),
            wake_tx,
        }
    }

    pub fn connection_id(&self) -> ConnectionID {
        self.connection_id.load(Ordering::Relaxed)
    }

    /// Nudges the engine without blocking; a full wake slot means a nudge is
    /// already pending.
    pub fn wake(&self) {
        let _ = self.wake_tx.try_send(());
    }

    /// Queues an encoded frame for reliable delivery. The engine assigns the
    /// packet sequence ID when it transmits.
    pub fn write_frame(&self, fr: &Frame) -> Result<(), Error> {
        if self.closer.is_closed() {
            return Err(self.closer.err());
        }
        self.send_queue.add(pack::pack_single(fr)?);
        self.wake();
        Ok(())
    }

    /// Writes a single-frame packet with sequence ID 0: never acked, never
    /// retransmitted.
    pub async fn write_unreliable(&self, fr: &Frame) -> Result<(), Error> {
        let body = pack::pack_single(fr)?;
        let pk = pack::pack(self.connection_id(), 0, 1, &body);
        self.conn.send(&pk).await
    }

    /// Single-shot teardown shared by local close, peer close and timeout.
    pub fn internal_close(&self, cause: Error) {
        if !self.closer.close(cause) {
            return;
        }
        info!("connection {} closed: {}", self.connection_id(), self.closer.err());
        for stream in self.streams.all() {
            stream.internal_close(self.closer.err());
        }
        log::logger().flush();
    }
}

/// Role-specific frame routing: the client resolves connection/stream open
/// responses, the server answers connection/stream requests.
pub(crate) enum RoleHandler {
    Client {
        response_tx: mpsc::Sender<ConnectionResponse>,
        stream_responses: Arc<DashMap<StreamID, oneshot::Sender<u8>>>,
    },
    Server {
        stream_requests_tx: mpsc::Sender<StreamID>,
    },
}

pub(crate) struct Engine {
    shared: Arc<Shared>,
    packet_rx: mpsc::Receiver<ReceivedPacket>,
    wake_rx: mpsc::Receiver<()>,
    handler: RoleHandler,
    sequence_id: u32,
    sender: Sender,
    rtt: Rtt,
    ack: AckQueue,
    received: ReceiveQueue,
    retransmission: RetransmissionQueue,
    mtu: MtuDiscovery,
    idle_deadline: Instant,
    pacing_deadline: Option<Instant>,
}

impl Engine {
    pub fn new(
        shared: Arc<Shared>,
        packet_rx: mpsc::Receiver<ReceivedPacket>,
        wake_rx: mpsc::Receiver<()>,
        handler: RoleHandler,
        mtud: bool,
    ) -> Self {
        let now = Instant::now();
        Self {
            shared,
            packet_rx,
            wake_rx,
            handler,
            sequence_id: 0,
            sender: Sender::new_reno(now, MIN_PACKET_SIZE),
            rtt: Rtt::new(),
            ack: AckQueue::new(),
            received: ReceiveQueue::new(),
            retransmission: RetransmissionQueue::new(),
            mtu: MtuDiscovery::new(now, mtud),
            idle_deadline: now + INACTIVITY_TIMEOUT,
            pacing_deadline: None,
        }
    }

    pub async fn run(mut self) {
        if let Err(e) = self.run_loop().await {
            warn!("connection {} engine failed: {}", self.shared.connection_id(), e);
            let close = Frame::ConnectionClose(ConnectionClose {
                code: CLOSE_INTERNAL,
                message: String::new(),
            });
            let _ = self.write_control(Instant::now(), &close, false).await;
            self.shared.internal_close(e);
        }
        self.cleanup();
    }

    async fn run_loop(&mut self) -> Result<(), Error> {
        loop {
            if self.shared.closer.is_closed() {
                return Ok(());
            }

            let now = Instant::now();
            self.maybe_send(now).await?;
            self.acknowledge(now).await?;

            let deadline = self.next_deadline();
            tokio::select! {
                biased;
                _ = self.shared.closer.closed() => return Ok(()),
                packet = self.packet_rx.recv() => {
                    let Some(packet) = packet else { return Ok(()) };
                    // Drain greedily, but only what was queued on entry.
                    let mut pending = self.packet_rx.len();
                    self.receive(packet).await?;
                    while pending > 0 {
                        let Ok(packet) = self.packet_rx.try_recv() else { break };
                        self.receive(packet).await?;
                        pending -= 1;
                    }
                }
                _ = self.wake_rx.recv() => {}
                _ = sleep_until(deadline) => self.trigger_timer(Instant::now()).await?,
            }
        }
    }

    /// Emits a due MTU probe, then drains the send queue while the
    /// congestion window and the pacer allow.
    async fn maybe_send(&mut self, now: Instant) -> Result<(), Error> {
        if let Some(size) = self.mtu.poll_probe(now, self.rtt.smoothed()) {
            trace!("connection {} probing mtu {}", self.shared.connection_id(), size);
            self.write_control(now, &Frame::MtuRequest(crate::frame::MtuRequest { mtu: size }), false)
                .await?;
        }

        self.pacing_deadline = None;
        while self.shared.send_queue.available() {
            let window = self.sender.available();
            let (count, body) = self.shared.send_queue.pack(window);
            if count == 0 {
                // The head frame does not fit the congestion window; wait
                // for acknowledgements, not for a deadline.
                break;
            }

            let bytes = (body.len() + PACKET_HEADER_SIZE) as u64;
            if let Some(at) = self.sender.time_until_send(now, &self.rtt, bytes) {
                self.pacing_deadline = Some(at);
                break;
            }

            self.transmit(now, count, &body).await?;
            self.shared.send_queue.flush();
        }
        Ok(())
    }

    async fn transmit(&mut self, now: Instant, count: u32, body: &[u8]) -> Result<(), Error> {
        self.sequence_id += 1;
        let sequence_id = self.sequence_id;
        let pk = pack::pack(self.shared.connection_id(), sequence_id, count, body);
        self.shared.conn.send(&pk).await?;
        trace!(
            "connection {} sent packet {} ({} frames, {} bytes)",
            self.shared.connection_id(),
            sequence_id,
            count,
            pk.len()
        );
        self.sender.on_send(pk.len() as u64);
        self.retransmission.add(now, sequence_id, pk);
        Ok(())
    }

    /// Flushes due acknowledgement ranges as unreliable ACK frames, chunked
    /// at 128 ranges per packet.
    async fn acknowledge(&mut self, now: Instant) -> Result<(), Error> {
        while let Some((ranges, delay, max)) = self.ack.flush(now, ACK_RANGE_CHUNK, false) {
            let fr = Frame::Acknowledgement(crate::frame::Acknowledgement { delay, max, ranges });
            self.write_control(now, &fr, false).await?;
            pool::recycle(fr);
        }
        Ok(())
    }

    /// Writes a single-frame packet immediately. With `needs_ack` the packet
    /// takes a fresh sequence ID and is registered for retransmission;
    /// without, it goes out as unreliable control (sequence 0).
    async fn write_control(&mut self, now: Instant, fr: &Frame, needs_ack: bool) -> Result<(), Error> {
        let body = pack::pack_single(fr)?;
        let sequence_id = if needs_ack {
            self.sequence_id += 1;
            self.sequence_id
        } else {
            0
        };
        let pk = pack::pack(self.shared.connection_id(), sequence_id, 1, &body);
        self.shared.conn.send(&pk).await?;
        if needs_ack {
            self.sender.on_send(pk.len() as u64);
            self.retransmission.add(now, sequence_id, pk);
        }
        Ok(())
    }

    fn next_deadline(&self) -> Instant {
        let mut deadline = self.idle_deadline;
        if let Some(at) = self.ack.next() {
            deadline = deadline.min(at);
        }
        if let Some(at) = self.retransmission.next(self.rtt.rto()) {
            deadline = deadline.min(at);
        }
        if let Some(at) = self.pacing_deadline {
            deadline = deadline.min(at);
        }
        deadline
    }

    async fn trigger_timer(&mut self, now: Instant) -> Result<(), Error> {
        if self.idle_deadline <= now {
            debug!("connection {} idle timeout", self.shared.connection_id());
            let close = Frame::ConnectionClose(ConnectionClose {
                code: CLOSE_TIMEOUT,
                message: "network inactivity".to_string(),
            });
            let _ = self.write_control(now, &close, false).await;
            self.shared.internal_close(Error::Timeout);
            return Ok(());
        }
        self.retransmit(now).await
    }

    /// Resends the oldest overdue packet, if any, and signals congestion
    /// with its superseded send time.
    async fn retransmit(&mut self, now: Instant) -> Result<(), Error> {
        match self.retransmission.shift(now, self.rtt.rto()) {
            Some(Shift::Resend { payload, previous }) => {
                debug!("connection {} retransmitting {} bytes", self.shared.connection_id(), payload.len());
                self.sender.on_congestion_event(now, previous);
                self.shared.conn.send(&payload).await?;
            }
            Some(Shift::Expired { bytes }) => {
                warn!(
                    "connection {} gave up on a packet after {} attempts",
                    self.shared.connection_id(),
                    crate::protocol::RETRANSMISSION_ATTEMPTS
                );
                self.sender.on_packet_discarded(bytes);
            }
            None => {}
        }
        Ok(())
    }

    /// Ingests one decoded packet: duplicate suppression and ack scheduling
    /// first, then frame dispatch.
    async fn receive(&mut self, packet: ReceivedPacket) -> Result<(), Error> {
        let ReceivedPacket { sequence_id, frames, now } = packet;
        self.idle_deadline = now + INACTIVITY_TIMEOUT;

        if sequence_id != 0 {
            // Always schedule an acknowledgement; a duplicate usually means
            // the peer lost our ACK. `add` is idempotent on range membership.
            self.ack.add(now, sequence_id);
            if !self.received.add(sequence_id) {
                debug!(
                    "connection {} dropping duplicate packet {}",
                    self.shared.connection_id(),
                    sequence_id
                );
                for fr in frames {
                    pool::recycle(fr);
                }
                return Ok(());
            }
        }

        for fr in frames {
            self.handle(fr, now).await?;
        }
        debug_assert_eq!(
            self.sender.flight(),
            self.retransmission.total_bytes(),
            "in-flight bytes out of sync with unacked retransmission bytes"
        );
        Ok(())
    }

    async fn handle(&mut self, fr: Frame, now: Instant) -> Result<(), Error> {
        match fr {
            Frame::Acknowledgement(fr) => {
                for range in &fr.ranges {
                    for sequence_id in range.lo..=range.hi {
                        let Some(entry) = self.retransmission.remove(sequence_id) else {
                            continue;
                        };
                        if sequence_id == fr.max {
                            let delay = Duration::from_micros(fr.delay.max(0) as u64);
                            self.rtt.add(now.saturating_duration_since(entry.sent), delay);
                        }
                        self.sender.on_ack(now, entry.sent, &self.rtt, entry.payload.len() as u64);
                    }
                }
                pool::recycle(Frame::Acknowledgement(fr));
            }
            Frame::ConnectionClose(fr) => {
                debug!(
                    "connection {} closed by peer (code {}): {}",
                    self.shared.connection_id(),
                    fr.code,
                    fr.message
                );
                self.shared.internal_close(Error::ClosedByPeer(fr.message));
            }
            Frame::StreamData(fr) => {
                if let Some(stream) = self.shared.streams.get(fr.stream_id) {
                    stream.receive(fr.sequence_id, &fr.payload);
                }
                pool::recycle(Frame::StreamData(fr));
            }
            Frame::StreamClose(fr) => {
                if let Some(stream) = self.shared.streams.get(fr.stream_id) {
                    stream.internal_close(Error::Closed("stream closed by peer".to_string()));
                }
            }
            Frame::MtuRequest(fr) => {
                self.write_control(now, &Frame::MtuResponse(MtuResponse { mtu: fr.mtu }), false)
                    .await?;
            }
            Frame::MtuResponse(fr) => {
                if let Some(mss) = self.mtu.on_ack(fr.mtu) {
                    debug!("connection {} raised mss to {}", self.shared.connection_id(), mss);
                    self.sender.set_mss(mss);
                    self.shared.send_queue.set_mss(mss);
                }
            }
            Frame::ConnectionRequest(_) => {
                if let RoleHandler::Server { .. } = self.handler {
                    let response = Frame::ConnectionResponse(ConnectionResponse {
                        connection_id: self.shared.connection_id(),
                        response: RESPONSE_SUCCESS,
                    });
                    self.write_control(now, &response, true).await?;
                }
            }
            Frame::ConnectionResponse(fr) => {
                if let RoleHandler::Client { response_tx, .. } = &self.handler {
                    if fr.response == RESPONSE_SUCCESS {
                        self.shared.connection_id.store(fr.connection_id, Ordering::Relaxed);
                    }
                    let _ = response_tx.try_send(fr);
                }
            }
            Frame::StreamRequest(fr) => {
                if let RoleHandler::Server { stream_requests_tx } = &self.handler {
                    if stream_requests_tx.try_send(fr.stream_id).is_err() {
                        warn!(
                            "connection {} dropping stream request {}: accept backlog full",
                            self.shared.connection_id(),
                            fr.stream_id
                        );
                    }
                }
            }
            Frame::StreamResponse(fr) => {
                if let RoleHandler::Client { stream_responses, .. } = &self.handler {
                    if let Some((_, tx)) = stream_responses.remove(&fr.stream_id) {
                        let _ = tx.send(fr.response);
                    } else {
                        debug!(
                            "connection {} ignoring late stream response {}",
                            self.shared.connection_id(),
                            fr.stream_id
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// Post-loop teardown: release queues and drain the packet channel.
    fn cleanup(&mut self) {
        self.shared.internal_close(Error::Closed("connection closed".to_string()));
        self.retransmission.clear();
        self.shared.send_queue.clear();
        if let RoleHandler::Client { stream_responses, .. } = &self.handler {
            stream_responses.clear();
        }
        self.packet_rx.close();
        while let Ok(packet) = self.packet_rx.try_recv() {
            for fr in packet.frames {
                pool::recycle(fr);
            }
        }
        log::logger().flush();
    }
}

/// Role of a connection's public handle.
#[derive(Clone)]
pub(crate) enum Role {
    Client(Arc<ClientHandle>),
    Server(Arc<ServerHandle>),
}

/// A spectral connection. Cheap to clone; all clones refer to the same
/// underlying transport state.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
    role: Role,
}

impl Connection {
    pub(crate) fn new(shared: Arc<Shared>, role: Role) -> Self {
        Self { shared, role }
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    /// Opens a new outgoing stream. Client connections only.
    pub async fn open_stream(&self) -> Result<Arc<Stream>, Error> {
        let Role::Client(handle) = &self.role else {
            return Err(Error::Unsupported);
        };
        if self.shared.closer.is_closed() {
            return Err(self.shared.closer.err());
        }

        let stream_id = handle.next_stream_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        handle.stream_responses.insert(stream_id, tx);
        debug!("connection {} requesting stream {}", self.shared.connection_id(), stream_id);

        if let Err(e) = self
            .shared
            .write_frame(&Frame::StreamRequest(crate::frame::StreamRequest { stream_id }))
        {
            handle.stream_responses.remove(&stream_id);
            return Err(e);
        }

        let response = tokio::select! {
            _ = self.shared.closer.closed() => {
                handle.stream_responses.remove(&stream_id);
                return Err(self.shared.closer.err());
            }
            response = rx => response,
        };
        match response {
            Ok(code) if code == RESPONSE_SUCCESS => self.create_stream(stream_id),
            Ok(_) => Err(Error::OpenStreamFailed),
            Err(_) => Err(self.shared.closer.err()),
        }
    }

    /// Accepts the next stream requested by the peer. Server connections
    /// only.
    pub async fn accept_stream(&self) -> Result<Arc<Stream>, Error> {
        let Role::Server(handle) = &self.role else {
            return Err(Error::Unsupported);
        };

        let mut requests = handle.stream_requests.lock().await;
        let stream_id = tokio::select! {
            _ = self.shared.closer.closed() => return Err(self.shared.closer.err()),
            request = requests.recv() => request.ok_or_else(|| self.shared.closer.err())?,
        };
        drop(requests);

        let stream = self.create_stream(stream_id)?;
        self.shared.write_frame(&Frame::StreamResponse(StreamResponse {
            stream_id,
            response: RESPONSE_SUCCESS,
        }))?;
        debug!("connection {} accepted stream {}", self.shared.connection_id(), stream_id);
        Ok(stream)
    }

    /// Sends CONNECTION_CLOSE (best effort) and tears the connection down.
    pub async fn close_with_error(&self, code: u8, message: &str) {
        let _ = self
            .shared
            .write_unreliable(&Frame::ConnectionClose(ConnectionClose {
                code,
                message: message.to_string(),
            }))
            .await;
        let cause = if message.is_empty() { "connection closed".to_string() } else { message.to_string() };
        self.shared.internal_close(Error::Closed(cause));
    }

    /// Resolves once the connection is fully closed.
    pub async fn closed(&self) {
        self.shared.closer.closed().await
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closer.is_closed()
    }

    /// The close cause, once closed.
    pub fn close_cause(&self) -> Option<Error> {
        self.shared.closer.cause()
    }

    pub fn connection_id(&self) -> ConnectionID {
        self.shared.connection_id()
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.shared.conn.local_addr()?)
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.shared.conn.peer_addr()
    }

    pub(crate) fn create_stream(&self, stream_id: StreamID) -> Result<Arc<Stream>, Error> {
        if self.shared.streams.get(stream_id).is_some() {
            return Err(Error::StreamAlreadyExists(stream_id));
        }
        let stream = Stream::new(self.shared.clone(), stream_id);
        self.shared.streams.add(stream.clone());
        Ok(stream)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("connection_id", &self.connection_id())
            .field("peer", &self.remote_addr())
            .field("closed", &self.is_closed())
            .finish()
    }
}
