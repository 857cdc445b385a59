use crate::closer::Closer;
use crate::connection::Shared;
use crate::error::Error;
use crate::frame::{Frame, StreamClose, StreamData, pack};
use crate::protocol::StreamID;
use crate::ring_buffer::RingBuffer;
use log::debug;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

/// Per-stream receive capacity.
const STREAM_BUFFER_SIZE: usize = 1024 * 1024;

/// STREAM_DATA wire overhead: frame ID, stream ID, sequence ID, length.
const STREAM_DATA_OVERHEAD: u64 = 20;

/// An independently ordered byte stream within a connection.
///
/// Writes fragment into STREAM_DATA frames and hand them to the connection's
/// send queue; reads drain a bounded ring fed in sequence order by the
/// engine. Both ends unblock with the close cause when the stream or its
/// connection goes away.
pub struct Stream {
    stream_id: StreamID,
    shared: Arc<Shared>,
    closer: Closer,
    sequence_id: AtomicU32,
    receive: Mutex<ReceiveState>,
    available: Notify,
}

#[derive(Debug)]
struct ReceiveState {
    ring: RingBuffer,
    pending: BinaryHeap<PendingFrame>,
    expected: u32,
}

#[derive(Debug)]
struct PendingFrame {
    sequence_id: u32,
    payload: Vec<u8>,
}

impl PartialEq for PendingFrame {
    fn eq(&self, other: &Self) -> bool {
        self.sequence_id == other.sequence_id
    }
}

impl Eq for PendingFrame {}

impl PartialOrd for PendingFrame {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingFrame {
    // Inverted so the BinaryHeap yields the lowest sequence ID first.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.sequence_id.cmp(&self.sequence_id)
    }
}

impl ReceiveState {
    fn new(capacity: usize) -> Self {
        Self { ring: RingBuffer::new(capacity), pending: BinaryHeap::new(), expected: 0 }
    }

    /// Returns true when at least one frame reached the ring.
    fn deliver(&mut self, sequence_id: u32, payload: &[u8]) -> bool {
        let mut delivered = false;
        if sequence_id == self.expected && self.ring.free() >= payload.len() {
            if self.ring.write(payload).is_ok() {
                self.expected += 1;
                delivered = true;
            }
        } else if sequence_id >= self.expected {
            self.pending.push(PendingFrame { sequence_id, payload: payload.to_vec() });
        }

        loop {
            let Some(head) = self.pending.peek() else { break };
            if head.sequence_id < self.expected {
                // Stale duplicate delivered out of order earlier.
                self.pending.pop();
                continue;
            }
            if head.sequence_id != self.expected || self.ring.free() < head.payload.len() {
                break;
            }
            let Some(head) = self.pending.pop() else { break };
            if self.ring.write(&head.payload).is_err() {
                break;
            }
            self.expected += 1;
            delivered = true;
        }
        delivered
    }
}

impl Stream {
    pub(crate) fn new(shared: Arc<Shared>, stream_id: StreamID) -> Arc<Self> {
        Arc::new(Self {
            stream_id,
            shared,
            closer: Closer::new(),
            sequence_id: AtomicU32::new(0),
            receive: Mutex::new(ReceiveState::new(STREAM_BUFFER_SIZE)),
            available: Notify::new(),
        })
    }

    pub fn id(&self) -> StreamID {
        self.stream_id
    }

    /// Copies buffered bytes into `buf`, waiting while none are available.
    /// Returns the close cause once the stream is down and drained.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize, Error> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            let notified = self.available.notified();
            {
                let mut state = self.lock_receive();
                if !state.ring.is_empty() {
                    return Ok(state.ring.read(buf));
                }
            }
            if self.closer.is_closed() {
                return Err(self.closer.err());
            }
            notified.await;
        }
    }

    /// Fragments `buf` into STREAM_DATA frames and enqueues them. Returns
    /// the full length; back-pressure only comes from the engine's pacing.
    pub async fn write(&self, buf: &[u8]) -> Result<usize, Error> {
        if self.closer.is_closed() {
            return Err(self.closer.err());
        }

        let chunk = (self.shared.send_queue.mss() - STREAM_DATA_OVERHEAD) as usize;
        for payload in buf.chunks(chunk.max(1)) {
            let fr = Frame::StreamData(StreamData {
                stream_id: self.stream_id,
                sequence_id: self.sequence_id.fetch_add(1, Ordering::Relaxed),
                payload: payload.to_vec(),
            });
            self.shared.send_queue.add(pack::pack_single(&fr)?);
        }
        self.shared.wake();
        Ok(buf.len())
    }

    /// Closes the stream: idempotent, best-effort STREAM_CLOSE to the peer.
    pub fn close(&self) -> Result<(), Error> {
        if self.closer.is_closed() {
            return Ok(());
        }
        let _ = self.shared.write_frame(&Frame::StreamClose(StreamClose { stream_id: self.stream_id }));
        self.internal_close(Error::Closed("stream closed".to_string()));
        Ok(())
    }

    /// Resolves when the stream has been closed, locally or by the peer.
    pub async fn closed(&self) {
        self.closer.closed().await
    }

    pub fn is_closed(&self) -> bool {
        self.closer.is_closed()
    }

    /// Engine-side delivery of one STREAM_DATA frame. In-order frames that
    /// fit go straight to the ring; everything else waits in the reorder
    /// queue until its turn and its room arrive.
    pub(crate) fn receive(&self, sequence_id: u32, payload: &[u8]) {
        if self.closer.is_closed() {
            return;
        }

        let delivered = self.lock_receive().deliver(sequence_id, payload);
        if delivered {
            self.available.notify_one();
        }
    }

    /// Shared teardown for local close, peer STREAM_CLOSE and connection
    /// teardown.
    pub(crate) fn internal_close(&self, cause: Error) {
        if !self.closer.close(cause) {
            return;
        }
        debug!("stream {} closed", self.stream_id);
        {
            let mut state = self.lock_receive();
            state.ring.reset();
            state.pending.clear();
        }
        self.available.notify_one();
        self.shared.streams.remove(self.stream_id);
    }

    fn lock_receive(&self) -> MutexGuard<'_, ReceiveState> {
        match self.receive.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("stream_id", &self.stream_id)
            .field("closed", &self.closer.is_closed())
            .finish()
    }
}
