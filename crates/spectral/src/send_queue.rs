use crate::protocol::{MAX_PACKET_SIZE, MIN_PACKET_SIZE};
use bytes::{Bytes, BytesMut};
use std::sync::Mutex;

/// Encoded frames awaiting transmission, coalesced into MSS-bounded packet
/// bodies. This is the one queue crossed from writer tasks into the engine,
/// hence the internal mutex.
#[derive(Debug)]
pub(crate) struct SendQueue {
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    queue: Vec<Bytes>,
    body: BytesMut,
    total: u32,
    mss: u64,
}

impl SendQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: Vec::new(),
                body: BytesMut::with_capacity(MAX_PACKET_SIZE as usize),
                total: 0,
                mss: MIN_PACKET_SIZE,
            }),
        }
    }

    /// True when frames are queued or a packed body awaits transmission.
    pub fn available(&self) -> bool {
        let inner = self.lock();
        !inner.queue.is_empty() || inner.total > 0
    }

    pub fn mss(&self) -> u64 {
        self.lock().mss
    }

    pub fn set_mss(&self, mss: u64) {
        self.lock().mss = mss;
    }

    pub fn add(&self, p: Bytes) {
        self.lock().queue.push(p);
    }

    /// Drains whole frames from the head into the packet body until the next
    /// frame would push it past `min(window, mss)`. Returns the frame count
    /// and a copy of the body; (0, empty) means nothing fits yet.
    pub fn pack(&self, window: u64) -> (u32, Bytes) {
        let mut inner = self.lock();
        if inner.queue.is_empty() && inner.total == 0 {
            return (0, Bytes::new());
        }

        let size = window.min(inner.mss) as usize;
        let mut taken = 0;
        while taken < inner.queue.len() {
            if inner.body.len() + inner.queue[taken].len() > size {
                break;
            }
            let entry = inner.queue[taken].clone();
            inner.body.extend_from_slice(&entry);
            inner.total += 1;
            taken += 1;
        }
        inner.queue.drain(..taken);
        (inner.total, Bytes::copy_from_slice(&inner.body))
    }

    /// Resets the packed body after a successful transmit.
    pub fn flush(&self) {
        let mut inner = self.lock();
        inner.body.clear();
        inner.total = 0;
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.queue.clear();
        inner.body.clear();
        inner.total = 0;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(n: usize) -> Bytes {
        Bytes::from(vec![0xab; n])
    }

    #[test]
    fn pack_coalesces_frames_up_to_the_bound() {
        let queue = SendQueue::new();
        queue.add(frame(500));
        queue.add(frame(500));
        queue.add(frame(500));

        // Default 1200-byte bound: two frames fit, the third stays.
        let (total, body) = queue.pack(u64::MAX);
        assert_eq!(total, 2);
        assert_eq!(body.len(), 1000);
        assert!(queue.available());

        queue.flush();
        let (total, body) = queue.pack(u64::MAX);
        assert_eq!(total, 1);
        assert_eq!(body.len(), 500);
    }

    #[test]
    fn pack_respects_a_small_window() {
        let queue = SendQueue::new();
        queue.add(frame(600));
        let (total, body) = queue.pack(100);
        assert_eq!(total, 0);
        assert!(body.is_empty());
        // The frame is still queued for a wider window.
        let (total, _) = queue.pack(1200);
        assert_eq!(total, 1);
    }

    #[test]
    fn packed_body_survives_until_flush() {
        let queue = SendQueue::new();
        queue.add(frame(100));
        let (first_total, first_body) = queue.pack(u64::MAX);
        // A pacer-blocked engine re-packs later and sees the same body.
        let (again_total, again_body) = queue.pack(u64::MAX);
        assert_eq!(first_total, again_total);
        assert_eq!(first_body, again_body);

        queue.flush();
        assert!(!queue.available());
        let (total, _) = queue.pack(u64::MAX);
        assert_eq!(total, 0);
    }

    #[test]
    fn set_mss_widens_the_bound() {
        let queue = SendQueue::new();
        queue.add(frame(1300));
        let (total, _) = queue.pack(u64::MAX);
        assert_eq!(total, 0);

        queue.set_mss(1400);
        let (total, body) = queue.pack(u64::MAX);
        assert_eq!(total, 1);
        assert_eq!(body.len(), 1300);
    }

    #[test]
    fn clear_discards_everything() {
        let queue = SendQueue::new();
        queue.add(frame(10));
        let _ = queue.pack(u64::MAX);
        queue.clear();
        assert!(!queue.available());
    }
}
