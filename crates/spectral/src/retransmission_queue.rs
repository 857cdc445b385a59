use crate::protocol::RETRANSMISSION_ATTEMPTS;
use bytes::Bytes;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Unacknowledged packet: the encoded datagram, its last send time and how
/// often it has been (re)transmitted.
#[derive(Debug)]
pub(crate) struct RetransmissionEntry {
    pub sequence_id: u32,
    pub payload: Bytes,
    pub sent: Instant,
    pub attempts: u8,
}

/// Outcome of a timer-driven [`RetransmissionQueue::shift`].
#[derive(Debug)]
pub(crate) enum Shift {
    /// Resend the payload; `previous` is the send time being superseded,
    /// which drives the congestion signal.
    Resend { payload: Bytes, previous: Instant },
    /// The entry exhausted its attempts and was dropped; `bytes` must leave
    /// the in-flight counter.
    Expired { bytes: u64 },
}

/// Unacked packets ordered by send time, oldest first.
#[derive(Debug, Default)]
pub(crate) struct RetransmissionQueue {
    entries: VecDeque<RetransmissionEntry>,
}

impl RetransmissionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, now: Instant, sequence_id: u32, payload: Bytes) {
        self.entries.push_back(RetransmissionEntry { sequence_id, payload, sent: now, attempts: 0 });
        // Send times are monotonic in practice; restore order if a caller
        // ever supplied one out of sequence.
        if self.entries.len() > 1 {
            let tail = self.entries.len() - 2;
            if self.entries[tail].sent > now {
                self.entries.make_contiguous().sort_by_key(|e| e.sent);
            }
        }
    }

    /// Removes and returns the entry for `sequence_id`, if present. O(n).
    pub fn remove(&mut self, sequence_id: u32) -> Option<RetransmissionEntry> {
        let at = self.entries.iter().position(|e| e.sequence_id == sequence_id)?;
        self.entries.remove(at)
    }

    /// Earliest deadline at which [`shift`](Self::shift) would act.
    pub fn next(&self, rto: Duration) -> Option<Instant> {
        self.entries.front().map(|e| e.sent + rto)
    }

    /// Pops the head if its timeout has expired. An entry past its attempt
    /// budget is discarded; otherwise it is re-stamped and moved to the tail
    /// so newer packets wait for their own timeouts.
    pub fn shift(&mut self, now: Instant, rto: Duration) -> Option<Shift> {
        let head = self.entries.front()?;
        if now.saturating_duration_since(head.sent) < rto {
            return None;
        }

        let mut entry = self.entries.pop_front()?;
        entry.attempts += 1;
        if entry.attempts > RETRANSMISSION_ATTEMPTS {
            return Some(Shift::Expired { bytes: entry.payload.len() as u64 });
        }

        let previous = entry.sent;
        entry.sent = now;
        let payload = entry.payload.clone();
        self.entries.push_back(entry);
        Some(Shift::Resend { payload, previous })
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Total payload bytes held; mirrors the sender's in-flight counter.
    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.payload.len() as u64).sum()
    }
}
