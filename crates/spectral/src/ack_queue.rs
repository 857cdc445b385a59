use crate::frame::{AckRange, pool};
use crate::protocol::{MAX_ACK_DELAY, TIMER_GRANULARITY};
use std::time::Duration;
use tokio::time::Instant;

/// Ranges per ACK frame; more are split across frames.
pub(crate) const ACK_RANGE_CHUNK: usize = 128;

/// Collects received packet sequence IDs as sorted, disjoint, inclusive
/// ranges and schedules their emission.
#[derive(Debug)]
pub(crate) struct AckQueue {
    ranges: Vec<AckRange>,
    max: u32,
    max_time: Option<Instant>,
    next_ack: Option<Instant>,
}

impl AckQueue {
    pub fn new() -> Self {
        Self { ranges: Vec::new(), max: 0, max_time: None, next_ack: None }
    }

    /// Records `sequence_id`, merging it into the neighbouring ranges where
    /// adjacent. Re-adding a covered ID changes nothing.
    pub fn add(&mut self, now: Instant, sequence_id: u32) {
        let at = self.ranges.partition_point(|r| r.hi < sequence_id);
        let touches_next =
            at < self.ranges.len() && self.ranges[at].lo <= sequence_id.saturating_add(1);
        let touches_prev = at > 0 && self.ranges[at - 1].hi + 1 == sequence_id;
        match (touches_prev, touches_next) {
            (_, true) if self.ranges[at].contains(sequence_id) => {}
            (true, true) if self.ranges[at].lo == sequence_id + 1 => {
                // Fills the one-element gap: the neighbours coalesce.
                self.ranges[at - 1].hi = self.ranges[at].hi;
                self.ranges.remove(at);
            }
            (true, _) => self.ranges[at - 1].hi = sequence_id,
            (_, true) => self.ranges[at].lo = self.ranges[at].lo.min(sequence_id),
            _ => self.ranges.insert(at, AckRange::new(sequence_id, sequence_id)),
        }

        if sequence_id > self.max || self.max_time.is_none() {
            self.max = sequence_id;
            self.max_time = Some(now);
        }
        if self.next_ack.is_none() {
            self.next_ack = Some(now + MAX_ACK_DELAY - TIMER_GRANULARITY);
        }
    }

    /// Deadline of the pending acknowledgement, if any.
    pub fn next(&self) -> Option<Instant> {
        self.next_ack
    }

    /// Takes up to `capacity` ranges once the deadline has passed (or when
    /// forced). Returns the ranges, the queueing delay of the maximum in
    /// microseconds, and the largest sequence ID covered by this batch. The
    /// schedule state resets when the last range leaves.
    pub fn flush(
        &mut self,
        now: Instant,
        capacity: usize,
        force: bool,
    ) -> Option<(Vec<AckRange>, i64, u32)> {
        if self.ranges.is_empty() {
            return None;
        }
        if !force && self.next_ack.is_some_and(|at| now < at) {
            return None;
        }

        let delay = self
            .max_time
            .map_or(Duration::ZERO, |at| now.saturating_duration_since(at))
            .as_micros() as i64;
        let take = capacity.min(self.ranges.len());
        let mut list = pool::take_ranges();
        list.extend(self.ranges.drain(..take));
        let max = list.last().map_or(0, |r| r.hi);

        if self.ranges.is_empty() {
            self.max = 0;
            self.max_time = None;
            self.next_ack = None;
        }
        Some((list, delay, max))
    }
}
