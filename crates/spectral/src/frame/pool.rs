//! Thread-local free lists for the variable-size frame variants.
//!
//! Only ACK range vectors and STREAM_DATA payload buffers churn fast enough
//! to be worth recycling; every other frame is a handful of plain words.
//! The lists are thread-local, so no locking is involved.

use crate::frame::{AckRange, Frame};
use std::cell::RefCell;

const MAX_POOLED: usize = 64;
const PAYLOAD_CAPACITY: usize = 1452;
const RANGES_CAPACITY: usize = 16;

thread_local! {
    static ACK_RANGES: RefCell<Vec<Vec<AckRange>>> = const { RefCell::new(Vec::new()) };
    static PAYLOADS: RefCell<Vec<Vec<u8>>> = const { RefCell::new(Vec::new()) };
}

pub fn take_ranges() -> Vec<AckRange> {
    ACK_RANGES
        .with_borrow_mut(|pool| pool.pop())
        .unwrap_or_else(|| Vec::with_capacity(RANGES_CAPACITY))
}

pub fn put_ranges(mut ranges: Vec<AckRange>) {
    ranges.clear();
    ACK_RANGES.with_borrow_mut(|pool| {
        if pool.len() < MAX_POOLED {
            pool.push(ranges);
        }
    });
}

pub fn take_payload() -> Vec<u8> {
    PAYLOADS
        .with_borrow_mut(|pool| pool.pop())
        .unwrap_or_else(|| Vec::with_capacity(PAYLOAD_CAPACITY))
}

pub fn put_payload(mut payload: Vec<u8>) {
    payload.clear();
    PAYLOADS.with_borrow_mut(|pool| {
        if pool.len() < MAX_POOLED {
            pool.push(payload);
        }
    });
}

/// Returns the pooled parts of a dispatched frame to their free lists.
pub fn recycle(fr: Frame) {
    match fr {
        Frame::Acknowledgement(fr) => put_ranges(fr.ranges),
        Frame::StreamData(fr) => put_payload(fr.payload),
        _ => {}
    }
}
