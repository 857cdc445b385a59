use crate::congestion::clamp;
use std::time::Duration;
use tokio::time::Instant;

/// One bucket refill covers this much transmission time.
const BURST_INTERVAL: Duration = Duration::from_millis(2);

const MIN_BURST_PACKETS: u64 = 10;
const MAX_BURST_PACKETS: u64 = 256;

/// Refill slightly faster than one window per RTT so pacing never becomes
/// the limiting factor by itself.
const PACING_GAIN: f64 = 1.25;

/// Fraction of the ideal wait actually imposed, keeping the bucket busy.
const DELAY_FACTOR: f64 = 0.8;

/// Token bucket shaping packet release over the congestion window.
#[derive(Debug)]
pub struct Pacer {
    capacity: u64,
    tokens: f64,
    mss: u64,
    window: u64,
    prev: Instant,
}

impl Pacer {
    pub fn new(now: Instant) -> Self {
        Self { capacity: 0, tokens: 0.0, mss: 0, window: 0, prev: now }
    }

    /// Returns `None` when `bytes` may go out immediately, or the instant at
    /// which enough tokens will have accumulated.
    pub fn time_until_send(
        &mut self,
        now: Instant,
        rtt: Duration,
        window: u64,
        mss: u64,
        bytes: u64,
    ) -> Option<Instant> {
        if window != self.window || mss != self.mss {
            self.capacity = optimal_capacity(rtt, mss, window);
            self.tokens = self.tokens.min(self.capacity as f64);
            self.window = window;
            self.mss = mss;
        }

        if self.tokens >= bytes as f64 {
            return None;
        }

        let elapsed = now.saturating_duration_since(self.prev);
        let rtt_secs = rtt.as_secs_f64().max(f64::EPSILON);
        let refill = window as f64 * PACING_GAIN * (elapsed.as_secs_f64() / rtt_secs);
        self.tokens = (self.tokens + refill).min(self.capacity as f64);
        self.prev = now;
        if self.tokens >= bytes as f64 {
            return None;
        }

        let shortfall = bytes.min(self.capacity) as f64 - self.tokens;
        let delay = rtt.mul_f64(shortfall / window as f64).mul_f64(DELAY_FACTOR);
        Some(now + delay)
    }

    pub fn on_send(&mut self, bytes: u64) {
        self.tokens = (self.tokens - bytes as f64).max(0.0);
    }
}

fn optimal_capacity(rtt: Duration, mss: u64, window: u64) -> u64 {
    let rtt_ns = rtt.as_nanos().max(1) as u64;
    let capacity = window.saturating_mul(BURST_INTERVAL.as_nanos() as u64) / rtt_ns;
    clamp(capacity, MIN_BURST_PACKETS * mss, MAX_BURST_PACKETS * mss)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MSS: u64 = 1200;
    const WINDOW: u64 = 12 * MSS;
    const RTT: Duration = Duration::from_millis(100);

    #[test]
    fn initial_burst_is_capped_by_capacity() {
        let now = Instant::now();
        let mut pacer = Pacer::new(now);
        // Capacity for a 100ms RTT clamps to the 10-segment floor; a fresh
        // bucket holds nothing, so the first send waits.
        assert!(pacer.time_until_send(now, RTT, WINDOW, MSS, MSS).is_some());
    }

    #[test]
    fn released_bytes_bounded_over_one_rtt() {
        let now = Instant::now();
        let mut pacer = Pacer::new(now);
        let mut released = 0u64;
        let mut t = now;
        let step = Duration::from_millis(1);
        while t < now + RTT {
            if pacer.time_until_send(t, RTT, WINDOW, MSS, MSS).is_none() {
                pacer.on_send(MSS);
                released += MSS;
            } else {
                t += step;
            }
        }
        let budget = (WINDOW as f64 * 1.25) as u64;
        assert!(released <= budget, "released {} > budget {}", released, budget);
    }

    #[test]
    fn tokens_drain_on_send() {
        let now = Instant::now();
        let mut pacer = Pacer::new(now);
        // One full RTT of refill fills the bucket to capacity.
        let later = now + RTT;
        assert!(pacer.time_until_send(later, RTT, WINDOW, MSS, MSS).is_none());
        pacer.on_send(10 * MSS);
        // Bucket exhausted again at the same instant.
        assert!(pacer.time_until_send(later, RTT, WINDOW, MSS, MSS).is_some());
    }

    #[test]
    fn deadline_is_in_the_future_and_bounded() {
        let now = Instant::now();
        let mut pacer = Pacer::new(now);
        let deadline = pacer.time_until_send(now, RTT, WINDOW, MSS, MSS).unwrap();
        assert!(deadline > now);
        assert!(deadline <= now + RTT);
    }

    #[test]
    fn window_change_refreshes_capacity() {
        let now = Instant::now();
        let mut pacer = Pacer::new(now);
        let _ = pacer.time_until_send(now + RTT, RTT, WINDOW, MSS, MSS);
        // A much larger window raises both capacity and refill rate.
        let deadline = pacer.time_until_send(now + RTT, RTT, WINDOW * 100, MSS, 50 * MSS);
        assert!(deadline.is_none() || deadline.unwrap() <= now + RTT + RTT);
    }
}
