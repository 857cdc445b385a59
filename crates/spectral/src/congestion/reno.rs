use crate::congestion::{Controller, Rtt, initial_window, minimum_window, should_increase_window};
use log::trace;
use tokio::time::Instant;

const REDUCTION_FACTOR: f64 = 0.5;

/// Classic Reno: one segment per ack in slow start, one segment per window of
/// acknowledged bytes in congestion avoidance, halving on loss.
#[derive(Debug)]
pub struct Reno {
    mss: u64,
    window: u64,
    ssthresh: u64,
    bytes_acked: u64,
}

impl Reno {
    pub fn new(mss: u64) -> Self {
        Self { mss, window: initial_window(mss), ssthresh: u64::MAX, bytes_acked: 0 }
    }
}

impl Controller for Reno {
    fn on_ack(
        &mut self,
        _now: Instant,
        _sent: Instant,
        _recovery_start: Instant,
        _rtt: &Rtt,
        bytes: u64,
        flight: u64,
    ) {
        if !should_increase_window(flight, self.window, self.ssthresh, self.mss) {
            return;
        }

        if self.window < self.ssthresh {
            self.window += self.mss;
            if self.window >= self.ssthresh {
                // Crossing into congestion avoidance: seed the accumulator
                // with the overshoot.
                self.bytes_acked = self.window - self.ssthresh;
                trace!("reno exited slow start, window={}", self.window);
            }
            return;
        }

        self.bytes_acked += bytes;
        if self.bytes_acked >= self.window {
            self.bytes_acked -= self.window;
            self.window += self.mss;
            trace!("reno congestion avoidance increase, window={}", self.window);
        }
    }

    fn on_congestion_event(&mut self, _now: Instant, _sent: Instant) {
        self.window = ((self.window as f64 * REDUCTION_FACTOR) as u64).max(minimum_window(self.mss));
        self.ssthresh = self.window;
        trace!("reno congestion event, window={}", self.window);
    }

    fn set_mss(&mut self, mss: u64) {
        self.mss = mss;
        self.window = self.window.max(minimum_window(mss));
    }

    fn mss(&self) -> u64 {
        self.mss
    }

    fn window(&self) -> u64 {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MSS: u64 = 1200;

    fn ack(reno: &mut Reno, bytes: u64, flight: u64) {
        let now = Instant::now();
        let rtt = Rtt::new();
        reno.on_ack(now, now, now, &rtt, bytes, flight);
    }

    #[test]
    fn slow_start_grows_one_segment_per_ack() {
        let mut reno = Reno::new(MSS);
        let start = reno.window();
        ack(&mut reno, MSS, start);
        assert_eq!(reno.window(), start + MSS);
    }

    #[test]
    fn idle_connection_does_not_grow() {
        let mut reno = Reno::new(MSS);
        let start = reno.window();
        ack(&mut reno, MSS, 0);
        assert_eq!(reno.window(), start);
    }

    #[test]
    fn congestion_avoidance_needs_a_full_window() {
        let mut reno = Reno::new(MSS);
        let now = Instant::now();
        reno.on_congestion_event(now, now);
        let window = reno.window();
        assert_eq!(reno.ssthresh, window);

        let mut acked = 0;
        while acked + MSS < window {
            ack(&mut reno, MSS, window);
            acked += MSS;
            assert_eq!(reno.window(), window);
        }
        ack(&mut reno, MSS, window);
        assert_eq!(reno.window(), window + MSS);
    }

    #[test]
    fn loss_halves_but_respects_minimum() {
        let mut reno = Reno::new(MSS);
        let now = Instant::now();
        reno.on_congestion_event(now, now);
        assert_eq!(reno.window(), 6000);
        for _ in 0..8 {
            reno.on_congestion_event(now, now);
        }
        assert_eq!(reno.window(), minimum_window(MSS));
    }

    #[test]
    fn set_mss_keeps_window_above_floor() {
        let mut reno = Reno::new(MSS);
        let now = Instant::now();
        for _ in 0..8 {
            reno.on_congestion_event(now, now);
        }
        reno.set_mss(1440);
        assert!(reno.window() >= minimum_window(1440));
        assert_eq!(reno.mss(), 1440);
    }
}
