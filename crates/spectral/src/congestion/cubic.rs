use crate::congestion::{Controller, Rtt, initial_window, minimum_window, should_increase_window};
use log::trace;
use tokio::time::Instant;

const BETA: f64 = 0.7;
const C: f64 = 0.4;

/// CUBIC (RFC 8312). `w_max` is kept in bytes and normalised to segments
/// where the cubic and TCP-friendly formulas require it.
#[derive(Debug)]
pub struct Cubic {
    mss: u64,
    window: u64,
    ssthresh: u64,
    w_max: u64,
    k: f64,
    acc: f64,
}

impl Cubic {
    pub fn new(mss: u64) -> Self {
        let window = initial_window(mss);
        Self { mss, window, ssthresh: u64::MAX, w_max: window, k: 0.0, acc: 0.0 }
    }

    fn w_cubic(&self, t: f64) -> f64 {
        let w_max = self.w_max as f64 / self.mss as f64;
        (C * (t - self.k).powi(3) + w_max) * self.mss as f64
    }

    fn w_est(&self, t: f64, srtt: f64) -> f64 {
        let w_max = self.w_max as f64 / self.mss as f64;
        (w_max * BETA + 3.0 * (1.0 - BETA) / (1.0 + BETA) * (t / srtt)) * self.mss as f64
    }

    fn update_k(&mut self) {
        let w_max = self.w_max as f64 / self.mss as f64;
        self.k = (w_max * (1.0 - BETA) / C).cbrt();
    }
}

impl Controller for Cubic {
    fn on_ack(
        &mut self,
        now: Instant,
        _sent: Instant,
        recovery_start: Instant,
        rtt: &Rtt,
        bytes: u64,
        flight: u64,
    ) {
        if !should_increase_window(flight, self.window, self.ssthresh, self.mss) {
            return;
        }

        if self.window < self.ssthresh {
            self.window += bytes;
            return;
        }

        let t = now.saturating_duration_since(recovery_start).as_secs_f64();
        let srtt = rtt.smoothed().as_secs_f64().max(f64::EPSILON);
        let target = self.w_cubic(t + srtt).max(self.w_est(t, srtt));
        let window = self.window as f64;
        if target <= window {
            return;
        }

        // RFC 8312 congestion avoidance: (target - cwnd) / cwnd segments per
        // acknowledged segment, accumulated until a whole segment is due.
        self.acc += (target - window) / window * self.mss as f64;
        while self.acc >= self.mss as f64 {
            self.window += self.mss;
            self.acc -= self.mss as f64;
            trace!("cubic window increase, window={}", self.window);
        }
    }

    fn on_congestion_event(&mut self, _now: Instant, _sent: Instant) {
        if self.window < self.w_max {
            self.w_max = (self.window as f64 * (1.0 - BETA) / 2.0) as u64;
        } else {
            self.w_max = self.window;
        }
        self.ssthresh = ((self.w_max as f64 * BETA) as u64).max(minimum_window(self.mss));
        self.window = self.ssthresh;
        self.acc = 0.0;
        self.update_k();
        trace!("cubic congestion event, window={}", self.window);
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
    use std::time::Duration;

    const MSS: u64 = 1200;

    #[test]
    fn slow_start_adds_acked_bytes() {
        let mut cubic = Cubic::new(MSS);
        let start = cubic.window();
        let now = Instant::now();
        let rtt = Rtt::new();
        cubic.on_ack(now, now, now, &rtt, MSS, start);
        assert_eq!(cubic.window(), start + MSS);
    }

    #[test]
    fn loss_applies_beta() {
        let mut cubic = Cubic::new(MSS);
        let now = Instant::now();
        let before = cubic.window();
        cubic.on_congestion_event(now, now);
        assert_eq!(cubic.window(), (before as f64 * BETA) as u64);
        assert_eq!(cubic.ssthresh, cubic.window());
        assert!(cubic.k > 0.0);
    }

    #[test]
    fn repeated_loss_hits_minimum_window() {
        let mut cubic = Cubic::new(MSS);
        let now = Instant::now();
        for _ in 0..16 {
            cubic.on_congestion_event(now, now);
        }
        assert_eq!(cubic.window(), minimum_window(MSS));
    }

    #[test]
    fn window_recovers_toward_w_max() {
        let mut cubic = Cubic::new(MSS);
        let start = Instant::now();
        cubic.on_congestion_event(start, start);
        let reduced = cubic.window();

        let mut rtt = Rtt::new();
        rtt.add(Duration::from_millis(50), Duration::ZERO);
        // Well past K the cubic curve is above w_max again.
        let later = start + Duration::from_secs(30);
        for _ in 0..64 {
            let flight = cubic.window();
            cubic.on_ack(later, later, start, &rtt, MSS, flight);
        }
        assert!(cubic.window() > reduced);
    }
}
