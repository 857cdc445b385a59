use crate::congestion::{Controller, Cubic, Pacer, Reno, Rtt};
use tokio::time::Instant;

/// Combines a window controller with the pacer, the in-flight counter and
/// recovery-epoch bookkeeping. The engine talks to this, never to the
/// controller directly.
pub struct Sender {
    flight: u64,
    recovery_send: bool,
    recovery_start: Instant,
    cc: Box<dyn Controller>,
    pacer: Pacer,
}

impl Sender {
    pub fn new_reno(now: Instant, mss: u64) -> Self {
        Self::new(Box::new(Reno::new(mss)), now)
    }

    pub fn new_cubic(now: Instant, mss: u64) -> Self {
        Self::new(Box::new(Cubic::new(mss)), now)
    }

    fn new(cc: Box<dyn Controller>, now: Instant) -> Self {
        Self { flight: 0, recovery_send: false, recovery_start: now, cc, pacer: Pacer::new(now) }
    }

    /// Congestion-window headroom. During the first send of a recovery epoch
    /// exactly one segment is allowed regardless of the window.
    pub fn available(&self) -> u64 {
        if self.recovery_send {
            return self.cc.mss();
        }
        self.cc.window().saturating_sub(self.flight)
    }

    pub fn on_send(&mut self, bytes: u64) {
        self.flight += bytes;
        self.recovery_send = false;
        self.pacer.on_send(bytes);
    }

    pub fn on_ack(&mut self, now: Instant, sent: Instant, rtt: &Rtt, bytes: u64) {
        self.flight = self.flight.saturating_sub(bytes);
        self.cc.on_ack(now, sent, self.recovery_start, rtt, bytes, self.flight);
    }

    /// At most one window reduction per recovery epoch: events for packets
    /// sent before the epoch began are ignored.
    pub fn on_congestion_event(&mut self, now: Instant, sent: Instant) {
        if sent > self.recovery_start {
            self.recovery_send = true;
            self.recovery_start = now;
            self.cc.on_congestion_event(now, sent);
        }
    }

    /// Removes a packet abandoned by the retransmission queue from flight.
    pub fn on_packet_discarded(&mut self, bytes: u64) {
        self.flight = self.flight.saturating_sub(bytes);
    }

    pub fn time_until_send(&mut self, now: Instant, rtt: &Rtt, bytes: u64) -> Option<Instant> {
        self.pacer.time_until_send(now, rtt.smoothed(), self.cc.window(), self.cc.mss(), bytes)
    }

    pub fn set_mss(&mut self, mss: u64) {
        self.cc.set_mss(mss);
    }

    pub fn mss(&self) -> u64 {
        self.cc.mss()
    }

    pub fn window(&self) -> u64 {
        self.cc.window()
    }

    pub fn flight(&self) -> u64 {
        self.flight
    }
}

impl std::fmt::Debug for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sender")
            .field("flight", &self.flight)
            .field("window", &self.cc.window())
            .field("recovery_send", &self.recovery_send)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const MSS: u64 = 1200;

    #[test]
    fn flight_accounting() {
        let now = Instant::now();
        let mut sender = Sender::new_reno(now, MSS);
        sender.on_send(MSS);
        sender.on_send(MSS);
        assert_eq!(sender.flight(), 2 * MSS);

        let rtt = Rtt::new();
        sender.on_ack(now, now, &rtt, MSS);
        assert_eq!(sender.flight(), MSS);
        // Over-acknowledging saturates at zero.
        sender.on_ack(now, now, &rtt, 10 * MSS);
        assert_eq!(sender.flight(), 0);
    }

    #[test]
    fn recovery_grants_one_segment() {
        let now = Instant::now();
        let mut sender = Sender::new_reno(now, MSS);
        let sent = now + Duration::from_millis(1);
        sender.on_send(sender.window());
        sender.on_congestion_event(now + Duration::from_millis(2), sent);
        // Window halved and fully occupied, yet one segment is allowed.
        assert_eq!(sender.available(), MSS);
        sender.on_send(MSS);
        assert_eq!(sender.available(), 0);
    }

    #[test]
    fn one_reduction_per_epoch() {
        let now = Instant::now();
        let mut sender = Sender::new_reno(now, MSS);
        let s1 = now + Duration::from_millis(1);
        let s2 = now + Duration::from_millis(2);
        let event1 = now + Duration::from_millis(10);
        sender.on_congestion_event(event1, s1);
        let after_first = sender.window();
        // s2 was sent before the new epoch started: no second reduction.
        sender.on_congestion_event(now + Duration::from_millis(11), s2);
        assert_eq!(sender.window(), after_first);
        // A packet sent after the epoch start does reduce again.
        sender.on_congestion_event(
            now + Duration::from_millis(30),
            event1 + Duration::from_millis(1),
        );
        assert!(sender.window() < after_first);
    }

    #[test]
    fn discarded_packets_leave_flight() {
        let now = Instant::now();
        let mut sender = Sender::new_cubic(now, MSS);
        sender.on_send(3 * MSS);
        sender.on_packet_discarded(MSS);
        assert_eq!(sender.flight(), 2 * MSS);
    }
}
