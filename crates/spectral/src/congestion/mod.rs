//! Congestion control: window controllers (Reno, CUBIC), token-bucket pacer,
//! RTT estimation, and the sender that ties them to in-flight accounting.

mod cubic;
mod pacer;
mod reno;
mod rtt;
mod sender;

pub use cubic::Cubic;
pub use pacer::Pacer;
pub use reno::Reno;
pub use rtt::{INITIAL_RTT, Rtt};
pub use sender::Sender;

use tokio::time::Instant;

/// Window controller interface shared by Reno and CUBIC.
pub(crate) trait Controller: Send {
    fn on_ack(
        &mut self,
        now: Instant,
        sent: Instant,
        recovery_start: Instant,
        rtt: &Rtt,
        bytes: u64,
        flight: u64,
    );
    fn on_congestion_event(&mut self, now: Instant, sent: Instant);
    fn set_mss(&mut self, mss: u64);
    fn mss(&self) -> u64;
    fn window(&self) -> u64;
}

pub(crate) fn initial_window(mss: u64) -> u64 {
    clamp(14720, 2 * mss, 10 * mss)
}

pub(crate) fn minimum_window(mss: u64) -> u64 {
    2 * mss
}

/// The window only grows while the connection is actually using it: the
/// flight is window-limited, slow start is pushing at least half the window,
/// or fewer than three segments of headroom remain.
pub(crate) fn should_increase_window(flight: u64, window: u64, ssthresh: u64, mss: u64) -> bool {
    if flight >= window {
        return true;
    }
    let available = window - flight;
    let slow_start_limited = ssthresh > window && flight > window / 2;
    slow_start_limited || available <= 3 * mss
}

pub(crate) fn clamp(value: u64, min: u64, max: u64) -> u64 {
    value.max(min).min(max)
}
