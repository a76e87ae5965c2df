//! Millisecond tick clock with wraparound safe deadlines.

use embassy_time::{block_for, Duration, Instant};

/// Milliseconds since an arbitrary origin, wrapping at `u32::MAX`.
pub type Tick = u32;

/// `true` once `now` has reached or passed `deadline`.
///
/// Deadlines are compared by distance, never by magnitude, so a deadline set
/// shortly before the counter wraps still expires once it has wrapped.
pub const fn expired(now: Tick, deadline: Tick) -> bool {
    now.wrapping_sub(deadline) < Tick::MAX / 2
}

/// Tick of `duration` as used in deadlines, saturating at half the tick range.
pub fn ticks(duration: Duration) -> Tick {
    duration.as_millis().min((Tick::MAX / 2) as u64) as Tick
}

/// Time source of the connection manager.
pub trait Clock {
    fn now(&self) -> Tick;

    /// Block the calling thread for `ms` milliseconds.
    fn delay_ms(&self, ms: u32);

    fn deadline(&self, after: Duration) -> Tick {
        self.now().wrapping_add(ticks(after))
    }
}

/// [`Clock`] backed by the `embassy-time` driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Tick {
        Instant::now().as_millis() as Tick
    }

    fn delay_ms(&self, ms: u32) {
        block_for(Duration::from_millis(ms as u64));
    }
}
