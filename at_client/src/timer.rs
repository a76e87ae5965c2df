use embassy_time::{block_for, Duration, Instant};

pub struct Timer {
    expires_at: Instant,
}

impl Timer {
    pub fn after(duration: Duration) -> Self {
        Self {
            expires_at: Instant::now() + duration,
        }
    }

    pub fn expired(&self) -> bool {
        self.expires_at <= Instant::now()
    }

    /// Poll `e` every `poll` until it yields a value or `timeout` elapses.
    ///
    /// `e` is always polled at least once.
    pub fn with_timeout<F, R>(timeout: Duration, poll: Duration, mut e: F) -> Option<R>
    where
        F: FnMut() -> Option<R>,
    {
        let timer = Timer::after(timeout);

        loop {
            if let Some(res) = e() {
                return Some(res);
            }
            if timer.expired() {
                return None;
            }
            block_for(poll);
        }
    }
}
