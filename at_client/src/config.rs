use embassy_time::Duration;

/// Configuration of the AT client and its parser.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Config {
    pub(crate) probe_timeout: Duration,
    pub(crate) recv_timeout: Duration,
    pub(crate) poll_interval: Duration,
    pub(crate) read_retry_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            probe_timeout: Duration::from_millis(300),
            recv_timeout: Duration::from_millis(20),
            poll_interval: Duration::from_millis(1),
            read_retry_delay: Duration::from_millis(100),
        }
    }

    /// How long a single `AT` probe waits for an answer in
    /// [`Client::wait_connect`](crate::Client::wait_connect).
    #[must_use]
    pub const fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Idle time allowed between two bytes of a raw payload.
    #[must_use]
    pub const fn recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = timeout;
        self
    }

    /// Pause between two checks for a completed response or for incoming
    /// raw bytes.
    #[must_use]
    pub const fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Pause of [`Parser::run`](crate::Parser::run) after the transport
    /// failed to read.
    #[must_use]
    pub const fn read_retry_delay(mut self, delay: Duration) -> Self {
        self.read_retry_delay = delay;
        self
    }
}
