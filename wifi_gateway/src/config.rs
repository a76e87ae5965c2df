use embassy_time::Duration;

/// Station credentials, `(ssid, password)`.
pub type Credentials = (&'static str, &'static str);

/// Configuration of the connection manager.
#[derive(Debug, Clone, Copy)]
pub struct WifiConfig {
    /// Join with these credentials. `None` joins through SmartConfig
    /// provisioning.
    pub credentials: Option<Credentials>,
    /// Modbus-TCP server port
    pub listen_port: u16,
    /// Idle time after which a session is closed. The module side timeout
    /// is set to twice this value.
    pub client_timeout: Duration,
    /// Time without any connected session after which the module is reset
    pub net_timeout: Duration,
    pub wait_connect_timeout: Duration,
    pub join_timeout: Duration,
    pub provisioning_timeout: Duration,
    pub ip_refresh_period: Duration,
    pub loop_period: Duration,
    /// Errors tolerated in the process state before resetting the module
    pub max_errors: u16,
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl WifiConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            credentials: None,
            listen_port: 502,
            client_timeout: Duration::from_secs(60),
            net_timeout: Duration::from_secs(300),
            wait_connect_timeout: Duration::from_secs(6),
            join_timeout: Duration::from_secs(30),
            provisioning_timeout: Duration::from_secs(180),
            ip_refresh_period: Duration::from_secs(10),
            loop_period: Duration::from_millis(10),
            max_errors: 5,
        }
    }

    #[must_use]
    pub const fn credentials(mut self, ssid: &'static str, password: &'static str) -> Self {
        self.credentials = Some((ssid, password));
        self
    }

    #[must_use]
    pub const fn listen_port(mut self, port: u16) -> Self {
        self.listen_port = port;
        self
    }

    #[must_use]
    pub const fn client_timeout(mut self, timeout: Duration) -> Self {
        self.client_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn net_timeout(mut self, timeout: Duration) -> Self {
        self.net_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn wait_connect_timeout(mut self, timeout: Duration) -> Self {
        self.wait_connect_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn provisioning_timeout(mut self, timeout: Duration) -> Self {
        self.provisioning_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn ip_refresh_period(mut self, period: Duration) -> Self {
        self.ip_refresh_period = period;
        self
    }

    #[must_use]
    pub const fn loop_period(mut self, period: Duration) -> Self {
        self.loop_period = period;
        self
    }

    #[must_use]
    pub const fn max_errors(mut self, max_errors: u16) -> Self {
        self.max_errors = max_errors;
        self
    }
}
