use at_client::{AtClient, Duration, Response};
use embassy_futures::block_on;
use embedded_hal::digital::OutputPin;

use crate::{
    device::WifiDevice,
    error::Error,
    gateway::{SessionProcessor, MAX_ADU_LENGTH},
    session::{SessionId, SessionState, MAX_SESSIONS},
    state::WifiState,
    tick::{expired, ticks, Clock, Tick},
    RESP_BUF_LEN,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);
const LISTEN_TIMEOUT: Duration = Duration::from_millis(5000);

const POWER_SETTLE_MS: u32 = 1000;
const RESET_PULSE_MS: u32 = 200;
const BOOT_MS: u32 = 2000;
const SETTLE_MS: u32 = 100;
const PROVISIONING_POLL_MS: u32 = 1000;

/// Drives the module through bring-up and serves the sessions once online.
///
/// Call [`WifiRunner::run`] from a dedicated thread, or [`WifiRunner::step`]
/// from an existing periodic task.
pub struct WifiRunner<'d, AT, C, P, RST, G> {
    device: WifiDevice<'d, AT, C>,
    power: P,
    reset: RST,
    gateway: G,
    ip_deadline: Tick,
}

impl<'d, AT, C, P, RST, G> WifiRunner<'d, AT, C, P, RST, G>
where
    AT: AtClient<RESP_BUF_LEN>,
    C: Clock,
    P: OutputPin,
    RST: OutputPin,
    G: SessionProcessor,
{
    pub fn new(device: WifiDevice<'d, AT, C>, power: P, reset: RST, gateway: G) -> Self {
        let ip_deadline = device.state.clock.deadline(device.state.config.ip_refresh_period);
        Self {
            device,
            power,
            reset,
            gateway,
            ip_deadline,
        }
    }

    pub fn device(&self) -> WifiDevice<'d, AT, C> {
        self.device
    }

    pub fn run(&mut self) -> ! {
        let period = ticks(self.device.state.config.loop_period);
        loop {
            self.step();
            self.device.state.clock.delay_ms(period);
        }
    }

    /// Run the action of the current state once, holding the AT mutex.
    pub fn step(&mut self) {
        let device = self.device;
        let state = device.state;
        let mut at = block_on(device.at.lock());
        let at = &mut *at;

        if expired(state.clock.now(), self.ip_deadline) {
            if state.wifi_state() == WifiState::NetProcess {
                self.refresh_ip(at).ok();
            }
            self.ip_deadline = state.clock.deadline(state.config.ip_refresh_period);
        }

        let next = match state.wifi_state() {
            WifiState::Reset => {
                self.power_cycle();
                Some(WifiState::PowerOn)
            }
            WifiState::PowerOn => match at.wait_connect(state.config.wait_connect_timeout) {
                Ok(()) => {
                    info!("wifi module connected");
                    Some(WifiState::ParaInit)
                }
                Err(_) => {
                    error!("wifi module not responding");
                    Some(WifiState::Reset)
                }
            },
            WifiState::ParaInit => match self.para_init(at) {
                Ok(()) => Some(WifiState::NetInit),
                Err(e) => {
                    error!("wifi parameter init failed: {:?}", e);
                    Some(WifiState::Reset)
                }
            },
            WifiState::NetInit => match self.net_init(at) {
                Ok(()) => {
                    state.refresh_liveness();
                    Some(WifiState::NetProcess)
                }
                Err(e) => {
                    error!("wifi network init failed: {:?}", e);
                    Some(WifiState::Reset)
                }
            },
            WifiState::NetProcess => {
                if self.net_process(at) {
                    None
                } else {
                    Some(WifiState::Reset)
                }
            }
        };

        if let Some(next) = next {
            info!("wifi state {:?} -> {:?}", state.wifi_state(), next);
            state.set_wifi_state(next);
        }
    }

    fn power_cycle(&mut self) {
        let state = self.device.state;
        warn!("wifi module reset");

        state.reset_network();

        if self.power.set_high().is_err() {
            error!("wifi power pin failed");
        }
        state.clock.delay_ms(POWER_SETTLE_MS);
        if self.reset.set_low().is_err() {
            error!("wifi reset pin failed");
        }
        state.clock.delay_ms(RESET_PULSE_MS);
        if self.reset.set_high().is_err() {
            error!("wifi reset pin failed");
        }
        state.clock.delay_ms(BOOT_MS);

        state.reset_errors();
    }

    fn para_init(&mut self, at: &mut AT) -> Result<(), Error> {
        let clock = &self.device.state.clock;
        let mut resp = Response::<RESP_BUF_LEN>::new(0, DEFAULT_TIMEOUT);

        at.exec_command(Some(&mut resp), format_args!("ATE0"))?;
        at.exec_command(Some(&mut resp), format_args!("AT+GMR"))?;
        for line in resp.lines().filter(|line| !line.is_empty()) {
            info!("{:?}", at_client::helpers::LossyStr(line));
        }
        clock.delay_ms(POWER_SETTLE_MS);

        at.exec_command(Some(&mut resp), format_args!("AT+CWMODE_CUR=1"))?;
        at.exec_command(Some(&mut resp), format_args!("AT+CWAUTOCONN=0"))?;
        Ok(())
    }

    fn net_init(&mut self, at: &mut AT) -> Result<(), Error> {
        let state = self.device.state;
        let config = &state.config;
        let clock = &state.clock;
        let mut resp = Response::<RESP_BUF_LEN>::new(0, DEFAULT_TIMEOUT);

        at.exec_command(Some(&mut resp), format_args!("AT+CWDHCP_CUR=1,1"))?;
        clock.delay_ms(SETTLE_MS);

        match config.credentials.filter(|_| !state.provisioning()) {
            Some((ssid, password)) => {
                resp.set_info(0, config.join_timeout);
                if let Err(e) = at.exec_command(
                    Some(&mut resp),
                    format_args!("AT+CWJAP_CUR=\"{}\",\"{}\"", ssid, password),
                ) {
                    error!("join {} failed", ssid);
                    return Err(e.into());
                }
                info!("joined {}", ssid);
            }
            None => {
                self.provision(at, &mut resp)?;
                state.set_provisioning(false);
            }
        }
        clock.delay_ms(SETTLE_MS);

        resp.set_info(0, DEFAULT_TIMEOUT);
        at.exec_command(Some(&mut resp), format_args!("AT+CIPSTA_CUR?"))?;
        clock.delay_ms(POWER_SETTLE_MS);

        at.exec_command(Some(&mut resp), format_args!("AT+CIPMODE=0"))?;
        clock.delay_ms(SETTLE_MS);
        at.exec_command(Some(&mut resp), format_args!("AT+CIPDINFO=0"))?;
        clock.delay_ms(SETTLE_MS);
        at.exec_command(Some(&mut resp), format_args!("AT+CIPMUX=1"))?;
        clock.delay_ms(SETTLE_MS);

        resp.set_info(0, LISTEN_TIMEOUT);
        if let Err(e) = at.exec_command(
            Some(&mut resp),
            format_args!("AT+CIPSERVER=1,{}", config.listen_port),
        ) {
            error!("listen on port {} failed", config.listen_port);
            return Err(e.into());
        }
        clock.delay_ms(SETTLE_MS);

        resp.set_info(0, DEFAULT_TIMEOUT);
        at.exec_command(
            Some(&mut resp),
            format_args!("AT+CIPSTO={}", config.client_timeout.as_secs() * 2),
        )?;

        info!("listening on port {}", config.listen_port);
        Ok(())
    }

    /// Join through SmartConfig, polling the join status until an access
    /// point is reported.
    fn provision(&mut self, at: &mut AT, resp: &mut Response<RESP_BUF_LEN>) -> Result<(), Error> {
        let state = self.device.state;
        let clock = &state.clock;

        resp.set_info(0, DEFAULT_TIMEOUT);
        at.exec_command(Some(&mut *resp), format_args!("AT+CWSTARTSMART"))?;
        info!("waiting for SmartConfig provisioning");

        let deadline = clock.deadline(state.config.provisioning_timeout);
        let joined = loop {
            clock.delay_ms(PROVISIONING_POLL_MS);
            // Not joined yet answers without the status line, or not at all
            if at
                .exec_command(Some(&mut *resp), format_args!("AT+CWJAP_CUR?"))
                .is_ok()
                && resp.get_line_by_keyword("+CWJAP_CUR:").is_some()
            {
                break true;
            }
            if expired(clock.now(), deadline) {
                break false;
            }
        };

        at.exec_command(Some(&mut *resp), format_args!("AT+CWSTOPSMART"))?;

        if !joined {
            error!("SmartConfig provisioning timed out");
            return Err(Error::At(at_client::Error::Timeout));
        }
        info!("SmartConfig provisioning done");
        Ok(())
    }

    fn refresh_ip(&mut self, at: &mut AT) -> Result<(), Error> {
        let mut resp = Response::<RESP_BUF_LEN>::new(0, DEFAULT_TIMEOUT);
        at.exec_command(Some(&mut resp), format_args!("AT+CIPSTA_CUR?"))?;
        Ok(())
    }

    /// One pass over the session table. Returns `false` when the module has
    /// to be reset.
    fn net_process(&mut self, at: &mut AT) -> bool {
        let device = self.device;
        let state = device.state;

        for id in (0..MAX_SESSIONS).map(SessionId) {
            match state.session_state(id) {
                SessionState::Closed => {}
                SessionState::Closing => self.close(at, id),
                SessionState::Connected if state.session_expired(id) => {
                    info!("session {} idle, closing", id.index());
                    self.close(at, id);
                }
                SessionState::Connected => {
                    let Some(block) = state.pop_block(id) else {
                        continue;
                    };
                    let mut response = [0u8; MAX_ADU_LENGTH];
                    let sent = match self.gateway.process(&block, &mut response) {
                        Ok(0) => Ok(()),
                        Ok(len) => device.send_locked(at, id, &response[..len]).map(|_| ()),
                        Err(e) => Err(e.into()),
                    };
                    if let Err(e) = sent {
                        error!("session {} failed: {:?}", id.index(), e);
                        self.close(at, id);
                    }
                }
            }
        }

        if state.any_connected() {
            state.refresh_liveness();
        }
        if state.liveness_expired() {
            error!("no session for too long");
            state.force_fatal();
        }

        if state.error_limit_reached() {
            error!("wifi error count {} exceeded", state.error_count());
            return false;
        }
        true
    }

    fn close(&mut self, at: &mut AT, id: SessionId) {
        if self.device.close_locked(at, id).is_err() {
            self.device.state.bump_errors();
        }
    }
}
