use at_client::{AtClient, Duration, Response};
use embassy_futures::block_on;
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, mutex::Mutex};
use heapless::String;

use crate::{
    error::Error,
    events::{socket_bit, SEND_FAIL, SEND_OK},
    session::{SessionId, SessionState},
    state::{Diagnostics, State, WifiState},
    tick::Clock,
    MAX_SEND_CHUNK, RESP_BUF_LEN,
};

const SEND_PREPARE_TIMEOUT: Duration = Duration::from_millis(3000);
const SEND_ACCEPT_TIMEOUT_MS: u32 = 5000;
const SEND_RESULT_TIMEOUT_MS: u32 = 100;
const SEND_SETTLE_MS: u32 = 100;
const CLOSE_TIMEOUT: Duration = Duration::from_millis(3000);
const STATUS_TIMEOUT: Duration = Duration::from_millis(1000);

/// Application side handle to the connection manager.
///
/// Every method taking the AT mutex blocks until the
/// [`WifiRunner`](crate::WifiRunner) finished its current iteration.
pub struct WifiDevice<'d, AT, C> {
    pub(crate) state: &'d State<C>,
    pub(crate) at: &'d Mutex<CriticalSectionRawMutex, AT>,
}

impl<AT, C> Clone for WifiDevice<'_, AT, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<AT, C> Copy for WifiDevice<'_, AT, C> {}

impl<'d, AT, C> WifiDevice<'d, AT, C>
where
    AT: AtClient<RESP_BUF_LEN>,
    C: Clock,
{
    pub fn new(state: &'d State<C>, at: &'d Mutex<CriticalSectionRawMutex, AT>) -> Self {
        Self { state, at }
    }

    pub fn state(&self) -> &'d State<C> {
        self.state
    }

    /// Send `buf` on `session`, all or nothing.
    pub fn session_send(&self, session: SessionId, buf: &[u8]) -> Result<usize, Error> {
        let mut at = block_on(self.at.lock());
        self.send_locked(&mut *at, session, buf)
    }

    /// Close `session` and wait for the module to confirm it.
    pub fn session_close(&self, session: SessionId) -> Result<(), Error> {
        let mut at = block_on(self.at.lock());
        self.close_locked(&mut *at, session)
    }

    /// Reset the module on the next iteration of the runner.
    pub fn request_reset(&self) {
        let _at = block_on(self.at.lock());
        warn!("wifi reset requested");
        self.state.set_wifi_state(WifiState::Reset);
    }

    /// Reset the module and join through SmartConfig provisioning, even if
    /// credentials are configured.
    pub fn request_provisioning(&self) {
        let _at = block_on(self.at.lock());
        warn!("wifi provisioning requested");
        self.state.set_provisioning(true);
        self.state.set_wifi_state(WifiState::Reset);
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.state.diagnostics()
    }

    /// Log the connection state and the session table.
    pub fn dump(&self) {
        let diag = self.diagnostics();
        info!("wifi state: {:?}", diag.state);
        info!(
            "ip: {}, gateway: {}, netmask: {}",
            diag.ip.as_str(),
            diag.gateway.as_str(),
            diag.netmask.as_str()
        );
        for (i, session) in diag.sessions.iter().enumerate() {
            info!(
                "session {}: link {:?}, {:?}, {} blocks",
                i, session.link_id, session.state, session.pending_blocks
            );
        }
    }

    pub(crate) fn send_locked(
        &self,
        at: &mut AT,
        session: SessionId,
        buf: &[u8],
    ) -> Result<usize, Error> {
        if self.state.session_state(session) != SessionState::Connected {
            return Err(Error::NotConnected);
        }
        let link_id = self.state.connected_link(session).ok_or(Error::InvalidSession)?;
        self.socket_send(at, link_id, buf)
    }

    /// Close the link of `session`. The slot is released once the module no
    /// longer lists the link; until then it stays closing.
    pub(crate) fn close_locked(&self, at: &mut AT, session: SessionId) -> Result<(), Error> {
        let Some(link_id) = self.state.begin_close(session) else {
            return Ok(());
        };
        self.socket_close(at, link_id)?;
        self.state.finish_close(session);
        Ok(())
    }

    fn socket_send(&self, at: &mut AT, link_id: u8, buf: &[u8]) -> Result<usize, Error> {
        if buf.is_empty() {
            return Ok(0);
        }

        let result = buf
            .chunks(MAX_SEND_CHUNK)
            .try_for_each(|chunk| self.send_chunk(at, link_id, chunk));

        self.state.clock.delay_ms(SEND_SETTLE_MS);
        self.state.set_sending(None);

        match result {
            Ok(()) => {
                debug!("socket ({}) sent {} bytes", link_id, buf.len());
                Ok(buf.len())
            }
            Err(e) => {
                error!("socket ({}) send {} bytes failed: {:?}", link_id, buf.len(), e);
                Err(e)
            }
        }
    }

    fn send_chunk(&self, at: &mut AT, link_id: u8, chunk: &[u8]) -> Result<(), Error> {
        let events = &self.state.events;
        let clock = &self.state.clock;

        events.clear(socket_bit(link_id) | SEND_OK | SEND_FAIL);
        self.state.set_sending(Some(link_id));

        let mut resp = Response::<RESP_BUF_LEN>::new(2, SEND_PREPARE_TIMEOUT);
        at.exec_command(
            Some(&mut resp),
            format_args!("AT+CIPSEND={},{}", link_id, chunk.len()),
        )?;
        at.send_raw(chunk)?;

        events
            .wait_any(socket_bit(link_id), SEND_ACCEPT_TIMEOUT_MS, clock)
            .ok_or(Error::SendTimeout)?;
        let outcome = events
            .wait_any(SEND_OK | SEND_FAIL, SEND_RESULT_TIMEOUT_MS, clock)
            .ok_or(Error::SendTimeout)?;
        if outcome & SEND_FAIL != 0 {
            return Err(Error::SendFailed);
        }
        Ok(())
    }

    fn socket_close(&self, at: &mut AT, link_id: u8) -> Result<(), Error> {
        let mut resp = Response::<RESP_BUF_LEN>::new(0, CLOSE_TIMEOUT);

        // An already closed link answers ERROR, the status query below decides
        if let Err(at_client::Error::Timeout) =
            at.exec_command(Some(&mut resp), format_args!("AT+CIPCLOSE={}", link_id))
        {
            error!("socket ({}) close timed out", link_id);
            return Err(Error::CloseFailed);
        }

        resp.set_info(0, STATUS_TIMEOUT);
        at.exec_command(Some(&mut resp), format_args!("AT+CIPSTATUS"))?;

        let mut keyword = String::<16>::new();
        // "+CIPSTATUS:" and a u8 always fit
        core::fmt::write(&mut keyword, format_args!("+CIPSTATUS:{}", link_id)).ok();
        if resp.get_line_by_keyword(&keyword).is_some() {
            error!("socket ({}) close failed", link_id);
            return Err(Error::CloseFailed);
        }

        info!("socket ({}) closed", link_id);
        Ok(())
    }
}
