use core::cell::RefCell;

use at_client::{helpers::LossyStr, RawReceive, UrcHandler};
use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};
use heapless::String;

use crate::{
    config::WifiConfig,
    events::{socket_bit, EventFlags, SEND_FAIL, SEND_OK},
    session::{
        find_slot, Block, SessionId, SessionState, WifiSession, MAX_SESSIONS, SESSION_BLOCK_SIZE,
    },
    tick::{expired, Clock, Tick},
    urc::{self, StationField, WifiUrc},
};

/// Capacity of a dotted quad address string
pub const ADDR_STR_LEN: usize = 15;

/// Error count that always resets the module
pub(crate) const ERROR_FATAL: u16 = u16::MAX;

/// Most bytes skipped looking for the end of an unparsable `+IPD` payload
const RESYNC_LIMIT: usize = 4096;

/// Bring-up state of the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WifiState {
    Reset,
    PowerOn,
    ParaInit,
    NetInit,
    NetProcess,
}

struct Shared {
    wifi_state: WifiState,
    error_cnt: u16,
    /// Liveness deadline, pushed forward while any session is connected
    wifi_timeout: Tick,
    sessions: [WifiSession; MAX_SESSIONS],
    ip: String<ADDR_STR_LEN>,
    gateway: String<ADDR_STR_LEN>,
    netmask: String<ADDR_STR_LEN>,
    /// Link whose `SEND OK`/`SEND FAIL` is awaited
    sending_link: Option<u8>,
    /// Join through provisioning even when credentials are configured
    provisioning: bool,
}

/// State shared between the URC handlers on the parser thread, the
/// [`WifiRunner`](crate::WifiRunner) and the [`WifiDevice`](crate::WifiDevice).
///
/// Everything lives behind a critical section mutex that is never held
/// across a blocking call, so it can be taken from URC handler context while
/// the runner holds the AT mutex.
pub struct State<C> {
    pub(crate) clock: C,
    pub(crate) config: WifiConfig,
    shared: Mutex<CriticalSectionRawMutex, RefCell<Shared>>,
    pub(crate) events: EventFlags,
}

impl<C> State<C> {
    const SESSION_INIT: WifiSession = WifiSession::new();

    pub const fn new(clock: C, config: WifiConfig) -> Self {
        Self {
            clock,
            config,
            shared: Mutex::new(RefCell::new(Shared {
                wifi_state: WifiState::Reset,
                error_cnt: 0,
                wifi_timeout: 0,
                sessions: [Self::SESSION_INIT; MAX_SESSIONS],
                ip: String::new(),
                gateway: String::new(),
                netmask: String::new(),
                sending_link: None,
                provisioning: false,
            })),
            events: EventFlags::new(),
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn config(&self) -> &WifiConfig {
        &self.config
    }

    fn with<R>(&self, f: impl FnOnce(&mut Shared) -> R) -> R {
        self.shared.lock(|s| f(&mut s.borrow_mut()))
    }

    pub fn wifi_state(&self) -> WifiState {
        self.with(|s| s.wifi_state)
    }

    pub fn session_state(&self, id: SessionId) -> SessionState {
        self.with(|s| {
            s.sessions
                .get(id.0)
                .map_or(SessionState::Closed, |session| session.state)
        })
    }

    pub fn session_link(&self, id: SessionId) -> Option<u8> {
        self.with(|s| s.sessions.get(id.0).and_then(|session| session.link_id))
    }

    /// Session currently bound to `link_id`
    pub fn session_by_link(&self, link_id: u8) -> Option<SessionId> {
        self.with(|s| {
            s.sessions
                .iter()
                .position(|session| {
                    session.link_id == Some(link_id) && session.state != SessionState::Closed
                })
                .map(SessionId)
        })
    }

    pub fn pending_blocks(&self, id: SessionId) -> usize {
        self.with(|s| s.sessions.get(id.0).map_or(0, |session| session.blocks.len()))
    }

    pub fn error_count(&self) -> u16 {
        self.with(|s| s.error_cnt)
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.with(|s| Diagnostics {
            state: s.wifi_state,
            ip: s.ip.clone(),
            gateway: s.gateway.clone(),
            netmask: s.netmask.clone(),
            sessions: core::array::from_fn(|i| SessionInfo {
                link_id: s.sessions[i].link_id,
                state: s.sessions[i].state,
                pending_blocks: s.sessions[i].blocks.len(),
            }),
        })
    }

    pub(crate) fn set_wifi_state(&self, state: WifiState) {
        self.with(|s| s.wifi_state = state)
    }

    pub(crate) fn set_provisioning(&self, enable: bool) {
        self.with(|s| s.provisioning = enable)
    }

    pub(crate) fn provisioning(&self) -> bool {
        self.with(|s| s.provisioning)
    }

    /// Close every session and forget the network parameters.
    pub(crate) fn reset_network(&self) {
        self.events.clear(u32::MAX);
        self.with(|s| {
            s.sessions.iter_mut().for_each(WifiSession::clean);
            s.ip.clear();
            s.gateway.clear();
            s.netmask.clear();
            s.sending_link = None;
        })
    }

    pub(crate) fn reset_errors(&self) {
        self.with(|s| s.error_cnt = 0)
    }

    pub(crate) fn bump_errors(&self) {
        self.with(|s| s.error_cnt = s.error_cnt.saturating_add(1))
    }

    pub(crate) fn force_fatal(&self) {
        self.with(|s| s.error_cnt = ERROR_FATAL)
    }

    /// Whether the module must be reset, either on a fatal event or once the
    /// error count goes past `max_errors`.
    pub(crate) fn error_limit_reached(&self) -> bool {
        let errors = self.error_count();
        errors == ERROR_FATAL || errors > self.config.max_errors
    }

    pub(crate) fn set_sending(&self, link_id: Option<u8>) {
        self.with(|s| s.sending_link = link_id)
    }

    /// Link of `id` if the session is connected
    pub(crate) fn connected_link(&self, id: SessionId) -> Option<u8> {
        self.with(|s| {
            s.sessions
                .get(id.0)
                .filter(|session| session.state == SessionState::Connected)
                .and_then(|session| session.link_id)
        })
    }

    pub(crate) fn any_connected(&self) -> bool {
        self.with(|s| {
            s.sessions
                .iter()
                .any(|session| session.state == SessionState::Connected)
        })
    }

    pub(crate) fn pop_block(&self, id: SessionId) -> Option<Block> {
        self.with(|s| s.sessions.get_mut(id.0)?.blocks.pop_front())
    }

    /// Mark `id` as closing and return its link, unless there is nothing to
    /// close.
    pub(crate) fn begin_close(&self, id: SessionId) -> Option<u8> {
        self.with(|s| {
            let session = s.sessions.get_mut(id.0)?;
            if session.state == SessionState::Closed {
                return None;
            }
            let link_id = session.link_id?;
            session.state = SessionState::Closing;
            Some(link_id)
        })
    }

    /// Release `id` after its link was closed, unless a URC reclaimed it in
    /// the meantime.
    pub(crate) fn finish_close(&self, id: SessionId) {
        self.with(|s| {
            if let Some(session) = s.sessions.get_mut(id.0) {
                if session.state == SessionState::Closing {
                    session.clean();
                }
            }
        })
    }
}

impl<C: Clock> State<C> {
    pub(crate) fn session_expired(&self, id: SessionId) -> bool {
        let now = self.clock.now();
        self.with(|s| {
            s.sessions
                .get(id.0)
                .is_some_and(|session| expired(now, session.timeout))
        })
    }

    pub(crate) fn refresh_liveness(&self) {
        let deadline = self.clock.deadline(self.config.net_timeout);
        self.with(|s| s.wifi_timeout = deadline)
    }

    pub(crate) fn liveness_expired(&self) -> bool {
        let now = self.clock.now();
        self.with(|s| expired(now, s.wifi_timeout))
    }

    fn in_process(&self) -> bool {
        self.wifi_state() == WifiState::NetProcess
    }

    fn on_station_info(&self, line: &[u8]) {
        let Some((field, value)) = urc::station_info(line) else {
            return;
        };
        let Ok(value) = core::str::from_utf8(value) else {
            return;
        };

        self.with(|s| {
            let target = match field {
                StationField::Ip => &mut s.ip,
                StationField::Gateway => &mut s.gateway,
                StationField::Netmask => &mut s.netmask,
            };
            target.clear();
            for c in value.chars() {
                if target.push(c).is_err() {
                    break;
                }
            }
        })
    }

    fn on_connect(&self, line: &[u8]) {
        if !self.in_process() {
            return;
        }
        let Some(link_id) = urc::link_event(line, ",CONNECT") else {
            return;
        };

        let deadline = self.clock.deadline(self.config.client_timeout);
        let slot = self.with(|s| {
            let slot = find_slot(&s.sessions, link_id)?;
            s.sessions[slot].claim(link_id, deadline);
            Some(slot)
        });

        match slot {
            Some(slot) => info!("socket ({}) connected on session {}", link_id, slot),
            None => warn!("socket ({}) connected, no free session", link_id),
        }
    }

    fn on_closed(&self, line: &[u8]) {
        if !self.in_process() {
            return;
        }
        let Some(link_id) = urc::link_event(line, ",CLOSED") else {
            return;
        };

        self.with(|s| {
            if let Some(session) = s.sessions.iter_mut().find(|session| {
                session.link_id == Some(link_id) && session.state > SessionState::Closing
            }) {
                session.clean();
            }
        });
        info!("socket ({}) closed", link_id);
    }

    fn on_wifi_disconnect(&self) {
        if !self.in_process() {
            return;
        }
        error!("wifi disconnected");
        self.force_fatal();
    }

    fn on_ipd<R: RawReceive>(&self, line: &[u8], raw: &mut R) {
        let Some((link_id, len)) = urc::ipd(line) else {
            error!("malformed IPD {:?}", LossyStr(line));
            match urc::ipd_len(line) {
                Some(len) => drain(raw, len),
                None => skip_until_idle(raw),
            }
            return;
        };
        if len == 0 {
            return;
        }
        if !self.in_process() {
            drain(raw, len);
            return;
        }

        let deadline = self.clock.deadline(self.config.client_timeout);
        let slot = self.with(|s| {
            let slot = find_slot(&s.sessions, link_id)?;
            let session = &mut s.sessions[slot];
            if session.state != SessionState::Connected {
                session.claim(link_id, deadline);
            }
            session.timeout = deadline;
            (!session.blocks.is_full() && len <= SESSION_BLOCK_SIZE).then_some(slot)
        });

        let Some(slot) = slot else {
            warn!("socket ({}) dropped {} bytes", link_id, len);
            drain(raw, len);
            return;
        };

        let mut block = Block::new();
        // Length checked against the block capacity above
        block.resize(len, 0).ok();
        if raw.recv_raw(&mut block[..], None).is_err() {
            error!("socket ({}) recv size ({}) data failed", link_id, len);
            return;
        }

        let deadline = self.clock.deadline(self.config.client_timeout);
        let stored = self.with(|s| {
            let session = &mut s.sessions[slot];
            if session.link_id != Some(link_id) || session.state != SessionState::Connected {
                return false;
            }
            session.timeout = deadline;
            session.blocks.push_back(block).is_ok()
        });

        if stored {
            debug!("socket ({}) received {} bytes", link_id, len);
        } else {
            warn!("socket ({}) dropped {} bytes", link_id, len);
        }
    }

    fn on_send_result(&self, line: &[u8]) {
        let result = if line.starts_with(b"SEND OK") {
            SEND_OK
        } else {
            SEND_FAIL
        };

        let link_id = self.with(|s| {
            let link_id = s.sending_link?;
            s.sessions
                .iter()
                .any(|session| {
                    session.link_id == Some(link_id) && session.state == SessionState::Connected
                })
                .then_some(link_id)
        });

        if let Some(link_id) = link_id {
            self.events.set(socket_bit(link_id) | result);
        }
    }
}

impl<C: Clock> UrcHandler for State<C> {
    type Kind = WifiUrc;

    fn handle<R: RawReceive>(&self, kind: WifiUrc, line: &[u8], raw: &mut R) {
        debug!("URC {:?}: {:?}", kind, LossyStr(line));
        match kind {
            WifiUrc::StationInfo => self.on_station_info(line),
            WifiUrc::Closed => self.on_closed(line),
            WifiUrc::Connect => self.on_connect(line),
            WifiUrc::WifiDisconnect => self.on_wifi_disconnect(),
            WifiUrc::Ipd => self.on_ipd(line, raw),
            WifiUrc::SendResult => self.on_send_result(line),
        }
    }
}

/// Consume a payload that cannot be stored, so the parser resumes on the
/// next line.
fn drain<R: RawReceive>(raw: &mut R, mut len: usize) {
    let mut scratch = [0u8; 64];
    while len > 0 {
        let n = len.min(scratch.len());
        if raw.recv_raw(&mut scratch[..n], None).is_err() {
            break;
        }
        len -= n;
    }
}

/// Consume a payload of unknown length, up to the first gap in the stream.
fn skip_until_idle<R: RawReceive>(raw: &mut R) {
    let mut byte = [0u8];
    let mut skipped = 0;
    while skipped < RESYNC_LIMIT && raw.recv_raw(&mut byte, None).is_ok() {
        skipped += 1;
    }
    warn!("skipped {} bytes after malformed IPD", skipped);
}

/// One slot of a [`Diagnostics`] snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionInfo {
    pub link_id: Option<u8>,
    pub state: SessionState,
    pub pending_blocks: usize,
}

/// Snapshot of the connection manager.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    pub state: WifiState,
    pub ip: String<ADDR_STR_LEN>,
    pub gateway: String<ADDR_STR_LEN>,
    pub netmask: String<ADDR_STR_LEN>,
    pub sessions: [SessionInfo; MAX_SESSIONS],
}

impl core::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "wifi state: {:?}", self.state)?;
        writeln!(
            f,
            "ip: {}, gateway: {}, netmask: {}",
            self.ip, self.gateway, self.netmask
        )?;
        for (i, session) in self.sessions.iter().enumerate() {
            match session.link_id {
                Some(link_id) => writeln!(
                    f,
                    "session {}: link {}, {:?}, {} blocks",
                    i, link_id, session.state, session.pending_blocks
                )?,
                None => writeln!(f, "session {}: {:?}", i, session.state)?,
            }
        }
        Ok(())
    }
}
