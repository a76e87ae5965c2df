use heapless::{Deque, Vec};

use crate::tick::Tick;

/// Number of concurrent sessions, matching the module's link ids `0..5`
pub const MAX_SESSIONS: usize = 5;
/// Largest inbound chunk a session can buffer
pub const SESSION_BLOCK_SIZE: usize = 512;
/// Inbound chunks buffered per session before further chunks are dropped
pub const SESSION_BLOCK_COUNT: usize = 4;

/// One received chunk
pub type Block = Vec<u8, SESSION_BLOCK_SIZE>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionState {
    Closed,
    /// Waiting for the module to confirm the link is gone
    Closing,
    Connected,
}

/// Handle to one slot of the session pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SessionId(pub(crate) usize);

impl SessionId {
    pub fn index(&self) -> usize {
        self.0
    }
}

pub(crate) struct WifiSession {
    pub(crate) link_id: Option<u8>,
    /// Idle deadline
    pub(crate) timeout: Tick,
    pub(crate) state: SessionState,
    pub(crate) blocks: Deque<Block, SESSION_BLOCK_COUNT>,
}

impl WifiSession {
    pub(crate) const fn new() -> Self {
        Self {
            link_id: None,
            timeout: 0,
            state: SessionState::Closed,
            blocks: Deque::new(),
        }
    }

    /// Release the slot and drop everything it buffered.
    pub(crate) fn clean(&mut self) {
        self.link_id = None;
        self.blocks.clear();
        self.state = SessionState::Closed;
    }

    /// Bind the slot to `link_id` as a fresh connection.
    pub(crate) fn claim(&mut self, link_id: u8, deadline: Tick) {
        self.clean();
        self.link_id = Some(link_id);
        self.timeout = deadline;
        self.state = SessionState::Connected;
    }

    pub(crate) fn is_free(&self) -> bool {
        self.link_id.is_none() && self.state == SessionState::Closed
    }
}

/// Slot bound to `link_id`, or else the first free slot.
pub(crate) fn find_slot(sessions: &[WifiSession], link_id: u8) -> Option<usize> {
    sessions
        .iter()
        .position(|s| s.link_id == Some(link_id) && s.state != SessionState::Closed)
        .or_else(|| sessions.iter().position(WifiSession::is_free))
}
