use core::cell::RefCell;

use embassy_sync::{
    blocking_mutex::{raw::CriticalSectionRawMutex, Mutex},
    signal::Signal,
};

use crate::response::Response;

/// Lifecycle of a client slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Status {
    Uninitialized,
    Initialized,
    /// Command line passthrough, responses are not captured
    Cli,
}

struct Shared<const N: usize> {
    name: Option<&'static str>,
    status: Status,
    /// Response currently being filled by the parser
    pending: Option<Response<N>>,
    /// Response handed back to the client once a terminal line arrived
    completed: Option<Response<N>>,
}

/// State shared between a [`Client`](crate::Client) and its
/// [`Parser`](crate::Parser).
pub struct ClientState<const N: usize> {
    shared: Mutex<CriticalSectionRawMutex, RefCell<Shared<N>>>,
    resp_notice: Signal<CriticalSectionRawMutex, ()>,
}

impl<const N: usize> Default for ClientState<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> ClientState<N> {
    pub const fn new() -> Self {
        Self {
            shared: Mutex::new(RefCell::new(Shared {
                name: None,
                status: Status::Uninitialized,
                pending: None,
                completed: None,
            })),
            resp_notice: Signal::new(),
        }
    }

    pub fn status(&self) -> Status {
        self.shared.lock(|s| s.borrow().status)
    }

    /// Name of the transport this slot is bound to
    pub fn name(&self) -> Option<&'static str> {
        self.shared.lock(|s| s.borrow().name)
    }

    /// Enter or leave CLI passthrough mode.
    pub fn set_cli(&self, enable: bool) {
        self.shared.lock(|s| {
            let mut s = s.borrow_mut();
            s.status = match (s.status, enable) {
                (Status::Uninitialized, _) => Status::Uninitialized,
                (_, true) => Status::Cli,
                (_, false) => Status::Initialized,
            };
        })
    }

    /// Bind an unused slot to `name`. Returns `false` if the slot is taken.
    pub(crate) fn try_bind(&self, name: &'static str) -> bool {
        self.shared.lock(|s| {
            let mut s = s.borrow_mut();
            if s.name.is_some() {
                return false;
            }
            s.name = Some(name);
            s.status = Status::Initialized;
            true
        })
    }

    /// Install `resp` as the response the parser fills next.
    pub(crate) fn begin(&self, resp: Response<N>) {
        self.resp_notice.reset();
        self.shared.lock(|s| {
            let mut s = s.borrow_mut();
            s.pending = Some(resp);
            s.completed = None;
        })
    }

    pub(crate) fn try_take_notice(&self) -> bool {
        self.resp_notice.try_take().is_some()
    }

    /// Take the response back from the parser.
    ///
    /// The flag is `true` when the response was completed by a terminal line
    /// before being taken.
    pub(crate) fn finish(&self) -> Option<(Response<N>, bool)> {
        self.shared.lock(|s| {
            let mut s = s.borrow_mut();
            if let Some(resp) = s.completed.take() {
                s.pending = None;
                return Some((resp, true));
            }
            s.pending.take().map(|resp| (resp, false))
        })
    }

    /// Route one line to the pending response.
    ///
    /// Returns `false` if no response is pending and the line was not used.
    pub(crate) fn feed_line(&self, line: &[u8]) -> bool {
        let completed = self.shared.lock(|s| {
            let mut s = s.borrow_mut();
            let Some(resp) = s.pending.as_mut() else {
                return None;
            };
            if resp.feed_line(line) {
                s.completed = s.pending.take();
                Some(true)
            } else {
                Some(false)
            }
        });

        match completed {
            Some(true) => {
                self.resp_notice.signal(());
                true
            }
            Some(false) => true,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ResponseStatus;
    use embassy_time::Duration;

    #[test]
    fn lines_dropped_without_pending_response() {
        let state = ClientState::<64>::new();
        assert!(!state.feed_line(b"OK"));
        assert!(state.finish().is_none());
    }

    #[test]
    fn completion_signals_once() {
        let state = ClientState::<64>::new();
        state.begin(Response::new(0, Duration::from_millis(100)));

        assert!(state.feed_line(b"+CWMODE_CUR:1"));
        assert!(!state.try_take_notice());
        assert!(state.feed_line(b"OK"));
        assert!(state.try_take_notice());
        assert!(!state.try_take_notice());

        // Exchange is over, further lines are not captured
        assert!(!state.feed_line(b"late"));

        let (resp, completed) = state.finish().unwrap();
        assert!(completed);
        assert_eq!(resp.status(), ResponseStatus::Ok);
        assert_eq!(resp.get_line(1), Some("+CWMODE_CUR:1"));
    }

    #[test]
    fn cli_mode_requires_binding() {
        let state = ClientState::<64>::new();
        state.set_cli(true);
        assert_eq!(state.status(), Status::Uninitialized);

        assert!(state.try_bind("uart2"));
        assert!(!state.try_bind("uart3"));
        assert_eq!(state.name(), Some("uart2"));

        state.set_cli(true);
        assert_eq!(state.status(), Status::Cli);
        state.set_cli(false);
        assert_eq!(state.status(), Status::Initialized);
    }
}
