//! Doubles for driving the connection manager without a module.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::atomic::{AtomicU32, Ordering};

use at_client::{AtClient, Duration, Error, RawReceive, Response, ResponseStatus};
use embedded_hal::digital::{ErrorType, OutputPin};

use crate::tick::{Clock, Tick};
use crate::RESP_BUF_LEN;

/// Clock that only moves when told to, or when something sleeps on it.
#[derive(Debug, Default)]
pub struct MockClock {
    now: AtomicU32,
}

impl MockClock {
    pub fn new(start: Tick) -> Self {
        Self {
            now: AtomicU32::new(start),
        }
    }

    pub fn advance(&self, ms: u32) {
        let now = self.now.load(Ordering::Relaxed);
        self.now.store(now.wrapping_add(ms), Ordering::Relaxed);
    }
}

impl Clock for MockClock {
    fn now(&self) -> Tick {
        self.now.load(Ordering::Relaxed)
    }

    fn delay_ms(&self, ms: u32) {
        self.advance(ms);
    }
}

/// Payload bytes following a URC line.
pub struct ScriptedRaw {
    data: VecDeque<u8>,
}

impl ScriptedRaw {
    pub fn new(data: &[u8]) -> Self {
        Self {
            data: data.iter().copied().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.data.len()
    }
}

impl RawReceive for ScriptedRaw {
    fn recv_raw(&mut self, buf: &mut [u8], _timeout: Option<Duration>) -> Result<usize, Error> {
        if self.data.len() < buf.len() {
            self.data.clear();
            return Err(Error::Timeout);
        }
        for b in buf.iter_mut() {
            *b = self.data.pop_front().unwrap();
        }
        Ok(buf.len())
    }
}

/// Receive side of a serial port replaying a fixed byte stream, failing once
/// it is exhausted.
pub struct ScriptedRx {
    data: VecDeque<u8>,
}

impl ScriptedRx {
    pub fn new(data: &[u8]) -> Self {
        Self {
            data: data.iter().copied().collect(),
        }
    }
}

impl embedded_io::ErrorType for ScriptedRx {
    type Error = embedded_io::ErrorKind;
}

impl embedded_io::Read for ScriptedRx {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let n = buf.len().min(self.data.len());
        if n == 0 {
            return Err(embedded_io::ErrorKind::Other);
        }
        for (b, d) in buf.iter_mut().zip(self.data.drain(..n)) {
            *b = d;
        }
        Ok(n)
    }
}

impl embedded_io::ReadReady for ScriptedRx {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.data.is_empty())
    }
}

/// How the scripted module answers one command.
#[derive(Debug, Clone, Copy)]
pub enum Reply {
    /// These lines, then `OK`
    Ok(&'static [&'static str]),
    /// These lines, then `ERROR`
    Error(&'static [&'static str]),
    /// These lines, then nothing
    Timeout(&'static [&'static str]),
}

pub const OK: Reply = Reply::Ok(&[]);

type Script<'s> = Box<dyn FnMut(&str) -> Reply + 's>;
type RawHook<'s> = Box<dyn FnMut(&[u8]) + 's>;

/// [`AtClient`] answering every command from a script.
pub struct MockAt<'s> {
    pub sent: Vec<String>,
    pub raw: Vec<Vec<u8>>,
    script: Script<'s>,
    on_raw: RawHook<'s>,
}

impl<'s> MockAt<'s> {
    pub fn new(script: impl FnMut(&str) -> Reply + 's) -> Self {
        Self {
            sent: Vec::new(),
            raw: Vec::new(),
            script: Box::new(script),
            on_raw: Box::new(|_| {}),
        }
    }

    /// Module answering `OK` to everything.
    pub fn ok() -> Self {
        Self::new(|_| OK)
    }

    /// Run `hook` on every raw payload, after it is recorded.
    pub fn on_raw(mut self, hook: impl FnMut(&[u8]) + 's) -> Self {
        self.on_raw = Box::new(hook);
        self
    }
}

impl AtClient<RESP_BUF_LEN> for MockAt<'_> {
    fn exec_command(
        &mut self,
        resp: Option<&mut Response<RESP_BUF_LEN>>,
        cmd: core::fmt::Arguments<'_>,
    ) -> Result<(), Error> {
        let cmd = cmd.to_string();
        let reply = (self.script)(&cmd);
        self.sent.push(cmd);

        let Some(resp) = resp else {
            return Ok(());
        };
        resp.reset();

        let done = match reply {
            Reply::Ok(lines) => {
                lines.iter().any(|l| resp.feed_line(l.as_bytes())) || resp.feed_line(b"OK")
            }
            Reply::Error(lines) => {
                lines.iter().any(|l| resp.feed_line(l.as_bytes())) || resp.feed_line(b"ERROR")
            }
            Reply::Timeout(lines) => {
                lines.iter().for_each(|l| {
                    resp.feed_line(l.as_bytes());
                });
                false
            }
        };

        if !done {
            return Err(Error::Timeout);
        }
        match resp.status() {
            ResponseStatus::Ok => Ok(()),
            _ => Err(Error::Error),
        }
    }

    fn send_raw(&mut self, buf: &[u8]) -> Result<usize, Error> {
        self.raw.push(buf.to_vec());
        (self.on_raw)(buf);
        Ok(buf.len())
    }

    fn wait_connect(&mut self, _timeout: Duration) -> Result<(), Error> {
        let reply = (self.script)("AT");
        self.sent.push("AT".to_string());
        match reply {
            Reply::Timeout(_) => Err(Error::Timeout),
            _ => Ok(()),
        }
    }
}

/// Output pin remembering every level it was driven to.
#[derive(Debug, Default)]
pub struct RecordingPin {
    pub levels: Vec<bool>,
}

impl ErrorType for RecordingPin {
    type Error = Infallible;
}

impl OutputPin for RecordingPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.levels.push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.levels.push(true);
        Ok(())
    }
}
