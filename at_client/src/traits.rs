use embassy_time::Duration;

use crate::{Error, Response};

/// Command side of an AT client.
///
/// Implemented by [`Client`](crate::Client). Code driving a module should
/// depend on this trait, so it can be exercised against a scripted client.
pub trait AtClient<const N: usize> {
    /// Send `cmd` followed by CRLF.
    ///
    /// With a response, block until a terminal line arrives or the response
    /// timeout elapses. Returns [`Error::Timeout`] when nothing terminated the
    /// exchange in time, and [`Error::Error`] when it terminated with an error
    /// line or overflowed the response buffer. The response keeps the lines
    /// received either way.
    ///
    /// Without a response, the command is only written.
    fn exec_command(
        &mut self,
        resp: Option<&mut Response<N>>,
        cmd: core::fmt::Arguments<'_>,
    ) -> Result<(), Error>;

    /// Write `buf` as is, without a line terminator.
    fn send_raw(&mut self, buf: &[u8]) -> Result<usize, Error>;

    /// Probe the module with `AT` until it answers, or `timeout` elapses.
    fn wait_connect(&mut self, timeout: Duration) -> Result<(), Error>;
}
