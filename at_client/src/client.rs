use core::fmt::Write as _;

use embassy_time::Duration;
use embedded_io::Write;
use heapless::String;

use crate::{
    helpers::LossyStr,
    response::{Response, ResponseStatus},
    state::{ClientState, Status},
    timer::Timer,
    AtClient, Config, Error, AT_CMD_MAX_LEN,
};

/// Client responsible for sending commands and waiting for their responses.
///
/// Lines are read on the other side of the shared [`ClientState`] by a
/// [`Parser`](crate::Parser), which signals the client once the pending
/// response is terminated. Only one exchange is in flight at a time, callers
/// serialize access by holding the client mutably.
pub struct Client<'a, W, const N: usize>
where
    W: Write,
{
    writer: W,
    state: &'a ClientState<N>,
    last_cmd: String<AT_CMD_MAX_LEN>,
    config: Config,
}

impl<'a, W, const N: usize> Client<'a, W, N>
where
    W: Write,
{
    pub fn new(writer: W, state: &'a ClientState<N>, config: Config) -> Self {
        Self {
            writer,
            state,
            last_cmd: String::new(),
            config,
        }
    }

    pub fn state(&self) -> &'a ClientState<N> {
        self.state
    }

    /// The last command sent, without its line terminator
    pub fn last_cmd(&self) -> &str {
        self.last_cmd.as_str()
    }

    fn send_command(&mut self, cmd: core::fmt::Arguments<'_>) -> Result<(), Error> {
        self.last_cmd.clear();
        self.last_cmd.write_fmt(cmd).map_err(|_| {
            error!("Command does not fit {} bytes", AT_CMD_MAX_LEN);
            Error::Overflow
        })?;

        if self.last_cmd.len() < 50 {
            debug!("Sending command: {:?}", self.last_cmd.as_str());
        } else {
            debug!(
                "Sending command with long payload ({} bytes)",
                self.last_cmd.len()
            );
        }

        self.writer
            .write_all(self.last_cmd.as_bytes())
            .map_err(|_| Error::Write)?;
        self.writer.write_all(b"\r\n").map_err(|_| Error::Write)?;
        self.writer.flush().map_err(|_| Error::Write)?;
        Ok(())
    }

    fn send_request(
        &mut self,
        resp: &mut Response<N>,
        cmd: core::fmt::Arguments<'_>,
    ) -> Result<(), Error> {
        resp.reset();
        let timeout = resp.timeout();
        self.state.begin(core::mem::take(resp));

        let sent = self.send_command(cmd);
        if sent.is_ok() {
            Timer::with_timeout(timeout, self.config.poll_interval, || {
                self.state.try_take_notice().then_some(())
            });
        }

        // A terminal line may still have landed after the wait gave up, so
        // trust the slot rather than the wait.
        let completed = match self.state.finish() {
            Some((r, completed)) => {
                *resp = r;
                completed
            }
            None => false,
        };
        sent?;

        if !completed {
            resp.set_status(ResponseStatus::Timeout);
            error!(
                "execute command ({:?}) timeout ({} ms)!",
                self.last_cmd.as_str(),
                timeout.as_millis()
            );
            return Err(Error::Timeout);
        }

        match resp.status() {
            ResponseStatus::Ok => Ok(()),
            status => {
                error!(
                    "execute command ({:?}) failed: {:?}",
                    self.last_cmd.as_str(),
                    status
                );
                Err(Error::Error)
            }
        }
    }
}

impl<W, const N: usize> AtClient<N> for Client<'_, W, N>
where
    W: Write,
{
    fn exec_command(
        &mut self,
        resp: Option<&mut Response<N>>,
        cmd: core::fmt::Arguments<'_>,
    ) -> Result<(), Error> {
        match resp {
            None => self.send_command(cmd),
            Some(_) if self.state.status() == Status::Cli => {
                error!("Execute command failed, client is in CLI mode");
                Err(Error::Busy)
            }
            Some(resp) => self.send_request(resp, cmd),
        }
    }

    fn send_raw(&mut self, buf: &[u8]) -> Result<usize, Error> {
        trace!("send raw: {:?}", LossyStr(buf));

        self.writer.write_all(buf).map_err(|_| Error::Write)?;
        self.writer.flush().map_err(|_| Error::Write)?;
        Ok(buf.len())
    }

    fn wait_connect(&mut self, timeout: Duration) -> Result<(), Error> {
        let deadline = Timer::after(timeout);
        let mut probe = Response::<N>::new(0, self.config.probe_timeout);

        loop {
            match self.exec_command(Some(&mut probe), format_args!("AT")) {
                // Any terminated answer means the module is alive
                Ok(()) | Err(Error::Error) => return Ok(()),
                Err(Error::Timeout) => {}
                Err(e) => return Err(e),
            }

            if deadline.expired() {
                error!("AT client connect failed after {} ms", timeout.as_millis());
                return Err(Error::Timeout);
            }
        }
    }
}
