use embassy_time::{block_for, Duration};
use embedded_io::{Read, ReadReady};

use crate::{
    helpers::LossyStr,
    state::ClientState,
    timer::Timer,
    urc::{find_urc, RawReceive, Urc, UrcHandler},
    Config, Error,
};

/// Receive side of an AT client.
///
/// The parser reads the serial stream one byte at a time and cuts it into
/// lines. A line ends on CRLF, on the configured end sign, or as soon as the
/// bytes collected so far match an entry of the URC table, which lets URCs
/// without a line terminator (such as `+IPD,0,10:`) be handed over before
/// their binary payload.
///
/// Every line is routed, in order, to:
/// 1. the handler of the first matching URC, which may then pull a payload
///    through [`RawReceive`];
/// 2. the pending response of the client, with the terminator stripped;
/// 3. nowhere, when no response is pending.
pub struct Parser<'a, R, H, const N: usize>
where
    R: Read + ReadReady,
    H: UrcHandler,
{
    reader: R,
    state: &'a ClientState<N>,
    handler: &'a H,
    urc_table: &'a [Urc<H::Kind>],
    line_buf: &'a mut [u8],
    end_sign: Option<u8>,
    config: Config,
}

impl<'a, R, H, const N: usize> Parser<'a, R, H, N>
where
    R: Read + ReadReady,
    H: UrcHandler,
{
    pub fn new(
        reader: R,
        state: &'a ClientState<N>,
        handler: &'a H,
        line_buf: &'a mut [u8],
        config: Config,
    ) -> Self {
        Self {
            reader,
            state,
            handler,
            urc_table: &[],
            line_buf,
            end_sign: None,
            config,
        }
    }

    /// Replace the URC table. Entries are matched in order.
    pub fn set_urc_table(&mut self, table: &'a [Urc<H::Kind>]) {
        self.urc_table = table;
    }

    /// Byte that terminates a line on its own, in addition to CRLF.
    /// `None` disables it.
    pub fn set_end_sign(&mut self, end_sign: Option<u8>) {
        self.end_sign = end_sign;
    }

    /// Read and dispatch lines forever.
    pub fn run(&mut self) -> ! {
        loop {
            self.poll();
        }
    }

    /// One iteration of [`Self::run`]. A failed read is retried only after
    /// the configured delay.
    fn poll(&mut self) {
        match self.digest_line() {
            Ok(()) | Err(Error::Overflow) => {}
            Err(e) => {
                error!("AT client parser error: {:?}", e);
                block_for(self.config.read_retry_delay);
            }
        }
    }

    /// Read one line and dispatch it.
    ///
    /// A line longer than the line buffer is discarded as a whole and reported
    /// as [`Error::Overflow`]. Reading resumes with the next line.
    pub fn digest_line(&mut self) -> Result<(), Error> {
        let len = self.read_line()?;
        let line = &self.line_buf[..len];

        if let Some(urc) = find_urc(self.urc_table, line) {
            debug!("Received URC: {:?}", LossyStr(line));
            let mut raw = RawReceiver {
                reader: &mut self.reader,
                timeout: self.config.recv_timeout,
                poll: self.config.poll_interval,
            };
            self.handler.handle(urc.kind, line, &mut raw);
            return Ok(());
        }

        let line = strip_terminator(line, self.end_sign);
        if self.state.feed_line(line) {
            trace!("Received line: {:?}", LossyStr(line));
        } else {
            trace!("Dropping unsolicited line: {:?}", LossyStr(line));
        }
        Ok(())
    }

    fn getchar(&mut self) -> Result<u8, Error> {
        let mut byte = [0u8];
        match self.reader.read(&mut byte) {
            Ok(1) => Ok(byte[0]),
            _ => Err(Error::Read),
        }
    }

    fn read_line(&mut self) -> Result<usize, Error> {
        let mut len = 0;
        let mut is_full = false;
        let mut last = 0u8;

        loop {
            let ch = self.getchar()?;

            if len < self.line_buf.len() {
                self.line_buf[len] = ch;
                len += 1;
            } else {
                is_full = true;
            }

            let line = &self.line_buf[..len];
            if (ch == b'\n' && last == b'\r')
                || self.end_sign == Some(ch)
                || find_urc(self.urc_table, line).is_some()
            {
                if is_full {
                    error!(
                        "Read line failed. The line data length is out of buffer size({})!",
                        self.line_buf.len()
                    );
                    return Err(Error::Overflow);
                }
                return Ok(len);
            }

            last = ch;
        }
    }
}

fn strip_terminator(line: &[u8], end_sign: Option<u8>) -> &[u8] {
    if let Some(line) = line.strip_suffix(b"\r\n") {
        return line;
    }
    match (line.split_last(), end_sign) {
        (Some((last, line)), Some(sign)) if *last == sign => line,
        _ => line,
    }
}

struct RawReceiver<'r, R> {
    reader: &'r mut R,
    timeout: Duration,
    poll: Duration,
}

impl<R> RawReceive for RawReceiver<'_, R>
where
    R: Read + ReadReady,
{
    fn recv_raw(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> Result<usize, Error> {
        let timeout = timeout.unwrap_or(self.timeout);
        let mut read = 0;

        while read < buf.len() {
            let reader = &mut *self.reader;
            Timer::with_timeout(timeout, self.poll, || match reader.read_ready() {
                Ok(true) => Some(Ok(())),
                Ok(false) => None,
                Err(_) => Some(Err(Error::Read)),
            })
            .ok_or_else(|| {
                error!(
                    "AT client receive raw data timeout ({} ms) after {} of {} bytes",
                    timeout.as_millis(),
                    read,
                    buf.len()
                );
                Error::Timeout
            })??;

            match self.reader.read(&mut buf[read..]) {
                Ok(0) | Err(_) => return Err(Error::Read),
                Ok(n) => read += n,
            }
        }

        trace!("Received raw data: {:?}", LossyStr(buf));
        Ok(read)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::ScriptedRx;
    use crate::{Response, ResponseStatus};
    use core::cell::RefCell;
    use std::vec::Vec;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Kind {
        Connect,
        Ipd,
        SendOk,
    }

    const URCS: &[Urc<Kind>] = &[
        Urc::new("", ",CONNECT\r\n", Kind::Connect),
        Urc::new("+IPD", ":", Kind::Ipd),
        Urc::new("SEND OK", "\r\n", Kind::SendOk),
    ];

    #[derive(Default)]
    struct Recorder {
        urcs: RefCell<Vec<(Kind, Vec<u8>)>>,
        payloads: RefCell<Vec<Vec<u8>>>,
    }

    impl UrcHandler for Recorder {
        type Kind = Kind;

        fn handle<R: RawReceive>(&self, kind: Kind, line: &[u8], raw: &mut R) {
            self.urcs.borrow_mut().push((kind, line.to_vec()));

            if kind == Kind::Ipd {
                let len: usize = core::str::from_utf8(&line[5..line.len() - 1])
                    .unwrap()
                    .rsplit(',')
                    .next()
                    .unwrap()
                    .parse()
                    .unwrap();
                let mut payload = vec![0u8; len];
                match raw.recv_raw(&mut payload, None) {
                    Ok(n) => {
                        assert_eq!(n, len);
                        self.payloads.borrow_mut().push(payload);
                    }
                    Err(e) => assert_eq!(e, Error::Timeout),
                }
            }
        }
    }

    macro_rules! setup {
        ($input:expr, $line_len:literal) => {{
            (
                ClientState::<64>::new(),
                Recorder::default(),
                [0u8; $line_len],
                ScriptedRx::new($input),
            )
        }};
    }

    fn digest_all<R, H, const N: usize>(parser: &mut Parser<'_, R, H, N>) -> Vec<Result<(), Error>>
    where
        R: Read + ReadReady,
        H: UrcHandler,
    {
        let mut results = Vec::new();
        loop {
            match parser.digest_line() {
                Err(Error::Read) => return results,
                res => results.push(res),
            }
        }
    }

    #[test]
    fn routes_lines_to_pending_response() {
        let (state, handler, mut buf, rx) = setup!(b"+CIPMUX:1\r\n\r\nOK\r\n", 32);
        let mut parser = Parser::new(rx, &state, &handler, &mut buf, Config::new());
        state.begin(Response::new(0, Duration::from_millis(10)));

        assert_eq!(digest_all(&mut parser), [Ok(()), Ok(()), Ok(())]);

        let (resp, completed) = state.finish().unwrap();
        assert!(completed);
        assert_eq!(resp.status(), ResponseStatus::Ok);
        assert_eq!(resp.line_counts(), 2);
        assert_eq!(resp.get_line(1), Some("+CIPMUX:1"));
        assert_eq!(resp.get_line(2), Some(""));
    }

    #[test]
    fn urc_wins_over_pending_response() {
        let (state, handler, mut buf, rx) = setup!(b"2,CONNECT\r\nSEND OK\r\nOK\r\n", 32);
        let mut parser = Parser::new(rx, &state, &handler, &mut buf, Config::new());
        parser.set_urc_table(URCS);
        state.begin(Response::new(0, Duration::from_millis(10)));

        digest_all(&mut parser);

        let (resp, completed) = state.finish().unwrap();
        assert!(completed);
        assert_eq!(resp.line_counts(), 0);
        assert_eq!(
            *handler.urcs.borrow(),
            [
                (Kind::Connect, b"2,CONNECT\r\n".to_vec()),
                (Kind::SendOk, b"SEND OK\r\n".to_vec()),
            ]
        );
    }

    #[test]
    fn urc_pulls_raw_payload() {
        let (state, handler, mut buf, rx) =
            setup!(b"+IPD,0,5:he\r\nl+IPD,3,2:hiOK\r\n", 32);
        let mut parser = Parser::new(rx, &state, &handler, &mut buf, Config::new());
        parser.set_urc_table(URCS);

        assert_eq!(digest_all(&mut parser), [Ok(()), Ok(()), Ok(())]);

        assert_eq!(
            *handler.payloads.borrow(),
            [b"he\r\nl".to_vec(), b"hi".to_vec()]
        );
        let urcs = handler.urcs.borrow();
        assert_eq!(urcs[0], (Kind::Ipd, b"+IPD,0,5:".to_vec()));
        assert_eq!(urcs[1], (Kind::Ipd, b"+IPD,3,2:".to_vec()));
    }

    #[test]
    fn raw_payload_stall_times_out() {
        let (state, handler, mut buf, rx) = setup!(b"+IPD,0,10:abc", 32);
        let mut parser = Parser::new(rx, &state, &handler, &mut buf, Config::new());
        parser.set_urc_table(URCS);

        assert_eq!(digest_all(&mut parser), [Ok(())]);
        assert!(handler.payloads.borrow().is_empty());
    }

    #[test]
    fn overflowing_line_is_discarded() {
        let (state, handler, mut buf, rx) = setup!(b"0123456789ABCDEF\r\nOK\r\n", 8);
        let mut parser = Parser::new(rx, &state, &handler, &mut buf, Config::new());
        state.begin(Response::new(0, Duration::from_millis(10)));

        assert_eq!(digest_all(&mut parser), [Err(Error::Overflow), Ok(())]);

        let (resp, completed) = state.finish().unwrap();
        assert!(completed);
        assert_eq!(resp.line_counts(), 0);
    }

    #[test]
    fn end_sign_terminates_line() {
        let (state, handler, mut buf, rx) = setup!(b"\r\nOK\r\n> ", 32);
        let mut parser = Parser::new(rx, &state, &handler, &mut buf, Config::new());
        parser.set_end_sign(Some(b'>'));
        state.begin(Response::new(3, Duration::from_millis(10)));

        digest_all(&mut parser);

        let (resp, completed) = state.finish().unwrap();
        assert!(completed);
        assert_eq!(resp.lines().collect::<Vec<_>>(), [&b""[..], &b"OK"[..], &b""[..]]);
        assert_eq!(parser.reader.remaining(), 0);
    }

    #[test]
    fn unsolicited_lines_dropped() {
        let (state, handler, mut buf, rx) = setup!(b"WIFI GOT IP\r\nready\r\n", 32);
        let mut parser = Parser::new(rx, &state, &handler, &mut buf, Config::new());

        assert_eq!(digest_all(&mut parser), [Ok(()), Ok(())]);
        assert!(state.finish().is_none());
    }

    #[test]
    fn failed_read_waits_before_retry() {
        let (state, handler, mut buf, rx) = setup!(b"", 32);
        let config = Config::new().read_retry_delay(Duration::from_millis(30));
        let mut parser = Parser::new(rx, &state, &handler, &mut buf, config);

        let start = embassy_time::Instant::now();
        parser.poll();
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn terminator_stripping() {
        assert_eq!(strip_terminator(b"OK\r\n", None), b"OK");
        assert_eq!(strip_terminator(b"SEND>", Some(b'>')), b"SEND");
        assert_eq!(strip_terminator(b"SEND>", None), b"SEND>");
        assert_eq!(strip_terminator(b"", Some(b'>')), b"");
    }
}
