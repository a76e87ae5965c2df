use embassy_time::Duration;
use heapless::Vec;
use nom::{
    branch::alt,
    bytes::complete::{take_till, take_till1},
    character::complete::{char, space0},
    combinator::recognize,
    sequence::{delimited, tuple},
    IResult,
};

use crate::helpers::SliceExt;

const AT_RESP_END_OK: &[u8] = b"OK";
const AT_RESP_END_ERROR: &[u8] = b"ERROR";
const AT_RESP_END_FAIL: &[u8] = b"FAIL";

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

/// Final status of one command exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResponseStatus {
    #[default]
    Ok,
    Error,
    Timeout,
    BufferFull,
}

/// Caller owned scratch space for the lines of one command response.
///
/// Lines are stored without their terminator and separated by a NUL byte, so
/// the sum of `line length + 1` over all stored lines never exceeds `N`. A line
/// that does not fit marks the exchange as [`ResponseStatus::BufferFull`],
/// which stays set until the response is reused.
#[derive(Debug, Clone)]
pub struct Response<const N: usize> {
    buf: Vec<u8, N>,
    line_num: usize,
    line_counts: usize,
    /// Lines received towards `line_num`, including the ones that did not fit
    received: usize,
    timeout: Duration,
    status: ResponseStatus,
}

impl<const N: usize> Default for Response<N> {
    fn default() -> Self {
        Self::new(0, DEFAULT_TIMEOUT)
    }
}

impl<const N: usize> Response<N> {
    /// Create a response expecting `line_num` lines, or any number of lines
    /// up to a status line when `line_num` is 0.
    pub const fn new(line_num: usize, timeout: Duration) -> Self {
        Self {
            buf: Vec::new(),
            line_num,
            line_counts: 0,
            received: 0,
            timeout,
            status: ResponseStatus::Ok,
        }
    }

    pub fn set_info(&mut self, line_num: usize, timeout: Duration) {
        self.line_num = line_num;
        self.timeout = timeout;
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn expected_lines(&self) -> usize {
        self.line_num
    }

    /// Number of lines stored by the last exchange
    pub fn line_counts(&self) -> usize {
        self.line_counts
    }

    pub fn status(&self) -> ResponseStatus {
        self.status
    }

    /// Number of stored lines, same as [`Self::line_counts`]
    pub fn len(&self) -> usize {
        self.line_counts
    }

    pub fn is_empty(&self) -> bool {
        self.line_counts == 0
    }

    /// Bytes used in the buffer, separators included
    pub fn used(&self) -> usize {
        self.buf.len()
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Iterate over the stored lines, in order of arrival.
    pub fn lines(&self) -> impl Iterator<Item = &[u8]> {
        self.buf.split(|b| *b == 0).take(self.line_counts)
    }

    /// Get one line by its number, starting from 1.
    pub fn get_line(&self, line: usize) -> Option<&str> {
        if line == 0 || line > self.line_counts {
            error!(
                "AT response get line failed! Input response line({}) error!",
                line
            );
            return None;
        }
        self.lines()
            .nth(line - 1)
            .and_then(|l| core::str::from_utf8(l).ok())
    }

    /// Get the first line containing `keyword`.
    pub fn get_line_by_keyword(&self, keyword: &str) -> Option<&str> {
        self.lines()
            .find(|l| l.contains_slice(keyword.as_bytes()))
            .and_then(|l| core::str::from_utf8(l).ok())
    }

    /// Split line number `line` into its comma separated arguments.
    pub fn parse_line_args(&self, line: usize) -> Option<LineArgs<'_>> {
        self.get_line(line).map(LineArgs::new)
    }

    pub fn parse_line_args_by_keyword(&self, keyword: &str) -> Option<LineArgs<'_>> {
        self.get_line_by_keyword(keyword).map(LineArgs::new)
    }

    /// Clear the lines and status of a previous exchange.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.line_counts = 0;
        self.received = 0;
        self.status = ResponseStatus::Ok;
    }

    pub(crate) fn set_status(&mut self, status: ResponseStatus) {
        self.status = status;
    }

    /// Feed one received line, terminator already stripped.
    ///
    /// Returns `true` when the line completes the exchange. Status lines
    /// (`OK` without a fixed line count, anything containing `ERROR` or
    /// starting with `FAIL`) complete it without being stored. A line that
    /// does not fit still counts towards a fixed line count, and once the
    /// buffer is full any `OK` ends the exchange.
    pub fn feed_line(&mut self, line: &[u8]) -> bool {
        let buffer_full = self.status == ResponseStatus::BufferFull;
        if (self.line_num == 0 || buffer_full) && line.starts_with(AT_RESP_END_OK) {
            self.finish(ResponseStatus::Ok);
            return true;
        }

        if line.contains_slice(AT_RESP_END_ERROR) || line.starts_with(AT_RESP_END_FAIL) {
            self.finish(ResponseStatus::Error);
            return true;
        }

        self.push_line(line);

        self.line_num != 0 && self.received >= self.line_num
    }

    fn finish(&mut self, status: ResponseStatus) {
        if self.status != ResponseStatus::BufferFull {
            self.status = status;
        }
    }

    fn push_line(&mut self, line: &[u8]) -> bool {
        self.received += 1;
        if self.buf.len() + line.len() + 1 > N {
            error!(
                "Read response buffer failed. The Response buffer size is out of buffer size({})!",
                N
            );
            self.status = ResponseStatus::BufferFull;
            return false;
        }

        // Capacity checked above
        self.buf.extend_from_slice(line).ok();
        self.buf.push(0).ok();
        self.line_counts += 1;
        true
    }
}

/// Iterator over the comma separated arguments of a response line.
///
/// A leading `+CMD:` prefix is skipped and double quotes around an argument
/// are removed.
#[derive(Debug, Clone)]
pub struct LineArgs<'a> {
    rest: &'a str,
    done: bool,
}

impl<'a> LineArgs<'a> {
    pub fn new(line: &'a str) -> Self {
        let rest = match command_prefix(line) {
            Ok((rest, _)) => rest,
            Err(_) => line,
        };
        Self {
            rest,
            done: line.is_empty(),
        }
    }

    /// Parse argument number `index`, starting from 0.
    pub fn arg<T: core::str::FromStr>(&self, index: usize) -> Option<T> {
        self.clone().nth(index)?.parse().ok()
    }
}

impl<'a> Iterator for LineArgs<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match argument(self.rest) {
            Ok((rest, arg)) => {
                match rest.strip_prefix(',') {
                    Some(rest) => self.rest = rest,
                    None => self.done = true,
                }
                Some(arg.trim())
            }
            Err(_) => {
                self.done = true;
                None
            }
        }
    }
}

fn command_prefix(input: &str) -> IResult<&str, &str> {
    recognize(tuple((char('+'), take_till1(|c| c == ':'), char(':'))))(input)
}

fn argument(input: &str) -> IResult<&str, &str> {
    delimited(
        space0,
        alt((
            delimited(char('"'), take_till(|c| c == '"'), char('"')),
            take_till(|c| c == ','),
        )),
        space0,
    )(input)
}
