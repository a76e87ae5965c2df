use embassy_time::Duration;

use crate::error::Error;

/// One entry of a URC table.
///
/// A line matches when it starts with `prefix` and ends with `suffix`. An
/// empty prefix or suffix matches anything. `kind` is handed to the
/// [`UrcHandler`] when the entry matches.
///
/// ```
/// use at_client::Urc;
///
/// #[derive(Clone, Copy)]
/// enum Kind {
///     Connect,
///     Ipd,
/// }
///
/// const URCS: &[Urc<Kind>] = &[
///     Urc::new("", ",CONNECT\r\n", Kind::Connect),
///     Urc::new("+IPD", ":", Kind::Ipd),
/// ];
///
/// assert!(URCS[0].matches(b"3,CONNECT\r\n"));
/// assert!(URCS[1].matches(b"+IPD,0,10:"));
/// assert!(!URCS[1].matches(b"+IPD,0,10"));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Urc<K> {
    pub prefix: &'static str,
    pub suffix: &'static str,
    pub kind: K,
}

impl<K> Urc<K> {
    pub const fn new(prefix: &'static str, suffix: &'static str, kind: K) -> Self {
        Self {
            prefix,
            suffix,
            kind,
        }
    }

    pub fn matches(&self, line: &[u8]) -> bool {
        (self.prefix.is_empty() || line.starts_with(self.prefix.as_bytes()))
            && (self.suffix.is_empty() || line.ends_with(self.suffix.as_bytes()))
    }
}

/// First entry of `table` matching `line`.
pub(crate) fn find_urc<'t, K>(table: &'t [Urc<K>], line: &[u8]) -> Option<&'t Urc<K>> {
    table.iter().find(|urc| urc.matches(line))
}

/// Raw access to the receive stream, given to URC handlers so they can pull
/// a binary payload following the URC line.
pub trait RawReceive {
    /// Fill `buf` completely from the stream.
    ///
    /// `timeout` bounds the idle time between two bytes. `None` uses the
    /// parser's configured receive timeout. Fails with [`Error::Timeout`] if
    /// the stream stalls, in which case the bytes already received are lost.
    fn recv_raw(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> Result<usize, Error>;
}

/// Processes matched URCs on the parser thread.
///
/// Handlers run synchronously and must not issue commands through the
/// client, as the parser is blocked until they return.
pub trait UrcHandler {
    type Kind: Copy;

    /// `line` is the complete matched line, including its terminator.
    fn handle<R: RawReceive>(&self, kind: Self::Kind, line: &[u8], raw: &mut R);
}

/// URC handler for clients that never register URCs.
#[derive(Debug, Default)]
pub struct NoopUrcHandler;

impl UrcHandler for NoopUrcHandler {
    type Kind = ();

    fn handle<R: RawReceive>(&self, _: Self::Kind, _: &[u8], _: &mut R) {}
}
