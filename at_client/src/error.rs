/// Errors returned by the crate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Serial read error, or the transport reached end of stream
    Read,
    /// Serial write error
    Write,
    /// Timed out while waiting for a response
    Timeout,
    /// The module answered with `ERROR`/`FAIL`, or the response did not fit
    /// the response buffer
    Error,
    /// The client is in CLI passthrough mode and cannot capture responses
    Busy,
    /// A received line, or a formatted command, did not fit its buffer
    Overflow,
    /// The transport is already bound to a client
    AlreadyBound,
    /// No free slot left in the client table
    TableFull,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Read => f.write_str("serial read error"),
            Self::Write => f.write_str("serial write error"),
            Self::Timeout => f.write_str("timed out waiting for response"),
            Self::Error => f.write_str("error response"),
            Self::Busy => f.write_str("client in CLI mode"),
            Self::Overflow => f.write_str("buffer overflow"),
            Self::AlreadyBound => f.write_str("transport already bound"),
            Self::TableFull => f.write_str("client table full"),
        }
    }
}
