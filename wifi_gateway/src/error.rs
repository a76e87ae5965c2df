/// Failures of a Modbus-TCP request, each closing the session it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GatewayError {
    /// Inconsistent MBAP header or PDU length
    Malformed,
    /// Register count outside `1..=125`
    InvalidQuantity,
    /// Register range past the end of the address space
    InvalidAddress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    At(at_client::Error),
    /// The session is not connected
    NotConnected,
    InvalidSession,
    /// The module reported `SEND FAIL`
    SendFailed,
    /// The module did not confirm a send in time
    SendTimeout,
    /// The link is still listed by the module after closing it
    CloseFailed,
    Gateway(GatewayError),
}

impl From<at_client::Error> for Error {
    fn from(e: at_client::Error) -> Self {
        Error::At(e)
    }
}

impl From<GatewayError> for Error {
    fn from(e: GatewayError) -> Self {
        Error::Gateway(e)
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::At(e) => write!(f, "AT: {}", e),
            Self::NotConnected => f.write_str("session not connected"),
            Self::InvalidSession => f.write_str("invalid session"),
            Self::SendFailed => f.write_str("send failed"),
            Self::SendTimeout => f.write_str("send timed out"),
            Self::CloseFailed => f.write_str("close failed"),
            Self::Gateway(e) => write!(f, "gateway: {:?}", e),
        }
    }
}
